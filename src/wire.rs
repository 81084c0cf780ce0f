//! Thin wrappers over `rmp`'s marker-level encode/decode functions.
//!
//! Nothing here understands namespaces or intern tables; it only converts `rmp`'s
//! generically-parameterized error types into this crate's own [`Error::Wire`].

use crate::error::Error;

/// Extension tag used for intern-table frames and back-references.
pub const INTERN_TAG: i8 = 6;
/// Extension tag used for custom-type records.
pub const CUSTOM_TAG: i8 = 8;

pub(crate) fn wire_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Wire(e.to_string())
}

pub(crate) fn write_nil(out: &mut Vec<u8>) -> Result<(), Error> {
    rmp::encode::write_nil(out).map_err(wire_err)
}

pub(crate) fn write_bool(out: &mut Vec<u8>, v: bool) -> Result<(), Error> {
    rmp::encode::write_bool(out, v).map_err(wire_err)
}

pub(crate) fn write_int(out: &mut Vec<u8>, v: i64) -> Result<(), Error> {
    rmp::encode::write_sint(out, v).map(|_| ()).map_err(wire_err)
}

pub(crate) fn write_uint(out: &mut Vec<u8>, v: u64) -> Result<(), Error> {
    rmp::encode::write_uint(out, v).map(|_| ()).map_err(wire_err)
}

pub(crate) fn write_float(out: &mut Vec<u8>, v: f64) -> Result<(), Error> {
    rmp::encode::write_f64(out, v).map_err(wire_err)
}

pub(crate) fn write_str(out: &mut Vec<u8>, v: &str) -> Result<(), Error> {
    rmp::encode::write_str(out, v).map_err(wire_err)
}

pub(crate) fn write_bin(out: &mut Vec<u8>, v: &[u8]) -> Result<(), Error> {
    rmp::encode::write_bin(out, v).map_err(wire_err)
}

pub(crate) fn write_array_len(out: &mut Vec<u8>, len: usize) -> Result<(), Error> {
    rmp::encode::write_array_len(out, len as u32).map(|_| ()).map_err(wire_err)
}

pub(crate) fn write_map_len(out: &mut Vec<u8>, len: usize) -> Result<(), Error> {
    rmp::encode::write_map_len(out, len as u32).map(|_| ()).map_err(wire_err)
}

pub(crate) fn write_ext(out: &mut Vec<u8>, tag: i8, payload: &[u8]) -> Result<(), Error> {
    rmp::encode::write_ext_meta(out, payload.len() as u32, tag).map_err(wire_err)?;
    out.extend_from_slice(payload);
    Ok(())
}

/// Split `n` bytes off the front of `cur`, advancing it.
pub(crate) fn take<'a>(cur: &mut &'a [u8], n: usize) -> Result<&'a [u8], Error> {
    if cur.len() < n {
        return Err(Error::MalformedExtension("unexpected end of input"));
    }
    let (head, tail) = cur.split_at(n);
    *cur = tail;
    Ok(head)
}
