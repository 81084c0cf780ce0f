//! Public entry points: [`Codec::dumps`] and [`Codec::loads`].

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use rmp::Marker;

use crate::error::Error;
use crate::intern::{DecodeInternTable, EncodeInternContext, EncodeInternTable};
use crate::registry::{Namespace, NamespaceModule, NamespaceRegistry};
use crate::value::{InternMode, Value};
use crate::wire::{self, CUSTOM_TAG, INTERN_TAG};

/// A self-describing MessagePack codec: owns a namespace registry and the
/// single-message intern-table state for the lifetime of one `dumps`/`loads` call.
pub struct Codec {
    registry: NamespaceRegistry,
    encode_intern: RefCell<EncodeInternContext>,
    decode_intern: RefCell<Option<DecodeInternTable>>,
}

impl Codec {
    pub fn new() -> Self {
        Codec {
            registry: NamespaceRegistry::new(),
            encode_intern: RefCell::new(EncodeInternContext::default()),
            decode_intern: RefCell::new(None),
        }
    }

    pub fn with_namespaces(namespaces: impl IntoIterator<Item = (String, Namespace)>) -> Result<Self, Error> {
        let mut codec = Self::new();
        for (name, ns) in namespaces {
            codec.add_namespace(name, ns)?;
        }
        Ok(codec)
    }

    pub fn add_namespace(&mut self, name: impl Into<String>, namespace: Namespace) -> Result<(), Error> {
        self.registry.add_namespace(name, namespace)
    }

    pub fn add_module(&mut self, module: NamespaceModule) -> Result<(), Error> {
        self.registry.add_module(module)
    }

    pub fn clear_namespaces(&mut self) {
        self.registry.clear();
    }

    /// Serialize `value` to bytes. If encoding `value` promotes any entries into
    /// an intern table, the returned bytes are the frame form (`Ext(INTERN_TAG,
    /// pack(entries) ++ pack(value))`); otherwise they're the plain encoding.
    pub fn dumps(&self, value: &Value) -> Result<Vec<u8>, Error> {
        // A table left active by a reentrant call (see the module docs on Codec's
        // concurrency model) is force-ended so this call starts clean, matching
        // the reference behavior rather than silently isolating per-call state.
        self.encode_intern.borrow_mut().table = None;

        let body = self.encode_dispatch(value)?;

        let table = self.encode_intern.borrow_mut().table.take();
        match table {
            None => Ok(body),
            Some(table) => {
                let mut framed = Vec::new();
                wire::write_ext(
                    &mut framed,
                    INTERN_TAG,
                    &{
                        let mut payload = table.get_bytes();
                        payload.extend_from_slice(&body);
                        payload
                    },
                )?;
                Ok(framed)
            }
        }
    }

    pub fn loads(&self, data: &[u8]) -> Result<Value, Error> {
        *self.decode_intern.borrow_mut() = None;
        let mut cur = data;
        let value = self.decode_dispatch(&mut cur)?;
        Ok(value)
    }

    // ---- encode ----

    fn encode_dispatch(&self, value: &Value) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        match value {
            Value::Nil => wire::write_nil(&mut out)?,
            Value::Bool(b) => wire::write_bool(&mut out, *b)?,
            Value::Int(i) => wire::write_int(&mut out, *i)?,
            Value::UInt(u) => wire::write_uint(&mut out, *u)?,
            Value::Float(v) => wire::write_float(&mut out, *v)?,
            Value::String(s) => wire::write_str(&mut out, s)?,
            Value::Binary(b) => wire::write_bin(&mut out, b)?,
            Value::Array(items) => {
                wire::write_array_len(&mut out, items.len())?;
                for item in items {
                    out.extend(self.encode_dispatch(item)?);
                }
            }
            Value::Map(pairs) => {
                wire::write_map_len(&mut out, pairs.len())?;
                for (k, v) in pairs {
                    out.extend(self.encode_dispatch(k)?);
                    out.extend(self.encode_dispatch(v)?);
                }
            }
            Value::Ext(tag, data) => wire::write_ext(&mut out, *tag, data)?,
            Value::Custom(any) => return self.encode_custom(any),
            Value::Intern(node) => return self.encode_intern(node.mode, &node.value),
        }
        Ok(out)
    }

    fn encode_custom(&self, any: &Rc<dyn Any>) -> Result<Vec<u8>, Error> {
        let (namespace, type_id, data) = self.registry.encode(self, any.as_ref())?;
        let mut payload = Vec::new();
        wire::write_str(&mut payload, &namespace)?;
        wire::write_uint(&mut payload, type_id as u64)?;
        payload.extend_from_slice(&data);
        let mut out = Vec::new();
        wire::write_ext(&mut out, CUSTOM_TAG, &payload)?;
        Ok(out)
    }

    fn encode_intern(&self, mode: InternMode, value: &Rc<Value>) -> Result<Vec<u8>, Error> {
        if self.encode_intern.borrow().table.is_none() {
            self.encode_intern.borrow_mut().table = Some(EncodeInternTable::default());
        }

        let existing_index = {
            let ctx = self.encode_intern.borrow();
            debug_assert!(ctx.is_active());
            let table = ctx.table.as_ref().expect("just ensured");
            match mode {
                InternMode::Identity => table.by_identity.get(&(Rc::as_ptr(value) as *const () as usize)).copied(),
                InternMode::Equality => table.originals.iter().position(|existing| existing == value.as_ref()),
            }
        };

        let index = match existing_index {
            Some(index) => index,
            None => {
                // Recurse before recording the entry: a child `Intern` node nested
                // inside `value` may itself need to borrow this same table, and
                // its entries must land at lower indices than this one (the
                // topological rule), which naturally falls out of encoding the
                // child first.
                let bytes = self.encode_dispatch(value)?;
                let mut ctx = self.encode_intern.borrow_mut();
                let table = ctx.table.as_mut().expect("just ensured");
                let index = table.len();
                if matches!(mode, InternMode::Identity) {
                    table.by_identity.insert(Rc::as_ptr(value) as *const () as usize, index);
                }
                table.originals.push(value.as_ref().clone());
                table.entries.push(bytes);
                index
            }
        };

        let mut payload = Vec::new();
        wire::write_uint(&mut payload, index as u64)?;
        let mut out = Vec::new();
        wire::write_ext(&mut out, INTERN_TAG, &payload)?;
        Ok(out)
    }

    // ---- decode ----

    fn decode_dispatch(&self, cur: &mut &[u8]) -> Result<Value, Error> {
        let marker_byte = *cur.first().ok_or(Error::MalformedExtension("unexpected end of input"))?;
        let marker = Marker::from_u8(marker_byte);
        match marker {
            Marker::Null => {
                rmp::decode::read_nil(cur).map_err(wire::wire_err)?;
                Ok(Value::Nil)
            }
            Marker::True | Marker::False => {
                Ok(Value::Bool(rmp::decode::read_bool(cur).map_err(wire::wire_err)?))
            }
            Marker::FixPos(_) | Marker::U8 | Marker::U16 | Marker::U32 | Marker::U64 => {
                Ok(Value::UInt(rmp::decode::read_int::<u64, _>(cur).map_err(wire::wire_err)?))
            }
            Marker::FixNeg(_) | Marker::I8 | Marker::I16 | Marker::I32 | Marker::I64 => {
                Ok(Value::Int(rmp::decode::read_int::<i64, _>(cur).map_err(wire::wire_err)?))
            }
            Marker::F32 => Ok(Value::Float(rmp::decode::read_f32(cur).map_err(wire::wire_err)? as f64)),
            Marker::F64 => Ok(Value::Float(rmp::decode::read_f64(cur).map_err(wire::wire_err)?)),
            Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => {
                let len = rmp::decode::read_str_len(cur).map_err(wire::wire_err)? as usize;
                let bytes = wire::take(cur, len)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|_| Error::MalformedExtension("string payload is not valid utf-8"))?;
                Ok(Value::String(s.to_owned()))
            }
            Marker::Bin8 | Marker::Bin16 | Marker::Bin32 => {
                let len = rmp::decode::read_bin_len(cur).map_err(wire::wire_err)? as usize;
                Ok(Value::Binary(wire::take(cur, len)?.to_vec()))
            }
            Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => {
                let len = rmp::decode::read_array_len(cur).map_err(wire::wire_err)? as usize;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.decode_dispatch(cur)?);
                }
                Ok(Value::Array(items))
            }
            Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => {
                let len = rmp::decode::read_map_len(cur).map_err(wire::wire_err)? as usize;
                let mut pairs = Vec::with_capacity(len);
                for _ in 0..len {
                    let k = self.decode_dispatch(cur)?;
                    let v = self.decode_dispatch(cur)?;
                    pairs.push((k, v));
                }
                Ok(Value::Map(pairs))
            }
            Marker::FixExt1
            | Marker::FixExt2
            | Marker::FixExt4
            | Marker::FixExt8
            | Marker::FixExt16
            | Marker::Ext8
            | Marker::Ext16
            | Marker::Ext32 => {
                let meta = rmp::decode::read_ext_meta(cur).map_err(wire::wire_err)?;
                let payload = wire::take(cur, meta.size as usize)?;
                self.decode_ext(meta.typeid, payload)
            }
            Marker::Reserved => Err(Error::MalformedExtension("reserved marker 0xc1")),
        }
    }

    fn decode_ext(&self, typeid: i8, mut payload: &[u8]) -> Result<Value, Error> {
        match typeid {
            INTERN_TAG => {
                let active = self.decode_intern.borrow().is_some();
                if active {
                    let index =
                        rmp::decode::read_int::<u64, _>(&mut payload).map_err(|_| Error::NestedTable)? as usize;
                    let ctx = self.decode_intern.borrow();
                    let table = ctx.as_ref().expect("checked active above");
                    if index >= table.len() {
                        return Err(Error::ForwardReference { index: index as u64, loaded: table.len() });
                    }
                    Ok(table[index].clone())
                } else {
                    *self.decode_intern.borrow_mut() = Some(Vec::new());
                    let result = (|| {
                        let len = rmp::decode::read_array_len(&mut payload).map_err(|_| Error::StrayReference)?
                            as usize;
                        for _ in 0..len {
                            let entry = self.decode_dispatch(&mut payload)?;
                            self.decode_intern.borrow_mut().as_mut().expect("just set").push(entry);
                        }
                        self.decode_dispatch(&mut payload)
                    })();
                    *self.decode_intern.borrow_mut() = None;
                    result
                }
            }
            CUSTOM_TAG => {
                let namespace = match self.decode_dispatch(&mut payload)? {
                    Value::String(s) => s,
                    _ => return Err(Error::MalformedExtension("custom-type namespace must be a string")),
                };
                let type_id = match self.decode_dispatch(&mut payload)? {
                    Value::UInt(u) => u as u32,
                    Value::Int(i) if i >= 0 => i as u32,
                    _ => return Err(Error::MalformedExtension("custom-type type_id must be a non-negative integer")),
                };
                let decoded = self
                    .registry
                    .decode(self, &namespace, type_id, payload)
                    .map_err(|e| wrap_custom(namespace, type_id, e))?;
                Ok(Value::Custom(decoded))
            }
            other => Ok(Value::Ext(other, payload.to_vec())),
        }
    }
}

fn wrap_custom(namespace: String, type_id: u32, err: Error) -> Error {
    match err {
        Error::UnknownNamespace(_) | Error::UnknownTypeId { .. } => err,
        other => Error::Custom { namespace, type_id, source: Box::new(other) },
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}
