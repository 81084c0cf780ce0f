//! Encode-side and decode-side intern-table state.
//!
//! The encode and decode sides need different shapes (bytes-in-progress vs.
//! already-decoded values), so unlike the distilled system's single `InternTable`
//! class, this crate keeps two small, purpose-built types.

use std::collections::HashMap;

use crate::value::Value;

/// Encode-side table: entries recorded in the order they were promoted.
#[derive(Default)]
pub(crate) struct EncodeInternTable {
    /// Already-serialized bytes of each entry, in order.
    pub entries: Vec<Vec<u8>>,
    /// `Rc::as_ptr` address -> entry index, for identity-mode dedup.
    pub by_identity: HashMap<usize, usize>,
    /// Pre-encode values, kept only so equality-mode dedup can scan them.
    pub originals: Vec<Value>,
}

impl EncodeInternTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let _ = crate::wire::write_array_len(&mut out, self.entries.len());
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
        out
    }
}

/// Per-codec-call encode-side intern context. At most one table is active at a time.
#[derive(Default)]
pub(crate) struct EncodeInternContext {
    pub table: Option<EncodeInternTable>,
}

impl EncodeInternContext {
    pub fn is_active(&self) -> bool {
        self.table.is_some()
    }
}

/// Decode-side table: already-decoded entry values, indexable by reference.
pub(crate) type DecodeInternTable = Vec<Value>;
