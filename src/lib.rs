//! A self-describing codec layered on MessagePack.
//!
//! Adds two cooperating extension mechanisms over the base wire format: a
//! namespaced registry that routes custom-typed values through user-supplied
//! encoders/decoders ([`registry`]), and an intern table that lets an encoder
//! deduplicate repeated substructures within one message and replace repeats with
//! compact back-references ([`intern`], exposed through [`Value::intern_by_identity`]
//! and [`Value::intern_by_equality`]).

mod codec;
mod error;
mod intern;
pub mod namespaces;
mod registry;
mod value;
mod wire;

pub use codec::Codec;
pub use error::Error;
pub use registry::{CatchAllNamespace, MatchPolicy, Namespace, NamespaceModule};
pub use value::{InternMode, InternNode, Value};
pub use wire::{CUSTOM_TAG, INTERN_TAG};
