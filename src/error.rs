use std::error;
use std::fmt;

/// Errors produced while encoding or decoding a [`Value`](crate::Value).
#[derive(Debug)]
pub enum Error {
    /// No registered namespace matched the value handed to `dumps`.
    Unserializable,
    /// A namespace with this name is already registered.
    DuplicateNamespace(String),
    /// Two entries in the same namespace were registered under the same type id.
    DuplicateTypeId { namespace: String, type_id: u32 },
    /// An extension record named a namespace this codec has never heard of.
    UnknownNamespace(String),
    /// An extension record named a type id with no matching entry in its namespace.
    UnknownTypeId { namespace: String, type_id: u32 },
    /// Frame-form `INTERN_TAG` encountered while a table is already active.
    NestedTable,
    /// An intern reference named an index at or beyond the entries loaded so far.
    ForwardReference { index: u64, loaded: usize },
    /// Reference-form `INTERN_TAG` encountered with no active table.
    StrayReference,
    /// An extension record's payload didn't have the shape its tag requires.
    MalformedExtension(&'static str),
    /// A malformed or truncated MessagePack primitive.
    Wire(String),
    /// A registered namespace's own encode/decode function failed.
    Custom {
        namespace: String,
        type_id: u32,
        source: Box<dyn error::Error + 'static>,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unserializable => write!(f, "no registered namespace matches this value"),
            Error::DuplicateNamespace(name) => write!(f, "namespace '{name}' already exists"),
            Error::DuplicateTypeId { namespace, type_id } => {
                write!(f, "type id {type_id} already registered in namespace '{namespace}'")
            }
            Error::UnknownNamespace(name) => write!(f, "unknown namespace: {name}"),
            Error::UnknownTypeId { namespace, type_id } => {
                write!(f, "unknown type_id {type_id} in namespace {namespace}")
            }
            Error::NestedTable => {
                write!(f, "intern tables cannot be nested: Ext 6 is reference-form while a table is active")
            }
            Error::ForwardReference { index, loaded } => {
                write!(f, "forward reference detected: index {index} with only {loaded} entries loaded")
            }
            Error::StrayReference => write!(f, "intern reference encountered with no active table"),
            Error::MalformedExtension(reason) => write!(f, "malformed extension record: {reason}"),
            Error::Wire(msg) => write!(f, "{msg}"),
            Error::Custom { namespace, type_id, source } => {
                write!(f, "namespace '{namespace}' type_id {type_id} failed: {source}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Custom { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
