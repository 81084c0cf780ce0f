//! Example plugin namespaces. Not part of the core protocol — these exist to show
//! how a consumer registers its own namespace, the way the distilled system's
//! own `table` namespace wraps array/dataframe libraries behind feature flags.

#[cfg(feature = "uuid-namespace")]
pub mod uuid_ns;
