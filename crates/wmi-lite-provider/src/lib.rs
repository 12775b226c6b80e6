//! wmi-lite-provider: management instrumentation provider abstraction
//!
//! Defines the capability contract a native provider must offer (connect to a
//! namespace, execute a query, enumerate and fetch instance properties) and an
//! in-memory provider backed by a snapshot of namespaces, classes and instances.

pub mod error;
pub mod memory;
pub mod traits;
pub mod value;
mod wql;

pub use error::ProviderError;
pub use memory::{CallCounts, MemoryInstance, MemoryProvider, Snapshot};
pub use traits::{Connection, NativeInstance, Provider, ResultSet};
pub use value::Variant;
