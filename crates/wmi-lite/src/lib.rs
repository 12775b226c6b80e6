//! wmi-lite: management instrumentation queries as case-insensitive records
//!
//! Executes WQL queries against a namespace through a pluggable
//! [`Provider`](wmi_lite_provider::Provider) and returns each result instance
//! as a [`PropertyBag`]. Provider failures are translated into a single
//! [`QueryError`] kind carrying the namespace, query and class involved.

pub mod error;
pub mod instance;
pub mod query;
pub mod translate;
pub mod wmi;

pub use error::{QueryError, QueryErrorKind};
pub use instance::PropertyBag;
pub use query::Query;
pub use translate::{QueryContext, translate};
pub use wmi::{DEFAULT_NAMESPACE, Wmi};

pub use wmi_lite_provider::{
    Connection, NativeInstance, Provider, ProviderError, ResultSet, Variant,
};
