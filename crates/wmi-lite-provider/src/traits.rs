//! Native provider capability traits

use std::fmt;

use crate::error::ProviderError;
use crate::value::Variant;

/// Entry point of a native management instrumentation provider
///
/// Shared as `Arc<dyn Provider>`; each call to [`Provider::connect`] opens a
/// new session bound to one namespace.
pub trait Provider: Send + Sync {
    /// Open a session to `namespace`
    ///
    /// # Errors
    /// Returns the native failure when the namespace cannot be bound.
    fn connect(&self, namespace: &str) -> Result<Box<dyn Connection>, ProviderError>;

    /// Short provider name for diagnostics
    fn provider_type(&self) -> &'static str;
}

/// Session bound to a single namespace
pub trait Connection: Send {
    /// Submit a query
    ///
    /// Providers may defer evaluation; failures can surface here, from
    /// [`ResultSet::evaluate`], or during iteration.
    ///
    /// # Errors
    /// Returns the native failure when the query is rejected outright.
    fn exec_query(&self, wql: &str) -> Result<Box<dyn ResultSet>, ProviderError>;

    /// Namespace this session is bound to
    fn namespace(&self) -> &str;
}

/// Native result collection, iterated in provider order
pub trait ResultSet: Iterator<Item = Result<Box<dyn NativeInstance>, ProviderError>> + Send {
    /// Force evaluation of the query and return the number of instances
    ///
    /// # Errors
    /// Returns the native failure of a query that could not be evaluated.
    fn evaluate(&mut self) -> Result<usize, ProviderError>;
}

/// One opaque instance returned by a query
pub trait NativeInstance: Send + fmt::Debug {
    /// Property names in schema order, with their original letter case
    fn property_names(&self) -> Vec<String>;

    /// Fetch a property's current value by its exact name
    ///
    /// # Errors
    /// Returns the native failure when the value cannot be read.
    fn property(&self, name: &str) -> Result<Variant, ProviderError>;

    /// Class of the instance, when the provider exposes it
    fn class_name(&self) -> Option<&str> {
        None
    }
}
