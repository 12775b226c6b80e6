//! Error types for wmi-lite

use thiserror::Error;
use wmi_lite_provider::ProviderError;

/// Classification of a query failure, derived from the native status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The query referenced a class that does not exist in the namespace
    InvalidClass,
    /// The namespace does not exist
    InvalidNamespace,
    /// The query text could not be parsed
    InvalidQuery,
    /// Any other provider failure
    Provider,
}

/// Failure of a query operation
///
/// Covers both connection failures and query execution failures. The message
/// always ends with the provider's original message text.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct QueryError {
    pub(crate) kind: QueryErrorKind,
    pub(crate) namespace: String,
    pub(crate) query: String,
    pub(crate) class_name: Option<String>,
    pub(crate) status_code: Option<String>,
    pub(crate) message: String,
    pub(crate) source: ProviderError,
}

impl QueryError {
    /// Failure classification
    #[must_use]
    pub fn kind(&self) -> QueryErrorKind {
        self.kind
    }

    /// Namespace the operation targeted
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Query text that was submitted
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Class name, known only for class-based convenience queries
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    /// Hexadecimal status code parsed from the provider message
    #[must_use]
    pub fn status_code(&self) -> Option<&str> {
        self.status_code.as_deref()
    }

    /// Full diagnostic message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Original provider failure
    #[must_use]
    pub fn provider_error(&self) -> &ProviderError {
        &self.source
    }

    /// Check if the failure names an unknown class
    #[must_use]
    pub fn is_invalid_class(&self) -> bool {
        self.kind == QueryErrorKind::InvalidClass
    }

    /// Check if the failure names an unknown namespace
    #[must_use]
    pub fn is_invalid_namespace(&self) -> bool {
        self.kind == QueryErrorKind::InvalidNamespace
    }

    /// Check if the query text was rejected
    #[must_use]
    pub fn is_invalid_query(&self) -> bool {
        self.kind == QueryErrorKind::InvalidQuery
    }
}
