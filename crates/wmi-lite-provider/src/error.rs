//! Error types for wmi-lite-provider

use thiserror::Error;

/// Failure reported by a native provider
///
/// Carries the provider's message text verbatim. Native providers embed a
/// hexadecimal status code in the text (e.g. `OLE error code:80041010`), which
/// callers may parse for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    /// Create an error from native message text
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Create an error in the native format for a status code
    ///
    /// Produces `OLE error code:<code> in <component>` followed by an indented
    /// description line.
    pub fn with_status(code: u32, component: &str, description: &str) -> Self {
        Self::new(format!(
            "OLE error code:{code:08X} in {component}\n    {description}"
        ))
    }

    /// Native message text
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ProviderError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
