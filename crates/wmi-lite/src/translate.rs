//! Translation of provider failures into [`QueryError`]

use tracing::warn;
use wmi_lite_provider::ProviderError;

use crate::error::{QueryError, QueryErrorKind};

/// Where a failure happened
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    /// Namespace being connected to or queried
    pub namespace: &'a str,
    /// Query text being executed
    pub query: &'a str,
    /// Target class, when the query was built from a class name
    pub class_name: Option<&'a str>,
}

impl<'a> QueryContext<'a> {
    /// Context for a raw query with no class information
    #[must_use]
    pub fn new(namespace: &'a str, query: &'a str) -> Self {
        Self {
            namespace,
            query,
            class_name: None,
        }
    }

    /// Attach the target class
    #[must_use]
    pub fn with_class(mut self, class_name: Option<&'a str>) -> Self {
        self.class_name = class_name;
        self
    }
}

/// Build a [`QueryError`] from a provider failure and its context
///
/// Well-known status codes get a descriptive preamble naming the class,
/// namespace or query; the provider message is always kept as the suffix.
#[must_use]
pub fn translate(error: ProviderError, context: &QueryContext<'_>) -> QueryError {
    let native = error.message();
    let status_code = parse_status_code(native);
    let kind = classify(status_code);
    let namespace = context.namespace;
    let query = context.query;

    let message = match (kind, context.class_name) {
        (QueryErrorKind::InvalidClass, Some(class)) => format!(
            "The specified class '{class}' is not valid in the namespace '{namespace}'.\n{native}"
        ),
        (QueryErrorKind::InvalidClass, None) => format!(
            "The specified query '{query}' referenced a class that is not valid in the namespace '{namespace}'.\n{native}"
        ),
        (QueryErrorKind::InvalidNamespace, _) => {
            format!("The specified namespace '{namespace}' is not valid.\n{native}")
        }
        (QueryErrorKind::InvalidQuery, _) => {
            format!("The specified query '{query}' is not valid.\n{native}")
        }
        (QueryErrorKind::Provider, _) => native.to_string(),
    };

    warn!(
        namespace = %namespace,
        query = %query,
        status_code = status_code.unwrap_or_default(),
        ?kind,
        "query failed"
    );

    QueryError {
        kind,
        namespace: namespace.to_string(),
        query: query.to_string(),
        class_name: context.class_name.map(str::to_string),
        status_code: status_code.map(str::to_string),
        message,
        source: error,
    }
}

fn classify(status_code: Option<&str>) -> QueryErrorKind {
    match status_code {
        Some(code) if code.eq_ignore_ascii_case("80041010") => QueryErrorKind::InvalidClass,
        Some(code) if code.eq_ignore_ascii_case("8004100E") => QueryErrorKind::InvalidNamespace,
        Some(code) if code.eq_ignore_ascii_case("80041017") => QueryErrorKind::InvalidQuery,
        _ => QueryErrorKind::Provider,
    }
}

/// Extract the status code from a native message
///
/// The code is the run of 1 to 8 hex digits following the first colon that
/// comes after a non-colon character, with optional whitespace in between.
fn parse_status_code(message: &str) -> Option<&str> {
    let bytes = message.as_bytes();

    for (colon, _) in message.match_indices(':') {
        if colon == 0 || bytes[colon - 1] == b':' {
            continue;
        }

        let after = &message[colon + 1..];
        let digits = after.trim_start_matches(|c: char| {
            matches!(c, ' ' | '\t' | '\n' | '\x0B' | '\x0C' | '\r')
        });
        let len = digits
            .bytes()
            .take(8)
            .take_while(u8::is_ascii_hexdigit)
            .count();
        if len > 0 {
            return Some(&digits[..len]);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(class_name: Option<&'a str>) -> QueryContext<'a> {
        QueryContext::new("root/cimv2", "select * from Win32_Bogus").with_class(class_name)
    }

    #[test]
    fn test_parse_status_code() {
        assert_eq!(parse_status_code("OLE error code:80041010"), Some("80041010"));
        assert_eq!(
            parse_status_code("(in OLE method `ExecQuery': )\n    OLE error code:80041017 in SWbemServicesEx"),
            Some("80041017")
        );
        assert_eq!(parse_status_code("code: 8004100e"), Some("8004100e"));
        assert_eq!(parse_status_code("code:800410100"), Some("80041010"));
        assert_eq!(parse_status_code("unparseableerror"), None);
        assert_eq!(parse_status_code(":80041010"), None);
        assert_eq!(parse_status_code("a::80041010"), None);
        assert_eq!(parse_status_code("a: zzz"), None);
    }

    #[test]
    fn test_parse_status_code_skips_ascii_whitespace_only() {
        assert_eq!(
            parse_status_code("code:\t\r\n\x0B\x0C 80041010"),
            Some("80041010")
        );
        assert_eq!(parse_status_code("code:\u{3000}80041010"), None);
        assert_eq!(parse_status_code("code:\u{a0}80041010"), None);
    }

    #[test]
    fn test_invalid_class_without_class_name() {
        let native = "OLE error code:80041010";
        let err = translate(ProviderError::new(native), &context(None));
        assert_eq!(err.kind(), QueryErrorKind::InvalidClass);
        assert!(err.message().contains(
            "referenced a class that is not valid in the namespace 'root/cimv2'"
        ));
        assert!(err.message().contains("'select * from Win32_Bogus'"));
        assert!(err.message().ends_with(native));
    }

    #[test]
    fn test_invalid_class_with_class_name() {
        let native = "OLE error code:80041010";
        let err = translate(ProviderError::new(native), &context(Some("Win32_Bogus")));
        assert!(err.is_invalid_class());
        assert!(err.message().starts_with(
            "The specified class 'Win32_Bogus' is not valid in the namespace 'root/cimv2'."
        ));
        assert!(err.message().ends_with(native));
        assert_eq!(err.class_name(), Some("Win32_Bogus"));
    }

    #[test]
    fn test_invalid_namespace() {
        let native = "OLE error code:8004100E in SWbemLocator";
        let err = translate(ProviderError::new(native), &context(None));
        assert!(err.is_invalid_namespace());
        assert!(err.message().contains("namespace 'root/cimv2' is not valid"));
        assert!(err.message().ends_with(native));
    }

    #[test]
    fn test_invalid_query_code_ignores_case() {
        let native = "error:80041017";
        let err = translate(ProviderError::new(native), &context(None));
        assert!(err.is_invalid_query());
        assert_eq!(
            err.message(),
            "The specified query 'select * from Win32_Bogus' is not valid.\nerror:80041017"
        );

        let err = translate(ProviderError::new("error:8004100e"), &context(None));
        assert!(err.is_invalid_namespace());
    }

    #[test]
    fn test_unrecognized_code_keeps_message() {
        let err = translate(ProviderError::new("unparseableerror"), &context(Some("Win32_Bogus")));
        assert_eq!(err.kind(), QueryErrorKind::Provider);
        assert_eq!(err.message(), "unparseableerror");
        assert_eq!(err.to_string(), "unparseableerror");
        assert_eq!(err.status_code(), None);

        let err = translate(ProviderError::new("failure:80070005"), &context(None));
        assert_eq!(err.message(), "failure:80070005");
        assert_eq!(err.status_code(), Some("80070005"));
    }

    #[test]
    fn test_context_is_recorded() {
        let err = translate(ProviderError::new("x"), &context(Some("Win32_Bogus")));
        assert_eq!(err.namespace(), "root/cimv2");
        assert_eq!(err.query(), "select * from Win32_Bogus");
        assert_eq!(err.provider_error().message(), "x");
        assert!(std::error::Error::source(&err).is_some());
    }
}
