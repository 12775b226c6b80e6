//! WQL query builder

use std::fmt;

/// WQL select query builder
///
/// Renders lower-case WQL; a builder with no projection or conditions renders
/// exactly `select * from <Class>`.
#[derive(Debug, Clone)]
pub struct Query {
    /// Projected properties, empty for `*`
    select: Vec<String>,
    /// Target class
    from: String,
    /// WHERE clauses, joined with `and`
    where_clauses: Vec<String>,
}

impl Query {
    /// Create a query selecting every property of a class
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            select: Vec::new(),
            from: class.into(),
            where_clauses: Vec::new(),
        }
    }

    /// Select specific properties
    #[must_use]
    pub fn select(mut self, properties: &[&str]) -> Self {
        self.select = properties.iter().map(|p| (*p).to_string()).collect();
        self
    }

    /// Add an equality condition
    #[must_use]
    pub fn where_eq(mut self, property: &str, value: &str) -> Self {
        self.where_clauses
            .push(format!("{property} = '{}'", escape(value)));
        self
    }

    /// Add a `like` condition (`%` and `_` wildcards)
    #[must_use]
    pub fn where_like(mut self, property: &str, pattern: &str) -> Self {
        self.where_clauses
            .push(format!("{property} like '{}'", escape(pattern)));
        self
    }

    /// Target class
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.from
    }

    /// Build the WQL string
    #[must_use]
    pub fn build(&self) -> String {
        let select = if self.select.is_empty() {
            "*".to_string()
        } else {
            self.select.join(", ")
        };
        let mut wql = format!("select {select} from {}", self.from);

        if !self.where_clauses.is_empty() {
            wql.push_str(" where ");
            wql.push_str(&self.where_clauses.join(" and "));
        }

        wql
    }
}

/// Escape single quotes by doubling them
fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all() {
        assert_eq!(
            Query::new("Win32_TapeDrive").build(),
            "select * from Win32_TapeDrive"
        );
    }

    #[test]
    fn test_query_builder() {
        let query = Query::new("Win32_Service")
            .select(&["Name", "State"])
            .where_eq("StartMode", "Auto")
            .where_like("Name", "w%");

        assert_eq!(
            query.build(),
            "select Name, State from Win32_Service where StartMode = 'Auto' and Name like 'w%'"
        );
        assert_eq!(query.class_name(), "Win32_Service");
        assert_eq!(query.to_string(), query.build());
    }

    #[test]
    fn test_quote_escaping() {
        let query = Query::new("Win32_UserAccount").where_eq("Name", "test' or '1'='1");
        assert!(query.build().contains("Name = 'test'' or ''1''=''1'"));
    }
}
