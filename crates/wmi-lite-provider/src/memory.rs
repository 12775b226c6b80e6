//! In-memory provider backed by a snapshot
//!
//! Serves namespaces, classes and instances held in memory, answering a small
//! WQL subset. Failures are reported with the same status codes a native
//! provider uses, so callers exercise their real error paths.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ProviderError;
use crate::traits::{Connection, NativeInstance, Provider, ResultSet};
use crate::value::Variant;
use crate::wql::{self, Op, Select};

const WBEM_E_NOT_FOUND: u32 = 0x8004_1002;
const WBEM_E_INVALID_NAMESPACE: u32 = 0x8004_100E;
const WBEM_E_INVALID_CLASS: u32 = 0x8004_1010;
const WBEM_E_INVALID_QUERY: u32 = 0x8004_1017;

// ============================================================================
// Snapshot format
// ============================================================================

/// Serializable contents of a [`MemoryProvider`]
///
/// ```toml
/// [[namespace]]
/// name = "root/cimv2"
///
/// [[namespace.class]]
/// name = "Win32_ComputerSystem"
///
/// [[namespace.class.instance]]
/// Name = "mycomputer1"
/// NumberOfProcessors = 4
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Namespaces
    #[serde(default, rename = "namespace")]
    pub namespaces: Vec<NamespaceSnapshot>,
}

/// One namespace in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceSnapshot {
    /// Namespace path, e.g. `root/cimv2`
    pub name: String,
    /// Classes in this namespace
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassSnapshot>,
}

/// One class in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSnapshot {
    /// Class name
    pub name: String,
    /// Instances as property maps (properties enumerate in key order)
    #[serde(default, rename = "instance")]
    pub instances: Vec<BTreeMap<String, Variant>>,
}

// ============================================================================
// Instances
// ============================================================================

/// Instance stored in a [`MemoryProvider`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryInstance {
    properties: Vec<(String, Variant)>,
}

impl MemoryInstance {
    /// Create an instance with no properties
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property; properties enumerate in insertion order
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.properties.push((name.into(), value.into()));
        self
    }

    fn get(&self, name: &str) -> Option<(&str, &Variant)> {
        self.properties
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(n, v)| (n.as_str(), v))
    }
}

impl From<BTreeMap<String, Variant>> for MemoryInstance {
    fn from(map: BTreeMap<String, Variant>) -> Self {
        Self {
            properties: map.into_iter().collect(),
        }
    }
}

// ============================================================================
// Provider
// ============================================================================

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    queries: AtomicUsize,
    fetches: AtomicUsize,
}

/// Number of capability calls observed by a [`MemoryProvider`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Successful and failed `connect` calls
    pub connects: usize,
    /// `exec_query` calls
    pub queries: usize,
    /// Property value fetches
    pub fetches: usize,
}

#[derive(Debug, Clone)]
struct ClassData {
    name: String,
    instances: Vec<MemoryInstance>,
}

#[derive(Debug, Clone)]
struct NamespaceData {
    name: String,
    classes: Vec<ClassData>,
}

/// Provider serving a snapshot held in memory
///
/// Clones share the same data and call counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    namespaces: Arc<Vec<NamespaceData>>,
    counters: Arc<Counters>,
    connect_error: Option<ProviderError>,
    query_error: Option<ProviderError>,
}

/// Namespace paths compare case-insensitively and accept either separator
fn namespace_key(namespace: &str) -> String {
    namespace
        .replace('\\', "/")
        .trim_matches('/')
        .to_ascii_lowercase()
}

impl MemoryProvider {
    /// Create an empty provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider serving the contents of a snapshot
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        snapshot
            .namespaces
            .into_iter()
            .fold(Self::new(), |provider, namespace| {
                let name = namespace.name;
                let provider = provider.with_namespace(&name);
                namespace.classes.into_iter().fold(provider, |provider, class| {
                    let instances = class.instances.into_iter().map(Into::into).collect();
                    provider.with_class(&name, class.name, instances)
                })
            })
    }

    /// Register a namespace with no classes
    #[must_use]
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace_entry(namespace);
        self
    }

    /// Register a class and its instances, creating the namespace if needed
    ///
    /// Instances are appended when the class already exists.
    #[must_use]
    pub fn with_class(
        mut self,
        namespace: &str,
        class: impl Into<String>,
        instances: Vec<MemoryInstance>,
    ) -> Self {
        let class = class.into();
        let entry = self.namespace_entry(namespace);
        match entry
            .classes
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(&class))
        {
            Some(existing) => existing.instances.extend(instances),
            None => entry.classes.push(ClassData {
                name: class,
                instances,
            }),
        }
        self
    }

    /// Fail every `connect` with the given native error
    #[must_use]
    pub fn with_connect_error(mut self, error: impl Into<ProviderError>) -> Self {
        self.connect_error = Some(error.into());
        self
    }

    /// Fail every `exec_query` with the given native error
    #[must_use]
    pub fn with_query_error(mut self, error: impl Into<ProviderError>) -> Self {
        self.query_error = Some(error.into());
        self
    }

    /// Capability calls observed so far
    #[must_use]
    pub fn call_counts(&self) -> CallCounts {
        CallCounts {
            connects: self.counters.connects.load(Ordering::Relaxed),
            queries: self.counters.queries.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
        }
    }

    fn namespace_entry(&mut self, namespace: &str) -> &mut NamespaceData {
        let key = namespace_key(namespace);
        let namespaces = Arc::make_mut(&mut self.namespaces);
        let index = match namespaces.iter().position(|n| namespace_key(&n.name) == key) {
            Some(index) => index,
            None => {
                namespaces.push(NamespaceData {
                    name: namespace.to_string(),
                    classes: Vec::new(),
                });
                namespaces.len() - 1
            }
        };
        &mut namespaces[index]
    }
}

impl Provider for MemoryProvider {
    #[instrument(skip(self), level = "debug")]
    fn connect(&self, namespace: &str) -> Result<Box<dyn Connection>, ProviderError> {
        self.counters.connects.fetch_add(1, Ordering::Relaxed);

        if let Some(error) = &self.connect_error {
            return Err(error.clone());
        }

        let key = namespace_key(namespace);
        let index = self
            .namespaces
            .iter()
            .position(|n| namespace_key(&n.name) == key)
            .ok_or_else(|| {
                ProviderError::with_status(
                    WBEM_E_INVALID_NAMESPACE,
                    "SWbemLocator",
                    "Invalid namespace",
                )
            })?;

        debug!(namespace = %namespace, "bound in-memory namespace");

        Ok(Box::new(MemoryConnection {
            namespace: namespace.to_string(),
            namespaces: Arc::clone(&self.namespaces),
            index,
            counters: Arc::clone(&self.counters),
            query_error: self.query_error.clone(),
        }))
    }

    fn provider_type(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Connection and results
// ============================================================================

struct MemoryConnection {
    namespace: String,
    namespaces: Arc<Vec<NamespaceData>>,
    index: usize,
    counters: Arc<Counters>,
    query_error: Option<ProviderError>,
}

impl Connection for MemoryConnection {
    fn exec_query(&self, wql: &str) -> Result<Box<dyn ResultSet>, ProviderError> {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);

        if let Some(error) = &self.query_error {
            return Err(error.clone());
        }

        debug!(namespace = %self.namespace, query = %wql, "deferring in-memory query");

        Ok(Box::new(MemoryResultSet {
            wql: wql.to_string(),
            namespaces: Arc::clone(&self.namespaces),
            index: self.index,
            counters: Arc::clone(&self.counters),
            rows: None,
        }))
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Result set evaluated on first use, like a semi-synchronous native query
struct MemoryResultSet {
    wql: String,
    namespaces: Arc<Vec<NamespaceData>>,
    index: usize,
    counters: Arc<Counters>,
    rows: Option<std::vec::IntoIter<MemoryRow>>,
}

impl MemoryResultSet {
    fn run(&self) -> Result<Vec<MemoryRow>, ProviderError> {
        let invalid_query = || {
            ProviderError::with_status(WBEM_E_INVALID_QUERY, "SWbemServicesEx", "Invalid query")
        };

        let Select {
            columns,
            class,
            conditions,
        } = wql::parse(&self.wql).ok_or_else(invalid_query)?;

        let data = self.namespaces[self.index]
            .classes
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&class))
            .ok_or_else(|| {
                ProviderError::with_status(WBEM_E_INVALID_CLASS, "SWbemServicesEx", "Invalid class")
            })?;

        let known = |property: &str| {
            data.instances.is_empty() || data.instances.iter().any(|i| i.get(property).is_some())
        };
        let referenced = columns
            .iter()
            .flatten()
            .chain(conditions.iter().map(|c| &c.property));
        for property in referenced {
            if !known(property.as_str()) {
                return Err(invalid_query());
            }
        }

        let rows = data
            .instances
            .iter()
            .filter(|instance| {
                conditions.iter().all(|condition| {
                    instance
                        .get(&condition.property)
                        .is_some_and(|(_, value)| {
                            let text = value.to_string();
                            match condition.op {
                                Op::Eq => text.eq_ignore_ascii_case(&condition.value),
                                Op::Like => wql::like_matches(&condition.value, &text),
                            }
                        })
                })
            })
            .map(|instance| {
                let properties = match &columns {
                    None => instance.properties.clone(),
                    Some(columns) => columns
                        .iter()
                        .map(|column| match instance.get(column) {
                            Some((name, value)) => (name.to_string(), value.clone()),
                            None => (column.clone(), Variant::Null),
                        })
                        .collect(),
                };
                MemoryRow {
                    class: data.name.clone(),
                    properties,
                    counters: Arc::clone(&self.counters),
                }
            })
            .collect();

        Ok(rows)
    }
}

impl ResultSet for MemoryResultSet {
    fn evaluate(&mut self) -> Result<usize, ProviderError> {
        if let Some(rows) = &self.rows {
            return Ok(rows.len());
        }
        let rows = self.run()?;
        let count = rows.len();
        self.rows = Some(rows.into_iter());
        Ok(count)
    }
}

impl Iterator for MemoryResultSet {
    type Item = Result<Box<dyn NativeInstance>, ProviderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rows.is_none()
            && let Err(error) = self.evaluate()
        {
            // report the failure once, then end iteration
            self.rows = Some(Vec::new().into_iter());
            return Some(Err(error));
        }
        self.rows
            .as_mut()?
            .next()
            .map(|row| Ok(Box::new(row) as Box<dyn NativeInstance>))
    }
}

#[derive(Debug)]
struct MemoryRow {
    class: String,
    properties: Vec<(String, Variant)>,
    counters: Arc<Counters>,
}

impl NativeInstance for MemoryRow {
    fn property_names(&self) -> Vec<String> {
        self.properties.iter().map(|(name, _)| name.clone()).collect()
    }

    fn property(&self, name: &str) -> Result<Variant, ProviderError> {
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        self.properties
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| ProviderError::with_status(WBEM_E_NOT_FOUND, "SWbemObjectEx", "Not found"))
    }

    fn class_name(&self) -> Option<&str> {
        Some(&self.class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn computers() -> MemoryProvider {
        MemoryProvider::new().with_class(
            "root/cimv2",
            "Win32_ComputerSystem",
            vec![
                MemoryInstance::new()
                    .with("cores", 4)
                    .with("name", "mycomputer1"),
                MemoryInstance::new()
                    .with("cores", 2)
                    .with("name", "mycomputer2"),
            ],
        )
    }

    fn names(result: &mut dyn ResultSet) -> Vec<String> {
        result
            .map(|instance| instance.unwrap().property("name").unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_connect_accepts_either_separator() {
        let provider = computers();
        assert!(provider.connect("root/cimv2").is_ok());
        assert!(provider.connect("ROOT\\CIMV2").is_ok());
        assert_eq!(provider.call_counts().connects, 2);
    }

    #[test]
    fn test_connect_unknown_namespace() {
        let err = computers().connect("root/notvalid").err().unwrap();
        assert!(err.message().contains("8004100E"));
    }

    #[test]
    fn test_select_all_in_order() {
        let conn = computers().connect("root/cimv2").unwrap();
        let mut result = conn.exec_query("select * from win32_computersystem").unwrap();
        assert_eq!(result.evaluate().unwrap(), 2);
        assert_eq!(names(result.as_mut()), vec!["mycomputer1", "mycomputer2"]);
    }

    #[test]
    fn test_where_and_projection() {
        let conn = computers().connect("root/cimv2").unwrap();
        let mut result = conn
            .exec_query("select Name from Win32_ComputerSystem where Cores = 2")
            .unwrap();
        let instance = result.next().unwrap().unwrap();
        assert_eq!(instance.property_names(), vec!["name".to_string()]);
        assert_eq!(instance.class_name(), Some("Win32_ComputerSystem"));
        assert!(result.next().is_none());

        let mut result = conn
            .exec_query("select * from Win32_ComputerSystem where name like '%2'")
            .unwrap();
        assert_eq!(names(result.as_mut()), vec!["mycomputer2"]);
    }

    #[test]
    fn test_failures_are_deferred_to_evaluation() {
        let conn = computers().connect("root/cimv2").unwrap();

        let mut result = conn.exec_query("select * from Win32_TapeDrive").unwrap();
        let err = result.evaluate().unwrap_err();
        assert!(err.message().contains("80041010"));

        let mut result = conn.exec_query("nosql_4_life").unwrap();
        let err = result.evaluate().unwrap_err();
        assert!(err.message().contains("80041017"));

        let mut result = conn
            .exec_query("select bios from Win32_ComputerSystem")
            .unwrap();
        assert!(result.evaluate().unwrap_err().message().contains("80041017"));
    }

    #[test]
    fn test_iteration_reports_failure_once() {
        let conn = computers().connect("root/cimv2").unwrap();
        let mut result = conn.exec_query("invalidclass").unwrap();
        assert!(matches!(result.next(), Some(Err(_))));
        assert!(result.next().is_none());
    }

    #[test]
    fn test_empty_class() {
        let provider = MemoryProvider::new().with_class("root/cimv2", "Win32_TapeDrive", vec![]);
        let conn = provider.connect("root/cimv2").unwrap();
        let mut result = conn.exec_query("select * from Win32_TapeDrive").unwrap();
        assert_eq!(result.evaluate().unwrap(), 0);
        assert!(result.next().is_none());
    }

    #[test]
    fn test_fault_injection() {
        let provider = computers().with_connect_error("unparseableerror");
        assert_eq!(
            provider.connect("root/cimv2").err().unwrap().message(),
            "unparseableerror"
        );

        let provider = computers().with_query_error("boom");
        let conn = provider.connect("root/cimv2").unwrap();
        assert!(conn.exec_query("select * from Win32_ComputerSystem").is_err());
        assert_eq!(provider.call_counts().queries, 1);
    }

    #[test]
    fn test_from_snapshot() {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{
                "namespace": [{
                    "name": "root/cimv2",
                    "class": [{
                        "name": "Win32_ComputerSystem",
                        "instance": [{ "Name": "mycomputer1", "NumberOfProcessors": 4 }]
                    }]
                }]
            }"#,
        )
        .unwrap();

        let provider = MemoryProvider::from_snapshot(snapshot);
        let conn = provider.connect("root/cimv2").unwrap();
        let mut result = conn.exec_query("select * from Win32_ComputerSystem").unwrap();
        let instance = result.next().unwrap().unwrap();
        assert_eq!(
            instance.property_names(),
            vec!["Name".to_string(), "NumberOfProcessors".to_string()]
        );
        assert_eq!(instance.property("numberofprocessors").unwrap(), Variant::Int(4));
        assert_eq!(provider.call_counts().fetches, 1);
    }
}
