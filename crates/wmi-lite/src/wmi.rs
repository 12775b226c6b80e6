//! Query engine

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use wmi_lite_provider::{Connection, Provider, ResultSet};

use crate::error::QueryError;
use crate::instance::PropertyBag;
use crate::query::Query;
use crate::translate::{QueryContext, translate};

/// Namespace used when none is given
pub const DEFAULT_NAMESPACE: &str = "root/cimv2";

/// Query engine bound to one namespace
///
/// Manages a single provider connection, opened on the first query and
/// reused for every query after it. A failed connection attempt is not
/// remembered: the next query tries again.
///
/// Queries take `&mut self`, so one engine serves one caller at a time;
/// share work across threads by giving each thread its own engine.
pub struct Wmi {
    /// Native provider used to open the connection
    provider: Arc<dyn Provider>,
    /// Target namespace
    namespace: String,
    /// Connection (opened on first query)
    connection: Option<Box<dyn Connection>>,
}

impl fmt::Debug for Wmi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wmi")
            .field("provider", &self.provider.provider_type())
            .field("namespace", &self.namespace)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Wmi {
    /// Create an engine for the default namespace
    ///
    /// Does not connect; the connection is opened by the first query.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            namespace: DEFAULT_NAMESPACE.to_string(),
            connection: None,
        }
    }

    /// Target a specific namespace
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Target namespace
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Check if the connection has been opened
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Execute a WQL query
    ///
    /// # Returns
    /// * `Ok(Vec<PropertyBag>)` - One record per instance, in provider order
    /// * `Err(QueryError)` - Connection or query failed
    ///
    /// # Errors
    /// Returns an error if the namespace cannot be connected or the query
    /// fails. No partial results are returned.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub fn query(&mut self, wql: &str) -> Result<Vec<PropertyBag>, QueryError> {
        self.collect(wql, None)
    }

    /// Query every instance of a class
    ///
    /// Equivalent to `query("select * from <class>")`, with the class named
    /// in any error.
    ///
    /// # Errors
    /// Returns an error if the namespace cannot be connected or the class is
    /// not valid.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub fn instances_of(&mut self, class: &str) -> Result<Vec<PropertyBag>, QueryError> {
        let wql = Query::new(class).build();
        self.collect(&wql, Some(class))
    }

    /// Query the first instance of a class
    ///
    /// Only the first native instance is wrapped; `Ok(None)` when the class
    /// has no instances.
    ///
    /// # Errors
    /// Returns an error if the namespace cannot be connected or the class is
    /// not valid.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub fn first_of(&mut self, class: &str) -> Result<Option<PropertyBag>, QueryError> {
        let wql = Query::new(class).build();
        let (mut results, _) = self.start_query(&wql, Some(class))?;

        match results.next() {
            None => {
                debug!("no instances");
                Ok(None)
            }
            Some(Ok(instance)) => Ok(Some(PropertyBag::new(instance))),
            Some(Err(e)) => {
                let context = QueryContext::new(&self.namespace, &wql).with_class(Some(class));
                Err(translate(e, &context))
            }
        }
    }

    /// Execute a builder query, with its class named in any error
    ///
    /// # Errors
    /// Returns an error if the namespace cannot be connected or the query
    /// fails.
    #[instrument(skip(self, query), fields(namespace = %self.namespace, query = %query))]
    pub fn query_with(&mut self, query: &Query) -> Result<Vec<PropertyBag>, QueryError> {
        self.collect(&query.build(), Some(query.class_name()))
    }

    /// Open the connection
    fn connect(&self, wql: &str) -> Result<Box<dyn Connection>, QueryError> {
        info!(
            namespace = %self.namespace,
            provider = self.provider.provider_type(),
            "connecting to namespace"
        );

        self.provider
            .connect(&self.namespace)
            .map_err(|e| translate(e, &QueryContext::new(&self.namespace, wql)))
    }

    /// Connect if needed, submit the query and force its evaluation
    fn start_query(
        &mut self,
        wql: &str,
        class_name: Option<&str>,
    ) -> Result<(Box<dyn ResultSet>, usize), QueryError> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.connect(wql)?,
        };
        let connection = self.connection.insert(connection);

        debug!(query = %wql, "executing query");

        let context = QueryContext::new(&self.namespace, wql).with_class(class_name);
        let mut results = connection
            .exec_query(wql)
            .map_err(|e| translate(e, &context))?;

        // evaluating the result set surfaces query failures before iteration
        let count = results.evaluate().map_err(|e| translate(e, &context))?;

        debug!(count, "query evaluated");

        Ok((results, count))
    }

    /// Run a query and wrap every instance
    fn collect(
        &mut self,
        wql: &str,
        class_name: Option<&str>,
    ) -> Result<Vec<PropertyBag>, QueryError> {
        let (results, count) = self.start_query(wql, class_name)?;
        let context = QueryContext::new(&self.namespace, wql).with_class(class_name);

        let mut bags = Vec::with_capacity(count);
        for instance in results {
            let instance = instance.map_err(|e| translate(e, &context))?;
            bags.push(PropertyBag::new(instance));
        }

        debug!(rows = bags.len(), "query completed");

        Ok(bags)
    }
}
