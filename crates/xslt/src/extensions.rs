//! Namespace-keyed handlers for extension elements and extension functions.
use crate::output::ResultSink;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use weft_xpath1::QualifiedName;

/// A scalar passed to or returned from an extension function.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionValue {
    String(String),
    Number(f64),
    Boolean(bool),
}

impl From<&str> for ExtensionValue {
    fn from(value: &str) -> Self {
        ExtensionValue::String(value.to_string())
    }
}

impl From<String> for ExtensionValue {
    fn from(value: String) -> Self {
        ExtensionValue::String(value)
    }
}

impl From<f64> for ExtensionValue {
    fn from(value: f64) -> Self {
        ExtensionValue::Number(value)
    }
}

impl From<bool> for ExtensionValue {
    fn from(value: bool) -> Self {
        ExtensionValue::Boolean(value)
    }
}

/// Implements the elements and functions of one extension namespace.
///
/// Handlers are shared by concurrent runs and must not keep per-run state.
pub trait ExtensionHandler: Send + Sync {
    /// Runs an extension element. `attributes` are the literal attribute values.
    fn element(
        &self,
        name: &QualifiedName,
        attributes: &[(QualifiedName, String)],
        out: &mut dyn ResultSink,
    ) -> Result<(), String>;

    fn has_function(&self, _local_name: &str) -> bool {
        false
    }

    fn function(&self, local_name: &str, _args: &[ExtensionValue]) -> Result<ExtensionValue, String> {
        Err(format!("Function '{}' is not provided", local_name))
    }

    /// Whether `element` supports `local_name`. Unsupported elements run their fallback.
    fn has_element(&self, _local_name: &str) -> bool {
        true
    }
}

#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    handlers: HashMap<String, Arc<dyn ExtensionHandler>>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut uris: Vec<&String> = self.handlers.keys().collect();
        uris.sort();
        f.debug_struct("ExtensionRegistry").field("namespaces", &uris).finish()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, namespace_uri: impl Into<String>, handler: Arc<dyn ExtensionHandler>) {
        self.handlers.insert(namespace_uri.into(), handler);
    }

    pub fn handler(&self, namespace_uri: &str) -> Option<&Arc<dyn ExtensionHandler>> {
        self.handlers.get(namespace_uri)
    }

    pub fn has_element(&self, name: &QualifiedName) -> bool {
        name.namespace_uri
            .as_deref()
            .and_then(|uri| self.handler(uri))
            .is_some_and(|h| h.has_element(&name.local_part))
    }

    pub fn has_function(&self, name: &QualifiedName) -> bool {
        name.namespace_uri
            .as_deref()
            .and_then(|uri| self.handler(uri))
            .is_some_and(|h| h.has_function(&name.local_part))
    }
}
