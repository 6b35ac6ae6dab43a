//! Schema connection properties.
//!
//! A flat string-to-string mapping read by content-key derivation. Only a
//! handful of keys are recognized here; everything else is passed through
//! untouched for the connection layer to interpret.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property naming the catalog URL or file location.
pub const CATALOG: &str = "Catalog";

/// Property carrying the schema definition inline instead of by URL.
pub const CATALOG_CONTENT: &str = "CatalogContent";

/// Property naming a processor that rewrites the schema at load time.
/// Its presence means the effective content can differ from the URL's bytes.
pub const DYNAMIC_SCHEMA_PROCESSOR: &str = "DynamicSchemaProcessor";

/// Flat mapping of connection property keys to values.
///
/// Backed by a `BTreeMap` so iteration order is deterministic, which matters
/// for anything derived from the property set (such as content keys).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaProperties {
    inner: BTreeMap<String, String>,
}

impl SchemaProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, returning self for chained construction.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.insert(key.into(), value.into());
        self
    }

    /// Set a property in place.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), value.into());
    }

    /// Get a property value, or `None` if absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    /// Returns true if the property is absent or blank.
    pub fn is_blank(&self, key: &str) -> bool {
        self.get(key).map_or(true, |v| v.trim().is_empty())
    }

    /// Returns true if the schema content is supplied inline or produced by a
    /// dynamic schema processor, in which case the catalog URL does not
    /// identify the content.
    pub fn has_inline_content(&self) -> bool {
        !self.is_blank(CATALOG_CONTENT) || !self.is_blank(DYNAMIC_SCHEMA_PROCESSOR)
    }

    /// Iterate properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
