//! Dimensional metadata tree: hierarchies, levels, members.
//!
//! A [`Member`] is a resolved dimensional value. Members are shared via
//! `Arc` once they enter the cache; multiple readers hold read-only
//! references while the cache owns the canonical storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// SCALAR VALUES
// ============================================================================

/// A scalar value as read from a relational column or used as a member's
/// local key within its parent.
///
/// Only types with total equality participate; keys must be usable as hash
/// map keys, so floating-point columns are rendered to `Text` by the row
/// source before they reach a key position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datum {
    Int(i64),
    Text(String),
    Bool(bool),
    /// SQL NULL. Distinct from every other value, equal to itself, so a
    /// null-keyed member still has a stable cache identity.
    Null,
}

impl Datum {
    /// Returns true if this is a SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Human-readable type name, used in type-mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Int(_) => "integer",
            Datum::Text(_) => "text",
            Datum::Bool(_) => "boolean",
            Datum::Null => "null",
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Int(v) => write!(f, "{}", v),
            Datum::Text(v) => write!(f, "{}", v),
            Datum::Bool(v) => write!(f, "{}", v),
            Datum::Null => write!(f, "#null"),
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Text(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::Text(v)
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Bool(v)
    }
}

// ============================================================================
// METADATA TREE
// ============================================================================

/// A dimension hierarchy. Identity is the unique name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hierarchy {
    /// Unique name, e.g. `[Store].[Stores]`.
    pub unique_name: String,
    /// Name of the owning dimension.
    pub dimension: String,
    /// Whether the hierarchy has an "all" member above its top level.
    pub has_all: bool,
}

impl Hierarchy {
    pub fn new(unique_name: impl Into<String>, dimension: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            dimension: dimension.into(),
            has_all: true,
        }
    }
}

impl fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_name)
    }
}

/// A level groups members at the same depth within a hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Level {
    /// Unique name, e.g. `[Store].[Stores].[City]`.
    pub unique_name: String,
    /// Distance from the root of the hierarchy; the "all" level is 0.
    pub depth: u32,
    /// Owning hierarchy, shared across all of its levels.
    pub hierarchy: Arc<Hierarchy>,
}

impl Level {
    pub fn new(unique_name: impl Into<String>, depth: u32, hierarchy: Arc<Hierarchy>) -> Self {
        Self {
            unique_name: unique_name.into(),
            depth,
            hierarchy,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_name)
    }
}

/// A resolved dimensional value.
///
/// Member identity is the pair (hierarchy, unique name); two members resolved
/// by independent load paths for the same key are expected to be value-equal,
/// which is why last-write-wins cache insertion is sound.
#[derive(Debug, Clone)]
pub struct Member {
    /// Unique name within the hierarchy, e.g. `[Store].[USA].[CA]`.
    pub unique_name: String,
    /// Local key of this member within its parent.
    pub key: Datum,
    /// Parent member, or `None` for a root member.
    pub parent: Option<Arc<Member>>,
    /// Level this member belongs to.
    pub level: Arc<Level>,
    /// Ordered property values attached by the resolver.
    pub properties: Vec<(String, serde_json::Value)>,
}

impl Member {
    pub fn new(
        unique_name: impl Into<String>,
        key: Datum,
        parent: Option<Arc<Member>>,
        level: Arc<Level>,
    ) -> Self {
        Self {
            unique_name: unique_name.into(),
            key,
            parent,
            level,
            properties: Vec::new(),
        }
    }

    /// Attach a property value, preserving insertion order.
    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.push((name.into(), value));
        self
    }

    /// The hierarchy this member belongs to.
    pub fn hierarchy(&self) -> &Arc<Hierarchy> {
        &self.level.hierarchy
    }

    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Returns true if `ancestor` appears anywhere on this member's parent
    /// chain. A member is not its own ancestor.
    pub fn is_descendant_of(&self, ancestor: &Member) -> bool {
        let mut cursor = self.parent.as_deref();
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            cursor = parent.parent.as_deref();
        }
        false
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.unique_name == other.unique_name
            && self.hierarchy().unique_name == other.hierarchy().unique_name
    }
}

impl Eq for Member {}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_name)
    }
}

// ============================================================================
// AGGREGATION IDENTITY
// ============================================================================

/// Identity of a cached aggregation, as presented to the change oracle.
///
/// Columns are sorted at construction so the identity is independent of the
/// order a query listed them in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationKey {
    /// Name of the star (fact table) the aggregation is computed over.
    pub star: String,
    /// Sorted names of the constrained columns.
    pub columns: Vec<String>,
}

impl AggregationKey {
    pub fn new(star: impl Into<String>, mut columns: Vec<String>) -> Self {
        columns.sort();
        Self {
            star: star.into(),
            columns,
        }
    }
}

impl fmt::Display for AggregationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.star, self.columns.join(", "))
    }
}

// =============================================================================
// TESTS
// =============================================================================
