//! Opaque cache keys and constraint descriptors.
//!
//! The key insight is that [`CacheKey`]'s private inner struct makes raw
//! tuple lookups UNCOMPILABLE. You cannot address the member cache without
//! going through the one key constructor, so two call sites can never
//! disagree about how a `(parent, local key)` pair is folded into a key.

use serde::{Deserialize, Serialize};
use std::fmt;
use strata_core::{Datum, Member};

/// Cache key for a member, built from its parent and local key.
///
/// # Design
///
/// The private inner struct ensures a `CacheKey` can ONLY be constructed via
/// [`CacheKey::new`]. Equality and hashing derive structurally from
/// `(parent identity, local key)`: two keys are equal iff they were built
/// from an equal parent identity and an equal local key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: KeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KeyInner {
    /// Unique name of the parent member, or `None` for a root member.
    parent: Option<String>,
    /// Local key of the member within its parent.
    key: Datum,
}

impl CacheKey {
    /// Create the key with which to address a member in the cache.
    ///
    /// Pure and deterministic: repeated calls with equal inputs yield keys
    /// that compare equal and hash equal.
    pub fn new(parent: Option<&Member>, key: Datum) -> Self {
        Self {
            inner: KeyInner {
                parent: parent.map(|p| p.unique_name.clone()),
                key,
            },
        }
    }

    /// Unique name of the parent this key is scoped to, if any.
    pub fn parent_unique_name(&self) -> Option<&str> {
        self.inner.parent.as_deref()
    }

    /// The local key value.
    pub fn local_key(&self) -> &Datum {
        &self.inner.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.parent {
            Some(parent) => write!(f, "{}/{}", parent, self.inner.key),
            None => write!(f, "/{}", self.inner.key),
        }
    }
}

/// Opaque descriptor of the query shape that produced a cached bulk list.
///
/// Two different constraints for the same parent or level are independent
/// cache entries; fetching under a different constraint is always a miss.
/// [`Constraint::none`] means "all children" / "all members of the level".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    shape: Option<String>,
}

impl Constraint {
    /// The unconstrained shape: all children, or all members of a level.
    pub fn none() -> Self {
        Self { shape: None }
    }

    /// A constrained shape, described by a canonical string the query layer
    /// derives from its predicate. The cache treats it as opaque.
    pub fn shaped(descriptor: impl Into<String>) -> Self {
        Self {
            shape: Some(descriptor.into()),
        }
    }

    /// Returns true if this is the unconstrained shape.
    pub fn is_none(&self) -> bool {
        self.shape.is_none()
    }
}

impl Default for Constraint {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            Some(shape) => f.write_str(shape),
            None => f.write_str("<unconstrained>"),
        }
    }
}
