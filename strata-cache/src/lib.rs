//! STRATA Cache - Member Cache with Oracle-Driven Invalidation
//!
//! The cache of resolved members keyed by `(parent, local key)`, plus
//! secondary caches for "children of a member" and "members of a level",
//! each conditioned on the constraint that produced them.
//!
//! # Design Philosophy
//!
//! Two states that traditional caches conflate are kept strictly apart here:
//! absence of a bulk entry means "unknown, must be fetched", while a present
//! entry with zero elements means "known: no children". Staleness is not
//! time-based; a [`ChangeOracle`] is consulted on the hot path of every
//! status-checked read, and a "changed" answer flushes the affected
//! hierarchy rather than raising an error.
//!
//! # Key Discipline
//!
//! [`CacheKey`] can only be built through its one constructor, so a raw
//! `(parent, key)` pair can never reach a lookup and accidentally collide
//! across hierarchies.

pub mod content_key;
pub mod key;
pub mod member_cache;
pub mod oracle;

pub use content_key::ContentKey;
pub use key::{CacheKey, Constraint};
pub use member_cache::{CacheConfig, CacheStats, InMemoryMemberCache, MemberCache};
pub use oracle::{ChangeOracle, NoopChangeOracle, ScriptedChangeOracle};
