//! Member cache contract and in-memory implementation.
//!
//! Point lookups ("member by key") and bulk lookups ("children of a member",
//! "members of a level") are cached separately: bulk lists are far larger and
//! constraint-sensitive, so they carry their own size-bounded eviction while
//! point entries live until removed or flushed.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

use strata_core::{CacheError, CacheResult, Datum, Hierarchy, Level, Member};

use crate::key::{CacheKey, Constraint};
use crate::oracle::{ChangeOracle, NoopChangeOracle};

/// Configuration for the in-memory member cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether removal operations are available. Removal on an immutable
    /// cache is a contract violation, not a no-op.
    pub mutable: bool,
    /// Upper bound on cached bulk lists (children plus level-members
    /// entries together). Oldest entries are evicted first.
    pub max_bulk_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mutable: true,
            max_bulk_entries: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable removal operations.
    pub fn with_mutable(mut self, mutable: bool) -> Self {
        self.mutable = mutable;
        self
    }

    /// Set the bulk-entry capacity.
    pub fn with_max_bulk_entries(mut self, max: usize) -> Self {
        self.max_bulk_entries = max;
        self
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of point and bulk lookup hits.
    pub hits: u64,
    /// Number of point and bulk lookup misses.
    pub misses: u64,
    /// Number of entries dropped by capacity eviction or oracle flushes.
    pub evictions: u64,
    /// Members currently cached.
    pub member_count: u64,
    /// Bulk lists currently cached.
    pub bulk_entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// The member cache contract.
///
/// Implementations are passive shared structures: any number of concurrent
/// readers, occasional writers, no internal scheduling. Independent load
/// paths may race to populate the same key; last write wins, which is sound
/// because members for an equal key are expected to be value-equal.
pub trait MemberCache: Send + Sync {
    /// Create the key with which to address a member in this cache.
    ///
    /// Pure and deterministic; the only valid way to obtain a lookup key.
    fn make_key(&self, parent: Option<&Member>, key: Datum) -> CacheKey {
        CacheKey::new(parent, key)
    }

    /// Retrieve the member with the given key, or `None` on miss.
    fn get_member(&self, key: &CacheKey) -> CacheResult<Option<Arc<Member>>> {
        self.get_member_checked(key, false)
    }

    /// Retrieve the member with the given key.
    ///
    /// When `must_check_status` is set, the change oracle is consulted before
    /// trusting a hit; a stale hit flushes the affected hierarchy and is
    /// reported as a miss.
    fn get_member_checked(
        &self,
        key: &CacheKey,
        must_check_status: bool,
    ) -> CacheResult<Option<Arc<Member>>>;

    /// Insert or replace, returning the previous occupant. Idempotent for
    /// equal members.
    fn put_member(&self, key: CacheKey, member: Arc<Member>)
        -> CacheResult<Option<Arc<Member>>>;

    /// Whether removal operations are available. Callers must check this
    /// before calling [`remove_member`](Self::remove_member) or
    /// [`remove_member_and_descendants`](Self::remove_member_and_descendants).
    fn is_mutable(&self) -> bool;

    /// Remove the member with the given key, returning it.
    ///
    /// Bulk lists still naming the member are corrected so a later bulk hit
    /// cannot resurrect it.
    fn remove_member(&self, key: &CacheKey) -> CacheResult<Option<Arc<Member>>>;

    /// Remove the member with the given key and every cached descendant,
    /// purging all bulk entries that transitively depended on the subtree.
    fn remove_member_and_descendants(&self, key: &CacheKey)
        -> CacheResult<Option<Arc<Member>>>;

    /// Children of `parent` under `constraint`: `None` means unknown (must
    /// be fetched), an empty list means "known: no children". The returned
    /// list is a snapshot; the cache may reclaim its canonical storage
    /// independently.
    fn get_children_from_cache(
        &self,
        parent: &Member,
        constraint: &Constraint,
    ) -> CacheResult<Option<Vec<Arc<Member>>>>;

    /// Members of `level` under `constraint`; same semantics as
    /// [`get_children_from_cache`](Self::get_children_from_cache).
    fn get_level_members_from_cache(
        &self,
        level: &Level,
        constraint: &Constraint,
    ) -> CacheResult<Option<Vec<Arc<Member>>>>;

    /// Register the children of `parent` fetched under `constraint`.
    fn put_children(
        &self,
        parent: &Member,
        constraint: Constraint,
        children: Vec<Arc<Member>>,
    ) -> CacheResult<()>;

    /// Register the members of `level` fetched under `constraint`.
    fn put_level_members(
        &self,
        level: &Level,
        constraint: Constraint,
        members: Vec<Arc<Member>>,
    ) -> CacheResult<()>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

/// Key of a bulk entry: the owning parent member or level, plus the
/// constraint the list was fetched under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BulkKey {
    owner: String,
    constraint: Constraint,
}

/// A cached bulk list, tagged with the hierarchy it belongs to so oracle
/// flushes can drop it without re-deriving ownership.
#[derive(Debug, Clone)]
struct BulkEntry {
    hierarchy: String,
    members: Vec<Arc<Member>>,
}

#[derive(Debug, Default)]
struct CacheState {
    members: HashMap<CacheKey, Arc<Member>>,
    children: HashMap<BulkKey, BulkEntry>,
    level_members: HashMap<BulkKey, BulkEntry>,
    /// Insertion order across both bulk maps, oldest first.
    bulk_order: VecDeque<BulkKey>,
    stats: CacheStats,
}

impl CacheState {
    fn snapshot_stats(&self) -> CacheStats {
        CacheStats {
            member_count: self.members.len() as u64,
            bulk_entry_count: (self.children.len() + self.level_members.len()) as u64,
            ..self.stats.clone()
        }
    }
}

/// In-memory member cache guarded by a single `RwLock`.
///
/// Readers never observe a half-written entry: every mutation replaces whole
/// entries under the write lock. Lock poisoning is surfaced as
/// [`CacheError::LockPoisoned`] rather than panicking the reader.
pub struct InMemoryMemberCache {
    config: CacheConfig,
    oracle: Arc<dyn ChangeOracle>,
    state: RwLock<CacheState>,
}

impl InMemoryMemberCache {
    /// Create a cache consulting the given change oracle.
    pub fn new(oracle: Arc<dyn ChangeOracle>, config: CacheConfig) -> Self {
        Self {
            config,
            oracle,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Create a mutable cache with the no-op oracle (permanently valid until
    /// explicitly flushed).
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(NoopChangeOracle::new()), CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Snapshot of the current statistics.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        Ok(self.read_state()?.snapshot_stats())
    }

    /// Drop every bulk list, leaving point entries in place.
    pub fn evict_bulk_entries(&self) -> CacheResult<u64> {
        let mut state = self.write_state()?;
        let dropped = (state.children.len() + state.level_members.len()) as u64;
        state.children.clear();
        state.level_members.clear();
        state.bulk_order.clear();
        state.stats.evictions += dropped;
        trace!(dropped, "evicted all bulk entries");
        Ok(dropped)
    }

    /// Drop every entry belonging to the given hierarchy. Called when the
    /// change oracle reports the hierarchy changed; also available to
    /// embedders for explicit flushes.
    pub fn flush_hierarchy(&self, hierarchy: &Hierarchy) -> CacheResult<u64> {
        let mut state = self.write_state()?;
        let dropped = Self::flush_hierarchy_locked(&mut state, &hierarchy.unique_name);
        debug!(hierarchy = %hierarchy.unique_name, dropped, "flushed hierarchy");
        Ok(dropped)
    }

    /// Drop everything.
    pub fn clear(&self) -> CacheResult<()> {
        let mut state = self.write_state()?;
        let dropped = (state.members.len() + state.children.len() + state.level_members.len())
            as u64;
        state.members.clear();
        state.children.clear();
        state.level_members.clear();
        state.bulk_order.clear();
        state.stats.evictions += dropped;
        Ok(())
    }

    fn read_state(&self) -> CacheResult<RwLockReadGuard<'_, CacheState>> {
        self.state.read().map_err(|_| CacheError::LockPoisoned)
    }

    fn write_state(&self) -> CacheResult<RwLockWriteGuard<'_, CacheState>> {
        self.state.write().map_err(|_| CacheError::LockPoisoned)
    }

    fn flush_hierarchy_locked(state: &mut CacheState, hierarchy: &str) -> u64 {
        let before = state.members.len() + state.children.len() + state.level_members.len();
        state
            .members
            .retain(|_, m| m.hierarchy().unique_name != hierarchy);
        state.children.retain(|_, e| e.hierarchy != hierarchy);
        state.level_members.retain(|_, e| e.hierarchy != hierarchy);
        let children = &state.children;
        let level_members = &state.level_members;
        state
            .bulk_order
            .retain(|k| children.contains_key(k) || level_members.contains_key(k));
        let dropped =
            (before - state.members.len() - state.children.len() - state.level_members.len())
                as u64;
        state.stats.evictions += dropped;
        dropped
    }

    /// Record a bulk entry and enforce the capacity bound, oldest first.
    fn insert_bulk(
        state: &mut CacheState,
        into_children: bool,
        key: BulkKey,
        entry: BulkEntry,
        max: usize,
    ) {
        let map = if into_children {
            &mut state.children
        } else {
            &mut state.level_members
        };
        if map.insert(key.clone(), entry).is_none() {
            state.bulk_order.push_back(key);
        }
        while state.children.len() + state.level_members.len() > max {
            let Some(oldest) = state.bulk_order.pop_front() else {
                break;
            };
            if state.children.remove(&oldest).is_some()
                || state.level_members.remove(&oldest).is_some()
            {
                state.stats.evictions += 1;
                trace!(owner = %oldest.owner, "evicted bulk entry at capacity");
            }
        }
    }

    /// Remove one member and repair bulk state: lists owned by the member go
    /// away entirely, lists merely containing it are corrected in place.
    fn remove_one_locked(state: &mut CacheState, key: &CacheKey) -> Option<Arc<Member>> {
        let removed = state.members.remove(key)?;
        state.children.retain(|k, _| k.owner != removed.unique_name);
        for entry in state
            .children
            .values_mut()
            .chain(state.level_members.values_mut())
        {
            entry.members.retain(|m| **m != *removed);
        }
        let children = &state.children;
        let level_members = &state.level_members;
        state
            .bulk_order
            .retain(|k| children.contains_key(k) || level_members.contains_key(k));
        Some(removed)
    }

    fn require_mutable(&self, operation: &str) -> CacheResult<()> {
        if self.config.mutable {
            Ok(())
        } else {
            Err(CacheError::ImmutableCache {
                operation: operation.to_string(),
            })
        }
    }
}

impl MemberCache for InMemoryMemberCache {
    fn get_member_checked(
        &self,
        key: &CacheKey,
        must_check_status: bool,
    ) -> CacheResult<Option<Arc<Member>>> {
        let mut state = self.write_state()?;
        let Some(member) = state.members.get(key).cloned() else {
            state.stats.misses += 1;
            return Ok(None);
        };

        if must_check_status && self.oracle.is_hierarchy_changed(member.hierarchy()) {
            let hierarchy = member.hierarchy().unique_name.clone();
            let dropped = Self::flush_hierarchy_locked(&mut state, &hierarchy);
            debug!(%hierarchy, dropped, "oracle reported change; treating hit as miss");
            state.stats.misses += 1;
            return Ok(None);
        }

        state.stats.hits += 1;
        Ok(Some(member))
    }

    fn put_member(
        &self,
        key: CacheKey,
        member: Arc<Member>,
    ) -> CacheResult<Option<Arc<Member>>> {
        let mut state = self.write_state()?;
        Ok(state.members.insert(key, member))
    }

    fn is_mutable(&self) -> bool {
        self.config.mutable
    }

    fn remove_member(&self, key: &CacheKey) -> CacheResult<Option<Arc<Member>>> {
        self.require_mutable("remove_member")?;
        let mut state = self.write_state()?;
        Ok(Self::remove_one_locked(&mut state, key))
    }

    fn remove_member_and_descendants(
        &self,
        key: &CacheKey,
    ) -> CacheResult<Option<Arc<Member>>> {
        self.require_mutable("remove_member_and_descendants")?;
        let mut state = self.write_state()?;
        let Some(root) = state.members.get(key).cloned() else {
            return Ok(None);
        };

        let descendant_keys: Vec<CacheKey> = state
            .members
            .iter()
            .filter(|(_, m)| m.is_descendant_of(&root))
            .map(|(k, _)| k.clone())
            .collect();
        for descendant in &descendant_keys {
            Self::remove_one_locked(&mut state, descendant);
        }
        Ok(Self::remove_one_locked(&mut state, key))
    }

    fn get_children_from_cache(
        &self,
        parent: &Member,
        constraint: &Constraint,
    ) -> CacheResult<Option<Vec<Arc<Member>>>> {
        let key = BulkKey {
            owner: parent.unique_name.clone(),
            constraint: constraint.clone(),
        };
        let mut state = self.write_state()?;
        let hit = state.children.get(&key).map(|e| e.members.clone());
        match hit {
            Some(members) => {
                state.stats.hits += 1;
                Ok(Some(members))
            }
            None => {
                state.stats.misses += 1;
                Ok(None)
            }
        }
    }

    fn get_level_members_from_cache(
        &self,
        level: &Level,
        constraint: &Constraint,
    ) -> CacheResult<Option<Vec<Arc<Member>>>> {
        let key = BulkKey {
            owner: level.unique_name.clone(),
            constraint: constraint.clone(),
        };
        let mut state = self.write_state()?;
        let hit = state.level_members.get(&key).map(|e| e.members.clone());
        match hit {
            Some(members) => {
                state.stats.hits += 1;
                Ok(Some(members))
            }
            None => {
                state.stats.misses += 1;
                Ok(None)
            }
        }
    }

    fn put_children(
        &self,
        parent: &Member,
        constraint: Constraint,
        children: Vec<Arc<Member>>,
    ) -> CacheResult<()> {
        let key = BulkKey {
            owner: parent.unique_name.clone(),
            constraint,
        };
        let entry = BulkEntry {
            hierarchy: parent.hierarchy().unique_name.clone(),
            members: children,
        };
        let mut state = self.write_state()?;
        Self::insert_bulk(&mut state, true, key, entry, self.config.max_bulk_entries);
        Ok(())
    }

    fn put_level_members(
        &self,
        level: &Level,
        constraint: Constraint,
        members: Vec<Arc<Member>>,
    ) -> CacheResult<()> {
        let key = BulkKey {
            owner: level.unique_name.clone(),
            constraint,
        };
        let entry = BulkEntry {
            hierarchy: level.hierarchy.unique_name.clone(),
            members,
        };
        let mut state = self.write_state()?;
        Self::insert_bulk(&mut state, false, key, entry, self.config.max_bulk_entries);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
