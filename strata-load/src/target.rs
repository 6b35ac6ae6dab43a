//! The per-hierarchy binding seam between rows and resolved members.
//!
//! The loader treats a [`Target`] purely as an interface: it has no
//! knowledge of how a target turns raw column values into a member. A target
//! is either SQL-driven (reads its bound columns from each row) or
//! enumerated (carries a fixed candidate list crossed against every row).

use std::sync::Arc;
use strata_core::{Datum, LoadError, LoadResult, Member};
use strata_cache::MemberCache;

use crate::statement::SqlStatement;

/// Binds one hierarchy's columns in a row to a resolved member.
pub trait Target: Send {
    /// The fixed candidate list, or `None` for a SQL-driven target.
    fn enum_members(&self) -> Option<&[Arc<Member>]>;

    /// Clear the current-member state left by a previous row.
    fn clear_current(&mut self);

    /// Set the current member directly (used on the replay path).
    fn set_current(&mut self, member: Arc<Member>);

    /// The member bound to the current row, if any.
    fn current(&self) -> Option<Arc<Member>>;

    /// Consume this target's bound columns starting at `column` and register
    /// the resolved member, returning the next free column offset. When a
    /// current member is already set, registers it without consuming columns.
    fn add_row(&mut self, stmt: Option<&SqlStatement>, column: usize) -> LoadResult<usize>;

    /// Register an enumerated candidate selected by the cross-product.
    fn register(&mut self, member: Arc<Member>) -> LoadResult<()>;

    /// Members registered so far, in registration order.
    fn registered(&self) -> &[Arc<Member>];

    /// Short description used in failure messages.
    fn description(&self) -> String;
}

/// Standard target: binds a `(key, name)` column pair for one level and
/// resolves members through the member cache.
///
/// Resolution is read-through: a cache hit reuses the shared member, a miss
/// creates the member and registers it under its cache key, so concurrent
/// load paths converge on value-equal members.
pub struct MemberTarget {
    level: Arc<strata_core::Level>,
    cache: Arc<dyn MemberCache>,
    enum_members: Option<Vec<Arc<Member>>>,
    current: Option<Arc<Member>>,
    members: Vec<Arc<Member>>,
}

impl MemberTarget {
    /// A SQL-driven target for `level`, resolving through `cache`.
    pub fn sql_driven(level: Arc<strata_core::Level>, cache: Arc<dyn MemberCache>) -> Self {
        Self {
            level,
            cache,
            enum_members: None,
            current: None,
            members: Vec::new(),
        }
    }

    /// An enumerated target whose candidates are fixed up front.
    pub fn enumerated(
        level: Arc<strata_core::Level>,
        cache: Arc<dyn MemberCache>,
        candidates: Vec<Arc<Member>>,
    ) -> Self {
        Self {
            level,
            cache,
            enum_members: Some(candidates),
            current: None,
            members: Vec::new(),
        }
    }

    /// Number of columns this target consumes per row.
    pub const COLUMN_WIDTH: usize = 2;

    fn resolve(&self, key: Datum, name: Datum) -> LoadResult<Arc<Member>> {
        let cache_key = self.cache.make_key(None, key.clone());
        if let Some(member) = self.cache.get_member(&cache_key)? {
            return Ok(member);
        }
        let unique_name = format!("{}.[{}]", self.level.hierarchy.unique_name, name);
        let member = Arc::new(Member::new(unique_name, key, None, self.level.clone()));
        self.cache.put_member(cache_key, member.clone())?;
        Ok(member)
    }
}

impl Target for MemberTarget {
    fn enum_members(&self) -> Option<&[Arc<Member>]> {
        self.enum_members.as_deref()
    }

    fn clear_current(&mut self) {
        self.current = None;
    }

    fn set_current(&mut self, member: Arc<Member>) {
        self.current = Some(member);
    }

    fn current(&self) -> Option<Arc<Member>> {
        self.current.clone()
    }

    fn add_row(&mut self, stmt: Option<&SqlStatement>, column: usize) -> LoadResult<usize> {
        if let Some(member) = self.current.clone() {
            self.members.push(member);
            return Ok(column);
        }
        let stmt = stmt.ok_or_else(|| LoadError::InvalidLoader {
            reason: format!(
                "target {} has no current member and no live statement",
                self.description()
            ),
        })?;
        let key = stmt.cell(column)?;
        let name = stmt.cell(column + 1)?;
        let member = self.resolve(key, name)?;
        self.current = Some(member.clone());
        self.members.push(member);
        Ok(column + Self::COLUMN_WIDTH)
    }

    fn register(&mut self, member: Arc<Member>) -> LoadResult<()> {
        self.members.push(member);
        Ok(())
    }

    fn registered(&self) -> &[Arc<Member>] {
        &self.members
    }

    fn description(&self) -> String {
        self.level.unique_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::InMemoryRowSource;
    use crate::statement::DefaultClassifier;
    use strata_cache::InMemoryMemberCache;
    use strata_core::{Hierarchy, Level};

    fn level() -> Arc<Level> {
        let hierarchy = Arc::new(Hierarchy::new("[Store].[Stores]", "Store"));
        Arc::new(Level::new("[Store].[Stores].[Country]", 1, hierarchy))
    }

    async fn statement(rows: Vec<Vec<Datum>>) -> SqlStatement {
        let mut stmt = SqlStatement::new(
            Box::new(InMemoryRowSource::new(rows)),
            Arc::new(DefaultClassifier),
            "test",
        );
        stmt.execute().await.unwrap();
        stmt
    }

    #[tokio::test]
    async fn test_add_row_resolves_and_caches() {
        let cache = Arc::new(InMemoryMemberCache::with_defaults());
        let mut target = MemberTarget::sql_driven(level(), cache.clone());
        let stmt = statement(vec![vec![Datum::from(1i64), Datum::from("USA")]]).await;

        let next = target.add_row(Some(&stmt), 0).unwrap();
        assert_eq!(next, 2);
        assert_eq!(target.registered().len(), 1);
        assert_eq!(
            target.registered()[0].unique_name,
            "[Store].[Stores].[USA]"
        );

        // The member landed in the cache under its key.
        let key = cache.make_key(None, Datum::from(1i64));
        assert!(cache.get_member(&key).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_row_reuses_cached_member() {
        let cache = Arc::new(InMemoryMemberCache::with_defaults());
        let mut target = MemberTarget::sql_driven(level(), cache.clone());

        let mut stmt = statement(vec![
            vec![Datum::from(1i64), Datum::from("USA")],
            vec![Datum::from(1i64), Datum::from("USA")],
        ])
        .await;

        target.add_row(Some(&stmt), 0).unwrap();
        target.clear_current();
        stmt.advance().await.unwrap();
        target.add_row(Some(&stmt), 0).unwrap();

        assert_eq!(target.registered().len(), 2);
        // Same Arc both times: the second row hit the cache.
        assert!(Arc::ptr_eq(&target.registered()[0], &target.registered()[1]));
    }

    #[tokio::test]
    async fn test_current_member_short_circuits_column_reads() {
        let cache = Arc::new(InMemoryMemberCache::with_defaults());
        let mut target = MemberTarget::sql_driven(level(), cache);
        let member = Arc::new(Member::new(
            "[Store].[Stores].[USA]",
            Datum::from(1i64),
            None,
            level(),
        ));

        target.set_current(member.clone());
        // No statement supplied: the current member is registered as-is.
        let next = target.add_row(None, 0).unwrap();
        assert_eq!(next, 0);
        assert_eq!(target.registered(), &[member]);
    }

    #[tokio::test]
    async fn test_no_current_and_no_statement_is_invalid() {
        let cache = Arc::new(InMemoryMemberCache::with_defaults());
        let mut target = MemberTarget::sql_driven(level(), cache);
        assert!(matches!(
            target.add_row(None, 0),
            Err(LoadError::InvalidLoader { .. })
        ));
    }
}
