//! STRATA Load - SQL-Backed Member Population
//!
//! Drives population of the member cache from relational results. A
//! [`ResultLoader`] owns a set of [`Target`]s and consumes one logical row
//! per iteration from either a live [`SqlStatement`] or a previously
//! captured [`PartialResult`]. Targets with an enumerated candidate list are
//! crossed against every native row, so one pass can populate several
//! hierarchies at once.
//!
//! Faults raised while driving a row are classified once, wrapped with a
//! context naming the targets in progress, and propagated; the statement's
//! underlying source is released exactly once regardless of how the pass
//! ends.

pub mod loader;
pub mod row;
pub mod statement;
pub mod target;

pub use loader::{PartialResult, PartialRow, ResultLoader};
pub use row::{InMemoryRowSource, RowSource};
pub use statement::{wrap_with_context, DefaultClassifier, ErrorClassifier, SqlStatement};
pub use target::{MemberTarget, Target};
