//! Forward-only row source abstraction.
//!
//! The loader never seeks backward on a live source; backward movement is
//! only achieved by replaying a previously captured partial result.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata_core::{Datum, LoadError, LoadResult};

/// A forward-only, single-pass cursor over a relational result.
///
/// The cursor starts positioned before the first row; [`advance`](Self::advance)
/// moves to the next row and reports whether one exists. Column access by
/// position is valid only while positioned on a row. Advancement is the only
/// operation expected to block on external I/O.
#[async_trait]
pub trait RowSource: Send {
    /// Move to the next row. Returns false once the result is exhausted.
    async fn advance(&mut self) -> LoadResult<bool>;

    /// Read the cell at `column` of the current row.
    fn cell(&self, column: usize) -> LoadResult<Datum>;

    /// Release the underlying result resources. Must be idempotent and safe
    /// to call after a fault.
    fn close(&mut self) -> LoadResult<()>;
}

/// Row source over in-memory rows, with fault injection for tests.
///
/// Serves two purposes: a deterministic source for unit and integration
/// tests, and a reference for what a driver-backed implementation must do
/// around positioning and close semantics.
pub struct InMemoryRowSource {
    rows: Vec<Vec<Datum>>,
    /// Index of the current row; `None` before the first advance.
    position: Option<usize>,
    /// Fail when advancing onto this row index.
    fail_on_advance: Option<usize>,
    /// Fail any cell read at this column.
    fail_on_cell: Option<usize>,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl InMemoryRowSource {
    pub fn new(rows: Vec<Vec<Datum>>) -> Self {
        Self {
            rows,
            position: None,
            fail_on_advance: None,
            fail_on_cell: None,
            closes: Arc::new(AtomicUsize::new(0)),
            closed: false,
        }
    }

    /// Inject a fault on the advance that would land on row `row`.
    pub fn with_fail_on_advance(mut self, row: usize) -> Self {
        self.fail_on_advance = Some(row);
        self
    }

    /// Inject a fault on any read of the cell at `column`.
    pub fn with_fail_on_cell(mut self, column: usize) -> Self {
        self.fail_on_cell = Some(column);
        self
    }

    /// Shared close counter, for asserting exactly-once release after the
    /// source has been moved into a statement.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }
}

#[async_trait]
impl RowSource for InMemoryRowSource {
    async fn advance(&mut self) -> LoadResult<bool> {
        let next = self.position.map_or(0, |p| p + 1);
        if self.fail_on_advance == Some(next) {
            return Err(LoadError::RowSource {
                context: "advancing row source".to_string(),
                reason: "injected fault".to_string(),
                transient: false,
            });
        }
        self.position = Some(next);
        Ok(next < self.rows.len())
    }

    fn cell(&self, column: usize) -> LoadResult<Datum> {
        if self.fail_on_cell == Some(column) {
            return Err(LoadError::RowSource {
                context: "reading row source".to_string(),
                reason: "injected cell fault".to_string(),
                transient: false,
            });
        }
        let row = self
            .position
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| LoadError::RowSource {
                context: "reading row source".to_string(),
                reason: "not positioned on a row".to_string(),
                transient: false,
            })?;
        row.get(column)
            .cloned()
            .ok_or(LoadError::ColumnOutOfRange {
                column,
                width: row.len(),
            })
    }

    fn close(&mut self) -> LoadResult<()> {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
