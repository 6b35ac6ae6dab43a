//! Statement wrapper: row counting, error classification, guaranteed release.

use std::sync::Arc;
use tracing::{debug, warn};

use strata_core::{Datum, LoadError, LoadResult};

use crate::row::RowSource;

/// Classifies a raw fault into the loader-facing error to propagate.
///
/// Implementations may distinguish transient causes (worth a caller-side
/// retry) from fatal ones. The loader calls this exactly once, at the
/// boundary between row processing and the caller's loop.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, context: &str, fault: LoadError) -> LoadError;
}

/// Default classifier: wraps the fault with the population context and flags
/// common connection-level failures as transient.
#[derive(Debug, Default)]
pub struct DefaultClassifier;

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, context: &str, fault: LoadError) -> LoadError {
        wrap_with_context(context, fault)
    }
}

/// Fold a fault into a single `RowSource` error carrying `context`.
/// An already-wrapped fault keeps its reason and transience; everything else
/// is rendered and judged by its reason text.
pub fn wrap_with_context(context: &str, fault: LoadError) -> LoadError {
    match fault {
        LoadError::RowSource {
            reason, transient, ..
        } => LoadError::RowSource {
            context: context.to_string(),
            reason,
            transient,
        },
        other => {
            let reason = other.to_string();
            let transient = is_transient_reason(&reason);
            LoadError::RowSource {
                context: context.to_string(),
                reason,
                transient,
            }
        }
    }
}

fn is_transient_reason(reason: &str) -> bool {
    let lower = reason.to_ascii_lowercase();
    ["timeout", "timed out", "connection reset", "connection refused", "deadlock"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// A live statement: an executing row source plus the classification logic
/// for faults raised while driving it.
///
/// Exclusively owned by one result loader for its lifetime. `close` releases
/// the source exactly once and is safe after a fault; a failure during close
/// is logged and swallowed so it never masks the primary failure the caller
/// is already observing.
pub struct SqlStatement {
    source: Box<dyn RowSource>,
    classifier: Arc<dyn ErrorClassifier>,
    context: String,
    row_count: u64,
    closed: bool,
}

impl SqlStatement {
    pub fn new(
        source: Box<dyn RowSource>,
        classifier: Arc<dyn ErrorClassifier>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            source,
            classifier,
            context: context.into(),
            row_count: 0,
            closed: false,
        }
    }

    /// Position on the first row. Returns false for an empty result.
    pub async fn execute(&mut self) -> LoadResult<bool> {
        let has_rows = self.advance().await?;
        debug!(context = %self.context, has_rows, "statement executed");
        Ok(has_rows)
    }

    /// Move to the next row, counting successfully fetched rows.
    pub async fn advance(&mut self) -> LoadResult<bool> {
        let more = self.source.advance().await?;
        if more {
            self.row_count += 1;
        }
        Ok(more)
    }

    /// Read a cell of the current row.
    pub fn cell(&self, column: usize) -> LoadResult<Datum> {
        self.source.cell(column)
    }

    /// Rows fetched so far.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Classify a fault raised while this statement was being driven.
    pub fn handle(&self, fault: LoadError) -> LoadError {
        self.classifier.classify(&self.context, fault)
    }

    /// Release the underlying source. Idempotent; never raises.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(release_fault) = self.source.close() {
            warn!(context = %self.context, %release_fault, "ignoring failure while closing statement");
        }
    }
}

impl Drop for SqlStatement {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::InMemoryRowSource;
    use std::sync::atomic::Ordering;

    fn statement(rows: Vec<Vec<Datum>>) -> SqlStatement {
        SqlStatement::new(
            Box::new(InMemoryRowSource::new(rows)),
            Arc::new(DefaultClassifier),
            "populating member cache for [[Store].[Stores]]",
        )
    }

    #[tokio::test]
    async fn test_row_count_tracks_fetched_rows() {
        let mut stmt = statement(vec![vec![Datum::from(1i64)], vec![Datum::from(2i64)]]);
        assert!(stmt.execute().await.unwrap());
        assert_eq!(stmt.row_count(), 1);
        assert!(stmt.advance().await.unwrap());
        assert!(!stmt.advance().await.unwrap());
        // The exhausted advance does not count a row.
        assert_eq!(stmt.row_count(), 2);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_runs_on_drop() {
        let source = InMemoryRowSource::new(vec![vec![Datum::from(1i64)]]);
        let closes = source.close_counter();
        let mut stmt = SqlStatement::new(
            Box::new(source),
            Arc::new(DefaultClassifier),
            "test close",
        );
        stmt.close();
        stmt.close();
        drop(stmt);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handle_wraps_with_statement_context() {
        let stmt = statement(vec![]);
        let wrapped = stmt.handle(LoadError::ColumnOutOfRange { column: 3, width: 2 });
        match wrapped {
            LoadError::RowSource {
                context, transient, ..
            } => {
                assert!(context.contains("[[Store].[Stores]]"));
                assert!(!transient);
            }
            other => panic!("expected RowSource wrap, got {:?}", other),
        }
    }

    #[test]
    fn test_classifier_marks_connection_faults_transient() {
        let wrapped = wrap_with_context(
            "loading",
            LoadError::RowSource {
                context: String::new(),
                reason: "connection reset by peer".to_string(),
                transient: true,
            },
        );
        assert!(matches!(
            wrapped,
            LoadError::RowSource { transient: true, .. }
        ));

        let inferred = wrap_with_context(
            "loading",
            LoadError::InvalidLoader {
                reason: "socket timed out".to_string(),
            },
        );
        assert!(matches!(
            inferred,
            LoadError::RowSource { transient: true, .. }
        ));
    }
}
