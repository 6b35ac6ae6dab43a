//! Loader driven row by row to populate member caches from a relational
//! result, live or replayed.
//!
//! When at least one target is enumerated, each native row is expanded into
//! the full Cartesian product over the enumerated candidate lists: the
//! recursion walks the enumerated targets in declared order with an index
//! vector selecting one candidate per target, and at the deepest level every
//! combination registers one tuple sharing the same underlying native row.

use std::sync::Arc;
use tracing::{debug, trace};

use strata_core::{LoadError, LoadResult, Member};

use crate::statement::{wrap_with_context, SqlStatement};
use crate::target::Target;

/// One captured native row: the resolved members of the non-enumerated
/// targets, in declared target order. Enumerated members are cheap to
/// regenerate and are not captured.
pub type PartialRow = Vec<Arc<Member>>;

/// A captured partial result, replayable in place of re-issuing the query.
pub type PartialResult = Vec<PartialRow>;

/// Drives one population pass over a relational result.
///
/// Exactly one of a live statement or a replay input must be supplied. The
/// caller loops on [`load_result`](Self::load_result) until it returns
/// false; each iteration processes one logical row and advances the cursor
/// by exactly one, on both the live and the replay path.
pub struct ResultLoader {
    targets: Vec<Box<dyn Target>>,
    enum_target_count: usize,
    stmt: Option<SqlStatement>,
    partial_result: Option<PartialResult>,
    capture: Option<PartialResult>,
    replay_idx: usize,
    context: String,
}

impl ResultLoader {
    /// Create a loader over `targets`.
    ///
    /// `enum_target_count` must equal the number of targets carrying an
    /// enumerated candidate list. `stmt` must be executed and positioned on
    /// the first row. When `capture` is set, the pass records one
    /// [`PartialRow`] per native row for a later replay pass.
    pub fn new(
        targets: Vec<Box<dyn Target>>,
        enum_target_count: usize,
        stmt: Option<SqlStatement>,
        partial_result: Option<PartialResult>,
        capture: bool,
    ) -> LoadResult<Self> {
        if stmt.is_some() == partial_result.is_some() {
            return Err(LoadError::InvalidLoader {
                reason: "exactly one of a live statement or a replay input must be supplied"
                    .to_string(),
            });
        }
        let enumerated = targets
            .iter()
            .filter(|t| t.enum_members().is_some())
            .count();
        if enumerated != enum_target_count {
            return Err(LoadError::InvalidLoader {
                reason: format!(
                    "enum_target_count is {} but {} targets are enumerated",
                    enum_target_count, enumerated
                ),
            });
        }

        let described: Vec<String> = targets.iter().map(|t| t.description()).collect();
        let context = format!(
            "populating member cache with members for [{}]",
            described.join(", ")
        );
        Ok(Self {
            targets,
            enum_target_count,
            stmt,
            partial_result,
            capture: capture.then(Vec::new),
            replay_idx: 0,
            context,
        })
    }

    /// Process the current row and advance. Returns whether another row
    /// remains. Faults are wrapped exactly once here, at the boundary with
    /// the caller's loop; no internal retries.
    pub async fn load_result(&mut self) -> LoadResult<bool> {
        if let Err(fault) = self.process_current_row() {
            return Err(self.wrap(fault));
        }
        match self.advance().await {
            Ok(more) => {
                trace!(context = %self.context, more, "row loaded");
                Ok(more)
            }
            Err(fault) => Err(self.wrap(fault)),
        }
    }

    /// The rows captured by this pass, if capture was requested.
    pub fn take_capture(&mut self) -> Option<PartialResult> {
        self.capture.take()
    }

    /// The targets, with their accumulated registrations.
    pub fn targets(&self) -> &[Box<dyn Target>] {
        &self.targets
    }

    /// Hand back the targets, closing the loader.
    pub fn into_targets(mut self) -> Vec<Box<dyn Target>> {
        self.close();
        std::mem::take(&mut self.targets)
    }

    /// Release the underlying statement. Idempotent; safe after a fault.
    pub fn close(&mut self) {
        if let Some(stmt) = &mut self.stmt {
            stmt.close();
        }
    }

    fn process_current_row(&mut self) -> LoadResult<()> {
        if self.enum_target_count == 0 {
            self.process_plain_row()
        } else {
            self.process_expanded_row()
        }
    }

    /// No enumerated targets: each target consumes its bound columns in
    /// declared order, sharing one running column offset.
    fn process_plain_row(&mut self) -> LoadResult<()> {
        if self.stmt.is_some() {
            let mut column = 0;
            for idx in 0..self.targets.len() {
                self.targets[idx].clear_current();
                column = self.targets[idx].add_row(self.stmt.as_ref(), column)?;
            }
        } else {
            let row = self.current_replay_row()?.clone();
            for (idx, member) in row.into_iter().enumerate() {
                let target = self
                    .targets
                    .get_mut(idx)
                    .ok_or_else(|| LoadError::InvalidLoader {
                        reason: "replay row is wider than the target list".to_string(),
                    })?;
                target.clear_current();
                target.set_current(member);
                target.add_row(None, 0)?;
            }
        }
        Ok(())
    }

    /// At least one enumerated target: bind the non-enumerated targets to
    /// the native row (live or replayed), then expand the cross product.
    fn process_expanded_row(&mut self) -> LoadResult<()> {
        let first_enum = self
            .targets
            .iter()
            .position(|t| t.enum_members().is_some())
            .ok_or_else(|| LoadError::InvalidLoader {
                reason: "no enumerated target found".to_string(),
            })?;

        let replay_row = if self.stmt.is_some() {
            None
        } else {
            Some(self.current_replay_row()?.clone())
        };
        self.reset_current_members(replay_row.as_deref())?;

        let mut src_member_idxes = vec![0usize; self.enum_target_count];
        self.add_targets(0, first_enum, &mut src_member_idxes)?;

        self.save_partial_row()
    }

    /// Set the current member for the targets that retrieve their values
    /// from native rows: from the replay row when replaying, cleared for a
    /// fresh column read when executing live. Never both.
    fn reset_current_members(&mut self, replay_row: Option<&[Arc<Member>]>) -> LoadResult<()> {
        let mut native = 0;
        for target in &mut self.targets {
            if target.enum_members().is_some() {
                continue;
            }
            match replay_row {
                Some(row) => {
                    let member = row.get(native).ok_or_else(|| LoadError::InvalidLoader {
                        reason: "replay row is narrower than the non-enumerated targets"
                            .to_string(),
                    })?;
                    target.set_current(member.clone());
                    native += 1;
                }
                None => target.clear_current(),
            }
        }
        Ok(())
    }

    /// Recursively form the cross product of the current native row with
    /// every enumerated candidate list.
    ///
    /// `curr_enum_idx` is the recursion depth (which slot of the index
    /// vector is being iterated); `curr_target_idx` is the position of that
    /// enumerated target within the declared target list.
    fn add_targets(
        &mut self,
        curr_enum_idx: usize,
        curr_target_idx: usize,
        src_member_idxes: &mut [usize],
    ) -> LoadResult<()> {
        let candidate_count = self.targets[curr_target_idx]
            .enum_members()
            .map(|m| m.len())
            .unwrap_or(0);

        for i in 0..candidate_count {
            src_member_idxes[curr_enum_idx] = i;
            if curr_enum_idx < self.enum_target_count - 1 {
                let next_target_idx = (curr_target_idx + 1..self.targets.len())
                    .find(|&idx| self.targets[idx].enum_members().is_some())
                    .ok_or_else(|| LoadError::InvalidLoader {
                        reason: "fewer enumerated targets than enum_target_count".to_string(),
                    })?;
                self.add_targets(curr_enum_idx + 1, next_target_idx, src_member_idxes)?;
            } else {
                self.register_combination(src_member_idxes)?;
            }
        }
        Ok(())
    }

    /// Deepest recursion level: register one tuple for the combination the
    /// index vector currently selects.
    fn register_combination(&mut self, src_member_idxes: &[usize]) -> LoadResult<()> {
        let mut column = 0;
        let mut enum_idx = 0;
        for idx in 0..self.targets.len() {
            if self.targets[idx].enum_members().is_none() {
                column = self.targets[idx].add_row(self.stmt.as_ref(), column)?;
            } else {
                let selected = self.targets[idx]
                    .enum_members()
                    .and_then(|members| members.get(src_member_idxes[enum_idx]))
                    .cloned()
                    .ok_or_else(|| LoadError::InvalidLoader {
                        reason: "enumerated candidate index out of range".to_string(),
                    })?;
                enum_idx += 1;
                self.targets[idx].register(selected)?;
            }
        }
        Ok(())
    }

    /// Capture the non-enumerated targets' current members as one row of
    /// the new partial result.
    fn save_partial_row(&mut self) -> LoadResult<()> {
        let Some(capture) = &mut self.capture else {
            return Ok(());
        };
        let mut row = Vec::new();
        for target in &self.targets {
            if target.enum_members().is_some() {
                continue;
            }
            let member = target.current().ok_or_else(|| LoadError::InvalidLoader {
                reason: format!("target {} has no current member to capture", target.description()),
            })?;
            row.push(member);
        }
        capture.push(row);
        Ok(())
    }

    /// Advance by exactly one logical row.
    async fn advance(&mut self) -> LoadResult<bool> {
        if let Some(stmt) = &mut self.stmt {
            stmt.advance().await
        } else {
            self.replay_idx += 1;
            let len = self.partial_result.as_ref().map_or(0, Vec::len);
            if self.replay_idx >= len {
                debug!(context = %self.context, rows = len, "replay exhausted");
            }
            Ok(self.replay_idx < len)
        }
    }

    fn current_replay_row(&self) -> LoadResult<&PartialRow> {
        self.partial_result
            .as_ref()
            .and_then(|rows| rows.get(self.replay_idx))
            .ok_or(LoadError::ReplayExhausted {
                row: self.replay_idx,
            })
    }

    /// Wrap a fault exactly once: a live statement applies its own
    /// classification, otherwise the loader wraps generically with its
    /// population context.
    fn wrap(&self, fault: LoadError) -> LoadError {
        match &self.stmt {
            Some(stmt) => stmt.handle(fault),
            None => wrap_with_context(&self.context, fault),
        }
    }
}
