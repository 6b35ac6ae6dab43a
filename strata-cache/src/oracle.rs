//! Change oracle protocol for cache invalidation.
//!
//! An oracle answers "has this hierarchy (or aggregation) changed since I
//! last asked?". It is consulted on every status-checked cache read,
//! potentially many times per query, so implementations must be cheap. The
//! first call for a given hierarchy or aggregation establishes the baseline;
//! there is nothing "before" to have changed from.
//!
//! A "changed" answer is a normal signal causing invalidation and refresh,
//! never a fault.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use strata_core::{AggregationKey, Hierarchy};

/// Answers whether cached data for a hierarchy or aggregation is stale.
///
/// Stateful per hierarchy/aggregation: implementations typically record the
/// timestamp of the first check and compare subsequent checks against
/// whatever change feed they watch.
pub trait ChangeOracle: Send + Sync {
    /// Has this hierarchy changed since the previous call for it?
    fn is_hierarchy_changed(&self, hierarchy: &Hierarchy) -> bool;

    /// Has this aggregation changed since the previous call for it?
    fn is_aggregation_changed(&self, aggregation: &AggregationKey) -> bool;
}

/// Default oracle that always answers "unchanged".
///
/// With this oracle the cache behaves as permanently valid until explicitly
/// flushed by other means. It still records the first time each hierarchy
/// was checked, so a real change feed can be swapped in without losing the
/// baseline semantics.
#[derive(Debug, Default)]
pub struct NoopChangeOracle {
    baselines: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl NoopChangeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the given hierarchy was first checked, if ever.
    pub fn first_checked(&self, hierarchy: &Hierarchy) -> Option<DateTime<Utc>> {
        self.baselines
            .lock()
            .ok()
            .and_then(|b| b.get(&hierarchy.unique_name).copied())
    }

    fn touch(&self, name: &str) {
        if let Ok(mut baselines) = self.baselines.lock() {
            baselines.entry(name.to_string()).or_insert_with(Utc::now);
        }
    }
}

impl ChangeOracle for NoopChangeOracle {
    fn is_hierarchy_changed(&self, hierarchy: &Hierarchy) -> bool {
        self.touch(&hierarchy.unique_name);
        false
    }

    fn is_aggregation_changed(&self, aggregation: &AggregationKey) -> bool {
        self.touch(&aggregation.star);
        false
    }
}

/// Oracle that answers from a programmed script.
///
/// Each hierarchy (by unique name) has a queue of scripted answers; once the
/// queue drains, the oracle falls back to "unchanged". This gives tests a
/// deterministic substitute for a real change feed.
#[derive(Debug, Default)]
pub struct ScriptedChangeOracle {
    hierarchy_answers: Mutex<HashMap<String, VecDeque<bool>>>,
    aggregation_answers: Mutex<HashMap<AggregationKey, VecDeque<bool>>>,
}

impl ScriptedChangeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue answers for a hierarchy, consumed one per check.
    pub fn script_hierarchy(&self, hierarchy: &Hierarchy, answers: impl IntoIterator<Item = bool>) {
        if let Ok(mut map) = self.hierarchy_answers.lock() {
            map.entry(hierarchy.unique_name.clone())
                .or_default()
                .extend(answers);
        }
    }

    /// Queue answers for an aggregation, consumed one per check.
    pub fn script_aggregation(
        &self,
        aggregation: &AggregationKey,
        answers: impl IntoIterator<Item = bool>,
    ) {
        if let Ok(mut map) = self.aggregation_answers.lock() {
            map.entry(aggregation.clone()).or_default().extend(answers);
        }
    }
}

impl ChangeOracle for ScriptedChangeOracle {
    fn is_hierarchy_changed(&self, hierarchy: &Hierarchy) -> bool {
        self.hierarchy_answers
            .lock()
            .ok()
            .and_then(|mut map| {
                map.get_mut(&hierarchy.unique_name)
                    .and_then(VecDeque::pop_front)
            })
            .unwrap_or(false)
    }

    fn is_aggregation_changed(&self, aggregation: &AggregationKey) -> bool {
        self.aggregation_answers
            .lock()
            .ok()
            .and_then(|mut map| map.get_mut(aggregation).and_then(VecDeque::pop_front))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> Hierarchy {
        Hierarchy::new("[Store].[Stores]", "Store")
    }

    #[test]
    fn test_noop_oracle_always_unchanged() {
        let oracle = NoopChangeOracle::new();
        let hierarchy = stores();
        let aggregation = AggregationKey::new("sales_fact", vec!["store_id".to_string()]);

        for _ in 0..3 {
            assert!(!oracle.is_hierarchy_changed(&hierarchy));
            assert!(!oracle.is_aggregation_changed(&aggregation));
        }
    }

    #[test]
    fn test_noop_oracle_records_baseline_on_first_check() {
        let oracle = NoopChangeOracle::new();
        let hierarchy = stores();

        assert!(oracle.first_checked(&hierarchy).is_none());
        oracle.is_hierarchy_changed(&hierarchy);
        let first = oracle.first_checked(&hierarchy).expect("baseline recorded");

        // A later check does not move the baseline.
        oracle.is_hierarchy_changed(&hierarchy);
        assert_eq!(oracle.first_checked(&hierarchy), Some(first));
    }

    #[test]
    fn test_scripted_oracle_consumes_answers_in_order() {
        let oracle = ScriptedChangeOracle::new();
        let hierarchy = stores();
        oracle.script_hierarchy(&hierarchy, [false, true]);

        assert!(!oracle.is_hierarchy_changed(&hierarchy));
        assert!(oracle.is_hierarchy_changed(&hierarchy));
        // Script drained: falls back to unchanged.
        assert!(!oracle.is_hierarchy_changed(&hierarchy));
    }

    #[test]
    fn test_scripted_oracle_isolates_hierarchies() {
        let oracle = ScriptedChangeOracle::new();
        let stores = stores();
        let customers = Hierarchy::new("[Customer].[Customers]", "Customer");
        oracle.script_hierarchy(&stores, [true]);

        assert!(!oracle.is_hierarchy_changed(&customers));
        assert!(oracle.is_hierarchy_changed(&stores));
    }

    #[test]
    fn test_scripted_oracle_aggregations() {
        let oracle = ScriptedChangeOracle::new();
        let agg = AggregationKey::new("sales_fact", vec!["time_id".to_string()]);
        oracle.script_aggregation(&agg, [true]);

        assert!(oracle.is_aggregation_changed(&agg));
        assert!(!oracle.is_aggregation_changed(&agg));
    }
}
