//! Pure set arithmetic between source and index fingerprints.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Work a run has to do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    /// Indexed filenames no longer present in the source.
    pub to_delete: BTreeSet<String>,
    /// `filename → hash` for new or changed source files.
    pub to_ingest: BTreeMap<String, String>,
    /// Subset of `to_ingest` the index already holds an older version of.
    pub changed: BTreeSet<String>,
    /// Files present on both sides with equal hashes.
    pub unchanged: usize,
}

impl ReconciliationPlan {
    /// Filenames whose records must be removed before ingesting: stale files plus the
    /// previous versions of changed files.
    pub fn deletions(&self) -> BTreeSet<String> {
        self.to_delete.union(&self.changed).cloned().collect()
    }

    /// Whether the index already matches the source.
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_ingest.is_empty()
    }
}

/// Diff `source` against `index`.
///
/// `to_delete` is every indexed name missing from the source; `to_ingest` is every source name
/// whose hash is absent from or differs from the index.
pub fn plan_reconciliation(
    source: &BTreeMap<String, String>,
    index: &BTreeMap<String, String>,
) -> ReconciliationPlan {
    let to_delete = index
        .keys()
        .filter(|name| !source.contains_key(*name))
        .cloned()
        .collect();

    let mut plan = ReconciliationPlan {
        to_delete,
        ..ReconciliationPlan::default()
    };
    for (name, hash) in source {
        match index.get(name) {
            Some(indexed) if indexed == hash => plan.unchanged += 1,
            Some(_) => {
                plan.changed.insert(name.clone());
                plan.to_ingest.insert(name.clone(), hash.clone());
            }
            None => {
                plan.to_ingest.insert(name.clone(), hash.clone());
            }
        }
    }
    plan
}

/// Force a full replace of files whose indexed chunks disagree on the hash.
///
/// Only names still present in the source are affected; vanished ones are already deleted.
pub fn force_reingest(
    plan: &mut ReconciliationPlan,
    divergent: &BTreeSet<String>,
    source: &BTreeMap<String, String>,
) {
    for name in divergent {
        let Some(hash) = source.get(name) else {
            continue;
        };
        if plan.to_ingest.contains_key(name) {
            continue;
        }
        tracing::warn!(file = %name, "Re-ingesting file with inconsistent indexed hashes");
        plan.unchanged = plan.unchanged.saturating_sub(1);
        plan.changed.insert(name.clone());
        plan.to_ingest.insert(name.clone(), hash.clone());
    }
}

/// Treat every pending file as replacing an older version whose chunks may still be indexed.
///
/// Used when the index state could not be read: the plan then assumes an empty index, so
/// nothing marks a file as changed and a shrunk file would keep its higher-ordinal chunks.
pub fn replace_all_pending(plan: &mut ReconciliationPlan) {
    plan.changed.extend(plan.to_ingest.keys().cloned());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn diff_deletes_vanished_and_ingests_changed() {
        let plan = plan_reconciliation(
            &map(&[("a", "1"), ("b", "2")]),
            &map(&[("b", "2"), ("c", "3")]),
        );
        assert_eq!(plan.to_delete, set(&["c"]));
        assert_eq!(plan.to_ingest, map(&[("a", "1")]));
        assert!(plan.changed.is_empty());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn changed_hash_is_replaced() {
        let plan = plan_reconciliation(&map(&[("a", "new")]), &map(&[("a", "old")]));
        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.to_ingest, map(&[("a", "new")]));
        assert_eq!(plan.changed, set(&["a"]));
        assert_eq!(plan.deletions(), set(&["a"]));
    }

    #[test]
    fn identical_state_is_empty_plan() {
        let state = map(&[("a", "1"), ("b", "2")]);
        let plan = plan_reconciliation(&state, &state);
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 2);
    }

    #[test]
    fn empty_index_ingests_everything() {
        let plan = plan_reconciliation(&map(&[("a", "1"), ("b", "2")]), &BTreeMap::new());
        assert_eq!(plan.to_ingest.len(), 2);
        assert!(plan.to_delete.is_empty());
        assert!(plan.changed.is_empty());
    }

    #[test]
    fn empty_source_deletes_everything() {
        let plan = plan_reconciliation(&BTreeMap::new(), &map(&[("a", "1")]));
        assert_eq!(plan.to_delete, set(&["a"]));
        assert!(plan.to_ingest.is_empty());
    }

    #[test]
    fn divergent_files_are_forced_into_replace() {
        let source = map(&[("a", "1"), ("b", "2")]);
        let mut plan = plan_reconciliation(&source, &map(&[("a", "1"), ("b", "2"), ("z", "9")]));
        force_reingest(&mut plan, &set(&["a", "z"]), &source);

        assert_eq!(plan.to_ingest, map(&[("a", "1")]));
        assert_eq!(plan.changed, set(&["a"]));
        assert_eq!(plan.to_delete, set(&["z"]));
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn unknown_index_state_replaces_every_pending_file() {
        let mut plan = plan_reconciliation(&map(&[("a", "1"), ("b", "2")]), &BTreeMap::new());
        replace_all_pending(&mut plan);

        assert_eq!(plan.changed, set(&["a", "b"]));
        assert_eq!(plan.deletions(), set(&["a", "b"]));
        assert_eq!(plan.to_ingest.len(), 2);
    }
}
