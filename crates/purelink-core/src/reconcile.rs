// ── Snapshot reconciliation ──
//
// Both pollers keep the last accepted snapshot of their source and diff
// each fresh one against it. The diff is pure; applying it is the
// lifecycle manager's job.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// Three-way difference between two keyed snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<K: Ord> {
    /// Keys in the previous snapshot only.
    pub missing: BTreeSet<K>,
    /// Keys in the current snapshot only.
    pub added: BTreeSet<K>,
    /// Keys in both whose values are not equal.
    pub changed: BTreeSet<K>,
}

impl<K: Ord> Diff<K> {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.added.is_empty() && self.changed.is_empty()
    }
}

impl<K: Ord> Default for Diff<K> {
    fn default() -> Self {
        Self {
            missing: BTreeSet::new(),
            added: BTreeSet::new(),
            changed: BTreeSet::new(),
        }
    }
}

/// Compare `previous` against `current` using `equal` for shared keys.
pub fn diff<K, V, F>(previous: &HashMap<K, V>, current: &HashMap<K, V>, equal: F) -> Diff<K>
where
    K: Ord + Hash + Clone,
    F: Fn(&V, &V) -> bool,
{
    let mut out = Diff::default();

    for (key, old) in previous {
        match current.get(key) {
            None => {
                out.missing.insert(key.clone());
            }
            Some(new) if !equal(old, new) => {
                out.changed.insert(key.clone());
            }
            Some(_) => {}
        }
    }

    out.added.extend(
        current
            .keys()
            .filter(|key| !previous.contains_key(*key))
            .cloned(),
    );

    out
}
