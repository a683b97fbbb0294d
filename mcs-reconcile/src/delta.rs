//! Collection deltas: membership sets, node counts, patch operations.

use std::collections::HashSet;
use std::hash::Hash;

use serde::Serialize;

/// Identity of a collection member, independent of its other fields.
pub trait NaturalKey {
    type Key: Eq + Hash + Clone;

    fn natural_key(&self) -> Self::Key;
}

impl NaturalKey for String {
    type Key = String;

    fn natural_key(&self) -> String {
        self.clone()
    }
}

/// Members to add and remove to turn `observed` into `desired`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaSet<M> {
    pub to_add: Vec<M>,
    pub to_remove: Vec<M>,
}

impl<M> DeltaSet<M> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Set difference by natural key.
///
/// Additions keep desired order, removals keep observed order. Duplicate
/// keys on either side count once.
pub fn compute_delta<M>(desired: &[M], observed: &[M]) -> DeltaSet<M>
where
    M: NaturalKey + Clone,
{
    let desired_keys: HashSet<M::Key> = desired.iter().map(NaturalKey::natural_key).collect();
    let observed_keys: HashSet<M::Key> = observed.iter().map(NaturalKey::natural_key).collect();

    DeltaSet {
        to_add: missing_from(desired, &observed_keys),
        to_remove: missing_from(observed, &desired_keys),
    }
}

fn missing_from<M>(members: &[M], other: &HashSet<M::Key>) -> Vec<M>
where
    M: NaturalKey + Clone,
{
    let mut seen = HashSet::new();
    members
        .iter()
        .filter(|m| {
            let key = m.natural_key();
            !other.contains(&key) && seen.insert(key)
        })
        .cloned()
        .collect()
}

/// Signed node count change.
pub fn scale_delta(desired: u32, observed: u32) -> i64 {
    i64::from(desired) - i64::from(observed)
}

/// One JSON-patch operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOp {
    pub path: String,
    pub value: serde_json::Value,
    pub op: String,
}

impl PatchOp {
    pub fn replace(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            value,
            op: "replace".to_string(),
        }
    }

    /// A replace op, only when `desired` is set and differs from `observed`.
    pub fn replace_if_changed<T>(path: &str, desired: Option<&T>, observed: &T) -> Option<Self>
    where
        T: PartialEq + Serialize,
    {
        let desired = desired.filter(|d| *d != observed)?;
        let value = serde_json::to_value(desired).ok()?;
        Some(Self::replace(path, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_delta_add_and_remove() {
        let delta = compute_delta(&names(&["db1", "db2"]), &names(&["db2", "db3"]));
        assert_eq!(delta.to_add, names(&["db1"]));
        assert_eq!(delta.to_remove, names(&["db3"]));
    }

    #[test]
    fn test_delta_dedups_keys() {
        let delta = compute_delta(&names(&["a", "a", "b"]), &names(&[]));
        assert_eq!(delta.to_add, names(&["a", "b"]));
        assert!(delta.to_remove.is_empty());
    }

    #[test]
    fn test_scale_delta_sign() {
        assert_eq!(scale_delta(5, 3), 2);
        assert_eq!(scale_delta(1, 4), -3);
        assert_eq!(scale_delta(0, u32::MAX), -i64::from(u32::MAX));
    }

    #[test]
    fn test_replace_if_changed() {
        assert_eq!(PatchOp::replace_if_changed("/max_nodes", Some(&5u32), &5u32), None);
        assert_eq!(PatchOp::replace_if_changed::<u32>("/max_nodes", None, &5), None);
        assert_eq!(
            PatchOp::replace_if_changed("/max_nodes", Some(&7u32), &5u32),
            Some(PatchOp::replace("/max_nodes", serde_json::json!(7)))
        );
    }

    proptest! {
        #[test]
        fn prop_delta_of_identical_sets_is_empty(set in prop::collection::vec("[a-d]{1,3}", 0..12)) {
            let delta = compute_delta(&set, &set);
            prop_assert!(delta.is_empty());
        }

        #[test]
        fn prop_add_and_remove_are_disjoint(
            desired in prop::collection::vec("[a-e]{1,2}", 0..12),
            observed in prop::collection::vec("[a-e]{1,2}", 0..12),
        ) {
            let delta = compute_delta(&desired, &observed);
            let added: HashSet<&String> = delta.to_add.iter().collect();
            prop_assert!(delta.to_remove.iter().all(|r| !added.contains(r)));
        }
    }
}
