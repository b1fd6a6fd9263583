//! Deterministic digest over a set of graph node ids.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// Digest over the sorted, deduplicated set of node ids influencing a
/// cached result. Order-independent: callers may pass ids in any order.
pub fn compute_topology_hash<I, S>(node_ids: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let sorted: BTreeSet<String> = node_ids.into_iter().map(|s| s.as_ref().to_string()).collect();
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for id in &sorted {
        id.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

/// True iff there is no matching entry, the entry's hash is empty, or it
/// equals the hash of `current_node_ids`.
pub fn validate_topology(entry_hash: Option<&str>, current_node_ids: &[String]) -> bool {
    match entry_hash {
        None => true,
        Some(hash) if hash.is_empty() => true,
        Some(hash) => hash == compute_topology_hash(current_node_ids),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_order_independent() {
        let a = compute_topology_hash(["A", "B", "C"]);
        let b = compute_topology_hash(["C", "A", "B"]);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_entry_hash_always_validates() {
        assert!(validate_topology(Some(""), &["A".to_string()]));
        assert!(validate_topology(None, &["A".to_string()]));
    }

    #[test]
    fn mismatched_hash_fails_validation() {
        let hash = compute_topology_hash(["A", "B"]);
        assert!(!validate_topology(Some(&hash), &["A".to_string()]));
    }
}
