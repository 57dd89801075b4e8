//! Decide which keys of a level need computing

use rustc_hash::FxHashSet;

use crate::cache::CacheTable;

/// Outcome of reconciling enumerated keys against the cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Keys to compute, in enumeration order
    pub pending: Vec<String>,
    /// Keys reused from the cache
    pub cached: usize,
    /// Cached keys recomputed because their content fingerprint changed
    pub changed: usize,
}

/// Keys present in both the annual and the period table.
///
/// `None` when either table is absent (every key is then new).
pub fn cached_keys(
    annual: Option<&CacheTable>,
    period: Option<&CacheTable>,
) -> Option<FxHashSet<String>> {
    let (annual, period) = (annual?, period?);
    Some(
        annual
            .keys()
            .iter()
            .filter(|k| period.keys().contains(*k))
            .cloned()
            .collect(),
    )
}

/// Split `keys` into pending and cached.
///
/// `changed` lists keys whose content differs from what the cache was built
/// from; they are recomputed even when cached.
pub fn reconcile(
    keys: &[String],
    cached: Option<&FxHashSet<String>>,
    changed: Option<&FxHashSet<String>>,
    force: bool,
) -> Reconciliation {
    let Some(cached) = cached.filter(|_| !force) else {
        return Reconciliation {
            pending: keys.to_vec(),
            ..Default::default()
        };
    };

    let mut out = Reconciliation::default();
    for key in keys {
        if !cached.contains(key) {
            out.pending.push(key.clone());
        } else if changed.is_some_and(|c| c.contains(key)) {
            out.changed += 1;
            out.pending.push(key.clone());
        } else {
            out.cached += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ks: &[&str]) -> Vec<String> {
        ks.iter().map(|k| k.to_string()).collect()
    }

    fn set(ks: &[&str]) -> FxHashSet<String> {
        ks.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn only_new_keys_pending() {
        let cached = set(&["A", "B"]);
        let r = reconcile(&keys(&["A", "B", "C"]), Some(&cached), None, false);
        assert_eq!(r.pending, keys(&["C"]));
        assert_eq!(r.cached, 2);
        assert_eq!(r.changed, 0);
    }

    #[test]
    fn force_recomputes_everything() {
        let cached = set(&["A", "B"]);
        let r = reconcile(&keys(&["A", "B", "C"]), Some(&cached), None, true);
        assert_eq!(r.pending, keys(&["A", "B", "C"]));
        assert_eq!(r.cached, 0);
    }

    #[test]
    fn absent_cache_means_all_new() {
        let r = reconcile(&keys(&["A", "B"]), None, None, false);
        assert_eq!(r.pending, keys(&["A", "B"]));
    }

    #[test]
    fn changed_keys_are_recomputed() {
        let cached = set(&["A", "B"]);
        let changed = set(&["B", "Z"]);
        let r = reconcile(&keys(&["A", "B", "C"]), Some(&cached), Some(&changed), false);
        assert_eq!(r.pending, keys(&["B", "C"]));
        assert_eq!(r.cached, 1);
        assert_eq!(r.changed, 1);
    }

    #[test]
    fn all_cached_yields_nothing() {
        let cached = set(&["A"]);
        let r = reconcile(&keys(&["A"]), Some(&cached), None, false);
        assert!(r.pending.is_empty());
        assert_eq!(r.cached, 1);
    }
}
