//! Chain traversal, construction, and destruction.

use std::collections::HashSet;

use keyfs_core::{KeyAlg, KeyfsError, KeyfsResult};
use keyfs_crypto::{KeyId, XKey};
use rand::Rng;

use crate::store::ChainStore;

/// How `resolve` treats a seed key with no persisted chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLookup {
    /// The seed must be the root of a persisted chain.
    Use,
    /// No chain entry means the key is used directly, unchained.
    IgnoreMissing,
}

/// Walk the wrap relation from `seed` and return the ordered chain.
///
/// Index 0 is the seed; the last element is the deepest key required to
/// unlock content. A successor carrying the `Invalid` sentinel terminates the
/// chain without being appended: it signals "the chain intentionally ends
/// here without revealing a further key".
pub fn resolve(store: &ChainStore, seed: &XKey, mode: ChainLookup) -> KeyfsResult<Vec<XKey>> {
    let mut chain = vec![seed.clone()];
    let mut visited: HashSet<KeyId> = HashSet::from([seed.id()]);
    // A healthy chain takes at most one hop per stored entry.
    let max_hops = store.len();
    let mut hops = 0;

    loop {
        let Some(current) = chain.last() else { break };
        match store.get_successor(current)? {
            None => {
                if chain.len() == 1 && mode == ChainLookup::Use {
                    return Err(KeyfsError::InvalidChain(format!(
                        "no chain found for key {}",
                        current.id()
                    )));
                }
                break;
            }
            Some(next) => {
                if next.alg() == KeyAlg::Invalid {
                    break;
                }
                if !visited.insert(next.id()) {
                    return Err(KeyfsError::CorruptChain(format!(
                        "cycle at key {}",
                        next.id()
                    )));
                }
                hops += 1;
                if hops > max_hops {
                    return Err(KeyfsError::CorruptChain(
                        "chain is longer than the store".into(),
                    ));
                }
                chain.push(next);
            }
        }
    }
    Ok(chain)
}

/// Wrap `child` under `parent`, creating a new chain link.
///
/// A parent that already has any entry is rejected and the existing entry is
/// left untouched; replacing a wrap silently would orphan whatever the old
/// successor protected.
pub fn add_chain(store: &mut ChainStore, parent: &XKey, child: &XKey) -> KeyfsResult<()> {
    if child.id() == parent.id() {
        return Err(KeyfsError::InvalidChain(format!(
            "key {} cannot wrap itself",
            parent.id()
        )));
    }
    if store.contains(&parent.id()) {
        return Err(KeyfsError::ChainAlreadySet(
            parent.id().to_string(),
            child.id().to_string(),
        ));
    }
    store.put_successor(parent, child)
}

/// Terminate a chain without revealing a further key: seals a random filler
/// record carrying the `Invalid` sentinel under `parent`.
pub fn add_chain_end(store: &mut ChainStore, parent: &XKey) -> KeyfsResult<()> {
    if store.contains(&parent.id()) {
        return Err(KeyfsError::ChainAlreadySet(
            parent.id().to_string(),
            "<end>".into(),
        ));
    }
    store.put_successor(parent, &XKey::random_filler())
}

/// Remove chain entries reachable from `seed`.
///
/// The deletable entries are the chain keys that own a store entry. Without
/// `cascade` only the deepest one is removed; with `cascade` every one,
/// innermost first. Stops at the first failing deletion; earlier removals
/// stay applied.
pub fn del_chain(store: &mut ChainStore, seed: &XKey, cascade: bool) -> KeyfsResult<Vec<KeyId>> {
    let chain = resolve(store, seed, ChainLookup::Use)?;
    let mut owners: Vec<XKey> = chain
        .into_iter()
        .filter(|k| store.contains(&k.id()))
        .collect();
    owners.reverse();
    if !cascade {
        owners.truncate(1);
    }

    let mut deleted = Vec::new();
    for key in &owners {
        if !store.delete_successor(key)? {
            return Err(KeyfsError::InvalidChain(format!(
                "chain entry for key {} disappeared during deletion",
                key.id()
            )));
        }
        deleted.push(key.id());
    }
    Ok(deleted)
}

/// Bounds for traffic-analysis padding.
#[derive(Debug, Clone)]
pub struct RandomChainPolicy {
    /// Inclusive lower bound on filler entries.
    pub min: u32,
    /// Exclusive upper bound on filler entries.
    pub max: u32,
}

impl Default for RandomChainPolicy {
    fn default() -> Self {
        Self { min: 8, max: 16 }
    }
}

/// Insert disconnected filler pairs so the store's shape does not reveal how
/// many real chains it holds. Both keys of a pair carry the `Invalid`
/// sentinel and are discarded immediately; the entries can never be resolved.
///
/// Returns the number of pairs written.
pub fn random_chain(store: &mut ChainStore, policy: &RandomChainPolicy) -> KeyfsResult<u32> {
    if policy.min >= policy.max {
        return Err(KeyfsError::Usage(format!(
            "lower bound ({}) >= upper bound ({})",
            policy.min, policy.max
        )));
    }
    let n = rand::thread_rng().gen_range(policy.min..policy.max) / 2;
    for _ in 0..n {
        let parent = XKey::random_filler();
        let child = XKey::random_filler();
        store.put_successor(&parent, &child)?;
    }
    tracing::debug!(pairs = n, "filler chain entries written");
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, ChainStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn key() -> XKey {
        XKey::random(KeyAlg::Aes256Ctr)
    }

    #[test]
    fn test_use_mode_requires_chain() {
        let (_dir, store) = open_store();
        let seed = key();
        assert!(matches!(
            resolve(&store, &seed, ChainLookup::Use),
            Err(KeyfsError::InvalidChain(_))
        ));
    }

    #[test]
    fn test_ignore_missing_yields_seed_alone() {
        let (_dir, store) = open_store();
        let seed = key();
        let chain = resolve(&store, &seed, ChainLookup::IgnoreMissing).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].id(), seed.id());
    }

    #[test]
    fn test_multi_hop_preserves_order() {
        let (_dir, mut store) = open_store();
        let (a, b, c) = (key(), key(), key());
        add_chain(&mut store, &a, &b).unwrap();
        add_chain(&mut store, &b, &c).unwrap();

        let chain = resolve(&store, &a, ChainLookup::Use).unwrap();
        let ids: Vec<_> = chain.iter().map(|k| k.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id(), c.id()]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let (_dir, mut store) = open_store();
        let (a, b) = (key(), key());
        add_chain(&mut store, &a, &b).unwrap();

        let first = resolve(&store, &a, ChainLookup::Use).unwrap();
        let second = resolve(&store, &a, ChainLookup::Use).unwrap();
        let first_ids: Vec<_> = first.iter().map(|k| k.id()).collect();
        let second_ids: Vec<_> = second.iter().map(|k| k.id()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_sentinel_terminates_without_appearing() {
        let (_dir, mut store) = open_store();
        let (a, b) = (key(), key());
        add_chain(&mut store, &a, &b).unwrap();
        add_chain_end(&mut store, &b).unwrap();

        let chain = resolve(&store, &a, ChainLookup::Use).unwrap();
        assert_eq!(chain.len(), 2, "sentinel must not be appended");
        assert_eq!(chain[1].id(), b.id());
    }

    #[test]
    fn test_cycle_is_corrupt_chain() {
        let (_dir, mut store) = open_store();
        let (a, b) = (key(), key());
        // Bypass the add_chain guard to simulate corruption.
        store.put_successor(&a, &b).unwrap();
        store.put_successor(&b, &a).unwrap();

        assert!(matches!(
            resolve(&store, &a, ChainLookup::Use),
            Err(KeyfsError::CorruptChain(_))
        ));
    }

    #[test]
    fn test_self_cycle_is_corrupt_chain() {
        let (_dir, mut store) = open_store();
        let a = key();
        store.put_successor(&a, &a).unwrap();

        assert!(matches!(
            resolve(&store, &a, ChainLookup::Use),
            Err(KeyfsError::CorruptChain(_))
        ));
    }

    #[test]
    fn test_add_chain_rejects_second_wrap() {
        let (_dir, mut store) = open_store();
        let (a, b, c) = (key(), key(), key());
        add_chain(&mut store, &a, &b).unwrap();

        assert!(matches!(
            add_chain(&mut store, &a, &c),
            Err(KeyfsError::ChainAlreadySet(..))
        ));

        // The original entry is untouched.
        let got = store.get_successor(&a).unwrap().unwrap();
        assert_eq!(got.id(), b.id());
    }

    #[test]
    fn test_add_chain_rejects_self_wrap() {
        let (_dir, mut store) = open_store();
        let a = key();
        assert!(matches!(
            add_chain(&mut store, &a, &a),
            Err(KeyfsError::InvalidChain(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_del_chain_leaf_only() {
        let (_dir, mut store) = open_store();
        let (a, b, c) = (key(), key(), key());
        add_chain(&mut store, &a, &b).unwrap();
        add_chain(&mut store, &b, &c).unwrap();

        let deleted = del_chain(&mut store, &a, false).unwrap();
        assert_eq!(deleted, vec![b.id()]);

        // The first link survives.
        let chain = resolve(&store, &a, ChainLookup::Use).unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_del_chain_cascade() {
        let (_dir, mut store) = open_store();
        let (a, b, c) = (key(), key(), key());
        add_chain(&mut store, &a, &b).unwrap();
        add_chain(&mut store, &b, &c).unwrap();

        let deleted = del_chain(&mut store, &a, true).unwrap();
        assert_eq!(deleted, vec![b.id(), a.id()], "innermost first");
        assert!(store.is_empty());

        let chain = resolve(&store, &a, ChainLookup::IgnoreMissing).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].id(), a.id());
    }

    #[test]
    fn test_del_chain_requires_chain() {
        let (_dir, mut store) = open_store();
        assert!(matches!(
            del_chain(&mut store, &key(), true),
            Err(KeyfsError::InvalidChain(_))
        ));
    }

    #[test]
    fn test_random_chain_writes_filler_pairs() {
        let (_dir, mut store) = open_store();
        let policy = RandomChainPolicy { min: 6, max: 7 };
        let n = random_chain(&mut store, &policy).unwrap();
        assert_eq!(n, 3);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_random_chain_rejects_bad_bounds() {
        let (_dir, mut store) = open_store();
        let policy = RandomChainPolicy { min: 16, max: 8 };
        assert!(matches!(
            random_chain(&mut store, &policy),
            Err(KeyfsError::Usage(_))
        ));
    }

    #[test]
    fn test_filler_entries_do_not_resolve() {
        let (_dir, mut store) = open_store();
        random_chain(&mut store, &RandomChainPolicy { min: 4, max: 5 }).unwrap();

        // A real chain through the same store is unaffected.
        let (a, b) = (key(), key());
        add_chain(&mut store, &a, &b).unwrap();
        let chain = resolve(&store, &a, ChainLookup::Use).unwrap();
        assert_eq!(chain.len(), 2);
    }
}
