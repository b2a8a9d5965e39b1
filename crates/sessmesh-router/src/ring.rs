//! Weighted consistent-hash ring with virtual nodes.
//!
//! Each backend contributes `weight` virtual nodes at positions
//! `crc32("{id}#{i}")` on a 32-bit circle. A key is owned by the first
//! virtual node whose hash is at or past the key's hash, wrapping at the
//! top of the space. Adding or removing a backend only remaps the keys
//! adjacent to its own virtual nodes, which is the point.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::{debug, info};

/// Default number of virtual nodes for a backend registered without an
/// explicit weight.
pub const DEFAULT_VIRTUAL_NODES: u32 = 100;

/// A single position on the hash ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualNode {
    /// Position on the 32-bit circle
    pub hash: u32,
    /// The backend this virtual node belongs to
    pub owner_id: String,
    /// Which of the owner's replicas this is (`0..weight`)
    pub replica_index: u32,
}

/// Identity and address of a physical backend, as returned by lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub id: String,
    pub address: String,
}

#[derive(Default)]
struct RingState {
    /// Sorted by `(hash, owner_id, replica_index)` at all times
    vnodes: Vec<VirtualNode>,
    weights: HashMap<String, u32>,
    addresses: HashMap<String, String>,
}

impl RingState {
    /// Index of the first virtual node at or past `hash`, wrapped.
    fn landing_index(&self, hash: u32) -> usize {
        let idx = self.vnodes.partition_point(|v| v.hash < hash);
        if idx >= self.vnodes.len() {
            0
        } else {
            idx
        }
    }
}

/// CRC32 (IEEE) over the raw bytes. Stable across processes and
/// releases, so independently built routers agree on placement.
fn hash_key(key: &str) -> u32 {
    crc32fast::hash(key.as_bytes())
}

fn virtual_node_key(id: &str, replica: u32) -> String {
    format!("{}#{}", id, replica)
}

/// Consistent-hash ring, internally synchronised.
///
/// Writes are serialised and atomic from a reader's perspective; readers
/// observe either the full pre-state or the full post-state. No
/// operation fails: lookups on an empty ring report absence, duplicate
/// adds and missing removes are no-ops.
pub struct HashRing {
    default_weight: u32,
    state: RwLock<RingState>,
}

impl HashRing {
    /// Creates an empty ring. `default_weight` is substituted for any
    /// non-positive weight passed to [`add_node`](Self::add_node); a
    /// non-positive `default_weight` itself falls back to
    /// [`DEFAULT_VIRTUAL_NODES`].
    pub fn new(default_weight: u32) -> Self {
        let default_weight = if default_weight == 0 {
            DEFAULT_VIRTUAL_NODES
        } else {
            default_weight
        };
        Self {
            default_weight,
            state: RwLock::new(RingState::default()),
        }
    }

    /// Adds a backend with `weight` virtual nodes. Adding an id that is
    /// already present is a no-op.
    pub fn add_node(&self, id: &str, weight: u32, address: &str) {
        let mut state = self.state.write();

        if state.weights.contains_key(id) {
            debug!(node = id, "node already in ring, skipping");
            return;
        }

        let weight = if weight == 0 { self.default_weight } else { weight };
        state.weights.insert(id.to_string(), weight);
        state.addresses.insert(id.to_string(), address.to_string());

        for replica in 0..weight {
            let hash = hash_key(&virtual_node_key(id, replica));
            state.vnodes.push(VirtualNode {
                hash,
                owner_id: id.to_string(),
                replica_index: replica,
            });
        }

        // Deterministic total order even under hash collisions, so
        // independent routers agree on owner selection.
        state.vnodes.sort_by(|a, b| {
            a.hash
                .cmp(&b.hash)
                .then_with(|| a.owner_id.cmp(&b.owner_id))
                .then_with(|| a.replica_index.cmp(&b.replica_index))
        });

        info!(node = id, weight, address, "added node to ring");
    }

    /// Removes a backend and all its virtual nodes. Removing an unknown
    /// id is a no-op.
    pub fn remove_node(&self, id: &str) {
        let mut state = self.state.write();

        if state.weights.remove(id).is_none() {
            debug!(node = id, "node not in ring, nothing to remove");
            return;
        }
        state.addresses.remove(id);

        let before = state.vnodes.len();
        state.vnodes.retain(|v| v.owner_id != id);

        info!(
            node = id,
            removed = before - state.vnodes.len(),
            "removed node from ring"
        );
    }

    /// The backend owning `key`: the first virtual node whose hash is at
    /// or past `crc32(key)`, wrapping past the top of the hash space.
    /// `None` on an empty ring.
    pub fn lookup(&self, key: &str) -> Option<BackendInfo> {
        let state = self.state.read();
        if state.vnodes.is_empty() {
            return None;
        }

        let vnode = &state.vnodes[state.landing_index(hash_key(key))];
        Some(BackendInfo {
            id: vnode.owner_id.clone(),
            address: state.addresses.get(&vnode.owner_id).cloned().unwrap_or_default(),
        })
    }

    /// Up to `count` distinct backends for `key`, starting at the owner
    /// and walking clockwise. The result length is
    /// `min(count, node_count)` and the first element equals
    /// [`lookup`](Self::lookup).
    pub fn successors(&self, key: &str, count: usize) -> Vec<BackendInfo> {
        let state = self.state.read();
        if state.vnodes.is_empty() || count == 0 {
            return Vec::new();
        }

        let start = state.landing_index(hash_key(key));
        let mut seen = HashSet::new();
        let mut result = Vec::with_capacity(count.min(state.weights.len()));

        for i in 0..state.vnodes.len() {
            if result.len() >= count {
                break;
            }
            let vnode = &state.vnodes[(start + i) % state.vnodes.len()];
            if seen.insert(vnode.owner_id.clone()) {
                result.push(BackendInfo {
                    id: vnode.owner_id.clone(),
                    address: state
                        .addresses
                        .get(&vnode.owner_id)
                        .cloned()
                        .unwrap_or_default(),
                });
            }
        }

        result
    }

    /// Network address of a backend, if present.
    pub fn address_of(&self, id: &str) -> Option<String> {
        self.state.read().addresses.get(id).cloned()
    }

    /// Number of virtual nodes a backend contributes, if present.
    pub fn weight_of(&self, id: &str) -> Option<u32> {
        self.state.read().weights.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().weights.contains_key(id)
    }

    /// Number of physical backends.
    pub fn node_count(&self) -> usize {
        self.state.read().weights.len()
    }

    /// Total number of virtual nodes.
    pub fn virtual_node_count(&self) -> usize {
        self.state.read().vnodes.len()
    }

    /// All backend ids, in no particular order.
    pub fn node_ids(&self) -> Vec<String> {
        self.state.read().weights.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn three_node_ring(weight: u32) -> HashRing {
        let ring = HashRing::new(weight);
        ring.add_node("backend-a", weight, "localhost:50051");
        ring.add_node("backend-b", weight, "localhost:50052");
        ring.add_node("backend-c", weight, "localhost:50053");
        ring
    }

    #[test]
    fn test_new_ring_is_empty() {
        let ring = HashRing::new(100);
        assert_eq!(ring.node_count(), 0);
        assert_eq!(ring.virtual_node_count(), 0);
    }

    #[test]
    fn test_zero_default_weight_falls_back() {
        let ring = HashRing::new(0);
        ring.add_node("backend-a", 0, "localhost:50051");
        assert_eq!(
            ring.virtual_node_count(),
            DEFAULT_VIRTUAL_NODES as usize
        );
    }

    #[test]
    fn test_add_node() {
        let ring = HashRing::new(10);
        ring.add_node("backend-a", 10, "localhost:50051");

        assert_eq!(ring.node_count(), 1);
        assert_eq!(ring.virtual_node_count(), 10);
        assert_eq!(ring.weight_of("backend-a"), Some(10));
        assert_eq!(
            ring.address_of("backend-a").as_deref(),
            Some("localhost:50051")
        );
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let ring = HashRing::new(10);
        ring.add_node("backend-a", 10, "localhost:50051");
        // Different weight and address: the first registration wins.
        ring.add_node("backend-a", 99, "localhost:60000");

        assert_eq!(ring.node_count(), 1);
        assert_eq!(ring.virtual_node_count(), 10);
        assert_eq!(ring.weight_of("backend-a"), Some(10));
        assert_eq!(
            ring.address_of("backend-a").as_deref(),
            Some("localhost:50051")
        );
    }

    #[test]
    fn test_remove_node() {
        let ring = HashRing::new(10);
        ring.add_node("backend-a", 10, "localhost:50051");
        ring.add_node("backend-b", 10, "localhost:50052");

        ring.remove_node("backend-a");

        assert_eq!(ring.node_count(), 1);
        assert_eq!(ring.virtual_node_count(), 10);
        assert!(!ring.contains("backend-a"));
        assert!(ring.contains("backend-b"));

        // Second removal is a no-op.
        ring.remove_node("backend-a");
        assert_eq!(ring.node_count(), 1);
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let ring = three_node_ring(100);

        let first = ring.lookup("session-123").unwrap();
        for _ in 0..10 {
            assert_eq!(ring.lookup("session-123").unwrap(), first);
        }
        assert!(!first.id.is_empty());
        assert!(!first.address.is_empty());
    }

    #[test]
    fn test_lookup_empty_ring() {
        let ring = HashRing::new(10);
        assert!(ring.lookup("session-1").is_none());
        assert!(ring.successors("session-1", 3).is_empty());
    }

    #[test]
    fn test_successors_distinct_and_bounded() {
        let ring = three_node_ring(10);

        for i in 0..50 {
            let key = format!("session-{}", i);
            let nodes = ring.successors(&key, 3);
            assert_eq!(nodes.len(), 3);

            let distinct: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
            assert_eq!(distinct.len(), 3);

            assert_eq!(nodes[0], ring.lookup(&key).unwrap());
        }

        // Asking for more than exist yields all of them, once each.
        assert_eq!(ring.successors("session-0", 10).len(), 3);
        assert!(ring.successors("session-0", 0).is_empty());
    }

    #[test]
    fn test_stability_under_re_add() {
        let ring = three_node_ring(50);
        let owners: Vec<_> = (0..200)
            .map(|i| ring.lookup(&format!("session-{}", i)).unwrap().id)
            .collect();

        // Churn back to the same membership.
        ring.remove_node("backend-b");
        ring.add_node("backend-b", 50, "localhost:50052");

        for (i, owner) in owners.iter().enumerate() {
            assert_eq!(
                &ring.lookup(&format!("session-{}", i)).unwrap().id,
                owner
            );
        }
    }

    #[test]
    fn test_minimal_remap_on_add() {
        let ring = three_node_ring(100);

        let sample = 10_000;
        let owners: Vec<_> = (0..sample)
            .map(|i| ring.lookup(&format!("session-{}", i)).unwrap().id)
            .collect();

        ring.add_node("backend-d", 100, "localhost:50054");

        let moved = (0..sample)
            .filter(|i| ring.lookup(&format!("session-{}", i)).unwrap().id != owners[*i])
            .count();

        // The newcomer owns ~1/4 of the space; allow ±20% of the sample
        // around that.
        let expected = sample / 4;
        let tolerance = sample * 20 / 100;
        assert!(
            moved.abs_diff(expected) <= tolerance,
            "remapped {} of {} keys, expected ~{}",
            moved,
            sample,
            expected
        );

        // Every moved key moved *to* the newcomer, never between
        // survivors.
        for i in 0..sample {
            let owner = ring.lookup(&format!("session-{}", i)).unwrap().id;
            if owner != owners[i] {
                assert_eq!(owner, "backend-d");
            }
        }
    }

    #[test]
    fn test_remove_does_not_remap_survivors() {
        let ring = three_node_ring(100);

        let owners: HashMap<String, String> = (0..1000)
            .map(|i| {
                let key = format!("session-{}", i);
                let owner = ring.lookup(&key).unwrap().id;
                (key, owner)
            })
            .collect();

        ring.remove_node("backend-b");

        for (key, old_owner) in &owners {
            let new_owner = ring.lookup(key).unwrap().id;
            if old_owner != "backend-b" {
                assert_eq!(&new_owner, old_owner, "survivor key {} moved", key);
            } else {
                assert_ne!(new_owner, "backend-b");
            }
        }
    }

    #[test]
    fn test_load_distribution() {
        let ring = three_node_ring(300);

        let mut distribution: HashMap<String, usize> = HashMap::new();
        let sample = 10_000;
        for i in 0..sample {
            let owner = ring.lookup(&format!("session-{}", i)).unwrap().id;
            *distribution.entry(owner).or_default() += 1;
        }

        // CRC32 clusters a little at realistic virtual-node counts, so
        // the bound is generous.
        let expected = sample / 3;
        let tolerance = expected * 25 / 100;
        for (node, count) in distribution {
            assert!(
                count.abs_diff(expected) <= tolerance,
                "node {} got {} keys, expected ~{}",
                node,
                count,
                expected
            );
        }
    }

    #[test]
    fn test_weighted_node_draws_more_load() {
        let ring = HashRing::new(100);
        ring.add_node("backend-a", 100, "localhost:50051");
        ring.add_node("backend-b", 300, "localhost:50052");

        let sample = 10_000;
        let b_count = (0..sample)
            .filter(|i| ring.lookup(&format!("session-{}", i)).unwrap().id == "backend-b")
            .count();

        // With 3x the virtual nodes, b should own ~3/4 of the keys.
        assert!(b_count > sample / 2, "backend-b only owns {} keys", b_count);
    }

    #[test]
    fn test_concurrent_reads_with_writer() {
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(three_node_ring(50));
        let mut handles = vec![];

        for t in 0..8 {
            let ring = Arc::clone(&ring);
            handles.push(thread::spawn(move || {
                for i in 0..500 {
                    let nodes = ring.successors(&format!("session-{}-{}", t, i), 2);
                    assert!(!nodes.is_empty());
                }
            }));
        }

        let writer_ring = Arc::clone(&ring);
        handles.push(thread::spawn(move || {
            for i in 0..20 {
                let id = format!("extra-{}", i);
                writer_ring.add_node(&id, 10, "localhost:60000");
                writer_ring.remove_node(&id);
            }
        }));

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ring.node_count(), 3);
    }
}
