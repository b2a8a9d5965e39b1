//! Two-tier LRU residency cache for chat sessions.
//!
//! The hot tier (L1) is small and fast, the warm tier (L2) larger and
//! slower; both are strict LRU. Every access lands the session at the
//! front of L1. When L1 overflows, its least recently used entry is
//! *demoted* to the front of L2; when L2 overflows, its least recently
//! used entry is *evicted* and the session is lost.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use sessmesh_common::protocol::error::{Result, SessmeshError};
use sessmesh_common::protocol::wire::CacheTier;

/// A single chat message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub content: String,
    pub sender_id: String,
    /// Seconds since the UNIX epoch, as supplied by the sender
    pub timestamp: i64,
}

/// A cached chat conversation.
///
/// Sessions are shared between the cache and request handlers as
/// `Arc<Session>`; tier moves transfer the `Arc`, so promotion and
/// demotion preserve object identity. The mutable portion sits behind an
/// interior lock, and all mutation goes through the cache so it happens
/// under the cache's exclusive lock.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: SystemTime,
    state: Mutex<SessionState>,
}

#[derive(Debug)]
struct SessionState {
    messages: Vec<Message>,
    message_count: usize,
    last_accessed: SystemTime,
}

impl Session {
    fn new(id: &str) -> Arc<Self> {
        let now = SystemTime::now();
        Arc::new(Self {
            id: id.to_string(),
            created_at: now,
            state: Mutex::new(SessionState {
                messages: Vec::new(),
                message_count: 0,
                last_accessed: now,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn last_accessed(&self) -> SystemTime {
        self.state.lock().last_accessed
    }

    /// Number of messages appended so far. Always equals
    /// `messages().len()`.
    pub fn message_count(&self) -> usize {
        self.state.lock().message_count
    }

    /// Snapshot of the message history in append order.
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    fn touch(&self) {
        self.state.lock().last_accessed = SystemTime::now();
    }

    fn append(&self, msg: Message) -> usize {
        let mut state = self.state.lock();
        state.messages.push(msg);
        state.message_count += 1;
        state.last_accessed = SystemTime::now();
        state.message_count
    }
}

/// Cache performance counters.
///
/// Invariants after every operation: `hits == l1_hits + l2_hits` and
/// `total_requests == hits + misses`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub demotions: u64,
    pub evictions: u64,
}

/// Read-only view of the cache produced by [`TieredCache::snapshot`].
///
/// Id lists are ordered front-to-back: most recently used first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub l1_size: usize,
    pub l1_capacity: usize,
    pub l2_size: usize,
    pub l2_capacity: usize,
    pub l1_ids: Vec<String>,
    pub l2_ids: Vec<String>,
    pub stats: CacheStats,
}

/// One recency-ordered tier: an id → session map plus an order deque
/// whose front is the most recently used entry.
#[derive(Debug, Default)]
struct Tier {
    entries: HashMap<String, Arc<Session>>,
    order: VecDeque<String>,
}

impl Tier {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, id: &str) -> Option<&Arc<Session>> {
        self.entries.get(id)
    }

    /// Moves an existing entry to the front.
    fn touch(&mut self, id: &str) {
        if self.entries.contains_key(id) {
            self.order.retain(|k| k != id);
            self.order.push_front(id.to_string());
        }
    }

    fn push_front(&mut self, id: String, session: Arc<Session>) {
        self.order.push_front(id.clone());
        self.entries.insert(id, session);
    }

    fn remove(&mut self, id: &str) -> Option<Arc<Session>> {
        let session = self.entries.remove(id)?;
        self.order.retain(|k| k != id);
        Some(session)
    }

    fn pop_back(&mut self) -> Option<(String, Arc<Session>)> {
        let id = self.order.pop_back()?;
        let session = self.entries.remove(&id)?;
        Some((id, session))
    }

    fn ids_front_to_back(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

struct CacheInner {
    l1: Tier,
    l1_capacity: usize,
    l2: Tier,
    l2_capacity: usize,
    stats: CacheStats,
}

impl CacheInner {
    /// Inserts at L1-front, demoting from L1-back until there is room.
    fn insert_into_l1(&mut self, server_id: &str, id: String, session: Arc<Session>) {
        while self.l1.len() >= self.l1_capacity {
            self.demote_from_l1(server_id);
        }
        self.l1.push_front(id, session);
    }

    /// Moves the L1 LRU entry down into L2, evicting the L2 LRU entry
    /// first if the warm tier is full. With no warm tier at all the
    /// demotion degenerates into a direct eviction.
    fn demote_from_l1(&mut self, server_id: &str) {
        let Some((id, session)) = self.l1.pop_back() else {
            return;
        };

        if self.l2_capacity == 0 {
            self.stats.evictions += 1;
            debug!(server = server_id, session = %id, "evicted from L1 (no warm tier)");
            return;
        }

        while self.l2.len() >= self.l2_capacity {
            if let Some((evicted, _)) = self.l2.pop_back() {
                self.stats.evictions += 1;
                debug!(server = server_id, session = %evicted, "evicted from L2");
            } else {
                break;
            }
        }

        self.l2.push_front(id.clone(), session);
        self.stats.demotions += 1;
        debug!(server = server_id, session = %id, "demoted from L1 to L2");
    }

    /// The shared lookup behind `get_or_create` and `append_message`.
    /// Counts one request and reports the pre-access residency tier.
    fn lookup_or_create(&mut self, server_id: &str, id: &str) -> (Arc<Session>, CacheTier) {
        self.stats.total_requests += 1;

        if let Some(session) = self.l1.get(id).cloned() {
            self.stats.hits += 1;
            self.stats.l1_hits += 1;
            session.touch();
            self.l1.touch(id);
            return (session, CacheTier::L1);
        }

        if let Some(session) = self.l2.remove(id) {
            self.stats.hits += 1;
            self.stats.l2_hits += 1;
            session.touch();
            // The promoted entry freed one L2 slot, so a demotion forced
            // by this insert cannot evict.
            self.insert_into_l1(server_id, id.to_string(), session.clone());
            debug!(server = server_id, session = %id, "promoted from L2 to L1");
            return (session, CacheTier::L2);
        }

        self.stats.misses += 1;
        let session = Session::new(id);
        self.insert_into_l1(server_id, id.to_string(), session.clone());
        (session, CacheTier::Miss)
    }
}

/// The two-tier residency cache of one backend.
///
/// All tier-mutating operations take a single exclusive lock covering
/// both tiers and the counters; `peek` and `snapshot` take it shared.
/// Promotion, demotion and eviction are O(1) amortised at the deque
/// backs; reorders on hit are O(tier size), which the small fixed
/// capacities keep cheap.
pub struct TieredCache {
    server_id: String,
    inner: RwLock<CacheInner>,
}

impl TieredCache {
    /// Creates a cache with the given tier capacities.
    ///
    /// The hot tier needs at least one slot; `l2_capacity == 0` is legal
    /// and degenerates into a single-tier LRU of size `l1_capacity`.
    pub fn new(server_id: impl Into<String>, l1_capacity: usize, l2_capacity: usize) -> Result<Self> {
        if l1_capacity == 0 {
            return Err(SessmeshError::CapacityInvalid);
        }

        Ok(Self {
            server_id: server_id.into(),
            inner: RwLock::new(CacheInner {
                l1: Tier::default(),
                l1_capacity,
                l2: Tier::default(),
                l2_capacity,
                stats: CacheStats::default(),
            }),
        })
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Fetches a session, creating it on miss.
    ///
    /// Returns the session and the tier it was resident in *before* the
    /// access: `L1` for a hot hit, `L2` for a warm hit (the entry is
    /// promoted), `Miss` for a freshly created session. Either way the
    /// session ends up at the front of L1.
    pub fn get_or_create(&self, id: &str) -> (Arc<Session>, CacheTier) {
        let mut inner = self.inner.write();
        inner.lookup_or_create(&self.server_id, id)
    }

    /// `get_or_create` followed by an append, as one atomic operation.
    ///
    /// Counts a single request; the returned tier is the pre-append
    /// residency reported by the lookup.
    pub fn append_message(&self, id: &str, msg: Message) -> (Arc<Session>, CacheTier) {
        let mut inner = self.inner.write();
        let (session, tier) = inner.lookup_or_create(&self.server_id, id);
        session.append(msg);
        (session, tier)
    }

    /// Residency check without any reordering or promotion.
    pub fn peek(&self, id: &str) -> Option<(Arc<Session>, CacheTier)> {
        let inner = self.inner.read();
        if let Some(session) = inner.l1.get(id) {
            return Some((session.clone(), CacheTier::L1));
        }
        if let Some(session) = inner.l2.get(id) {
            return Some((session.clone(), CacheTier::L2));
        }
        None
    }

    /// Drops both tiers. Counters are preserved; see
    /// [`reset_stats`](Self::reset_stats).
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.l1.clear();
        inner.l2.clear();
        debug!(server = %self.server_id, "cache cleared");
    }

    /// Zeroes the counters without touching residency.
    pub fn reset_stats(&self) {
        self.inner.write().stats = CacheStats::default();
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.read().stats
    }

    /// Consistent view of capacities, sizes, tier orderings and
    /// counters.
    pub fn snapshot(&self) -> CacheSnapshot {
        let inner = self.inner.read();
        CacheSnapshot {
            l1_size: inner.l1.len(),
            l1_capacity: inner.l1_capacity,
            l2_size: inner.l2.len(),
            l2_capacity: inner.l2_capacity,
            l1_ids: inner.l1.ids_front_to_back(),
            l2_ids: inner.l2.ids_front_to_back(),
            stats: inner.stats,
        }
    }
}
