use std::{
    collections::{HashMap, VecDeque},
    hash::Hash,
    time::{Duration, Instant},
};

/// Small in-memory TTL set, used to deduplicate tasks by (chat_id, message_id).
///
/// Prevents duplicated processing if the same message gets enqueued twice.
/// Entries keep insertion order; every call first evicts expired entries from
/// the front, then trims from the front until the set fits `max_size`. This
/// keeps each call O(1) amortized and the structure bounded in both memory
/// and staleness.
#[derive(Debug)]
pub struct TtlSet<K> {
    ttl: Duration,
    max_size: usize,
    order: VecDeque<K>,
    seen: HashMap<K, Instant>,
}

impl<K: Clone + Eq + Hash> TtlSet<K> {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ttl,
            max_size: max_size.max(1),
            order: VecDeque::new(),
            seen: HashMap::new(),
        }
    }

    /// Record `key` if unseen or expired. Returns `true` exactly when the
    /// caller should process the item.
    pub fn add_if_new(&mut self, key: K) -> bool {
        self.add_if_new_at(key, Instant::now())
    }

    /// Deterministic variant for tests.
    pub fn add_if_new_at(&mut self, key: K, now: Instant) -> bool {
        self.evict(now);
        if self.seen.contains_key(&key) {
            return false;
        }
        self.seen.insert(key.clone(), now);
        self.order.push_back(key);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict(&mut self, now: Instant) {
        // Insertion order equals time order, so all expired entries sit at
        // the front.
        while let Some(front) = self.order.front() {
            let Some(&ts) = self.seen.get(front) else {
                self.order.pop_front();
                continue;
            };
            if now.duration_since(ts) < self.ttl {
                break;
            }
            self.seen.remove(front);
            self.order.pop_front();
        }

        while self.seen.len() > self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            } else {
                break;
            }
        }
    }
}
