//! LRU Tracker Module
//!
//! Tracks identifier access order so the bounded in-process store can
//! evict the least recently used entry when it hits capacity.

use std::collections::VecDeque;

// == LRU Tracker ==
/// Access-order tracker: front = most recently used, back = least.
#[derive(Debug, Default)]
pub struct LruTracker {
    order: VecDeque<String>,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty tracker.
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Touch ==
    /// Marks an identifier as just used, moving it to the front.
    pub fn touch(&mut self, id: &str) {
        self.remove(id);
        self.order.push_front(id.to_string());
    }

    // == Remove ==
    /// Stops tracking an identifier. Unknown identifiers are ignored.
    pub fn remove(&mut self, id: &str) {
        self.order.retain(|tracked| tracked != id);
    }

    // == Evict Oldest ==
    /// Removes and returns the least recently used identifier, or None
    /// when nothing is tracked.
    pub fn evict_oldest(&mut self) -> Option<String> {
        self.order.pop_back()
    }

    // == Clear ==
    /// Forgets every tracked identifier.
    pub fn clear(&mut self) {
        self.order.clear();
    }

    // == Length ==
    /// Number of tracked identifiers.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_eviction_order_follows_insertion() {
        let mut lru = LruTracker::new();
        lru.touch("a");
        lru.touch("b");
        lru.touch("c");

        assert_eq!(lru.evict_oldest(), Some("a".to_string()));
        assert_eq!(lru.evict_oldest(), Some("b".to_string()));
        assert_eq!(lru.evict_oldest(), Some("c".to_string()));
        assert_eq!(lru.evict_oldest(), None);
    }

    #[test]
    fn test_lru_touch_moves_to_front() {
        let mut lru = LruTracker::new();
        lru.touch("a");
        lru.touch("b");
        lru.touch("c");

        // "a" would be evicted next; touching it protects it
        lru.touch("a");
        assert_eq!(lru.evict_oldest(), Some("b".to_string()));
        assert_eq!(lru.evict_oldest(), Some("c".to_string()));
        assert_eq!(lru.evict_oldest(), Some("a".to_string()));
    }

    #[test]
    fn test_lru_touch_deduplicates() {
        let mut lru = LruTracker::new();
        lru.touch("a");
        lru.touch("a");
        lru.touch("a");
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn test_lru_remove() {
        let mut lru = LruTracker::new();
        lru.touch("a");
        lru.touch("b");
        lru.remove("a");
        lru.remove("never-tracked");

        assert_eq!(lru.len(), 1);
        assert_eq!(lru.evict_oldest(), Some("b".to_string()));
    }

    #[test]
    fn test_lru_clear() {
        let mut lru = LruTracker::new();
        lru.touch("a");
        lru.touch("b");
        lru.clear();
        assert!(lru.is_empty());
        assert_eq!(lru.evict_oldest(), None);
    }
}
