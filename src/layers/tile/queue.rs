//! Pending-fetch queue

use super::types::TileKey;
use crate::prelude::HashSet;

#[derive(Debug, Clone, Copy)]
struct QueuedKey {
    key: TileKey,
    /// Insertion order, breaks priority ties.
    sequence: u64,
}

/// Keys awaiting dispatch, deduplicated.
///
/// The queue only holds keys. Priorities live on the cache entries and are
/// looked up when popping, so a re-prioritised view reorders the queue for free.
#[derive(Debug, Default)]
pub struct LoadQueue {
    entries: Vec<QueuedKey>,
    members: HashSet<TileKey>,
    sequence: u64,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the key was already queued.
    pub fn push(&mut self, key: TileKey) -> bool {
        if !self.members.insert(key) {
            return false;
        }
        self.sequence += 1;
        self.entries.push(QueuedKey {
            key,
            sequence: self.sequence,
        });
        true
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.members.contains(key)
    }

    pub fn remove(&mut self, key: &TileKey) -> bool {
        if !self.members.remove(key) {
            return false;
        }
        self.entries.retain(|entry| entry.key != *key);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.members.clear();
    }

    /// Pops the key with the lowest priority value, oldest first on ties.
    ///
    /// `priority_of` returns `None` for keys that should no longer be fetched
    /// (evicted or no longer queued); those are dropped on the way.
    pub fn pop_next<F>(&mut self, priority_of: F) -> Option<TileKey>
    where
        F: Fn(&TileKey) -> Option<f64>,
    {
        let members = &mut self.members;
        let mut best: Option<(usize, f64, u64)> = None;
        let mut index = 0;
        self.entries.retain(|entry| {
            let Some(priority) = priority_of(&entry.key) else {
                members.remove(&entry.key);
                return false;
            };
            let better = match best {
                None => true,
                Some((_, best_priority, best_sequence)) => priority
                    .total_cmp(&best_priority)
                    .then(entry.sequence.cmp(&best_sequence))
                    .is_lt(),
            };
            if better {
                best = Some((index, priority, entry.sequence));
            }
            index += 1;
            true
        });

        let (index, _, _) = best?;
        let entry = self.entries.remove(index);
        self.members.remove(&entry.key);
        Some(entry.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::TileCoord;
    use crate::prelude::HashMap;

    #[test]
    fn test_push_deduplicates() {
        let mut queue = LoadQueue::new();
        let key = TileCoord::new(1, 1, 3);
        assert!(queue.push(key));
        assert!(!queue.push(key));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_pop_lowest_priority_first() {
        let mut queue = LoadQueue::new();
        let far = TileCoord::new(0, 0, 4);
        let near = TileCoord::new(5, 5, 4);
        let tie = TileCoord::new(6, 5, 4);
        queue.push(far);
        queue.push(tie);
        queue.push(near);

        let mut priorities = HashMap::default();
        priorities.insert(far, 8.0);
        priorities.insert(near, 1.0);
        priorities.insert(tie, 1.0);

        let order: Vec<_> = std::iter::from_fn(|| queue.pop_next(|k| priorities.get(k).copied()))
            .collect();
        // `tie` was pushed before `near`.
        assert_eq!(order, vec![tie, near, far]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_drops_keys_without_priority() {
        let mut queue = LoadQueue::new();
        let gone = TileCoord::new(0, 0, 2);
        let live = TileCoord::new(1, 0, 2);
        queue.push(gone);
        queue.push(live);

        let next = queue.pop_next(|k| if *k == live { Some(4.0) } else { None });
        assert_eq!(next, Some(live));
        assert!(queue.is_empty());
        assert!(!queue.contains(&gone));
        // The dropped key can be queued again.
        assert!(queue.push(gone));
    }
}
