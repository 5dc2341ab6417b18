use parking_lot::Mutex;
use std::collections::HashSet;

/// Concurrency-safe set of scope keys seen during one site crawl.
#[derive(Debug, Default)]
pub struct VisitedSet {
    keys: Mutex<HashSet<String>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `key` and reports whether it was new. Test and insert happen
    /// under one lock, so only one caller ever sees `true` for a key.
    pub fn insert_if_absent(&self, key: &str) -> bool {
        let mut keys = self.keys.lock();
        if keys.contains(key) {
            return false;
        }
        keys.insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn only_first_insert_wins() {
        let set = VisitedSet::new();
        assert!(set.insert_if_absent("/a"));
        assert!(!set.insert_if_absent("/a"));
        assert!(set.contains("/a"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn racing_threads_admit_one_winner_per_key() {
        let set = VisitedSet::new();
        let winners = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for i in 0..100 {
                        if set.insert_if_absent(&format!("/p{i}")) {
                            winners.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });
        assert_eq!(winners.load(Ordering::Relaxed), 100);
        assert_eq!(set.len(), 100);
    }
}
