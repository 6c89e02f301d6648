//! The ranked pending-download queue.
//!
//! At most one entry per item id. Entries are kept sorted by score
//! (descending), then by enqueue time (most recent first). A repeat trigger
//! can raise an entry's score but never lower it, and only a strict increase
//! refreshes its timestamp.

use serde::{Deserialize, Serialize};

use crate::item::Item;
use crate::storage::{Document, Namespace};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDownloadEntry {
    pub id: String,
    pub item: Item,
    pub priority_score: u64,
    /// Milliseconds since the Unix epoch of the last insert or boost.
    pub enqueued_at: i64,
}

/// What an insert-or-boost did to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueChange {
    Inserted { score: u64 },
    Boosted { from: u64, to: u64 },
    Unchanged { score: u64 },
}

impl QueueChange {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, QueueChange::Unchanged { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingQueue {
    entries: Vec<PendingDownloadEntry>,
}

impl Document for PendingQueue {
    const NAMESPACE: Namespace = Namespace::PendingDownloads;
}

impl PendingQueue {
    /// Insert `item` with `score`, or raise the score of its existing entry.
    pub fn enqueue_or_boost(&mut self, item: &Item, score: u64, now_ms: i64) -> QueueChange {
        let stamp = self.next_stamp(now_ms);
        let change = match self.entries.iter_mut().find(|e| e.id == item.id) {
            Some(entry) if score > entry.priority_score => {
                let from = entry.priority_score;
                entry.priority_score = score;
                entry.enqueued_at = stamp;
                QueueChange::Boosted { from, to: score }
            }
            Some(entry) => QueueChange::Unchanged { score: entry.priority_score },
            None => {
                self.entries.push(PendingDownloadEntry {
                    id: item.id.clone(),
                    item: item.clone(),
                    priority_score: score,
                    enqueued_at: stamp,
                });
                QueueChange::Inserted { score }
            }
        };
        self.sort();
        change
    }

    pub fn remove(&mut self, id: &str) -> Option<PendingDownloadEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&PendingDownloadEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[PendingDownloadEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<PendingDownloadEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-establish ordering and the one-entry-per-id invariant on a
    /// document that came from storage. Duplicates keep their best score.
    pub fn normalized(mut self) -> Self {
        self.sort();
        let mut seen = std::collections::HashSet::new();
        self.entries.retain(|e| seen.insert(e.id.clone()));
        self
    }

    /// Timestamps are strictly increasing within a queue so the recency
    /// tie-break is always total, even for triggers in the same millisecond.
    fn next_stamp(&self, now_ms: i64) -> i64 {
        match self.entries.iter().map(|e| e.enqueued_at).max() {
            Some(latest) if latest >= now_ms => latest + 1,
            _ => now_ms,
        }
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            b.priority_score
                .cmp(&a.priority_score)
                .then_with(|| b.enqueued_at.cmp(&a.enqueued_at))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> Item {
        Item::new(id, format!("Song {}", id), "Artist")
    }

    fn ids(queue: &PendingQueue) -> Vec<&str> {
        queue.entries().iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_insert() {
        let mut queue = PendingQueue::default();
        let change = queue.enqueue_or_boost(&item("a"), 200, 1_000);

        assert_eq!(change, QueueChange::Inserted { score: 200 });
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get("a").unwrap().enqueued_at, 1_000);
    }

    #[test]
    fn test_identical_trigger_is_idempotent() {
        let mut queue = PendingQueue::default();
        queue.enqueue_or_boost(&item("a"), 300, 1_000);
        let change = queue.enqueue_or_boost(&item("a"), 300, 2_000);

        assert_eq!(change, QueueChange::Unchanged { score: 300 });
        assert_eq!(queue.len(), 1);
        let entry = queue.get("a").unwrap();
        assert_eq!(entry.priority_score, 300);
        // Equal score must not refresh the timestamp
        assert_eq!(entry.enqueued_at, 1_000);
    }

    #[test]
    fn test_lower_score_never_downgrades() {
        let mut queue = PendingQueue::default();
        queue.enqueue_or_boost(&item("a"), 450, 1_000);
        let change = queue.enqueue_or_boost(&item("a"), 200, 2_000);

        assert_eq!(change, QueueChange::Unchanged { score: 450 });
        assert_eq!(queue.get("a").unwrap().priority_score, 450);
        assert_eq!(queue.get("a").unwrap().enqueued_at, 1_000);
    }

    #[test]
    fn test_boost_raises_score_and_refreshes_timestamp() {
        let mut queue = PendingQueue::default();
        queue.enqueue_or_boost(&item("a"), 200, 1_000);
        let change = queue.enqueue_or_boost(&item("a"), 400, 5_000);

        assert_eq!(change, QueueChange::Boosted { from: 200, to: 400 });
        let entry = queue.get("a").unwrap();
        assert_eq!(entry.priority_score, 400);
        assert_eq!(entry.enqueued_at, 5_000);
    }

    #[test]
    fn test_ordering_score_then_recency() {
        let mut queue = PendingQueue::default();
        queue.enqueue_or_boost(&item("low"), 200, 1_000);
        queue.enqueue_or_boost(&item("high"), 500, 2_000);
        queue.enqueue_or_boost(&item("mid-old"), 300, 3_000);
        queue.enqueue_or_boost(&item("mid-new"), 300, 4_000);

        assert_eq!(ids(&queue), vec!["high", "mid-new", "mid-old", "low"]);
    }

    #[test]
    fn test_boost_promotes_within_tie() {
        let mut queue = PendingQueue::default();
        queue.enqueue_or_boost(&item("a"), 300, 1_000);
        queue.enqueue_or_boost(&item("b"), 320, 2_000);
        queue.enqueue_or_boost(&item("a"), 320, 3_000);

        // Same score, `a` was boosted more recently
        assert_eq!(ids(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_same_millisecond_triggers_still_ordered() {
        let mut queue = PendingQueue::default();
        queue.enqueue_or_boost(&item("first"), 300, 1_000);
        queue.enqueue_or_boost(&item("second"), 300, 1_000);

        assert_eq!(ids(&queue), vec!["second", "first"]);
        assert!(queue.get("second").unwrap().enqueued_at > queue.get("first").unwrap().enqueued_at);
    }

    #[test]
    fn test_remove() {
        let mut queue = PendingQueue::default();
        queue.enqueue_or_boost(&item("a"), 200, 1_000);
        queue.enqueue_or_boost(&item("b"), 300, 2_000);

        let removed = queue.remove("a").unwrap();
        assert_eq!(removed.id, "a");
        assert!(!queue.contains("a"));
        assert!(queue.remove("a").is_none());
        assert_eq!(ids(&queue), vec!["b"]);
    }

    #[test]
    fn test_normalized_dedups_and_sorts() {
        let entry = |id: &str, score: u64, at: i64| PendingDownloadEntry {
            id: id.to_string(),
            item: item(id),
            priority_score: score,
            enqueued_at: at,
        };
        let json = serde_json::to_string(&vec![
            entry("a", 200, 1),
            entry("b", 300, 2),
            entry("a", 400, 3),
        ])
        .unwrap();

        let queue: PendingQueue = serde_json::from_str(&json).unwrap();
        let queue = queue.normalized();
        assert_eq!(ids(&queue), vec!["a", "b"]);
        assert_eq!(queue.get("a").unwrap().priority_score, 400);
    }

    #[test]
    fn test_persisted_as_array() {
        let mut queue = PendingQueue::default();
        queue.enqueue_or_boost(&item("a"), 200, 1_000);
        let json = serde_json::to_string(&queue).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains("\"priority_score\":200"));
    }
}
