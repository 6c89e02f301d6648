use serde::{Deserialize, Serialize};

use crate::item::Item;
use crate::storage::{Document, Namespace};

/// Items durably available offline, newest first. One entry per id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletedDownloads {
    items: Vec<Item>,
}

impl Document for CompletedDownloads {
    const NAMESPACE: Namespace = Namespace::Downloads;
}

impl CompletedDownloads {
    pub fn has(&self, id: &str) -> bool {
        self.items.iter().any(|i| i.id == id)
    }

    /// Add `item` unless an entry with its id already exists.
    pub fn add(&mut self, item: &Item) -> bool {
        if self.has(&item.id) {
            return false;
        }
        self.items.insert(0, item.clone());
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != id);
        self.items.len() != before
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Item> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_dedups() {
        let mut done = CompletedDownloads::default();
        let item = Item::new("a", "A", "X");

        assert!(done.add(&item));
        assert!(!done.add(&item));
        assert_eq!(done.len(), 1);
        assert!(done.has("a"));
    }

    #[test]
    fn test_newest_first() {
        let mut done = CompletedDownloads::default();
        done.add(&Item::new("a", "A", "X"));
        done.add(&Item::new("b", "B", "X"));

        let ids: Vec<&str> = done.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_remove() {
        let mut done = CompletedDownloads::default();
        done.add(&Item::new("a", "A", "X"));

        assert!(done.remove("a"));
        assert!(!done.remove("a"));
        assert!(done.is_empty());
    }
}
