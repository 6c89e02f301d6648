use serde::{Deserialize, Serialize};

use crate::item::Item;
use crate::storage::{Document, Namespace};

pub const DEFAULT_HISTORY_SIZE: usize = 20;

/// Recently played items, most recent first, one entry per id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentlyPlayed {
    items: Vec<Item>,
}

impl Document for RecentlyPlayed {
    const NAMESPACE: Namespace = Namespace::History;
}

impl RecentlyPlayed {
    /// Move `item` to the front and drop anything beyond `max_entries`.
    pub fn record(&mut self, item: &Item, max_entries: usize) {
        self.items.retain(|i| i.id != item.id);
        self.items.insert(0, item.clone());
        self.items.truncate(max_entries);
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Item> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(history: &RecentlyPlayed) -> Vec<&str> {
        history.items().iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_replay_moves_to_front() {
        let mut history = RecentlyPlayed::default();
        history.record(&Item::new("a", "A", "X"), DEFAULT_HISTORY_SIZE);
        history.record(&Item::new("b", "B", "X"), DEFAULT_HISTORY_SIZE);
        history.record(&Item::new("a", "A", "X"), DEFAULT_HISTORY_SIZE);

        assert_eq!(ids(&history), vec!["a", "b"]);
    }

    #[test]
    fn test_capped() {
        let mut history = RecentlyPlayed::default();
        for i in 0..(DEFAULT_HISTORY_SIZE + 5) {
            history.record(&Item::new(i.to_string(), "T", "X"), DEFAULT_HISTORY_SIZE);
        }

        assert_eq!(history.items().len(), DEFAULT_HISTORY_SIZE);
        assert_eq!(history.items()[0].id, (DEFAULT_HISTORY_SIZE + 4).to_string());
    }
}
