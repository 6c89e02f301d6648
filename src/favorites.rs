//! The user's starred list. Curated by the list-management feature; the
//! engine reads membership for the favorite bonus and keeps it in sync when
//! it observes a toggle.

use serde::{Deserialize, Serialize};

use crate::item::Item;
use crate::storage::{Document, Namespace};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoriteSet {
    items: Vec<Item>,
}

impl Document for FavoriteSet {
    const NAMESPACE: Namespace = Namespace::Favorites;
}

impl FavoriteSet {
    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|i| i.id == id)
    }

    pub fn insert(&mut self, item: &Item) -> bool {
        if self.contains(&item.id) {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let mut favs = FavoriteSet::default();
        let item = Item::new("a", "A", "X");

        assert!(favs.insert(&item));
        assert!(!favs.insert(&item));
        assert!(favs.contains("a"));
        assert!(favs.remove("a"));
        assert!(!favs.contains("a"));
        assert!(!favs.remove("a"));
    }
}
