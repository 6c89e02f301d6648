use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::storage::{Document, Namespace};

/// Per-profile play frequency, keyed by item id. Counts only ever grow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayCounts {
    counts: HashMap<String, u32>,
}

impl Document for PlayCounts {
    const NAMESPACE: Namespace = Namespace::PlayCounts;
}

impl PlayCounts {
    pub fn get(&self, item_id: &str) -> u32 {
        self.counts.get(item_id).copied().unwrap_or(0)
    }

    /// Record one play and return the new count.
    pub fn increment(&mut self, item_id: &str) -> u32 {
        let count = self.counts.entry(item_id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_is_zero() {
        let counts = PlayCounts::default();
        assert_eq!(counts.get("missing"), 0);
        assert!(counts.is_empty());
    }

    #[test]
    fn test_increment_creates_at_one() {
        let mut counts = PlayCounts::default();
        assert_eq!(counts.increment("a"), 1);
        assert_eq!(counts.increment("a"), 2);
        assert_eq!(counts.increment("b"), 1);
        assert_eq!(counts.get("a"), 2);
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_stored_as_plain_map() {
        let mut counts = PlayCounts::default();
        counts.increment("song");
        let json = serde_json::to_string(&counts).unwrap();
        assert_eq!(json, r#"{"song":1}"#);
    }
}
