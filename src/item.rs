use serde::{Deserialize, Serialize};

/// A playable media entry. Owned by the catalog layer; the engine only
/// keeps snapshots of it in its documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stable content identifier
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub duration_seconds: u32,
}

impl Item {
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            thumbnail_url: None,
            duration_seconds: 0,
        }
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration_seconds = seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_json_uses_defaults() {
        let item: Item = serde_json::from_str(r#"{"id":"yt-1","title":"Song","artist":"Band"}"#).unwrap();
        assert_eq!(item.id, "yt-1");
        assert!(item.thumbnail_url.is_none());
        assert_eq!(item.duration_seconds, 0);
    }

    #[test]
    fn test_missing_thumbnail_not_serialized() {
        let json = serde_json::to_string(&Item::new("1", "A", "B")).unwrap();
        assert!(!json.contains("thumbnail_url"));
    }

    #[test]
    fn test_builder() {
        let item = Item::new("1", "Title", "Artist")
            .with_thumbnail("https://img/1.jpg")
            .with_duration(215);
        assert_eq!(item.thumbnail_url.as_deref(), Some("https://img/1.jpg"));
        assert_eq!(item.duration_seconds, 215);
    }
}
