//! Download priority scoring.
//!
//! `score = weight * 100 + play_count * 20 + (favorited ? 50 : 0)`
//!
//! The trigger weight dominates: a one-class gap (100 points) is only
//! overturned by a play-count lead of more than 5.

pub const WEIGHT_MULTIPLIER: u64 = 100;
pub const PLAY_COUNT_BONUS: u64 = 20;
pub const FAVORITE_BONUS: u64 = 50;

/// Which user action asked for an item to be made available offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerClass {
    /// Passive: the item was played
    History,
    /// Added to the user's starred list
    Favorite,
    /// Saved into a playlist
    Playlist,
    /// The user pressed "download"; outranks every other class
    ExplicitDownload,
}

impl TriggerClass {
    /// Base priority of this trigger class.
    pub const fn weight(self) -> u64 {
        match self {
            TriggerClass::History => 2,
            TriggerClass::Playlist => 3,
            TriggerClass::Favorite => 4,
            TriggerClass::ExplicitDownload => 5,
        }
    }
}

impl std::fmt::Display for TriggerClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerClass::History => write!(f, "history"),
            TriggerClass::Favorite => write!(f, "favorite"),
            TriggerClass::Playlist => write!(f, "playlist"),
            TriggerClass::ExplicitDownload => write!(f, "explicit_download"),
        }
    }
}

impl std::str::FromStr for TriggerClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "history" | "play" => Ok(TriggerClass::History),
            "favorite" | "favourite" | "mylist" => Ok(TriggerClass::Favorite),
            "playlist" => Ok(TriggerClass::Playlist),
            "explicit_download" | "download" | "explicit" => Ok(TriggerClass::ExplicitDownload),
            _ => Err(anyhow::anyhow!("Unknown trigger class: {}", s)),
        }
    }
}

pub fn priority_score(base_priority: u64, play_count: u32, is_favorited: bool) -> u64 {
    let favorite = if is_favorited { FAVORITE_BONUS } else { 0 };
    base_priority
        .saturating_mul(WEIGHT_MULTIPLIER)
        .saturating_add(u64::from(play_count).saturating_mul(PLAY_COUNT_BONUS))
        .saturating_add(favorite)
}

pub fn score_for(trigger: TriggerClass, play_count: u32, is_favorited: bool) -> u64 {
    priority_score(trigger.weight(), play_count, is_favorited)
}
