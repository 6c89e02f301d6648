//! Per-profile sync state and the entry points UI surfaces call.
//!
//! Every operation is a synchronous read-modify-write of whole documents
//! inside [`Store::atomically`], so no task ever observes a half-applied
//! change (a completed item that is still pending, or neither).

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::completed::CompletedDownloads;
use crate::connectivity::Connectivity;
use crate::favorites::FavoriteSet;
use crate::history::{RecentlyPlayed, DEFAULT_HISTORY_SIZE};
use crate::item::Item;
use crate::pending::{PendingDownloadEntry, PendingQueue, QueueChange};
use crate::play_counts::PlayCounts;
use crate::priority::{self, TriggerClass};
use crate::storage::{Namespace, Store, Txn};

/// Result of an insert-or-boost request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Inserted { score: u64 },
    Boosted { from: u64, to: u64 },
    Unchanged { score: u64 },
    /// Dropped: requests are not staged while offline.
    Offline,
    AlreadyDownloaded,
    /// A toggle removed an existing download.
    Removed,
    /// Un-favorited an item that has no queue entry.
    NotQueued,
}

impl From<QueueChange> for EnqueueOutcome {
    fn from(change: QueueChange) -> Self {
        match change {
            QueueChange::Inserted { score } => Self::Inserted { score },
            QueueChange::Boosted { from, to } => Self::Boosted { from, to },
            QueueChange::Unchanged { score } => Self::Unchanged { score },
        }
    }
}

/// Result of committing a finished transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The id left the pending queue while transferring; nothing written.
    Discarded,
}

/// Counts shown on a downloads screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileStats {
    pub pending: usize,
    pub completed: usize,
    pub favorites: usize,
    pub tracked_plays: usize,
}

pub struct SyncEngine {
    store: Store,
    connectivity: Arc<dyn Connectivity>,
    history_limit: usize,
}

impl SyncEngine {
    pub fn new(store: Store, connectivity: Arc<dyn Connectivity>) -> Self {
        Self {
            store,
            connectivity,
            history_limit: DEFAULT_HISTORY_SIZE,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    // ── UI triggers ─────────────────────────────────────────────────

    /// The item started playing: count it, remember it, queue it.
    pub fn on_play(&self, profile_id: &str, item: &Item) -> EnqueueOutcome {
        let limit = self.history_limit;
        let plays = self.store.atomically(|txn| {
            let mut counts: PlayCounts = txn.load(profile_id);
            let plays = counts.increment(&item.id);
            txn.save(profile_id, &counts);

            let mut history: RecentlyPlayed = txn.load(profile_id);
            history.record(item, limit);
            txn.save(profile_id, &history);
            plays
        });
        debug!("Play #{} of {} for profile {}", plays, item.id, profile_id);

        self.enqueue_or_boost(profile_id, item, TriggerClass::History)
    }

    /// Favorite state changed. Un-favoriting does not dequeue; use
    /// [`SyncEngine::cancel_pending`] for an explicit undo.
    pub fn on_favorite_toggle(&self, profile_id: &str, item: &Item, now_favorited: bool) -> EnqueueOutcome {
        self.store.atomically(|txn| {
            let mut favorites: FavoriteSet = txn.load(profile_id);
            let changed = if now_favorited {
                favorites.insert(item)
            } else {
                favorites.remove(&item.id)
            };
            if changed {
                txn.save(profile_id, &favorites);
            }
        });

        if now_favorited {
            self.enqueue_or_boost(profile_id, item, TriggerClass::Favorite)
        } else {
            match self.queue(profile_id).get(&item.id) {
                Some(entry) => EnqueueOutcome::Unchanged { score: entry.priority_score },
                None => EnqueueOutcome::NotQueued,
            }
        }
    }

    pub fn on_playlist_add(&self, profile_id: &str, item: &Item) -> EnqueueOutcome {
        self.enqueue_or_boost(profile_id, item, TriggerClass::Playlist)
    }

    pub fn on_explicit_download_request(&self, profile_id: &str, item: &Item) -> EnqueueOutcome {
        self.enqueue_or_boost(profile_id, item, TriggerClass::ExplicitDownload)
    }

    /// The user deleted a download. Also purges any pending entry a stale
    /// trigger may have re-added. Play counts are left alone.
    pub fn on_explicit_download_removal(&self, profile_id: &str, item_id: &str) -> bool {
        let (was_completed, was_pending) = self.store.atomically(|txn| {
            let mut completed: CompletedDownloads = txn.load(profile_id);
            let was_completed = completed.remove(item_id);
            if was_completed {
                txn.save(profile_id, &completed);
            }

            let mut queue = load_queue(txn, profile_id);
            let was_pending = queue.remove(item_id).is_some();
            if was_pending {
                txn.save(profile_id, &queue);
            }
            (was_completed, was_pending)
        });

        if was_completed || was_pending {
            info!(
                "Removed download {} for profile {} (completed: {}, pending: {})",
                item_id, profile_id, was_completed, was_pending
            );
        }
        was_completed || was_pending
    }

    /// Download button: remove when already offline, otherwise request it.
    pub fn toggle_download(&self, profile_id: &str, item: &Item) -> EnqueueOutcome {
        if self.is_downloaded(profile_id, &item.id) {
            self.on_explicit_download_removal(profile_id, &item.id);
            EnqueueOutcome::Removed
        } else {
            self.on_explicit_download_request(profile_id, item)
        }
    }

    pub fn get_offline_catalog(&self, profile_id: &str) -> Vec<Item> {
        self.store.load::<CompletedDownloads>(profile_id).into_items()
    }

    fn queue(&self, profile_id: &str) -> PendingQueue {
        self.store.load::<PendingQueue>(profile_id).normalized()
    }

    pub fn get_queue_snapshot(&self, profile_id: &str) -> Vec<PendingDownloadEntry> {
        self.queue(profile_id).into_entries()
    }

    // ── Pending queue ───────────────────────────────────────────────

    /// Score `item` for `trigger` and insert it or raise its entry.
    pub fn enqueue_or_boost(&self, profile_id: &str, item: &Item, trigger: TriggerClass) -> EnqueueOutcome {
        if !self.is_online() {
            debug!("Download of {} ignored: offline", item.id);
            return EnqueueOutcome::Offline;
        }

        let now_ms = Utc::now().timestamp_millis();
        let outcome = self.store.atomically(|txn| {
            let completed: CompletedDownloads = txn.load(profile_id);
            if completed.has(&item.id) {
                return EnqueueOutcome::AlreadyDownloaded;
            }

            let plays = txn.load::<PlayCounts>(profile_id).get(&item.id);
            let favorited = txn.load::<FavoriteSet>(profile_id).contains(&item.id);
            let score = priority::score_for(trigger, plays, favorited);

            let mut queue = load_queue(txn, profile_id);
            let change = queue.enqueue_or_boost(item, score, now_ms);
            if change.is_mutation() {
                txn.save(profile_id, &queue);
            }
            EnqueueOutcome::from(change)
        });

        debug!("Enqueue {} ({}) for profile {}: {:?}", item.id, trigger, profile_id, outcome);
        outcome
    }

    /// Explicit cancellation. An in-flight transfer for the id keeps
    /// running but its result will be discarded.
    pub fn cancel_pending(&self, profile_id: &str, item_id: &str) -> bool {
        let removed = self.store.atomically(|txn| {
            let mut queue = load_queue(txn, profile_id);
            let removed = queue.remove(item_id).is_some();
            if removed {
                txn.save(profile_id, &queue);
            }
            removed
        });
        if removed {
            info!("Cancelled pending download {} for profile {}", item_id, profile_id);
        }
        removed
    }

    pub fn is_pending(&self, profile_id: &str, item_id: &str) -> bool {
        self.queue(profile_id).contains(item_id)
    }

    // ── Completed downloads ─────────────────────────────────────────

    pub fn is_downloaded(&self, profile_id: &str, item_id: &str) -> bool {
        self.store.load::<CompletedDownloads>(profile_id).has(item_id)
    }

    /// Commit a successful transfer: add to the catalog and clear the
    /// pending entry together, but only if the entry is still pending.
    pub fn commit_completed(&self, profile_id: &str, item: &Item) -> CommitOutcome {
        let outcome = self.store.atomically(|txn| {
            let mut queue = load_queue(txn, profile_id);
            if queue.remove(&item.id).is_none() {
                return CommitOutcome::Discarded;
            }

            let mut completed: CompletedDownloads = txn.load(profile_id);
            if completed.add(item) {
                txn.save(profile_id, &completed);
            }
            txn.save(profile_id, &queue);
            CommitOutcome::Committed
        });

        match outcome {
            CommitOutcome::Committed => info!("Download complete: {} for profile {}", item.id, profile_id),
            CommitOutcome::Discarded => {
                debug!("Discarding result for {}: no longer pending for profile {}", item.id, profile_id)
            }
        }
        outcome
    }

    // ── Read-only views ─────────────────────────────────────────────

    pub fn play_count(&self, profile_id: &str, item_id: &str) -> u32 {
        self.store.load::<PlayCounts>(profile_id).get(item_id)
    }

    /// Record a play without queueing anything.
    pub fn increment_play_count(&self, profile_id: &str, item_id: &str) -> u32 {
        self.store.atomically(|txn| {
            let mut counts: PlayCounts = txn.load(profile_id);
            let plays = counts.increment(item_id);
            txn.save(profile_id, &counts);
            plays
        })
    }

    pub fn is_favorite(&self, profile_id: &str, item_id: &str) -> bool {
        self.store.load::<FavoriteSet>(profile_id).contains(item_id)
    }

    pub fn favorites(&self, profile_id: &str) -> Vec<Item> {
        self.store.load::<FavoriteSet>(profile_id).into_items()
    }

    pub fn history(&self, profile_id: &str) -> Vec<Item> {
        self.store.load::<RecentlyPlayed>(profile_id).into_items()
    }

    pub fn stats(&self, profile_id: &str) -> ProfileStats {
        ProfileStats {
            pending: self.queue(profile_id).len(),
            completed: self.store.load::<CompletedDownloads>(profile_id).len(),
            favorites: self.store.load::<FavoriteSet>(profile_id).items().len(),
            tracked_plays: self.store.load::<PlayCounts>(profile_id).len(),
        }
    }

    /// Drop every document stored for a deleted profile.
    pub fn forget_profile(&self, profile_id: &str) {
        self.store.atomically(|txn| {
            for namespace in Namespace::ALL {
                txn.delete(namespace, profile_id);
            }
        });
        info!("Forgot sync state for profile {}", profile_id);
    }
}

/// The stored queue with duplicate ids collapsed onto their best entry.
fn load_queue(txn: &Txn<'_>, profile_id: &str) -> PendingQueue {
    txn.load::<PendingQueue>(profile_id).normalized()
}
