//! Download lifecycle: `Idle → Transferring → {Completed | Cancelled}`.
//!
//! A controller pulls entries from the pending queue, drives the opaque
//! transfer and commits the result. Cancellation is deferred: removing an id
//! from the queue never aborts its transfer, it only makes the commit a
//! no-op. Several controllers may race on the same id; the commit re-check
//! and catalog dedup keep the final state identical either way.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};

use crate::config::DownloadsConfig;
use crate::engine::{CommitOutcome, SyncEngine};
use crate::item::Item;
use crate::transfer::{ContentTransfer, ProgressReporter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    Started { profile_id: String, item_id: String, title: String },
    Progress { profile_id: String, item_id: String, percent: u8 },
    Completed { profile_id: String, item_id: String },
    /// Transfer finished after the entry was cancelled.
    Discarded { profile_id: String, item_id: String },
    Failed { profile_id: String, item_id: String, error: String },
    QueueUpdated { profile_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    AlreadyDownloaded,
    NotQueued,
    InFlight,
    NoCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum TransferOutcome {
    Completed,
    Discarded,
    Failed,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub completed: usize,
    pub discarded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Completed => self.completed += 1,
            TransferOutcome::Discarded => self.discarded += 1,
            TransferOutcome::Failed => self.failed += 1,
            TransferOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

type TransferKey = (String, String);

pub struct DownloadController {
    engine: Arc<SyncEngine>,
    transfer: Arc<dyn ContentTransfer>,
    event_tx: mpsc::UnboundedSender<DownloadEvent>,
    semaphore: Semaphore,
    max_concurrent: usize,
    timeout: Option<Duration>,
    in_flight: Mutex<HashSet<TransferKey>>,
    progress: Mutex<HashMap<TransferKey, u8>>,
}

impl DownloadController {
    pub fn new(
        engine: Arc<SyncEngine>,
        transfer: Arc<dyn ContentTransfer>,
        config: &DownloadsConfig,
    ) -> (Self, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let max_concurrent = config.effective_max_concurrent();

        let controller = Self {
            engine,
            transfer,
            event_tx,
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            timeout: config.transfer_timeout(),
            in_flight: Mutex::new(HashSet::new()),
            progress: Mutex::new(HashMap::new()),
        };

        (controller, event_rx)
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Current percentage for a transfer this controller is running.
    pub fn progress(&self, profile_id: &str, item_id: &str) -> Option<u8> {
        let key = (profile_id.to_string(), item_id.to_string());
        self.progress.lock().unwrap_or_else(PoisonError::into_inner).get(&key).copied()
    }

    pub fn is_transferring(&self, profile_id: &str, item_id: &str) -> bool {
        let key = (profile_id.to_string(), item_id.to_string());
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).contains(&key)
    }

    /// Start the highest-ranked queued item not already running here.
    /// Returns `None` when offline, idle, or every slot is busy.
    pub async fn process_next(&self, profile_id: &str) -> Option<TransferOutcome> {
        if !self.engine.is_online() {
            return None;
        }

        // Try to acquire a permit
        let permit = self.semaphore.try_acquire().ok()?;

        let next = self
            .engine
            .get_queue_snapshot(profile_id)
            .into_iter()
            .find(|entry| !self.is_transferring(profile_id, &entry.id))?;

        let outcome = self.drive(profile_id, &next.item).await;
        drop(permit);
        Some(outcome)
    }

    /// Run every queued item, `max_concurrent` at a time, highest rank first.
    pub async fn sweep(&self, profile_id: &str) -> SweepReport {
        if !self.engine.is_online() {
            tracing::debug!("Sweep for profile {} skipped: offline", profile_id);
            return SweepReport::default();
        }

        let entries = self.engine.get_queue_snapshot(profile_id);
        let report = Mutex::new(SweepReport::default());

        futures_util::stream::iter(entries)
            .for_each_concurrent(self.max_concurrent, |entry| {
                let report = &report;
                async move {
                    let outcome = self.run_transfer(profile_id, &entry.item).await;
                    report.lock().unwrap_or_else(PoisonError::into_inner).record(outcome);
                }
            })
            .await;

        let report = report.into_inner().unwrap_or_else(PoisonError::into_inner);
        tracing::info!("Sweep for profile {}: {:?}", profile_id, report);
        report
    }

    /// Drive one transfer, waiting for a free slot.
    pub async fn run_transfer(&self, profile_id: &str, item: &Item) -> TransferOutcome {
        let Ok(permit) = self.semaphore.acquire().await else {
            return TransferOutcome::Skipped(SkipReason::NoCapacity);
        };
        let outcome = self.drive(profile_id, item).await;
        drop(permit);
        outcome
    }

    async fn drive(&self, profile_id: &str, item: &Item) -> TransferOutcome {
        if !self.engine.is_online() {
            return TransferOutcome::Skipped(SkipReason::Offline);
        }
        if self.engine.is_downloaded(profile_id, &item.id) {
            return TransferOutcome::Skipped(SkipReason::AlreadyDownloaded);
        }
        if !self.engine.is_pending(profile_id, &item.id) {
            return TransferOutcome::Skipped(SkipReason::NotQueued);
        }
        let Some(_guard) = InFlightGuard::claim(self, profile_id, &item.id) else {
            return TransferOutcome::Skipped(SkipReason::InFlight);
        };

        self.emit(DownloadEvent::Started {
            profile_id: profile_id.to_string(),
            item_id: item.id.clone(),
            title: item.title.clone(),
        });
        self.update_progress(profile_id, &item.id, 0);

        let reporter = ProgressReporter::new(|percent| self.update_progress(profile_id, &item.id, percent));
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.transfer.transfer(item, &reporter)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("transfer timed out after {:?}", limit)),
            },
            None => self.transfer.transfer(item, &reporter).await,
        };

        match result {
            Ok(()) => match self.engine.commit_completed(profile_id, item) {
                CommitOutcome::Committed => {
                    self.update_progress(profile_id, &item.id, 100);
                    self.emit(DownloadEvent::Completed {
                        profile_id: profile_id.to_string(),
                        item_id: item.id.clone(),
                    });
                    self.emit(DownloadEvent::QueueUpdated { profile_id: profile_id.to_string() });
                    TransferOutcome::Completed
                }
                CommitOutcome::Discarded => {
                    self.emit(DownloadEvent::Discarded {
                        profile_id: profile_id.to_string(),
                        item_id: item.id.clone(),
                    });
                    TransferOutcome::Discarded
                }
            },
            Err(e) => {
                // Entry stays queued; the next sweep retries it.
                tracing::warn!("Download failed: {} - {:#}", item.id, e);
                self.emit(DownloadEvent::Failed {
                    profile_id: profile_id.to_string(),
                    item_id: item.id.clone(),
                    error: format!("{:#}", e),
                });
                TransferOutcome::Failed
            }
        }
    }

    fn update_progress(&self, profile_id: &str, item_id: &str, percent: u8) {
        let percent = percent.min(100);
        let key = (profile_id.to_string(), item_id.to_string());
        {
            let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(progress.get(&key), Some(&current) if percent <= current) {
                return;
            }
            progress.insert(key, percent);
        }
        self.emit(DownloadEvent::Progress {
            profile_id: profile_id.to_string(),
            item_id: item_id.to_string(),
            percent,
        });
    }

    fn emit(&self, event: DownloadEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Marks a transfer as running on this controller; clears the in-flight
/// flag and progress on drop, whatever the outcome.
struct InFlightGuard<'a> {
    controller: &'a DownloadController,
    key: TransferKey,
}

impl<'a> InFlightGuard<'a> {
    fn claim(controller: &'a DownloadController, profile_id: &str, item_id: &str) -> Option<Self> {
        let key = (profile_id.to_string(), item_id.to_string());
        let inserted = controller
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then_some(Self { controller, key })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.controller
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        self.controller
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
