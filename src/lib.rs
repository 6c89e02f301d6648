//! Prioritized background sync engine for offline media availability.
//!
//! UI surfaces report what the user does with an [`Item`] (plays, favorites,
//! playlist adds, explicit download requests). The [`SyncEngine`] turns those
//! triggers into a ranked, deduplicated pending-download queue persisted per
//! profile, and the [`DownloadController`] drains that queue through an
//! opaque [`ContentTransfer`], committing finished items to the offline
//! catalog.

pub mod completed;
pub mod config;
pub mod connectivity;
pub mod downloads;
pub mod engine;
pub mod favorites;
pub mod history;
pub mod item;
pub mod pending;
pub mod play_counts;
pub mod priority;
pub mod rpc;
pub mod storage;
pub mod transfer;

pub use connectivity::{AlwaysOnline, Connectivity, NetworkStatus};
pub use downloads::{DownloadController, DownloadEvent, SweepReport, TransferOutcome};
pub use engine::{CommitOutcome, EnqueueOutcome, SyncEngine};
pub use item::Item;
pub use pending::PendingDownloadEntry;
pub use priority::TriggerClass;
pub use storage::Store;
pub use transfer::{ContentTransfer, ProgressReporter, SimulatedTransfer};
