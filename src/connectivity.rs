//! Online/offline gate consulted before enqueueing and before starting a
//! transfer. Point-in-time only; no retry logic lives here.

use std::sync::atomic::{AtomicBool, Ordering};

pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Host-updated network status, flipped from the platform's
/// online/offline events.
#[derive(Debug)]
pub struct NetworkStatus {
    online: AtomicBool,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            tracing::info!("Network status changed: {}", if online { "online" } else { "offline" });
        }
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for NetworkStatus {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// For hosts without a network signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}
