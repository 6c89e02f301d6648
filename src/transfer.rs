//! The opaque "fetch content for this item" operation.
//!
//! Hosts plug in the real network fetch; [`SimulatedTransfer`] stands in
//! with a timer-driven fake, the way the player UI animates a download.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;

use crate::config::SimulationConfig;
use crate::item::Item;

/// Progress callback handed to a transfer. Values are percentages; the
/// controller clamps them to 0–100 and ignores anything that goes backwards.
pub struct ProgressReporter<'a> {
    sink: Box<dyn Fn(u8) + Send + Sync + 'a>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: impl Fn(u8) + Send + Sync + 'a) -> Self {
        Self { sink: Box::new(sink) }
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, percent: u8) {
        (self.sink)(percent.min(100));
    }

    /// Report `done` out of `total` units (bytes, ticks).
    pub fn report_fraction(&self, done: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = (done.min(total) * 100 / total) as u8;
        self.report(percent);
    }
}

#[async_trait]
pub trait ContentTransfer: Send + Sync {
    /// Materialize `item` locally. `Ok` means the content is fully available.
    async fn transfer(&self, item: &Item, progress: &ProgressReporter<'_>) -> Result<()>;
}

pub struct SimulatedTransfer {
    duration: Duration,
    steps: u8,
    failure_rate: f64,
}

impl SimulatedTransfer {
    pub fn new(duration: Duration, steps: u8) -> Self {
        Self {
            duration,
            steps: steps.max(1),
            failure_rate: 0.0,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(Duration::from_millis(config.transfer_ms), config.progress_steps)
            .with_failure_rate(config.failure_rate)
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 };
        self
    }
}

#[async_trait]
impl ContentTransfer for SimulatedTransfer {
    async fn transfer(&self, item: &Item, progress: &ProgressReporter<'_>) -> Result<()> {
        let fails = self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate);
        let fail_at = self.steps / 2;
        let tick = self.duration / u32::from(self.steps);

        for step in 1..=self.steps {
            tokio::time::sleep(tick).await;
            if fails && step > fail_at {
                anyhow::bail!("simulated transfer of {} failed", item.id);
            }
            progress.report_fraction(u64::from(step), u64::from(self.steps));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_report_fraction() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::new(|p| seen.lock().unwrap().push(p));
        reporter.report_fraction(1, 4);
        reporter.report_fraction(9, 4);
        reporter.report_fraction(1, 0);
        reporter.report(250);
        assert_eq!(*seen.lock().unwrap(), vec![25, 100, 100]);
    }

    #[tokio::test]
    async fn test_simulated_transfer_reaches_100() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::new(|p| seen.lock().unwrap().push(p));
        let transfer = SimulatedTransfer::new(Duration::from_millis(20), 4);

        transfer.transfer(&Item::new("a", "A", "X"), &reporter).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![25, 50, 75, 100]);
    }

    #[tokio::test]
    async fn test_simulated_transfer_always_failing() {
        let transfer = SimulatedTransfer::new(Duration::from_millis(10), 2).with_failure_rate(1.0);
        let result = transfer.transfer(&Item::new("a", "A", "X"), &ProgressReporter::noop()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_failure_rate_clamped() {
        let transfer = SimulatedTransfer::new(Duration::ZERO, 1).with_failure_rate(7.0);
        assert_eq!(transfer.failure_rate, 1.0);
        let transfer = SimulatedTransfer::new(Duration::ZERO, 1).with_failure_rate(f64::NAN);
        assert_eq!(transfer.failure_rate, 0.0);
    }
}
