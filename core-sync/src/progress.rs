//! Progress reporting shared by the library and auto-sync pipelines.

use crate::error::SyncError;
use core_runtime::events::{CoreEvent, EventBus, EventStream, SyncEvent, SyncPipeline, SyncProgress};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Result of a sync entry point. Entry points never return `Err`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub success: bool,
    /// Tracks considered by the pass
    pub tracks_count: usize,
    pub added: usize,
    pub updated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn succeeded(tracks_count: usize, added: usize, updated: usize) -> Self {
        Self {
            success: true,
            tracks_count,
            added,
            updated,
            error: None,
        }
    }

    pub fn failed(error: &SyncError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// Snapshot for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInfo {
    /// Epoch ms of the last successful library sync
    pub last_sync: Option<i64>,
    /// Whether a quick sync would be accepted right now
    pub can_sync: bool,
    pub in_progress: bool,
}

/// Emits the status events of one pipeline with non-decreasing percentages.
pub(crate) struct ProgressReporter {
    event_bus: EventBus,
    pipeline: SyncPipeline,
    last_percent: u8,
}

impl ProgressReporter {
    pub fn new(event_bus: EventBus, pipeline: SyncPipeline) -> Self {
        Self {
            event_bus,
            pipeline,
            last_percent: 0,
        }
    }

    pub fn pipeline(&self) -> SyncPipeline {
        self.pipeline
    }

    /// Start a new pass.
    pub fn reset(&mut self) {
        self.last_percent = 0;
    }

    pub fn waiting(&self, message: &str) {
        self.emit(SyncProgress::waiting(self.pipeline, message));
    }

    pub fn syncing(&mut self, message: &str, percent: u8, counts: Option<(u64, u64)>) {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;

        let mut progress = SyncProgress::syncing(self.pipeline, message).with_progress(percent);
        if let Some((synced, total)) = counts {
            progress = progress.with_counts(synced, total);
        }
        self.emit(progress);
    }

    pub fn completed(&mut self, message: &str, counts: Option<(u64, u64)>) {
        self.last_percent = 100;
        let mut progress = SyncProgress::completed(self.pipeline, message).with_progress(100);
        if let Some((synced, total)) = counts {
            progress = progress.with_counts(synced, total);
        }
        self.emit(progress);
    }

    pub fn failed(&self, message: &str, error: &SyncError) {
        self.emit(SyncProgress::failed(self.pipeline, message, error.to_string()));
    }

    pub fn idle(&self, message: &str) {
        self.emit(SyncProgress::idle(self.pipeline, message));
    }

    fn emit(&self, progress: SyncProgress) {
        // No subscribers is fine.
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::Status(progress)));
    }
}

/// Percentage inside `[start, start + span]` for `done` out of `total`.
pub(crate) fn scaled_percent(done: usize, total: usize, start: u8, span: u8) -> u8 {
    if total == 0 {
        return start.saturating_add(span);
    }
    let fraction = (done.min(total) as f64) / (total as f64);
    start.saturating_add((fraction * f64::from(span)).round() as u8)
}

/// Typed stream of one pipeline's status events. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ProgressSubscription {
    stream: EventStream,
}

impl ProgressSubscription {
    pub fn new(event_bus: &EventBus, pipeline: SyncPipeline) -> Self {
        let stream = event_bus.stream().filter(move |event| {
            matches!(event, CoreEvent::Sync(SyncEvent::Status(p)) if p.pipeline == pipeline)
        });
        Self { stream }
    }

    /// Next status, skipping over lag. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<SyncProgress> {
        loop {
            match self.stream.recv().await {
                Ok(CoreEvent::Sync(SyncEvent::Status(progress))) => return Some(progress),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Progress subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next status if one is already queued.
    pub fn try_recv(&mut self) -> Option<SyncProgress> {
        loop {
            match self.stream.try_recv()? {
                Ok(CoreEvent::Sync(SyncEvent::Status(progress))) => return Some(progress),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_runtime::events::SyncStatus;

    #[test]
    fn test_scaled_percent() {
        assert_eq!(scaled_percent(0, 100, 0, 50), 0);
        assert_eq!(scaled_percent(50, 100, 0, 50), 25);
        assert_eq!(scaled_percent(100, 100, 50, 50), 100);
        assert_eq!(scaled_percent(0, 0, 50, 50), 100);
        assert_eq!(scaled_percent(200, 100, 0, 50), 50);
    }

    #[tokio::test]
    async fn test_reporter_percent_never_decreases() {
        let bus = EventBus::new(16);
        let mut sub = ProgressSubscription::new(&bus, SyncPipeline::Library);
        let mut reporter = ProgressReporter::new(bus.clone(), SyncPipeline::Library);

        reporter.syncing("a", 40, None);
        reporter.syncing("b", 30, None);
        reporter.completed("done", Some((3, 3)));

        let percents: Vec<_> = std::iter::from_fn(|| sub.try_recv())
            .map(|p| p.progress.unwrap())
            .collect();
        assert_eq!(percents, vec![40, 40, 100]);
    }

    #[tokio::test]
    async fn test_subscription_filters_pipeline() {
        let bus = EventBus::new(16);
        let mut sub = ProgressSubscription::new(&bus, SyncPipeline::AutoSync);

        ProgressReporter::new(bus.clone(), SyncPipeline::Library).idle("library");
        ProgressReporter::new(bus.clone(), SyncPipeline::AutoSync).idle("auto");

        let progress = sub.recv().await.unwrap();
        assert_eq!(progress.message, "auto");
        assert_eq!(progress.status, SyncStatus::Idle);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_outcome_from_error() {
        let outcome = SyncOutcome::failed(&SyncError::SyncInProgress);
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Sync already in progress"));
        assert_eq!(outcome.tracks_count, 0);
    }
}
