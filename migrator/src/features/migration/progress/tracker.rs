//! Progress callback handed to pipelines.
//!
//! Every item is reported to the injected reporter. When attached to a state
//! store, counters are also written to the state file: at most once per
//! interval, and always on the last item of a stage.

use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use super::{ProgressEvent, ProgressReporter, Stage};
use crate::features::migration::state::{MigrationState, StateStore, StepName};

pub const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(1);

struct Persistence<'a> {
    state: &'a mut MigrationState,
    store: &'a StateStore,
}

pub struct ProgressTracker<'a> {
    step: StepName,
    reporter: &'a dyn ProgressReporter,
    persistence: Option<Persistence<'a>>,
    interval: Duration,
    last_saved: Option<Instant>,
}

impl<'a> ProgressTracker<'a> {
    /// Reports only; nothing is written to disk
    pub fn new(step: StepName, reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            step,
            reporter,
            persistence: None,
            interval: DEFAULT_PERSIST_INTERVAL,
            last_saved: None,
        }
    }

    pub fn persisted(
        step: StepName,
        reporter: &'a dyn ProgressReporter,
        state: &'a mut MigrationState,
        store: &'a StateStore,
    ) -> Self {
        Self {
            persistence: Some(Persistence { state, store }),
            ..Self::new(step, reporter)
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn step(&self) -> StepName {
        self.step
    }

    pub fn stage(&self, stage: Stage, total: usize) {
        self.reporter.report(ProgressEvent::StageStarted {
            step: self.step,
            stage,
            total: total as u64,
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.reporter.report(ProgressEvent::Warning {
            step: self.step,
            message: message.into(),
        });
    }

    pub async fn advance(&mut self, stage: Stage, processed: usize, total: usize, item: Option<&str>) {
        let (processed, total) = (processed as u64, total as u64);
        self.reporter.report(ProgressEvent::Item {
            step: self.step,
            stage,
            processed,
            total,
            item: item.map(str::to_string),
        });

        let Some(persistence) = self.persistence.as_mut() else {
            return;
        };
        persistence
            .state
            .update_step_progress(self.step, processed, total);

        let due = self
            .last_saved
            .map_or(true, |saved| saved.elapsed() >= self.interval);
        if processed < total && !due {
            return;
        }

        if let Err(e) = persistence.store.save(&*persistence.state).await {
            warn!("[Progress] Failed to persist progress for {}: {}", self.step, e);
        }
        self.last_saved = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::migration::progress::{ChannelReporter, NoopReporter};

    async fn persisted_processed(store: &StateStore) -> u64 {
        store
            .load()
            .await
            .unwrap()
            .step(StepName::ImportAssets)
            .map(|step| step.items_processed)
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_progress_is_throttled_but_final_item_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let mut state = MigrationState::new();
        state.start_step(StepName::ImportAssets);

        {
            let mut tracker = ProgressTracker::persisted(
                StepName::ImportAssets,
                &NoopReporter,
                &mut state,
                &store,
            )
            .with_interval(Duration::from_secs(3600));

            tracker.advance(Stage::Users, 1, 5, Some("alice")).await;
            assert_eq!(persisted_processed(&store).await, 1);

            tracker.advance(Stage::Users, 2, 5, Some("bob")).await;
            tracker.advance(Stage::Users, 3, 5, Some("carol")).await;
            assert_eq!(persisted_processed(&store).await, 1);

            tracker.advance(Stage::Users, 5, 5, None).await;
            assert_eq!(persisted_processed(&store).await, 5);
        }

        let step = state.step(StepName::ImportAssets).unwrap();
        assert_eq!((step.items_processed, step.items_total), (5, 5));
    }

    #[tokio::test]
    async fn test_unwritable_state_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the state directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = StateStore::new(blocker.join("state.json"));
        let mut state = MigrationState::new();

        let mut tracker =
            ProgressTracker::persisted(StepName::ImportAssets, &NoopReporter, &mut state, &store);
        tracker.advance(Stage::Rooms, 1, 1, None).await;
    }

    #[tokio::test]
    async fn test_events_reach_reporter() {
        let (reporter, mut events) = ChannelReporter::new();
        let mut tracker = ProgressTracker::new(StepName::ExportAssets, &reporter);

        tracker.stage(Stage::Users, 2);
        tracker.advance(Stage::Users, 2, 2, None).await;

        assert_eq!(
            events.recv().await,
            Some(ProgressEvent::StageStarted {
                step: StepName::ExportAssets,
                stage: Stage::Users,
                total: 2,
            })
        );
        assert_eq!(
            events.recv().await,
            Some(ProgressEvent::Item {
                step: StepName::ExportAssets,
                stage: Stage::Users,
                processed: 2,
                total: 2,
                item: None,
            })
        );
    }
}
