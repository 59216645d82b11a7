//! Live polling of the current sensor reading.
//!
//! Each cycle fetches the latest reading and runs it through the classifier.
//! Cycles never overlap: a trigger (timer tick or manual refresh) that lands
//! while another cycle is outstanding is dropped, not queued. Stopping the
//! timer cancels future ticks only; a cycle already in flight runs to
//! completion and its result is applied.

use crate::classifier::ClassifierPipeline;
use crate::datasources::SensorSource;
use crate::error::Result;
use crate::models::{RecommendationStatus, SensorReading};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Everything a front end needs to render the live view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollerSnapshot {
    pub live: bool,
    pub in_flight: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub reading: Option<SensorReading>,
    pub recommendation: RecommendationStatus,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle was in flight; nothing happened.
    Skipped,
    Updated {
        reading: SensorReading,
        recommendation: RecommendationStatus,
    },
    /// The sensor source could not be read; the previous reading is kept.
    UpstreamUnavailable(String),
}

/// What started a cycle. Timer cycles only run while live; a manual refresh
/// runs regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Timer,
    Manual,
}

struct Shared<S> {
    source: S,
    classifier: Arc<ClassifierPipeline>,
    interval: Duration,
    state: Mutex<PollerSnapshot>,
    timer: Mutex<Option<JoinHandle<()>>>,
    updates: watch::Sender<PollerSnapshot>,
}

impl<S> Drop for Shared<S> {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct LivePoller<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for LivePoller<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Clears the in-flight flag however the cycle exits.
struct InFlightGuard<'a, S: SensorSource> {
    poller: &'a LivePoller<S>,
}

impl<S: SensorSource> Drop for InFlightGuard<'_, S> {
    fn drop(&mut self) {
        self.poller.update(|state| state.in_flight = false);
    }
}

impl<S: SensorSource> LivePoller<S> {
    pub fn new(source: S, classifier: Arc<ClassifierPipeline>, interval: Duration) -> Self {
        let (updates, _) = watch::channel(PollerSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                source,
                classifier,
                interval,
                state: Mutex::new(PollerSnapshot::default()),
                timer: Mutex::new(None),
                updates,
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    pub fn snapshot(&self) -> PollerSnapshot {
        lock(&self.shared.state).clone()
    }

    /// Receive a snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<PollerSnapshot> {
        self.shared.updates.subscribe()
    }

    pub fn is_live(&self) -> bool {
        lock(&self.shared.state).live
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.shared.state).in_flight
    }

    fn update(&self, f: impl FnOnce(&mut PollerSnapshot)) {
        let snapshot = {
            let mut state = lock(&self.shared.state);
            f(&mut state);
            state.clone()
        };
        self.shared.updates.send_replace(snapshot);
    }

    /// Turn live mode on and schedule a cycle every interval, the first one
    /// interval from now. Calling it while already live does nothing. Must
    /// be called from within a tokio runtime.
    pub fn start_polling(&self) {
        let mut timer = lock(&self.shared.timer);
        if timer.is_some() {
            return;
        }
        self.update(|state| state.live = true);

        let period = self.shared.interval;
        *timer = Some(tokio::spawn(run_timer(Arc::downgrade(&self.shared), period)));
        tracing::info!(interval_secs = period.as_secs_f64(), "live polling started");
    }

    /// Turn live mode off. Once this returns no timer cycle starts; one
    /// already in flight still completes. Safe to call when not polling.
    pub fn stop_polling(&self) {
        self.update(|state| state.live = false);
        if let Some(handle) = lock(&self.shared.timer).take() {
            handle.abort();
            tracing::info!("live polling stopped");
        }
    }

    pub fn set_live(&self, live: bool) {
        if live {
            self.start_polling();
        } else {
            self.stop_polling();
        }
    }

    /// Run one cycle now, outside the timer schedule.
    pub async fn manual_refresh(&self) -> CycleOutcome {
        tracing::debug!("manual refresh requested");
        self.run_cycle(Trigger::Manual).await
    }

    /// Load the classifier model, then refresh so the current reading gets a
    /// recommendation without waiting for the next tick.
    pub async fn load_model(&self, path: &Path) -> Result<CycleOutcome> {
        self.shared.classifier.load_from_path(path).await?;
        loop {
            // A cycle in flight may have predicted before the install
            match self.run_cycle(Trigger::Manual).await {
                CycleOutcome::Skipped => tokio::time::sleep(Duration::from_millis(100)).await,
                outcome => return Ok(outcome),
            }
        }
    }

    async fn run_cycle(&self, trigger: Trigger) -> CycleOutcome {
        {
            let mut state = lock(&self.shared.state);
            // Checked under the same lock that claims in_flight, so a stop
            // that has returned can never be followed by a timer fetch.
            if trigger == Trigger::Timer && !state.live {
                tracing::debug!("polling stopped, dropping timer cycle");
                return CycleOutcome::Skipped;
            }
            if state.in_flight {
                tracing::debug!("cycle already in flight, dropping trigger");
                return CycleOutcome::Skipped;
            }
            state.in_flight = true;
        }
        let _guard = InFlightGuard { poller: self };
        self.update(|_| {});

        match self.shared.source.fetch_latest().await {
            Ok(reading) => {
                let recommendation = match self.shared.classifier.predict_reading(&reading) {
                    Ok(rec) => RecommendationStatus::Ready(rec),
                    Err(e) => {
                        if e.is_prediction_error() {
                            tracing::debug!("prediction unavailable: {}", e);
                        } else {
                            tracing::warn!("Classifier error: {}", e);
                        }
                        RecommendationStatus::Unavailable(e.to_string())
                    }
                };

                self.update(|state| {
                    state.reading = Some(reading);
                    state.last_updated = Some(Utc::now());
                    state.recommendation = recommendation.clone();
                    state.last_error = None;
                });
                tracing::debug!(recommendation = %recommendation, "sensor reading updated");

                CycleOutcome::Updated {
                    reading,
                    recommendation,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to fetch sensor reading: {}", e);
                let message = e.to_string();
                self.update(|state| state.last_error = Some(message.clone()));
                CycleOutcome::UpstreamUnavailable(message)
            }
        }
    }
}

async fn run_timer<S: SensorSource>(shared: Weak<Shared<S>>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let Some(shared) = shared.upgrade() else {
            break;
        };
        let poller = LivePoller { shared };
        if !poller.is_live() {
            break;
        }

        // Run the cycle as its own task so cancelling the timer never
        // cancels a cycle that has already started.
        tokio::spawn(async move {
            poller.run_cycle(Trigger::Timer).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::model::tests::npk_model_json;
    use crate::classifier::DenseModel;
    use crate::error::{CropError, Result};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Clone)]
    struct FakeSource {
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
        gate: Option<Arc<Notify>>,
        reading: SensorReading,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: Arc::new(AtomicBool::new(false)),
                gate: None,
                reading: SensorReading {
                    n: 50.0,
                    p: 30.0,
                    k: 20.0,
                    temperature: 25.0,
                    humidity: 50.0,
                    soil_moisture: 35.0,
                },
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SensorSource for FakeSource {
        async fn fetch_latest(&self) -> Result<SensorReading> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                Err(CropError::UpstreamUnavailable("sensor gateway down".into()))
            } else {
                Ok(self.reading)
            }
        }
    }

    fn ready_classifier() -> Arc<ClassifierPipeline> {
        let pipeline = ClassifierPipeline::new();
        pipeline
            .install(DenseModel::from_json_str(&npk_model_json()).unwrap())
            .unwrap();
        Arc::new(pipeline)
    }

    fn poller(source: FakeSource) -> LivePoller<FakeSource> {
        LivePoller::new(source, ready_classifier(), Duration::from_secs(10))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn manual_refresh_updates_reading_and_recommendation() {
        let source = FakeSource::new();
        let poller = poller(source.clone());
        assert_eq!(poller.snapshot().recommendation, RecommendationStatus::Loading);

        let outcome = poller.manual_refresh().await;
        match outcome {
            CycleOutcome::Updated {
                reading,
                recommendation,
            } => {
                assert_eq!(reading.n, 50.0);
                match recommendation {
                    RecommendationStatus::Ready(rec) => {
                        assert_eq!(rec.crop_label.as_deref(), Some("rice"))
                    }
                    other => panic!("unexpected status: {other:?}"),
                }
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let snapshot = poller.snapshot();
        assert_eq!(snapshot.reading, Some(source.reading));
        assert!(snapshot.last_updated.is_some());
        assert!(!snapshot.in_flight);
        assert!(!snapshot.live);
    }

    #[tokio::test]
    async fn upstream_failure_keeps_previous_reading() {
        let source = FakeSource::new();
        let poller = poller(source.clone());
        poller.manual_refresh().await;
        let before = poller.snapshot();

        source.fail.store(true, Ordering::SeqCst);
        let outcome = poller.manual_refresh().await;
        assert!(matches!(outcome, CycleOutcome::UpstreamUnavailable(_)));

        let after = poller.snapshot();
        assert_eq!(after.reading, before.reading);
        assert_eq!(after.last_updated, before.last_updated);
        assert_eq!(after.recommendation, before.recommendation);
        assert!(after.last_error.unwrap().contains("gateway down"));
        assert!(!after.in_flight);

        // Next successful cycle clears the error
        source.fail.store(false, Ordering::SeqCst);
        poller.manual_refresh().await;
        assert!(poller.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn overlapping_manual_refresh_is_dropped() {
        let gate = Arc::new(Notify::new());
        let source = FakeSource::gated(gate.clone());
        let poller = poller(source.clone());

        let first = tokio::spawn({
            let poller = poller.clone();
            async move { poller.manual_refresh().await }
        });
        wait_until(|| poller.is_in_flight()).await;

        assert_eq!(poller.manual_refresh().await, CycleOutcome::Skipped);
        assert_eq!(source.calls(), 1);
        assert!(poller.is_in_flight());

        gate.notify_one();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Updated { .. }));
        assert!(!poller.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_during_in_flight_cycle_are_noops() {
        let gate = Arc::new(Notify::new());
        let source = FakeSource::gated(gate.clone());
        let poller = poller(source.clone());

        poller.start_polling();
        assert!(poller.is_live());

        // Ticks at 10s and 20s; the first fetch is still blocked
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(source.calls(), 1);
        assert!(poller.is_in_flight());
        assert!(poller.snapshot().last_updated.is_none());

        gate.notify_one();
        wait_until(|| !poller.is_in_flight()).await;
        assert_eq!(source.calls(), 1);
        assert!(poller.snapshot().last_updated.is_some());

        poller.stop_polling();
    }

    #[tokio::test(start_paused = true)]
    async fn polling_runs_every_interval_until_stopped() {
        let source = FakeSource::new();
        let poller = poller(source.clone());

        poller.start_polling();
        // Starting twice does not double the schedule
        poller.start_polling();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls(), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(source.calls(), 3);

        poller.stop_polling();
        assert!(!poller.is_live());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 3);

        // Stopping again is harmless
        poller.stop_polling();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_in_flight_cycle_finish() {
        let gate = Arc::new(Notify::new());
        let source = FakeSource::gated(gate.clone());
        let poller = poller(source.clone());

        poller.start_polling();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(poller.is_in_flight());

        poller.stop_polling();
        gate.notify_one();
        wait_until(|| !poller.is_in_flight()).await;

        let snapshot = poller.snapshot();
        assert!(!snapshot.live);
        assert_eq!(snapshot.reading, Some(source.reading));
    }

    #[tokio::test]
    async fn unloaded_classifier_reports_unavailable_without_touching_state() {
        let classifier = Arc::new(ClassifierPipeline::new());
        let poller = LivePoller::new(FakeSource::new(), classifier.clone(), Duration::from_secs(10));

        let before = poller.snapshot();
        let request = serde_json::json!({"N": 50, "P": 30, "K": 20, "temperature": 25, "humidity": 50});
        assert!(matches!(
            classifier.predict(&request),
            Err(CropError::ModelUnavailable)
        ));
        assert_eq!(poller.snapshot(), before);

        // A cycle still stores the reading but shows no crop
        poller.manual_refresh().await;
        let snapshot = poller.snapshot();
        assert!(snapshot.reading.is_some());
        assert!(matches!(
            snapshot.recommendation,
            RecommendationStatus::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn subscribers_see_new_readings() {
        let poller = poller(FakeSource::new());
        let mut updates = poller.subscribe();

        poller.manual_refresh().await;
        assert!(updates.has_changed().unwrap());
        let latest = updates.borrow_and_update().clone();
        assert!(latest.reading.is_some());
        assert!(!latest.in_flight);
    }

    #[tokio::test]
    async fn timer_cycle_after_stop_is_skipped() {
        let source = FakeSource::new();
        let poller = poller(source.clone());

        poller.start_polling();
        poller.stop_polling();

        // A timer cycle that was spawned but had not started before the stop
        assert_eq!(poller.run_cycle(Trigger::Timer).await, CycleOutcome::Skipped);
        assert_eq!(source.calls(), 0);
        assert!(!poller.is_in_flight());

        // Manual refresh does not depend on live mode
        assert!(matches!(
            poller.manual_refresh().await,
            CycleOutcome::Updated { .. }
        ));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn no_fetch_starts_after_stop_returns() {
        let source = FakeSource::new();
        let poller = LivePoller::new(
            source.clone(),
            ready_classifier(),
            Duration::from_micros(50),
        );

        for _ in 0..300 {
            poller.start_polling();
            tokio::time::sleep(Duration::from_micros(200)).await;
            poller.stop_polling();
            let was_in_flight = poller.is_in_flight();
            let calls_at_stop = source.calls();

            for _ in 0..1000 {
                if !poller.is_in_flight() {
                    break;
                }
                tokio::time::sleep(Duration::from_micros(50)).await;
            }
            assert!(!poller.is_in_flight());
            let calls_after_drain = source.calls();
            if !was_in_flight {
                assert_eq!(calls_after_drain, calls_at_stop);
            }

            // Several intervals later nothing new has started
            tokio::time::sleep(Duration::from_millis(1)).await;
            assert_eq!(source.calls(), calls_after_drain);
        }
    }

    #[tokio::test]
    async fn loading_the_model_refreshes_the_recommendation() {
        let source = FakeSource::new();
        let poller = LivePoller::new(
            source.clone(),
            Arc::new(ClassifierPipeline::new()),
            Duration::from_secs(10),
        );

        poller.manual_refresh().await;
        assert!(matches!(
            poller.snapshot().recommendation,
            RecommendationStatus::Unavailable(_)
        ));

        let path = std::env::temp_dir().join(format!(
            "cropadvisor-poller-model-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, npk_model_json()).unwrap();
        let outcome = poller.load_model(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(outcome, CycleOutcome::Updated { .. }));
        assert_eq!(source.calls(), 2);
        match poller.snapshot().recommendation {
            RecommendationStatus::Ready(rec) => assert_eq!(rec.crop_label.as_deref(), Some("rice")),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_model_load_does_not_refresh() {
        let source = FakeSource::new();
        let poller = LivePoller::new(
            source.clone(),
            Arc::new(ClassifierPipeline::new()),
            Duration::from_secs(10),
        );
        let err = poller
            .load_model(Path::new("/nonexistent/crop_model.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, CropError::ModelLoad(_)));
        assert_eq!(source.calls(), 0);
    }
}
