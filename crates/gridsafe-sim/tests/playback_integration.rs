//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "playback"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Timer-driven playback scenarios under a paused clock."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gridsafe_common::metrics::new_registry;
use gridsafe_sim::{
    ActuationDispatcher, ActuatorClient, ActuatorError, LoadError, LoadRequest, LogCategory,
    PlaybackMetrics, PlaybackScheduler, PlaybackState, PlaybackStats, Record, RecordSequence,
    Rgb, SequenceLoader, Zone, LOG_FEED_CAPACITY,
};
use tokio::time::{sleep, timeout, Instant};

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Color(Rgb),
    Off,
}

struct RecordingActuator {
    origin: Instant,
    sent: Mutex<Vec<(Duration, String, Sent)>>,
}

impl RecordingActuator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<(Duration, String, Sent)> {
        self.sent.lock().unwrap().clone()
    }

    fn colors(&self) -> Vec<(Duration, Rgb)> {
        self.sent()
            .into_iter()
            .filter_map(|(at, _, sent)| match sent {
                Sent::Color(rgb) => Some((at, rgb)),
                Sent::Off => None,
            })
            .collect()
    }
}

#[async_trait]
impl ActuatorClient for RecordingActuator {
    async fn set_color(&self, zone: &Zone, color: Rgb) -> Result<(), ActuatorError> {
        self.sent
            .lock()
            .unwrap()
            .push((self.origin.elapsed(), zone.to_string(), Sent::Color(color)));
        Ok(())
    }

    async fn power_off(&self, zone: &Zone) -> Result<(), ActuatorError> {
        self.sent
            .lock()
            .unwrap()
            .push((self.origin.elapsed(), zone.to_string(), Sent::Off));
        Ok(())
    }
}

struct FailingActuator;

#[async_trait]
impl ActuatorClient for FailingActuator {
    async fn set_color(&self, _zone: &Zone, _color: Rgb) -> Result<(), ActuatorError> {
        Err(ActuatorError::Transport("connection refused".into()))
    }

    async fn power_off(&self, _zone: &Zone) -> Result<(), ActuatorError> {
        Err(ActuatorError::Rejected {
            status: 404,
            message: "unknown section".into(),
        })
    }
}

struct HungActuator;

#[async_trait]
impl ActuatorClient for HungActuator {
    async fn set_color(&self, _zone: &Zone, _color: Rgb) -> Result<(), ActuatorError> {
        std::future::pending().await
    }

    async fn power_off(&self, _zone: &Zone) -> Result<(), ActuatorError> {
        std::future::pending().await
    }
}

struct UnreachableLoader;

#[async_trait]
impl SequenceLoader for UnreachableLoader {
    async fn load(&self, _request: &LoadRequest) -> Result<RecordSequence, LoadError> {
        Err(LoadError::Unreachable("connection refused".into()))
    }
}

struct StaticLoader(RecordSequence);

#[async_trait]
impl SequenceLoader for StaticLoader {
    async fn load(&self, _request: &LoadRequest) -> Result<RecordSequence, LoadError> {
        Ok(self.0.clone())
    }
}

fn at(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + ms).single()
}

/// Three records 2000ms and 500ms apart: safe, caught, missed.
fn reference_scenario() -> RecordSequence {
    RecordSequence::new(vec![
        Record::new(at(0), 0, 0).with_telemetry("voltage", 230.0),
        Record::new(at(2_000), 1, 1).with_telemetry("voltage", 198.2),
        Record::new(at(2_500), 0, 2).with_telemetry("current", 41.7),
    ])
}

fn evenly_spaced(len: usize, gap_ms: i64) -> RecordSequence {
    (0..len)
        .map(|i| Record::new(at(i as i64 * gap_ms), 0, 0))
        .collect::<Vec<_>>()
        .into()
}

fn scheduler_with(client: Arc<dyn ActuatorClient>) -> PlaybackScheduler {
    PlaybackScheduler::new(ActuationDispatcher::new(client), None)
}

async fn wait_until_stopped(scheduler: &PlaybackScheduler) {
    let mut states = scheduler.subscribe();
    timeout(
        Duration::from_secs(600),
        states.wait_for(|state| *state == PlaybackState::Stopped),
    )
    .await
    .expect("playback should finish")
    .expect("scheduler alive");
    // Let fire-and-forget dispatch tasks drain.
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn reference_scenario_replays_with_original_pacing() {
    let actuator = RecordingActuator::new();
    let scheduler = scheduler_with(actuator.clone());
    scheduler.set_zone(Zone::new("downtown"));
    scheduler.load(reference_scenario()).unwrap();

    scheduler.play();
    assert_eq!(scheduler.state(), PlaybackState::Playing);
    wait_until_stopped(&scheduler).await;

    assert_eq!(
        actuator.colors(),
        vec![
            (Duration::from_millis(0), Rgb::new(0, 255, 0)),
            (Duration::from_millis(2_000), Rgb::new(255, 50, 0)),
            (Duration::from_millis(2_500), Rgb::new(255, 0, 0)),
        ]
    );
    assert!(actuator.sent().iter().all(|(_, zone, _)| zone == "downtown"));

    let stats = scheduler.stats();
    assert_eq!(stats.total_processed, 3);
    assert_eq!(stats.missed_count, 1);
    assert_eq!(stats.safe_count, 2);
    assert_eq!(stats.flagged_count, 1);
    assert_eq!(stats.correct_count, 2);
    assert_eq!(scheduler.cursor(), 2);

    let feed = scheduler.log_feed();
    let indices: Vec<usize> = feed.iter().map(|entry| entry.record_index).collect();
    assert_eq!(indices, vec![2, 1, 0]);
    let categories: Vec<LogCategory> = feed.iter().map(|entry| entry.category).collect();
    assert_eq!(
        categories,
        vec![LogCategory::Missed, LogCategory::Fdi, LogCategory::Ok]
    );
    assert_eq!(feed[0].telemetry_summary, "V:0.0 C:41.7");
    assert!(feed[0].id > feed[1].id && feed[1].id > feed[2].id);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_rewinds_and_powers_off() {
    let actuator = RecordingActuator::new();
    let scheduler = scheduler_with(actuator.clone());
    scheduler.load(evenly_spaced(10, 1_000)).unwrap();
    scheduler.play();
    sleep(Duration::from_millis(2_100)).await;
    assert_eq!(scheduler.stats().total_processed, 3);

    scheduler.stop();
    scheduler.stop();
    assert_eq!(scheduler.state(), PlaybackState::Stopped);
    assert_eq!(scheduler.cursor(), 0);
    assert_eq!(scheduler.stats(), PlaybackStats::default());
    assert!(scheduler.log_feed().is_empty());

    sleep(Duration::from_secs(30)).await;
    let sent = actuator.sent();
    assert_eq!(actuator.colors().len(), 3);
    let offs = sent.iter().filter(|(_, _, sent)| *sent == Sent::Off).count();
    assert_eq!(offs, 2);
    assert_eq!(sent[3].1, "all");
    assert_eq!(scheduler.stats(), PlaybackStats::default());
}

#[tokio::test(start_paused = true)]
async fn reload_while_playing_discards_pending_tick() {
    let actuator = RecordingActuator::new();
    let scheduler = scheduler_with(actuator.clone());
    scheduler.load(evenly_spaced(5, 1_000)).unwrap();
    scheduler.play();
    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(scheduler.cursor(), 2);

    scheduler.load(evenly_spaced(2, 1_000)).unwrap();
    assert_eq!(scheduler.state(), PlaybackState::Loaded);
    assert_eq!(scheduler.cursor(), 0);
    assert_eq!(scheduler.sequence_len(), 2);
    assert_eq!(scheduler.stats(), PlaybackStats::default());
    assert!(scheduler.log_feed().is_empty());

    sleep(Duration::from_secs(10)).await;
    assert_eq!(scheduler.state(), PlaybackState::Loaded);
    assert_eq!(scheduler.stats().total_processed, 0);
    assert_eq!(actuator.colors().len(), 2);

    scheduler.play();
    wait_until_stopped(&scheduler).await;
    assert_eq!(scheduler.stats().total_processed, 2);
}

#[tokio::test(start_paused = true)]
async fn failing_actuator_does_not_disturb_playback() {
    let metrics = PlaybackMetrics::new(new_registry()).unwrap();
    let scheduler = PlaybackScheduler::new(
        ActuationDispatcher::new(Arc::new(FailingActuator)).with_metrics(Some(metrics.clone())),
        Some(metrics.clone()),
    );
    scheduler.load(reference_scenario()).unwrap();
    let started = Instant::now();
    scheduler.play();
    wait_until_stopped(&scheduler).await;

    assert!(started.elapsed() < Duration::from_millis(2_600));
    assert_eq!(scheduler.stats().total_processed, 3);
    assert_eq!(metrics.actuator_command_count("set_color", false), 3);

    scheduler.stop();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(metrics.actuator_command_count("power_off", false), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_actuator_does_not_delay_ticks() {
    let scheduler = scheduler_with(Arc::new(HungActuator));
    scheduler.load(reference_scenario()).unwrap();
    let started = Instant::now();
    scheduler.play();
    wait_until_stopped(&scheduler).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(2_500) && elapsed < Duration::from_millis(2_600));
    assert_eq!(scheduler.stats().missed_count, 1);
}

#[tokio::test(start_paused = true)]
async fn speed_change_applies_to_next_delay_only() {
    let actuator = RecordingActuator::new();
    let scheduler = scheduler_with(actuator.clone());
    scheduler.load(evenly_spaced(3, 4_000)).unwrap();
    scheduler.play();
    sleep(Duration::from_millis(100)).await;
    scheduler.set_speed(4.0).unwrap();
    assert!(scheduler.set_speed(250.0).is_err());
    assert_eq!(scheduler.speed().get(), 4.0);
    wait_until_stopped(&scheduler).await;

    let times: Vec<Duration> = actuator.colors().into_iter().map(|(at, _)| at).collect();
    assert_eq!(
        times,
        vec![
            Duration::from_millis(0),
            Duration::from_millis(4_000),
            Duration::from_millis(5_000),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_play_keeps_a_single_timer() {
    let actuator = RecordingActuator::new();
    let scheduler = scheduler_with(actuator.clone());
    scheduler.load(reference_scenario()).unwrap();
    scheduler.play();
    scheduler.play();
    sleep(Duration::from_millis(10)).await;
    scheduler.play();
    wait_until_stopped(&scheduler).await;
    assert_eq!(actuator.colors().len(), 3);
    assert_eq!(scheduler.stats().total_processed, 3);
}

#[tokio::test(start_paused = true)]
async fn play_after_exhaustion_restarts_from_first_record() {
    let actuator = RecordingActuator::new();
    let scheduler = scheduler_with(actuator.clone());
    scheduler.load(reference_scenario()).unwrap();
    scheduler.play();
    wait_until_stopped(&scheduler).await;
    let first_run_ids: Vec<u64> = scheduler.log_feed().iter().map(|e| e.id).collect();

    scheduler.play();
    assert_eq!(scheduler.state(), PlaybackState::Playing);
    wait_until_stopped(&scheduler).await;

    let stats = scheduler.stats();
    assert_eq!(stats.total_processed, 3);
    assert_eq!(stats.missed_count, 1);
    let second_run_ids: Vec<u64> = scheduler.log_feed().iter().map(|e| e.id).collect();
    assert_eq!(second_run_ids.len(), 3);
    assert!(second_run_ids.iter().min() > first_run_ids.iter().max());
    assert_eq!(actuator.colors().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn log_feed_keeps_the_latest_fifty_records() {
    let scheduler = scheduler_with(RecordingActuator::new());
    let untimed: RecordSequence = (0..60)
        .map(|_| Record::new(None, 0, 0))
        .collect::<Vec<_>>()
        .into();
    scheduler.load(untimed).unwrap();
    scheduler.set_speed(100.0).unwrap();
    scheduler.play();
    wait_until_stopped(&scheduler).await;

    let feed = scheduler.log_feed();
    assert_eq!(feed.len(), LOG_FEED_CAPACITY);
    assert_eq!(feed.first().map(|entry| entry.record_index), Some(59));
    assert_eq!(feed.last().map(|entry| entry.record_index), Some(10));
    assert_eq!(scheduler.stats().total_processed, 60);
}

#[tokio::test(start_paused = true)]
async fn failed_load_leaves_session_untouched() {
    let scheduler = scheduler_with(RecordingActuator::new());
    let request = LoadRequest::new("models/rf.pkl", "data/test.csv");

    let err = scheduler
        .load_from(&UnreachableLoader, &request)
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Unreachable(_)));
    assert_eq!(scheduler.state(), PlaybackState::Idle);

    let loaded = scheduler
        .load_from(&StaticLoader(reference_scenario()), &request)
        .await
        .unwrap();
    assert_eq!(loaded, 3);
    assert_eq!(scheduler.state(), PlaybackState::Loaded);

    assert!(scheduler
        .load_from(&UnreachableLoader, &request)
        .await
        .is_err());
    assert_eq!(scheduler.state(), PlaybackState::Loaded);
    assert_eq!(scheduler.sequence_len(), 3);
}
