//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "playback"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Playback state machine and cancellable replay timer."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! The playback scheduler replays a [`RecordSequence`] against real-time
//! pacing scaled by an operator-chosen [`SpeedMultiplier`].
//!
//! All session state lives behind one mutex that is never held across an
//! `.await`. At most one timer task exists per session: it is tagged with the
//! session epoch at spawn time and receives a oneshot cancellation signal.
//! `load`, `stop` and `play` bump the epoch, so a wake-up that races a
//! cancellation finds a stale epoch and does nothing.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use gridsafe_common::config::{MAX_PLAYBACK_SPEED, MIN_PLAYBACK_SPEED};
use gridsafe_common::PlaybackConfig;
use gridsafe_logging::{gs_debug, gs_info, gs_warn, log_playback_event, LogContext, PlaybackEventOutcome};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};

use crate::actuator::{outcome_color, ActuationDispatcher, Zone};
use crate::classify::classify;
use crate::error::PlaybackError;
use crate::feed::{LogEntry, LogFeed};
use crate::loader::{LoadError, LoadRequest, SequenceLoader};
use crate::metrics::PlaybackMetrics;
use crate::record::{Record, RecordSequence};
use crate::stats::PlaybackStats;

/// Gap used when either timestamp of a pair is missing.
pub const FALLBACK_DELAY_MS: i64 = 1_000;
/// Gap used when timestamps run backwards.
pub const NEGATIVE_GAP_DELAY_MS: i64 = 100;
/// Largest gap replayed verbatim.
pub const MAX_GAP_MS: i64 = 5_000;
/// Gap substituted for anything above [`MAX_GAP_MS`].
pub const CAPPED_GAP_DELAY_MS: i64 = 2_000;

/// Unscaled delay in milliseconds between showing `current` and `next`.
pub fn raw_delay_ms(current: &Record, next: &Record) -> i64 {
    let raw = match (current.timestamp, next.timestamp) {
        (Some(current), Some(next)) => (next - current).num_milliseconds(),
        _ => FALLBACK_DELAY_MS,
    };
    if raw < 0 {
        NEGATIVE_GAP_DELAY_MS
    } else if raw > MAX_GAP_MS {
        CAPPED_GAP_DELAY_MS
    } else {
        raw
    }
}

/// Wall-clock delay before `next` is shown at the given speed.
pub fn playback_delay(current: &Record, next: &Record, speed: SpeedMultiplier) -> Duration {
    let micros = raw_delay_ms(current, next) as f64 * 1_000.0 / speed.get();
    Duration::from_micros(micros.round() as u64)
}

/// Replay speed factor in `[1, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SpeedMultiplier(f64);

impl SpeedMultiplier {
    pub const MIN: f64 = MIN_PLAYBACK_SPEED;
    pub const MAX: f64 = MAX_PLAYBACK_SPEED;

    pub fn new(value: f64) -> Result<Self, PlaybackError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(PlaybackError::InvalidSpeed(value))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for SpeedMultiplier {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

impl TryFrom<f64> for SpeedMultiplier {
    type Error = PlaybackError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SpeedMultiplier> for f64 {
    fn from(speed: SpeedMultiplier) -> Self {
        speed.0
    }
}

impl fmt::Display for SpeedMultiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// No sequence loaded.
    #[default]
    Idle,
    Loaded,
    Playing,
    Stopped,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loaded => "loaded",
            PlaybackState::Playing => "playing",
            PlaybackState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a playback session for operator surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub cursor: usize,
    pub length: usize,
    pub speed: f64,
    pub zone: Zone,
    pub stats: PlaybackStats,
    pub accuracy: f64,
    /// Newest first.
    pub log: Vec<LogEntry>,
}

struct Session {
    state: PlaybackState,
    sequence: Option<RecordSequence>,
    cursor: usize,
    stats: PlaybackStats,
    feed: LogFeed,
    speed: SpeedMultiplier,
    zone: Zone,
    epoch: u64,
    // Log entry ids stay unique for the lifetime of the scheduler.
    next_entry_id: u64,
    timer: Option<oneshot::Sender<()>>,
}

impl Session {
    fn new(zone: Zone, speed: SpeedMultiplier) -> Self {
        Self {
            state: PlaybackState::Idle,
            sequence: None,
            cursor: 0,
            stats: PlaybackStats::default(),
            feed: LogFeed::new(),
            speed,
            zone,
            epoch: 0,
            next_entry_id: 1,
            timer: None,
        }
    }

    fn rewind(&mut self) {
        self.cursor = 0;
        self.stats.reset();
        self.feed.clear();
    }

    fn cancel_timer(&mut self) {
        if let Some(cancel) = self.timer.take() {
            let _ = cancel.send(());
        }
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn sequence_len(&self) -> usize {
        self.sequence.as_ref().map_or(0, RecordSequence::len)
    }
}

enum Tick {
    Continue(Duration),
    Finished,
    Cancelled,
}

struct Shared {
    session: Mutex<Session>,
    dispatcher: ActuationDispatcher,
    metrics: Option<PlaybackMetrics>,
    state_tx: watch::Sender<PlaybackState>,
}

impl Shared {
    fn transition(&self, session: &mut Session, next: PlaybackState) {
        if session.state != next {
            gs_debug!(
                context = LogContext::new().with_cursor(session.cursor as u64),
                "playback state {} -> {}",
                session.state,
                next
            );
        }
        session.state = next;
        self.state_tx.send_replace(next);
    }

    fn tick(&self, epoch: u64) -> Tick {
        let mut session = self.session.lock();
        if session.epoch != epoch || session.state != PlaybackState::Playing {
            return Tick::Cancelled;
        }
        let Some(sequence) = session.sequence.clone() else {
            return Tick::Cancelled;
        };
        let index = session.cursor;
        let Some(current) = sequence.get(index) else {
            session.timer = None;
            self.transition(&mut session, PlaybackState::Stopped);
            return Tick::Finished;
        };

        let outcome = classify(current);
        session.stats.update(current, outcome);
        let id = session.next_entry_id;
        session.next_entry_id += 1;
        session
            .feed
            .push(LogEntry::from_record(id, index, current, outcome));
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(outcome);
        }
        self.dispatcher
            .set_color(&session.zone, outcome_color(outcome));

        match sequence.get(index + 1) {
            Some(next) => {
                let delay = playback_delay(current, next, session.speed);
                session.cursor = index + 1;
                Tick::Continue(delay)
            }
            None => {
                session.timer = None;
                self.transition(&mut session, PlaybackState::Stopped);
                let zone = session.zone.to_string();
                gs_info!(
                    context = LogContext::new()
                        .with_zone(&zone)
                        .with_cursor(index as u64),
                    "playback finished after {} records",
                    session.stats.total_processed
                );
                Tick::Finished
            }
        }
    }
}

async fn run_timer(shared: Weak<Shared>, epoch: u64, mut cancel: oneshot::Receiver<()>) {
    let mut delay = Duration::ZERO;
    loop {
        tokio::select! {
            biased;
            _ = &mut cancel => return,
            _ = tokio::time::sleep(delay) => {}
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        match shared.tick(epoch) {
            Tick::Continue(next) => delay = next,
            Tick::Finished | Tick::Cancelled => return,
        }
    }
}

/// Handle to a playback session. Clones share the same session.
#[derive(Clone)]
pub struct PlaybackScheduler {
    shared: Arc<Shared>,
}

impl PlaybackScheduler {
    pub fn new(dispatcher: ActuationDispatcher, metrics: Option<PlaybackMetrics>) -> Self {
        Self::with_session(dispatcher, metrics, Zone::All, SpeedMultiplier::default())
    }

    /// Build a scheduler using the configured zone and initial speed.
    pub fn from_config(
        config: &PlaybackConfig,
        dispatcher: ActuationDispatcher,
        metrics: Option<PlaybackMetrics>,
    ) -> Result<Self, PlaybackError> {
        let speed = SpeedMultiplier::new(config.speed)?;
        Ok(Self::with_session(
            dispatcher,
            metrics,
            Zone::new(config.zone.as_str()),
            speed,
        ))
    }

    fn with_session(
        dispatcher: ActuationDispatcher,
        metrics: Option<PlaybackMetrics>,
        zone: Zone,
        speed: SpeedMultiplier,
    ) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(Session::new(zone, speed)),
                dispatcher,
                metrics,
                state_tx,
            }),
        }
    }

    /// Replace the sequence and rewind. Any pending tick is cancelled.
    pub fn load(&self, sequence: RecordSequence) -> Result<(), PlaybackError> {
        if sequence.is_empty() {
            return Err(PlaybackError::EmptySequence);
        }
        let len = sequence.len();
        let mut session = self.shared.session.lock();
        session.cancel_timer();
        session.sequence = Some(sequence);
        session.rewind();
        self.shared.transition(&mut session, PlaybackState::Loaded);
        let zone = session.zone.to_string();
        drop(session);
        gs_info!(
            context = LogContext::new().with_zone(&zone),
            "loaded {} records",
            len
        );
        Ok(())
    }

    /// Fetch a sequence through `loader` and load it.
    ///
    /// The session is untouched while the loader runs and stays untouched
    /// when it fails.
    pub async fn load_from<L>(&self, loader: &L, request: &LoadRequest) -> Result<usize, LoadError>
    where
        L: SequenceLoader + ?Sized,
    {
        let context = LogContext::new()
            .with_model(&request.model)
            .with_dataset(&request.dataset);
        let result = match loader.load(request).await {
            Ok(sequence) => {
                let len = sequence.len();
                self.load(sequence).map(|_| len).map_err(|_| LoadError::Empty)
            }
            Err(err) => Err(err),
        };
        if let Some(metrics) = &self.shared.metrics {
            metrics.record_load(result.is_ok());
        }
        match &result {
            Ok(len) => log_playback_event(
                Some(&context),
                "playback.load",
                &format!("{len} records ready"),
                PlaybackEventOutcome::Success,
            ),
            Err(err) => log_playback_event(
                Some(&context),
                "playback.load",
                &err.to_string(),
                PlaybackEventOutcome::Fault,
            ),
        }
        result
    }

    /// Start advancing the cursor. Replaying a finished sequence starts over.
    ///
    /// No-op while `Idle` or already `Playing`, and outside a Tokio runtime.
    pub fn play(&self) {
        let Ok(runtime) = Handle::try_current() else {
            gs_warn!("play ignored: no tokio runtime to drive the timer");
            return;
        };
        let mut session = self.shared.session.lock();
        match session.state {
            PlaybackState::Idle | PlaybackState::Playing => {
                gs_debug!("play ignored while {}", session.state);
                return;
            }
            PlaybackState::Stopped => session.rewind(),
            PlaybackState::Loaded => {}
        }
        session.cancel_timer();
        let epoch = session.epoch;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        session.timer = Some(cancel_tx);
        self.shared.transition(&mut session, PlaybackState::Playing);
        let zone = session.zone.to_string();
        let len = session.sequence_len();
        drop(session);

        runtime.spawn(run_timer(Arc::downgrade(&self.shared), epoch, cancel_rx));
        gs_info!(
            context = LogContext::new().with_zone(&zone),
            "playback started over {} records",
            len
        );
    }

    /// Cancel playback, rewind, and switch the zone's lights off.
    pub fn stop(&self) {
        let mut session = self.shared.session.lock();
        session.cancel_timer();
        session.rewind();
        let next = if session.sequence.is_some() {
            PlaybackState::Stopped
        } else {
            PlaybackState::Idle
        };
        self.shared.transition(&mut session, next);
        let zone = session.zone.clone();
        drop(session);

        self.shared.dispatcher.power_off(&zone);
        let zone = zone.to_string();
        log_playback_event(
            Some(&LogContext::new().with_zone(&zone)),
            "playback.stop",
            "playback stopped and rewound",
            PlaybackEventOutcome::Success,
        );
    }

    /// Change the speed used for the next computed delay.
    pub fn set_speed(&self, multiplier: f64) -> Result<SpeedMultiplier, PlaybackError> {
        let speed = SpeedMultiplier::new(multiplier)?;
        self.shared.session.lock().speed = speed;
        gs_debug!("playback speed set to {}", speed);
        Ok(speed)
    }

    /// Direct subsequent actuator commands at `zone`.
    pub fn set_zone(&self, zone: Zone) {
        let name = zone.to_string();
        self.shared.session.lock().zone = zone;
        gs_debug!(context = LogContext::new().with_zone(&name), "actuator zone changed");
    }

    /// Receiver observing every state transition.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.shared.state_tx.subscribe()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.session.lock().state
    }

    pub fn cursor(&self) -> usize {
        self.shared.session.lock().cursor
    }

    pub fn sequence_len(&self) -> usize {
        self.shared.session.lock().sequence_len()
    }

    pub fn stats(&self) -> PlaybackStats {
        self.shared.session.lock().stats
    }

    /// Copy of the live log, newest first.
    pub fn log_feed(&self) -> Vec<LogEntry> {
        self.shared.session.lock().feed.to_vec()
    }

    pub fn speed(&self) -> SpeedMultiplier {
        self.shared.session.lock().speed
    }

    pub fn zone(&self) -> Zone {
        self.shared.session.lock().zone.clone()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let session = self.shared.session.lock();
        PlaybackSnapshot {
            state: session.state,
            cursor: session.cursor,
            length: session.sequence_len(),
            speed: session.speed.get(),
            zone: session.zone.clone(),
            stats: session.stats,
            accuracy: session.stats.accuracy(),
            log: session.feed.to_vec(),
        }
    }
}

impl fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.shared.session.lock();
        f.debug_struct("PlaybackScheduler")
            .field("state", &session.state)
            .field("cursor", &session.cursor)
            .field("length", &session.sequence_len())
            .field("speed", &session.speed)
            .field("zone", &session.zone)
            .finish()
    }
}
