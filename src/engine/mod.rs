//! Bell engine: drives the schedule from a clock and dispatches fires.
//!
//! Every tick reads the clock once and runs [`Engine::evaluate`]:
//!
//! 1. compare the reading with the previous one and report clock anomalies
//! 2. recompute the next upcoming instant and report changes
//! 3. ask the fire decider for an unfired match and record its key
//! 4. hand the cue chain to the sequencer, log the activity, show a
//!    desktop notice and emit `Fired`
//!
//! The key is recorded before dispatch, so a second evaluation of the same
//! minute is suppressed even while the first chain is still sounding.
//! Activity delivery, notices and playback completion are watched on
//! detached tasks and never block the tick.
//!
//! Ticks are serialized with [`Engine::stop`]: once `stop` returns, no tick
//! that started before it can still hand a chain to the sequencer.

use crate::activity::{ActivityRecord, ActivitySink, NoopActivitySink};
use crate::clock::{Clock, ClockAnomaly, ClockWatch, SystemClock};
use crate::config::{BellConfig, CuesConfig};
use crate::error::Result;
use crate::notify::{NoopNotifier, Notice, Notifier};
use crate::playback::{AudioSink, CueRef, PlaybackHandle, PlaybackSequencer, PlaybackState};
use crate::schedule::{
    Category, DedupGuard, EventKey, MatchedEvent, NextEventView, ScheduleEntry, ScheduleTable,
    TimeOfDay, decide, next_event,
};
use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Event type used in the activity log for manual test fires.
pub const TEST_EVENT_TYPE: &str = "test";

/// Status updates published by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    Started,
    Stopped,
    /// A scheduled instant fired and its chain was handed to the sequencer.
    Fired(MatchedEvent),
    /// A manual test cue was started.
    TestFired { label: String },
    /// A chain was abandoned because a cue failed.
    PlaybackFailed { label: String, reason: String },
    ClockAnomaly(ClockAnomaly),
    /// The next upcoming instant changed (None: nothing left today).
    NextEventChanged(Option<NextEventView>),
}

struct Driver {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Scheduler engine owning the table, dedup state and playback slot.
///
/// Share it as `Arc<Engine>`; [`Engine::start`] needs the `Arc` to hand a
/// weak reference to the ticker task.
pub struct Engine {
    table: ScheduleTable,
    cues: CuesConfig,
    tick: Duration,
    recent_limit: usize,
    sequencer: PlaybackSequencer,
    activity: Arc<dyn ActivitySink>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    guard: Mutex<DedupGuard>,
    watch: Mutex<ClockWatch>,
    // Outer None: not computed since the last start.
    last_next: Mutex<Option<Option<(Category, TimeOfDay)>>>,
    recent: Mutex<VecDeque<ActivityRecord>>,
    // Held for the whole of a tick.
    ticking: Mutex<()>,
    driver: Mutex<Option<Driver>>,
}

impl Engine {
    /// Build an engine from `config`, playing through `sink`.
    ///
    /// Uses the system clock, drops activity records and shows no notices
    /// until configured otherwise with [`Engine::with_clock`],
    /// [`Engine::with_activity_sink`] and [`Engine::with_notifier`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::BellError::Config`] if the configuration is invalid.
    pub fn new(
        config: &BellConfig,
        sink: Arc<dyn AudioSink>,
        events_tx: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Self> {
        config.validate()?;
        let table = ScheduleTable::from_config(&config.schedule)?;

        let sequencer =
            PlaybackSequencer::new(sink, Duration::from_millis(config.engine.grace_millis));
        sequencer.set_volume(config.schedule.default_volume);

        Ok(Self {
            table,
            cues: config.cues.clone(),
            tick: Duration::from_millis(config.engine.tick_millis),
            recent_limit: config.engine.recent_activity_limit,
            sequencer,
            activity: Arc::new(NoopActivitySink),
            notifier: Arc::new(NoopNotifier),
            clock: Arc::new(SystemClock),
            events_tx,
            guard: Mutex::new(DedupGuard::new()),
            watch: Mutex::new(ClockWatch::new()),
            last_next: Mutex::new(None),
            recent: Mutex::new(VecDeque::new()),
            ticking: Mutex::new(()),
            driver: Mutex::new(None),
        })
    }

    pub fn with_activity_sink(mut self, activity: Arc<dyn ActivitySink>) -> Self {
        self.activity = activity;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn table(&self) -> &ScheduleTable {
        &self.table
    }

    /// Current reading of the engine's clock.
    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    // --- Lifecycle ---

    /// Clear dedup state and start the ticker. No-op if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut driver = lock(&self.driver);
        if driver.is_some() {
            debug!("bell engine already running");
            return;
        }

        lock(&self.guard).reset();
        lock(&self.watch).reset();
        *lock(&self.last_next) = None;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(drive(Arc::downgrade(self), self.tick, cancel.clone()));
        *driver = Some(Driver { cancel, task });
        drop(driver);

        info!(
            entries = self.table.entries().len(),
            hourly = self.table.hourly().is_some(),
            "bell engine started"
        );
        self.emit(EngineEvent::Started);
    }

    /// Stop the ticker and halt playback. Dedup state is kept.
    ///
    /// Waits for a tick already in progress, then halts whatever it played.
    pub fn stop(&self) {
        let Some(driver) = lock(&self.driver).take() else {
            return;
        };
        driver.cancel.cancel();
        drop(driver.task);
        let _tick = lock(&self.ticking);
        self.sequencer.stop();
        info!("bell engine stopped");
        self.emit(EngineEvent::Stopped);
    }

    /// Stop, then start again with fresh dedup state.
    pub fn restart(self: &Arc<Self>) {
        self.stop();
        self.start();
    }

    pub fn is_running(&self) -> bool {
        lock(&self.driver).is_some()
    }

    // --- Tick ---

    /// Run one full tick for the reading `now`.
    ///
    /// Works whether or not the ticker is running, so callers can drive
    /// the engine from their own clock. Returns the dispatched match.
    ///
    /// Must be called from within a tokio runtime.
    pub fn evaluate(&self, now: NaiveDateTime) -> Option<MatchedEvent> {
        let _tick = lock(&self.ticking);
        self.run_tick(now)
    }

    /// Ticker entry point: reads the clock and ticks unless `cancel` fired.
    ///
    /// The cancellation check happens under the tick lock, so a tick never
    /// starts after [`Engine::stop`] has cancelled the driver.
    fn tick_unless_cancelled(&self, cancel: &CancellationToken) -> Option<MatchedEvent> {
        let _tick = lock(&self.ticking);
        if cancel.is_cancelled() {
            return None;
        }
        let now = self.clock.now();
        self.run_tick(now)
    }

    fn run_tick(&self, now: NaiveDateTime) -> Option<MatchedEvent> {
        if let Some(anomaly) = lock(&self.watch).observe(now) {
            info!("clock anomaly: {anomaly}");
            self.emit(EngineEvent::ClockAnomaly(anomaly));
        }

        self.refresh_next_event(now);

        let matched = {
            let mut guard = lock(&self.guard);
            let matched = decide(now, &self.table, &guard)?;
            guard.record(matched.key.clone());
            matched
        };

        self.dispatch(&matched);
        Some(matched)
    }

    fn refresh_next_event(&self, now: NaiveDateTime) {
        let next = next_event(now, &self.table);
        let identity = next.as_ref().map(|n| (n.category, n.time));

        let mut last = lock(&self.last_next);
        if last.as_ref() == Some(&identity) {
            return;
        }
        *last = Some(identity);
        drop(last);

        match &next {
            Some(view) => debug!(
                category = %view.category,
                time = %view.time,
                seconds_until = view.seconds_until,
                "next event"
            ),
            None => debug!("no more events today"),
        }
        self.emit(EngineEvent::NextEventChanged(next));
    }

    fn dispatch(&self, matched: &MatchedEvent) {
        let category = matched.category();
        let cues = self.cues.for_category(category).to_vec();
        info!(
            key = %matched.key,
            label = %matched.label(),
            cues = cues.len(),
            "firing scheduled event"
        );

        let handle = self.sequencer.play(cues, matched.label());
        self.watch_playback(handle, matched.label().to_owned());

        let record = ActivityRecord::new(
            category.as_str(),
            matched.at,
            format!("{} dimainkan", matched.label()),
        );
        self.push_recent(record.clone());
        self.announce(Notice::new(
            matched.entry.label.clone(),
            matched.entry.description.clone(),
        ));
        self.emit(EngineEvent::Fired(matched.clone()));
        self.report(record);
    }

    // --- Manual control ---

    /// Play `cue` immediately, preempting any chain. Not subject to dedup.
    ///
    /// Must be called from within a tokio runtime.
    pub fn test_fire(&self, cue: CueRef) {
        let label = cue.label.clone();
        info!(label = %label, "test fire");

        let handle = self.sequencer.play(vec![cue], label.clone());
        self.watch_playback(handle, label.clone());

        let record = ActivityRecord::new(
            TEST_EVENT_TYPE,
            self.clock.now(),
            format!("{label} dimainkan"),
        );
        self.push_recent(record.clone());
        self.emit(EngineEvent::TestFired { label });
        self.report(record);
    }

    /// Play the configured test cue.
    pub fn test_fire_default(&self) {
        self.test_fire(self.cues.test.clone());
    }

    /// Halt playback without stopping the ticker.
    pub fn stop_playback(&self) {
        self.sequencer.stop();
    }

    pub fn set_volume(&self, volume: f32) {
        self.sequencer.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.sequencer.volume()
    }

    // --- Queries ---

    /// Every entry active on `now`'s weekday, ordered by time.
    pub fn today_schedule(&self, now: NaiveDateTime) -> Vec<ScheduleEntry> {
        self.table.entries_for_day(now.weekday())
    }

    pub fn next_event(&self, now: NaiveDateTime) -> Option<NextEventView> {
        next_event(now, &self.table)
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.sequencer.state()
    }

    /// Dispatched events, newest first.
    pub fn recent_activity(&self) -> Vec<ActivityRecord> {
        lock(&self.recent).iter().cloned().collect()
    }

    /// Last instant recorded as fired for `category`.
    pub fn last_fired(&self, category: Category) -> Option<EventKey> {
        lock(&self.guard).last_key(category).cloned()
    }

    // --- Helpers ---

    fn emit(&self, event: EngineEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("engine event receiver dropped");
        }
    }

    fn push_recent(&self, record: ActivityRecord) {
        let mut recent = lock(&self.recent);
        recent.push_front(record);
        recent.truncate(self.recent_limit);
    }

    fn report(&self, record: ActivityRecord) {
        let activity = Arc::clone(&self.activity);
        tokio::spawn(async move {
            if let Err(e) = activity.record(&record).await {
                warn!(event_type = %record.event_type, "activity log unavailable: {e}");
            }
        });
    }

    fn announce(&self, notice: Notice) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&notice).await {
                warn!(title = %notice.title, "desktop notice not shown: {e}");
            }
        });
    }

    fn watch_playback(&self, handle: PlaybackHandle, label: String) {
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle.finished().await {
                warn!(label = %label, "playback failed: {e}");
                let _ = events_tx.send(EngineEvent::PlaybackFailed {
                    label,
                    reason: e.to_string(),
                });
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

async fn drive(engine: Weak<Engine>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let Some(strong) = engine.upgrade() else {
            break;
        };
        strong.tick_unless_cancelled(&cancel);
    }
    debug!("bell engine ticker exited");
}
