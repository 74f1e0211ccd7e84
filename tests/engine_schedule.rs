//! End-to-end engine behaviour through the public API.
//!
//! Drives `Engine::evaluate` with hand-picked timestamps, plays through a
//! gated test sink and, for the activity path, posts to a real activity-log
//! server bound to an ephemeral port.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use workbell::activity::HttpActivitySink;
use workbell::activity::server::ActivityServer;
use workbell::activity::store::ActivityStore;
use workbell::config::{ServerConfig, WeekdayScheduleConfig};
use workbell::playback::{AudioSink, CueRef, InstantSink, PlaybackOutcome};
use workbell::schedule::{Category, DaySet, TimeOfDay};
use workbell::{BellConfig, Engine, EngineEvent};

// June 2024: the 2nd is a Sunday, the 3rd a Monday, the 7th a Friday.
fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

fn engine_with(
    config: &BellConfig,
    sink: Arc<dyn AudioSink>,
) -> (Arc<Engine>, mpsc::UnboundedReceiver<EngineEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = Engine::new(config, sink, tx).unwrap();
    (Arc::new(engine), rx)
}

fn instant_engine() -> Arc<Engine> {
    engine_with(&BellConfig::default(), Arc::new(InstantSink::new())).0
}

type Request = (String, oneshot::Sender<PlaybackOutcome>);

/// Sink whose cues end only when the test answers.
struct GatedSink {
    requests: mpsc::UnboundedSender<Request>,
}

#[async_trait]
impl AudioSink for GatedSink {
    async fn start(
        &self,
        cue: &CueRef,
        _volume: f32,
        cancel: CancellationToken,
    ) -> PlaybackOutcome {
        let (tx, rx) = oneshot::channel();
        let _ = self.requests.send((cue.label.clone(), tx));
        tokio::select! {
            _ = cancel.cancelled() => PlaybackOutcome::Completed,
            outcome = rx => outcome.unwrap_or(PlaybackOutcome::Completed),
        }
    }
}

#[tokio::test]
async fn repeated_polling_fires_once() {
    let engine = instant_engine();
    assert!(engine.evaluate(at(3, 7, 50, 0)).is_some());
    for _ in 0..5 {
        assert!(engine.evaluate(at(3, 7, 50, 0)).is_none());
    }
    // Slightly earlier reading after a backward jump.
    assert!(engine.evaluate(at(3, 7, 49, 59)).is_none());
    assert!(engine.evaluate(at(3, 7, 50, 0)).is_none());
}

#[tokio::test]
async fn combined_daily_wins_a_shared_instant() {
    let mut config = BellConfig::default();
    config.schedule.weekday_schedules.push(WeekdayScheduleConfig {
        name: "clash".to_owned(),
        days: DaySet::WORKDAYS,
        times: vec![TimeOfDay::new(7, 50)],
        ..WeekdayScheduleConfig::default()
    });
    let (engine, _events) = engine_with(&config, Arc::new(InstantSink::new()));

    let matched = engine.evaluate(at(3, 7, 50, 0)).unwrap();
    assert_eq!(matched.category(), Category::CombinedDaily);
}

#[tokio::test]
async fn weekend_only_hears_hourly_ticks() {
    let engine = instant_engine();
    assert!(engine.evaluate(at(2, 7, 50, 0)).is_none());
    assert!(engine.evaluate(at(2, 11, 30, 0)).is_none());

    let matched = engine.evaluate(at(2, 8, 0, 0)).unwrap();
    assert_eq!(matched.category(), Category::HourlyTick);
}

#[tokio::test]
async fn friday_uses_its_own_instants() {
    let engine = instant_engine();
    let matched = engine.evaluate(at(7, 11, 30, 0)).unwrap();
    assert_eq!(matched.category(), Category::WeekdayInstant);
    // Monday has no 11:30 instant.
    assert!(engine.evaluate(at(3, 11, 30, 0)).is_none());
}

#[tokio::test(start_paused = true)]
async fn ceremony_chain_completes_then_yields_to_siren() {
    let (tx, mut requests) = mpsc::unbounded_channel();
    let (engine, _events) =
        engine_with(&BellConfig::default(), Arc::new(GatedSink { requests: tx }));

    engine.evaluate(at(3, 7, 50, 0)).unwrap();
    let (label, done) = requests.recv().await.unwrap();
    assert_eq!(label, "Indonesia Raya");
    assert_eq!(engine.playback_state().queue.len(), 1);

    done.send(PlaybackOutcome::Completed).unwrap();
    let (label, _hymn) = requests.recv().await.unwrap();
    assert_eq!(label, "Hymne Sinarmas");
    assert_eq!(
        engine.playback_state().current_label.as_deref(),
        Some("Hymne Sinarmas")
    );

    // The siren preempts the hymn.
    engine.evaluate(at(3, 8, 0, 0)).unwrap();
    let (label, _siren) = requests.recv().await.unwrap();
    assert_eq!(label, "Sirine Kerja");
    assert_eq!(
        engine.playback_state().chain_label.as_deref(),
        Some("Sirine Kerja")
    );
}

#[tokio::test(start_paused = true)]
async fn preempted_chain_never_resumes() {
    let (tx, mut requests) = mpsc::unbounded_channel();
    let (engine, _events) =
        engine_with(&BellConfig::default(), Arc::new(GatedSink { requests: tx }));

    engine.evaluate(at(3, 7, 50, 0)).unwrap();
    let (label, _anthem) = requests.recv().await.unwrap();
    assert_eq!(label, "Indonesia Raya");

    engine.test_fire(CueRef::new("Test Audio", "sounds/chime.mp3"));
    let (label, done) = requests.recv().await.unwrap();
    assert_eq!(label, "Test Audio");
    done.send(PlaybackOutcome::Completed).unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(requests.try_recv().is_err(), "hymn must never start");
    assert!(!engine.playback_state().is_playing);
}

#[tokio::test]
async fn next_event_example_from_monday_morning() {
    let mut config = BellConfig::default();
    config.schedule.weekday_schedules.clear();
    let (engine, _events) = engine_with(&config, Arc::new(InstantSink::new()));

    let next = engine.next_event(at(3, 7, 49, 59)).unwrap();
    assert_eq!(next.category, Category::CombinedDaily);
    assert_eq!(next.time, TimeOfDay::new(7, 50));

    let next = engine.next_event(at(3, 7, 50, 1)).unwrap();
    assert_eq!(next.category, Category::HourlyTick);
    assert_eq!(next.time, TimeOfDay::new(8, 0));

    assert!(engine.next_event(at(3, 18, 0, 0)).is_none());
}

#[tokio::test]
async fn restart_allows_the_same_instant_again() {
    let (engine, mut events) = engine_with(&BellConfig::default(), Arc::new(InstantSink::new()));
    engine.start();

    assert!(engine.evaluate(at(3, 13, 0, 0)).is_some());
    assert!(engine.evaluate(at(3, 13, 0, 0)).is_none());

    engine.stop();
    assert!(engine.evaluate(at(3, 13, 0, 0)).is_none());

    engine.restart();
    assert!(engine.evaluate(at(3, 13, 0, 0)).is_some());
    engine.stop();

    let mut transitions = Vec::new();
    while let Ok(event) = events.try_recv() {
        if matches!(event, EngineEvent::Started | EngineEvent::Stopped) {
            transitions.push(event);
        }
    }
    assert_eq!(
        transitions,
        vec![
            EngineEvent::Started,
            EngineEvent::Stopped,
            EngineEvent::Started,
            EngineEvent::Stopped,
        ]
    );
}

#[tokio::test]
async fn fires_reach_the_activity_log_server() {
    let store = Arc::new(ActivityStore::open_in_memory().unwrap());
    let server_config = ServerConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        database: None,
    };
    let server = ActivityServer::start(Arc::clone(&store), &server_config)
        .await
        .unwrap();

    let sink = HttpActivitySink::new(
        format!("http://{}/api/activity-log", server.addr()),
        Duration::from_secs(2),
    )
    .unwrap();
    let (tx, _events) = mpsc::unbounded_channel();
    let engine = Engine::new(&BellConfig::default(), Arc::new(InstantSink::new()), tx)
        .unwrap()
        .with_activity_sink(Arc::new(sink));

    engine.evaluate(at(3, 9, 0, 0)).unwrap();

    let mut stored = Vec::new();
    for _ in 0..100 {
        stored = store.recent(10).unwrap();
        if !stored.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].event_type, "hourly_tick");
    assert_eq!(stored[0].event_time, "09:00:00");
    assert_eq!(stored[0].description, "Reminder Jam dimainkan");

    server.shutdown();
}

#[tokio::test]
async fn unreachable_activity_log_does_not_disturb_firing() {
    let sink =
        HttpActivitySink::new("http://127.0.0.1:9/api/activity-log", Duration::from_millis(200))
            .unwrap();
    let (tx, _events) = mpsc::unbounded_channel();
    let engine = Engine::new(&BellConfig::default(), Arc::new(InstantSink::new()), tx)
        .unwrap()
        .with_activity_sink(Arc::new(sink));

    assert!(engine.evaluate(at(3, 9, 0, 0)).is_some());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(engine.evaluate(at(3, 10, 0, 0)).is_some());
    assert_eq!(engine.recent_activity().len(), 2);
}
