//! Integration tests for phased countdowns on a virtual clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use phasecount_core::{
    alert, AlertMapper, Broadcaster, Config, CountdownEngine, Event, ManualScheduler,
    MemoryBroadcaster, Phase,
};
use proptest::prelude::*;

/// Message log entries stamped with the virtual time they were broadcast at.
#[derive(Clone, Default)]
struct TimedSink {
    scheduler: ManualScheduler,
    log: Arc<Mutex<Vec<(u64, String)>>>,
}

impl TimedSink {
    fn new(scheduler: &ManualScheduler) -> Self {
        Self {
            scheduler: scheduler.clone(),
            log: Arc::default(),
        }
    }

    fn at(&self, text: &str) -> Vec<u64> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| m == text)
            .map(|(t, _)| *t)
            .collect()
    }

    fn messages(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }
}

impl Broadcaster for TimedSink {
    fn broadcast_message(&self, text: &str) {
        let now = self.scheduler.now().as_secs();
        self.log.lock().unwrap().push((now, text.to_string()));
    }
}

fn lobby_phases(sink: Arc<dyn Broadcaster>) -> Vec<Phase> {
    let ten = Arc::clone(&sink);
    let five = Arc::clone(&sink);
    let alerts = AlertMapper::from_durations([
        (
            Duration::from_secs(10),
            alert(move |id| ten.broadcast_message(&format!("> 10 seconds to start: {id}"))),
        ),
        (
            Duration::from_secs(5),
            alert(move |id| five.broadcast_message(&format!("> 5 seconds to start: {id}"))),
        ),
    ])
    .unwrap();

    let prepare = Phase::new(Duration::from_secs(15), alerts.to_countdown_ticker()).unwrap();
    let active = Phase::new(
        Duration::from_secs(10),
        move |id: &str, sec: u64, _: Duration| {
            sink.broadcast_message(&format!("[{id}] Game ongoing... Seconds left: {sec}"))
        },
    )
    .unwrap();
    vec![prepare, active]
}

fn start_lobby(engine: &CountdownEngine, sink: &TimedSink, id: &str) {
    let finish = sink.clone();
    let cancel = sink.clone();
    engine
        .start_phased_countdown(
            id,
            lobby_phases(Arc::new(sink.clone())),
            move |id, _| finish.broadcast_message(&format!("> Countdown finished for {id}")),
            move |id| cancel.broadcast_message(&format!("> Countdown cancelled for: {id}")),
        )
        .unwrap();
}

#[test]
fn test_phased_countdown_broadcast_timeline() {
    let scheduler = ManualScheduler::new();
    let engine = CountdownEngine::new(Arc::new(scheduler.clone()));
    let sink = TimedSink::new(&scheduler);

    start_lobby(&engine, &sink, "countdown-id");
    scheduler.advance_secs(30);

    assert_eq!(sink.at("> 10 seconds to start: countdown-id"), vec![5]);
    assert_eq!(sink.at("> 5 seconds to start: countdown-id"), vec![10]);
    assert_eq!(sink.at("[countdown-id] Game ongoing... Seconds left: 10"), vec![15]);
    assert_eq!(sink.at("[countdown-id] Game ongoing... Seconds left: 1"), vec![24]);
    assert_eq!(sink.at("> Countdown finished for countdown-id"), vec![25]);
    assert!(sink.at("> Countdown cancelled for: countdown-id").is_empty());
    assert_eq!(sink.messages().len(), 2 + 10 + 1);
}

#[test]
fn test_cancel_mid_run_emits_single_cancel_message() {
    let scheduler = ManualScheduler::new();
    let engine = CountdownEngine::new(Arc::new(scheduler.clone()));
    let sink = TimedSink::new(&scheduler);

    start_lobby(&engine, &sink, "countdown-id");
    scheduler.advance_secs(7);
    engine.cancel("countdown-id");
    engine.cancel("countdown-id");
    scheduler.advance_secs(30);

    assert_eq!(sink.at("> Countdown cancelled for: countdown-id"), vec![8]);
    assert_eq!(sink.at("> 10 seconds to start: countdown-id"), vec![5]);
    assert!(sink.at("> 5 seconds to start: countdown-id").is_empty());
    assert!(sink.at("> Countdown finished for countdown-id").is_empty());
    assert!(!engine.has_countdown("countdown-id"));
}

#[test]
fn test_distinct_ids_are_independent() {
    let scheduler = ManualScheduler::new();
    let engine = CountdownEngine::new(Arc::new(scheduler.clone()));
    let sink = TimedSink::new(&scheduler);

    start_lobby(&engine, &sink, "north");
    scheduler.advance_secs(3);
    start_lobby(&engine, &sink, "south");
    scheduler.advance_secs(4);
    engine.cancel("north");
    scheduler.advance_secs(40);

    assert_eq!(sink.at("> Countdown cancelled for: north"), vec![8]);
    assert_eq!(sink.at("> 10 seconds to start: south"), vec![8]);
    assert_eq!(sink.at("> Countdown finished for south"), vec![28]);
    assert!(sink.at("> Countdown cancelled for: south").is_empty());
}

#[test]
fn test_alerts_fire_once_per_phase_execution() {
    let scheduler = ManualScheduler::new();
    let engine = CountdownEngine::new(Arc::new(scheduler.clone()));
    let sink = MemoryBroadcaster::new();

    let shared: Arc<dyn Broadcaster> = Arc::new(sink.clone());
    let alerts = AlertMapper::<str>::new()
        .with_alert(Duration::from_secs(2), move |id: &str| {
            shared.broadcast_message(&format!("two:{id}"))
        })
        .unwrap();
    let phase = Phase::from_secs(4, alerts.to_countdown_ticker());

    // One phase template reused three times in the same countdown.
    engine
        .start_phased_countdown("reuse", vec![phase.clone(), phase.clone(), phase], |_, _| {}, |_| {})
        .unwrap();
    scheduler.advance_secs(20);

    assert_eq!(sink.count("two:reuse"), 3);
}

#[test]
fn test_events_from_preset_run() {
    let scheduler = ManualScheduler::new();
    let engine = CountdownEngine::new(Arc::new(scheduler.clone()));
    let mut events = engine.subscribe();
    let sink = MemoryBroadcaster::new();

    let config = Config::default();
    let preset = config.preset("match-start").unwrap();
    preset.start(&engine, "arena", Arc::new(sink.clone())).unwrap();
    scheduler.advance_secs(25);

    assert_eq!(
        sink.messages().first().map(String::as_str),
        Some("> 10 seconds to start: arena")
    );
    assert_eq!(
        sink.messages().last().map(String::as_str),
        Some("> Countdown finished for arena")
    );

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    let kinds: Vec<&str> = seen
        .iter()
        .map(|e| match e {
            Event::CountdownStarted { .. } => "started",
            Event::PhaseStarted { .. } => "phase",
            Event::CountdownFinished { .. } => "finished",
            Event::CountdownCancelled { .. } => "cancelled",
            Event::CountdownFaulted { .. } => "faulted",
            Event::CountdownClosed { .. } => "closed",
        })
        .collect();
    assert_eq!(kinds, vec!["started", "phase", "phase", "finished", "closed"]);
    assert!(seen.iter().all(|e| e.countdown_id() == "arena"));
}

#[test]
fn test_cancel_from_tick_callback_stops_before_next_tick() {
    let scheduler = ManualScheduler::new();
    let engine = CountdownEngine::new(Arc::new(scheduler.clone()));
    let sink = MemoryBroadcaster::new();

    let canceller = engine.clone();
    let ticks = sink.clone();
    let phase = Phase::from_secs(10, move |id: &str, sec: u64, _: Duration| {
        ticks.broadcast_message(&format!("tick {sec}"));
        if sec == 8 {
            canceller.cancel(id);
        }
    });
    let cancelled = sink.clone();
    engine
        .start_phased_countdown(
            "self-cancel",
            vec![phase],
            |_, _| {},
            move |id| cancelled.broadcast_message(&format!("cancelled {id}")),
        )
        .unwrap();
    scheduler.advance_secs(15);

    assert_eq!(
        sink.messages(),
        vec!["tick 10", "tick 9", "tick 8", "cancelled self-cancel"]
    );
}

proptest! {
    #[test]
    fn finish_fires_once_after_total_duration(durations in proptest::collection::vec(0u64..6, 1..6)) {
        let scheduler = ManualScheduler::new();
        let engine = CountdownEngine::new(Arc::new(scheduler.clone()));
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let finishes = Arc::new(Mutex::new(Vec::new()));

        let phases: Vec<Phase> = durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let ticks = ticks.clone();
                Phase::from_secs(*d, move |_: &str, sec: u64, elapsed: Duration| {
                    ticks.lock().unwrap().push((i, sec, elapsed.as_secs()));
                })
            })
            .collect();
        let total: u64 = durations.iter().sum();

        let done = finishes.clone();
        engine
            .start_phased_countdown(
                "prop",
                phases,
                move |_, elapsed| done.lock().unwrap().push(elapsed),
                |_| {},
            )
            .unwrap();
        scheduler.advance_secs(total + 3);

        let ticks = ticks.lock().unwrap();
        prop_assert_eq!(ticks.len() as u64, total);
        // Phases in order, remaining time strictly decreasing within a phase,
        // elapsed counting every delivered tick.
        for (n, window) in ticks.windows(2).enumerate() {
            let ((pa, sa, _), (pb, sb, eb)) = (window[0], window[1]);
            prop_assert!(pa < pb || (pa == pb && sb + 1 == sa));
            prop_assert_eq!(eb, n as u64 + 1);
        }
        prop_assert_eq!(finishes.lock().unwrap().clone(), vec![Duration::from_secs(total)]);
        prop_assert!(!engine.has_countdown("prop"));
    }
}
