#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use cometd_client::runtime::{Event, TokioScheduler};
use cometd_client::timer::{DelayedAction, Scheduler, TimerTask};
use cometd_client::{ClientConfig, Runtime, Status};

fn next_timer(event: Option<Event>) -> (u64, TimerTask) {
    match event {
        Some(Event::Timer(timer)) => (timer.id, timer.task),
        _ => panic!("expected a timer event"),
    }
}

#[tokio::test(start_paused = true)]
async fn timers_fire_in_deadline_order() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = TokioScheduler::new(tx.downgrade());

    let slow = scheduler.schedule(
        Duration::from_millis(200),
        TimerTask::Delayed(DelayedAction::Connect),
    );
    let fast = scheduler.schedule(
        Duration::from_millis(100),
        TimerTask::Delayed(DelayedAction::Handshake),
    );
    assert_eq!(scheduler.pending(), 2);

    let (id, task) = next_timer(rx.recv().await);
    assert_eq!(id, fast);
    assert_eq!(task, TimerTask::Delayed(DelayedAction::Handshake));

    let (id, _) = next_timer(rx.recv().await);
    assert_eq!(id, slow);
    assert_eq!(scheduler.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_timer_never_fires() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = TokioScheduler::new(tx.downgrade());

    let cancelled = scheduler.schedule(
        Duration::from_millis(50),
        TimerTask::Delayed(DelayedAction::Connect),
    );
    let kept = scheduler.schedule(
        Duration::from_millis(100),
        TimerTask::Delayed(DelayedAction::Connect),
    );
    scheduler.cancel(cancelled);

    let (id, _) = next_timer(rx.recv().await);
    assert_eq!(id, kept);
    assert_ne!(id, cancelled);
}

#[tokio::test]
async fn handle_reaches_the_event_loop() {
    let runtime = Runtime::start(ClientConfig::new("http://127.0.0.1:9/cometd")).unwrap();
    let cometd = runtime.handle();

    assert_eq!(cometd.status().await.unwrap(), Status::Disconnected);
    let types = cometd.call(|c| c.transport_types()).await.unwrap();
    assert_eq!(types, vec!["long-polling", "callback-polling"]);

    let err = cometd.publish("/foo", json!({"x": 1})).await.unwrap_err();
    assert_eq!(err.code().as_str(), "INVALID_STATE");

    cometd.shutdown();
    runtime.join().await;
    assert!(cometd.status().await.is_err());
}

#[test]
fn start_rejects_invalid_config() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(async {
        assert!(Runtime::start(ClientConfig::default()).is_err());
    });
}
