mod common;

use common::{MemLedger, MemStore, StubSender, fast_retry, wait_until};
use pulse_telemetry::app::config::{BatchConfig, BatchSizeConfig, EngagementConfig};
use pulse_telemetry::app::{Lifecycle, LifecycleEvent};
use pulse_telemetry::buffer::{AssemblerHandle, EventAssembler, UserEngagement};
use pulse_telemetry::domain::AppMeta;
use pulse_telemetry::engine::{BatchEngine, EngineDeps};
use pulse_telemetry::storage::{Counter, MemoryCounter, MemoryPressure};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    assembler: AssemblerHandle,
    sender: StubSender,
    lifecycle: Lifecycle,
    pressure: MemoryPressure,
}

fn spawn_pipeline(batch: BatchConfig, engagement: EngagementConfig) -> Harness {
    let sender = StubSender::default();
    let pressure = MemoryPressure::new();
    let counter: Arc<dyn Counter> = Arc::new(MemoryCounter::default());
    let sizes = BatchSizeConfig::default();
    let lifecycle = Lifecycle::new();

    let engine = BatchEngine::spawn(
        EngineDeps {
            sender: Arc::new(sender.clone()),
            store: Box::new(MemStore::default()),
            ledger: Box::new(MemLedger::default()),
            counter: Arc::clone(&counter),
            meta: Box::new(AppMeta::with_base(Map::new())),
            pressure: pressure.clone(),
        },
        fast_retry(),
        sizes.clone(),
        CancellationToken::new(),
    );
    let assembler = EventAssembler::spawn(
        engine,
        counter,
        pressure.clone(),
        &batch,
        &sizes,
        &engagement,
        lifecycle.subscribe(),
        CancellationToken::new(),
    );
    Harness {
        assembler,
        sender,
        lifecycle,
        pressure,
    }
}

fn slow_timers() -> BatchConfig {
    BatchConfig {
        size: 3,
        sending_timer_interval_secs: 60.0,
        ..BatchConfig::default()
    }
}

#[tokio::test]
async fn seals_on_count_threshold_and_merges_common_parameters() {
    let h = spawn_pipeline(slow_timers(), EngagementConfig { timer_interval_secs: 60.0 });

    let mut common_params = Map::new();
    common_params.insert("app".to_string(), json!("demo"));
    common_params.insert("screen".to_string(), json!("home"));
    h.assembler.set_common_parameters(common_params).await;

    let mut explicit = Map::new();
    explicit.insert("screen".to_string(), json!("cart"));
    h.assembler.add_event("view", Some(explicit)).await;
    h.assembler.add_event("tap", None).await;
    h.assembler.add_event("scroll", None).await;

    wait_until("sealed batch delivery", || h.sender.sent_count() == 1).await;
    let events = h.sender.sent_events(0);
    assert_eq!(events.len(), 3);

    // Explicit parameters win over common ones; common fill the gaps.
    assert_eq!(events[0].data["screen"], "cart");
    assert_eq!(events[0].data["app"], "demo");
    assert_eq!(events[1].data["screen"], "home");

    // Event sequence numbers are monotonically assigned.
    let nums: Vec<i64> = events.iter().map(|e| e.event_num).collect();
    assert_eq!(nums, vec![1, 2, 3]);
}

#[tokio::test]
async fn periodic_timer_seals_a_partial_buffer() {
    let batch = BatchConfig {
        size: 100,
        sending_timer_interval_secs: 0.05,
        ..BatchConfig::default()
    };
    let h = spawn_pipeline(batch, EngagementConfig { timer_interval_secs: 60.0 });

    h.assembler.add_event("lone", None).await;
    wait_until("timer-driven seal", || h.sender.sent_count() == 1).await;
    assert_eq!(h.sender.sent_events(0)[0].name, "lone");
}

#[tokio::test]
async fn background_stops_the_timer_and_foreground_restarts_it() {
    let batch = BatchConfig {
        size: 100,
        sending_timer_interval_secs: 0.05,
        ..BatchConfig::default()
    };
    let h = spawn_pipeline(batch, EngagementConfig { timer_interval_secs: 60.0 });

    h.lifecycle.notify(LifecycleEvent::EnterBackground);
    tokio::time::sleep(Duration::from_millis(100)).await;

    h.assembler.add_event("buffered", None).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.sender.sent_count(), 0, "timer must stay cancelled in background");

    h.lifecycle.notify(LifecycleEvent::EnterForeground);
    wait_until("seal after foreground restart", || h.sender.sent_count() == 1).await;
    assert_eq!(h.sender.sent_events(0)[0].name, "buffered");
}

#[tokio::test]
async fn termination_seals_whatever_is_buffered() {
    let h = spawn_pipeline(slow_timers(), EngagementConfig { timer_interval_secs: 60.0 });

    h.assembler.add_event("one", None).await;
    h.assembler.add_event("two", None).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.sender.sent_count(), 0);

    h.lifecycle.notify(LifecycleEvent::WillTerminate);
    wait_until("terminate-driven seal", || h.sender.sent_count() == 1).await;
    assert_eq!(h.sender.sent_events(0).len(), 2);
}

#[tokio::test]
async fn engagement_timer_reports_the_current_screen() {
    let batch = BatchConfig {
        size: 100,
        sending_timer_interval_secs: 0.08,
        ..BatchConfig::default()
    };
    let h = spawn_pipeline(batch, EngagementConfig { timer_interval_secs: 0.05 });

    h.assembler
        .set_user_engagement(Some(UserEngagement {
            screen_name: "cart".to_string(),
            text_size: None,
        }))
        .await;

    wait_until("an engagement event arrives", || {
        (0..h.sender.sent_count()).any(|i| {
            h.sender
                .sent_events(i)
                .iter()
                .any(|e| e.name == "user_engagement")
        })
    })
    .await;

    let engagement_event = (0..h.sender.sent_count())
        .flat_map(|i| h.sender.sent_events(i))
        .find(|e| e.name == "user_engagement")
        .unwrap();
    assert_eq!(engagement_event.data["screen_name"], Value::from("cart"));
}

#[tokio::test]
async fn sync_events_skip_the_buffer() {
    let h = spawn_pipeline(slow_timers(), EngagementConfig { timer_interval_secs: 60.0 });

    assert!(h.assembler.add_event_sync("checkout", None).await);
    assert_eq!(h.sender.sent_count(), 1);
    assert_eq!(h.sender.sent_events(0)[0].name, "checkout");
}

#[tokio::test]
async fn constrained_pressure_seals_each_event_immediately() {
    let h = spawn_pipeline(slow_timers(), EngagementConfig { timer_interval_secs: 60.0 });

    h.pressure.set_constrained();
    h.assembler.add_event("urgent", None).await;
    wait_until("immediate seal under pressure", || h.sender.sent_count() == 1).await;
    assert_eq!(h.sender.sent_events(0)[0].name, "urgent");
}
