//! End-to-end pipeline tests on paused tokio time.
//!
//! Delivery is scripted through a recording transport so every outcome
//! (success, session gone, transient failure) can be exercised without a
//! network, and the inactivity trigger is driven by advancing the paused
//! clock instead of real wall time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;

use keyflow::beacon::BestEffortTransport;
use keyflow::delivery::{DeliveryOutcome, IngestTransport};
use keyflow::{EventType, FailureCache, FlushPolicy, PipelineHandle, TelemetryEvent};

/// Transport that records every call and replays scripted outcomes.
/// Defaults to `Delivered` once the script runs out.
#[derive(Debug, Default)]
struct ScriptedTransport {
    outcomes: Mutex<VecDeque<DeliveryOutcome>>,
    calls: Mutex<Vec<(String, Vec<TelemetryEvent>)>>,
}

impl ScriptedTransport {
    fn scripted(outcomes: Vec<DeliveryOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn accepting() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn calls(&self) -> Vec<(String, Vec<TelemetryEvent>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IngestTransport for ScriptedTransport {
    async fn send_batch(&self, session_id: &str, events: &[TelemetryEvent]) -> DeliveryOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((session_id.to_string(), events.to_vec()));
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DeliveryOutcome::Delivered)
    }
}

/// Beacon that records fires synchronously.
#[derive(Debug, Default)]
struct RecordingBeacon {
    fired: Mutex<Vec<(String, Vec<TelemetryEvent>)>>,
}

impl RecordingBeacon {
    fn fired(&self) -> Vec<(String, Vec<TelemetryEvent>)> {
        self.fired.lock().unwrap().clone()
    }
}

impl BestEffortTransport for RecordingBeacon {
    fn fire(&self, session_id: &str, events: Vec<TelemetryEvent>) {
        self.fired
            .lock()
            .unwrap()
            .push((session_id.to_string(), events));
    }
}

struct Harness {
    handle: PipelineHandle,
    join: JoinHandle<()>,
    transport: Arc<ScriptedTransport>,
    beacon: Arc<RecordingBeacon>,
    cache: FailureCache,
    _dir: tempfile::TempDir,
    start: DateTime<Utc>,
}

impl Harness {
    fn new(transport: Arc<ScriptedTransport>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cache = FailureCache::new(dir.path().join("failed_events.json"));
        let beacon = Arc::new(RecordingBeacon::default());
        let (handle, join) = PipelineHandle::spawn(
            FlushPolicy::default(),
            transport.clone(),
            cache.clone(),
            beacon.clone(),
        );
        Self {
            handle,
            join,
            transport,
            beacon,
            cache,
            _dir: dir,
            start: Utc::now(),
        }
    }

    async fn bind(&self, session_id: &str) {
        self.handle
            .bind_session(Some(session_id.to_string()), self.start)
            .await
            .unwrap();
    }

    /// Add `count` down events with distinct key codes and increasing
    /// offsets, so order is observable in delivered batches.
    fn add_events(&self, count: usize) {
        for i in 0..count {
            let at = self.start + TimeDelta::milliseconds(i as i64 * 10);
            self.handle
                .add_event_at(EventType::Down, &format!("Key{i}"), false, at);
        }
    }
}

/// Let the actor drain its command queue without reaching the idle deadline.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_size_trigger_fires_at_exactly_fifty() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;

    harness.add_events(49);
    settle().await;
    assert_eq!(harness.transport.call_count(), 0, "flush fired before 50");

    harness
        .handle
        .add_event_at(EventType::Down, "Key49", false, harness.start);
    settle().await;

    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "s1");
    assert_eq!(calls[0].1.len(), 50);

    // The 50th-event flush drained the buffer; a later flush only carries
    // what was added after it.
    harness.add_events(1);
    harness.handle.flush().await.unwrap();
    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].1.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_idle_flush_fires_after_five_seconds() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;

    harness.add_events(10);
    tokio::time::sleep(Duration::from_millis(4_999)).await;
    assert_eq!(harness.transport.call_count(), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_each_add_rearms_the_idle_timer() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;

    harness.add_events(1);
    tokio::time::sleep(Duration::from_secs(3)).await;

    harness
        .handle
        .add_event_at(EventType::Up, "Key0", false, harness.start);
    tokio::time::sleep(Duration::from_secs(3)).await;
    // 6s since the first add, but only 3s since the last one.
    assert_eq!(harness.transport.call_count(), 0);

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_network_call_without_a_session() {
    let harness = Harness::new(ScriptedTransport::accepting());

    harness.add_events(100);
    harness.handle.flush().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(harness.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delivered_batch_preserves_enqueue_order() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;

    harness.add_events(5);
    harness.handle.flush().await.unwrap();

    let calls = harness.transport.calls();
    let codes: Vec<String> = calls[0].1.iter().map(|e| e.key_code.clone()).collect();
    assert_eq!(codes, vec!["Key0", "Key1", "Key2", "Key3", "Key4"]);

    let offsets: Vec<i64> = calls[0].1.iter().map(|e| e.timestamp_offset).collect();
    assert_eq!(offsets, vec![0, 10, 20, 30, 40]);
}

#[tokio::test(start_paused = true)]
async fn test_double_flush_performs_one_network_call() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;

    harness.add_events(3);
    harness.handle.flush().await.unwrap();
    harness.handle.flush().await.unwrap();

    assert_eq!(harness.transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_caches_batch_and_next_success_clears() {
    let harness = Harness::new(ScriptedTransport::scripted(vec![
        DeliveryOutcome::Transient("connection refused".to_string()),
    ]));
    harness.bind("s1").await;

    harness.add_events(3);
    harness.handle.flush().await.unwrap();

    let cached = harness.cache.load().unwrap();
    assert_eq!(cached.len(), 3);
    let codes: Vec<String> = cached.iter().map(|e| e.key_code.clone()).collect();
    assert_eq!(codes, vec!["Key0", "Key1", "Key2"]);

    // Next delivery succeeds; the cache is cleared.
    harness.add_events(2);
    harness.handle.flush().await.unwrap();
    assert!(harness.cache.is_empty().unwrap());
    assert_eq!(harness.transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_session_gone_drops_batch_without_caching() {
    let harness = Harness::new(ScriptedTransport::scripted(vec![
        DeliveryOutcome::SessionGone,
    ]));
    harness.bind("s1").await;

    harness.add_events(4);
    harness.handle.flush().await.unwrap();

    assert!(harness.cache.is_empty().unwrap());
    // Dropped outright: no retry, no second call.
    assert_eq!(harness.transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_appends_to_existing_cache_in_order() {
    let harness = Harness::new(ScriptedTransport::scripted(vec![
        DeliveryOutcome::Transient("500".to_string()),
        DeliveryOutcome::Transient("502".to_string()),
    ]));
    harness.bind("s1").await;

    harness.add_events(2);
    harness.handle.flush().await.unwrap();
    harness.add_events(1);
    harness.handle.flush().await.unwrap();

    let cached = harness.cache.load().unwrap();
    let codes: Vec<String> = cached.iter().map(|e| e.key_code.clone()).collect();
    assert_eq!(codes, vec!["Key0", "Key1", "Key0"]);
}

#[tokio::test(start_paused = true)]
async fn test_success_clears_cache_even_for_an_unrelated_batch() {
    // Documented behavior: any success clears the slot, regardless of which
    // session the cached events belonged to.
    let harness = Harness::new(ScriptedTransport::scripted(vec![
        DeliveryOutcome::Transient("down".to_string()),
    ]));
    harness.bind("s1").await;
    harness.add_events(2);
    harness.handle.flush().await.unwrap();
    assert_eq!(harness.cache.len().unwrap(), 2);

    harness.bind("s2").await;
    harness.add_events(1);
    harness.handle.flush().await.unwrap();
    assert!(harness.cache.is_empty().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_rebinding_discards_buffered_events() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;
    harness.add_events(5);
    settle().await;

    harness.bind("s2").await;
    harness.handle.flush().await.unwrap();

    assert_eq!(harness.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rebinding_cancels_the_idle_timer() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;
    harness.add_events(5);
    settle().await;

    harness.bind("s2").await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(harness.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unbinding_makes_pipeline_inert() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;
    harness
        .handle
        .bind_session(None, harness.start)
        .await
        .unwrap();

    harness.add_events(60);
    harness.handle.flush().await.unwrap();

    assert_eq!(harness.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_end_session_flushes_then_goes_inert() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;
    harness.add_events(3);

    harness.handle.end_session().await.unwrap();
    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.len(), 3);

    // Events after session end go nowhere.
    harness.add_events(2);
    harness.handle.flush().await.unwrap();
    assert_eq!(harness.transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_remaining_events() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;
    harness.add_events(2);

    harness.handle.shutdown().await.unwrap();
    harness.join.await.unwrap();

    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.len(), 2);
    assert!(harness.beacon.fired().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_abrupt_drop_fires_the_beacon_with_remaining_events() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;
    harness.add_events(3);
    settle().await;

    drop(harness.handle);
    harness.join.await.unwrap();

    let fired = harness.beacon.fired();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].0, "s1");
    assert_eq!(fired[0].1.len(), 3);
    // The classified path never ran.
    assert_eq!(harness.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abrupt_drop_with_empty_buffer_stays_silent() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;

    drop(harness.handle);
    harness.join.await.unwrap();

    assert!(harness.beacon.fired().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_event_before_session_start_is_discarded() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;

    let before = harness.start - TimeDelta::milliseconds(10);
    harness
        .handle
        .add_event_at(EventType::Down, "KeyA", false, before);
    harness
        .handle
        .add_event_at(EventType::Down, "KeyB", false, harness.start);

    harness.handle.flush().await.unwrap();

    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.len(), 1);
    assert_eq!(calls[0].1[0].key_code, "KeyB");
}

#[tokio::test(start_paused = true)]
async fn test_fingers_are_classified_at_enqueue_time() {
    let harness = Harness::new(ScriptedTransport::accepting());
    harness.bind("s1").await;

    harness
        .handle
        .add_event_at(EventType::Down, "KeyA", false, harness.start);
    harness
        .handle
        .add_event_at(EventType::Down, "Space", false, harness.start);
    harness.handle.flush().await.unwrap();

    let calls = harness.transport.calls();
    assert_eq!(calls[0].1[0].finger_used, keyflow::FingerPosition::LPinky);
    assert_eq!(calls[0].1[1].finger_used, keyflow::FingerPosition::RThumb);
}
