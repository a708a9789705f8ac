use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};

use super::{PeriodicPublisher, SnapshotSource};
use crate::broker::topic::TopicId;
use crate::broker::{Broker, ConnectionStream};
use crate::config::Settings;
use crate::store::Catalog;
use crate::utils::error::StoreError;

fn broker() -> Arc<Broker> {
    let broker = Broker::from_settings(&Settings::default().broker);
    broker.registry().declare("1").unwrap();
    broker.registry().declare("2").unwrap();
    Arc::new(broker)
}

async fn next_value(stream: &mut ConnectionStream) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended");
    serde_json::from_str(frame.as_str()).unwrap()
}

fn fixed(state: Value) -> Arc<dyn SnapshotSource> {
    Arc::new(move |_: &TopicId| -> Result<Value, StoreError> { Ok(state.clone()) })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn publishes_snapshots_to_subscribers() {
    let broker = broker();
    let (_conn, mut stream) = broker.open("1", None).unwrap();
    let _welcome = next_value(&mut stream).await;

    let publisher = PeriodicPublisher::new(broker.clone(), Duration::from_secs(30));
    let state = json!([{ "table_no": 1, "status": "available" }]);
    assert!(publisher.start("1", Duration::from_millis(20), fixed(state.clone())));
    assert!(!publisher.start("1", Duration::from_millis(20), fixed(state.clone())));

    assert_eq!(next_value(&mut stream).await, state);
    assert_eq!(next_value(&mut stream).await, state);
    assert!(publisher.stats().published >= 2);
    publisher.stop_all();
    assert_eq!(publisher.running(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn published_snapshot_matches_source() {
    let broker = broker();
    let catalog = Arc::new(Catalog::new(2, 3));
    catalog.update_status(1, 3, "occupied").unwrap();

    let (_conn, mut stream) = broker.open("1", None).unwrap();
    let _welcome = next_value(&mut stream).await;

    let publisher = PeriodicPublisher::new(broker.clone(), Duration::from_secs(30));
    publisher.start("1", Duration::from_secs(60), catalog.clone());

    let received = next_value(&mut stream).await;
    assert_eq!(received, catalog.snapshot(&"1".to_string()).unwrap());
    publisher.stop("1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_is_immediate_and_idempotent() {
    let broker = broker();
    let publisher = PeriodicPublisher::new(broker, Duration::from_secs(30));
    publisher.start("1", Duration::from_millis(10), fixed(json!([])));
    assert!(publisher.is_running("1"));
    assert!(publisher.stop("1"));
    assert!(!publisher.is_running("1"));
    assert!(!publisher.stop("1"));
    // restart after stop is allowed
    assert!(publisher.start("1", Duration::from_millis(10), fixed(json!([]))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_topic_stops_after_grace() {
    let broker = broker();
    let publisher = PeriodicPublisher::new(broker, Duration::from_millis(50));
    publisher.start("2", Duration::from_millis(10), fixed(json!([])));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!publisher.is_running("2"));
    assert_eq!(publisher.stats().published, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn occupied_topic_keeps_running() {
    let broker = broker();
    let (_conn, _stream) = broker.open("2", None).unwrap();
    let publisher = PeriodicPublisher::new(broker.clone(), Duration::from_millis(50));
    publisher.start("2", Duration::from_millis(10), fixed(json!([])));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(publisher.is_running("2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_source_drops_ticks() {
    let broker = broker();
    let (_conn, _stream) = broker.open("1", None).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let slow: Arc<dyn SnapshotSource> = Arc::new(move |_: &TopicId| -> Result<Value, StoreError> {
        counted.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(150));
        Ok(json!([]))
    });

    let publisher = PeriodicPublisher::new(broker.clone(), Duration::from_secs(30));
    publisher.start("1", Duration::from_millis(20), slow);
    tokio::time::sleep(Duration::from_millis(250)).await;
    publisher.stop("1");

    let stats = publisher.stats();
    assert!(stats.skipped_ticks >= 3, "stats: {stats:?}");
    assert!(calls.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_fetch_is_skipped() {
    let broker = broker();
    let (_conn, _stream) = broker.open("1", None).unwrap();
    let failing: Arc<dyn SnapshotSource> = Arc::new(|topic: &TopicId| -> Result<Value, StoreError> {
        Err(StoreError::StoreNotFound(topic.clone()))
    });

    let publisher = PeriodicPublisher::new(broker.clone(), Duration::from_secs(30));
    publisher.start("1", Duration::from_millis(20), failing);
    tokio::time::sleep(Duration::from_millis(150)).await;
    publisher.stop("1");

    let stats = publisher.stats();
    assert!(stats.failed_fetches >= 2);
    assert_eq!(stats.published, 0);
    assert!(broker.registry().subscriber_count("1").unwrap() == 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_after_stop_all_is_refused() {
    let broker = broker();
    let publisher = PeriodicPublisher::new(broker, Duration::from_secs(30));
    assert!(publisher.start("1", Duration::from_millis(10), fixed(json!([]))));

    publisher.stop_all();
    assert!(!publisher.start("2", Duration::from_millis(10), fixed(json!([]))));
    assert!(!publisher.is_running("2"));
    assert_eq!(publisher.running(), 0);
}
