use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use todos_api::core::models::{LogEvent, OperationKind};
use todos_api::infra::event_publisher::{EventPublisher, DEFAULT_PUBLISH_TIMEOUT};

use crate::common::{settle, wait_for_events, RecordingChannel, StalledChannel};

#[tokio::test]
async fn test_publishes_json_to_named_channel() {
    let channel = Arc::new(RecordingChannel::new());
    let publisher = EventPublisher::new(channel.clone(), "audit");
    assert_eq!(publisher.channel_name(), "audit");

    publisher.publish(LogEvent::new(OperationKind::Delete, "alice", 4, "f00d"));
    wait_for_events(&channel, 1).await;

    assert_eq!(channel.channels(), vec!["audit".to_string()]);
    assert_eq!(
        channel.events(),
        vec![serde_json::json!({"zipkinSpan": "f00d", "opName": "DELETE", "username": "alice", "todoId": 4})]
    );
}

#[tokio::test]
async fn test_channel_failure_is_swallowed() {
    let channel = Arc::new(RecordingChannel::new());
    channel.should_fail.store(true, Ordering::SeqCst);
    let publisher = EventPublisher::new(channel.clone(), "audit");

    publisher.publish(LogEvent::new(OperationKind::Create, "alice", 1, "t"));
    settle().await;

    assert_eq!(channel.count(), 0);

    channel.should_fail.store(false, Ordering::SeqCst);
    publisher.publish(LogEvent::new(OperationKind::Create, "alice", 2, "t"));
    wait_for_events(&channel, 1).await;
    assert_eq!(channel.events()[0]["todoId"], 2);
}

#[tokio::test]
async fn test_publish_returns_before_delivery() {
    let channel = Arc::new(RecordingChannel::new());
    let publisher = EventPublisher::new(channel.clone(), "audit");

    // current-thread runtime: the spawned send cannot run until we yield
    publisher.publish(LogEvent::new(OperationKind::Update, "bob", 9, "t"));
    assert_eq!(channel.count(), 0);

    wait_for_events(&channel, 1).await;
    assert_eq!(channel.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_channel_tasks_end_at_publish_timeout() {
    let channel = Arc::new(StalledChannel::default());
    let publisher = EventPublisher::new(channel.clone(), "audit");

    for id in 0..200 {
        publisher.publish(LogEvent::new(OperationKind::Create, "alice", id, "t"));
    }
    for _ in 0..1_000 {
        if channel.started.load(Ordering::SeqCst) == 200 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(channel.started.load(Ordering::SeqCst), 200);
    assert_eq!(channel.pending.load(Ordering::SeqCst), 200);

    tokio::time::sleep(DEFAULT_PUBLISH_TIMEOUT + Duration::from_millis(10)).await;

    assert_eq!(channel.pending.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_publish_timeout_is_honoured() {
    let channel = Arc::new(StalledChannel::default());
    let publisher =
        EventPublisher::new(channel.clone(), "audit").with_timeout(Duration::from_secs(5));

    publisher.publish(LogEvent::new(OperationKind::Delete, "bob", 3, "t"));
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(channel.pending.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(channel.pending.load(Ordering::SeqCst), 0);
}
