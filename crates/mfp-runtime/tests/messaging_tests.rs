//! Integration tests for topic messaging.
//!
//! Runs a full platform over the in-process transport and covers:
//! - Connect handshake outcomes
//! - Retained messages
//! - Subscriber counts
//! - Request/reply
//! - Cleanup when a document unloads

use mfp_message::{
    BrokerEvent, ClientCommand, ConnectRefusal, Envelope, MessagingError, TopicMessage,
};
use mfp_runtime::client::SubscriberCountStream;
use mfp_runtime::config::{ApplicationConfig, PlatformConfig};
use mfp_runtime::{HostPlatform, StaticManifestLoader};
use mfp_types::SubscriberId;
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;

// =============================================================================
// Test Fixtures
// =============================================================================

const ORIGIN_A: &str = "http://a.test";
const ORIGIN_B: &str = "http://b.test";
const WAIT: Duration = Duration::from_secs(2);

fn manifest(name: &str) -> mfp_message::ApplicationManifest {
    serde_json::from_value(json!({ "name": name })).unwrap()
}

async fn start() -> HostPlatform {
    let loader = StaticManifestLoader::new()
        .with("http://a.test/manifest.json", manifest("App A"))
        .with("http://b.test/manifest.json", manifest("App B"));

    let mut config = PlatformConfig::default();
    config.host.origin = "http://host.test".into();
    config.messaging.broker_discover_timeout_ms = 300;
    config.messaging.request_timeout_ms = 5_000;
    config.apps = vec![
        ApplicationConfig::new("app-a", "http://a.test/manifest.json"),
        ApplicationConfig::new("app-b", "http://b.test/manifest.json"),
    ];

    HostPlatform::start(config, &loader).await.expect("platform starts")
}

/// Waits until the broker reports `expected` subscribers on `topic`.
async fn await_count(platform: &HostPlatform, topic: &str, expected: usize) {
    let poll = async {
        loop {
            let count = platform.broker().subscriber_count(topic).await.unwrap();
            if count == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    timeout(WAIT, poll)
        .await
        .unwrap_or_else(|_| panic!("topic '{topic}' never reached {expected} subscribers"));
}

async fn next_count(counts: &mut SubscriberCountStream) -> usize {
    timeout(WAIT, counts.recv()).await.unwrap().unwrap()
}

// =============================================================================
// Handshake
// =============================================================================

#[tokio::test]
async fn registered_application_connects() {
    let platform = start().await;
    let client = platform.connect_client("app-a", ORIGIN_A);

    let id = client.connected().await.unwrap();

    assert_eq!(client.client_id(), Some(id));
    platform.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_application_is_refused() {
    let platform = start().await;
    let client = platform.connect_client("ghost", ORIGIN_A);

    let err = client.connected().await.unwrap_err();

    assert!(matches!(
        err,
        MessagingError::ConnectRefused {
            code: ConnectRefusal::Rejected,
            ..
        }
    ));
}

#[tokio::test]
async fn wrong_origin_times_out_discovery() {
    let platform = start().await;
    let client = platform.connect_client("app-a", "http://evil.test");

    let err = timeout(WAIT, client.connected()).await.unwrap().unwrap_err();

    assert!(matches!(err, MessagingError::BrokerDiscoverTimeout { .. }));
    let publish = client.publish(TopicMessage::new("news")).await;
    assert!(matches!(
        publish,
        Err(MessagingError::BrokerDiscoverTimeout { .. })
    ));
}

// =============================================================================
// Retained Messages
// =============================================================================

#[tokio::test]
async fn retained_message_replays_until_cleared() {
    let platform = start().await;
    let publisher = platform.connect_client("app-a", ORIGIN_A);
    let subscriber = platform.connect_client("app-b", ORIGIN_B);

    publisher
        .publish(
            TopicMessage::new("weather/zurich")
                .with_body(json!({"celsius": 21}))
                .retained(true),
        )
        .await
        .unwrap();

    let mut late = subscriber.subscribe("weather/zurich").await.unwrap();
    let replayed = timeout(WAIT, late.recv()).await.unwrap().unwrap();
    assert_eq!(replayed.body, Some(json!({"celsius": 21})));
    assert_eq!(replayed.headers.app_symbolic_name(), Some("app-a"));

    // Empty retained publish clears without reaching subscribers
    publisher
        .publish(TopicMessage::new("weather/zurich").retained(true))
        .await
        .unwrap();
    let mut later = subscriber.subscribe("weather/zurich").await.unwrap();
    assert!(later.try_recv().is_none());
    assert!(late.try_recv().is_none());
}

#[tokio::test]
async fn message_reaches_each_local_subscription_once() {
    let platform = start().await;
    let publisher = platform.connect_client("app-a", ORIGIN_A);
    let subscriber = platform.connect_client("app-b", ORIGIN_B);

    let mut first = subscriber.subscribe("news").await.unwrap();
    let mut second = subscriber.subscribe("news").await.unwrap();
    publisher
        .publish(TopicMessage::new("news").with_body("hello"))
        .await
        .unwrap();

    for sub in [&mut first, &mut second] {
        let message = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        assert_eq!(message.body, Some(json!("hello")));
        assert!(sub.try_recv().is_none());
    }
}

#[tokio::test]
async fn retained_publish_racing_a_subscribe_arrives_once() {
    let platform = start().await;
    let publisher = platform.connect_client("app-a", ORIGIN_A);
    let subscriber = platform.connect_client("app-b", ORIGIN_B);

    for round in 0..20 {
        let topic = format!("race/{round}");
        let mut existing = subscriber.subscribe(topic.as_str()).await.unwrap();

        let (published, joined) = tokio::join!(
            publisher.publish(TopicMessage::new(topic.as_str()).with_body("m").retained(true)),
            subscriber.subscribe(topic.as_str()),
        );
        published.unwrap();
        let mut joined = joined.unwrap();

        for sub in [&mut existing, &mut joined] {
            let message = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
            assert_eq!(message.body, Some(json!("m")));
            let extra = timeout(Duration::from_millis(50), sub.recv()).await;
            assert!(extra.is_err(), "round {round}: duplicate delivery {extra:?}");
        }
    }
}

// =============================================================================
// Subscriber Counts
// =============================================================================

#[tokio::test]
async fn subscriber_count_follows_subscriptions() {
    let platform = start().await;
    let observer = platform.platform_client();
    let a = platform.connect_client("app-a", ORIGIN_A);
    let b = platform.connect_client("app-b", ORIGIN_B);

    let mut counts = observer.subscriber_count("news").await.unwrap();
    assert_eq!(next_count(&mut counts).await, 0);

    let sub_a = a.subscribe("news").await.unwrap();
    assert_eq!(next_count(&mut counts).await, 1);

    let _sub_b = b.subscribe("news").await.unwrap();
    assert_eq!(next_count(&mut counts).await, 2);

    drop(sub_a);
    assert_eq!(next_count(&mut counts).await, 1);

    b.disconnect().await.unwrap();
    assert_eq!(next_count(&mut counts).await, 0);
}

// =============================================================================
// Request/Reply
// =============================================================================

#[tokio::test]
async fn request_without_replier_fails_fast() {
    let platform = start().await;
    let client = platform.connect_client("app-a", ORIGIN_A);

    // Far below the request timeout
    let result = timeout(
        Duration::from_millis(500),
        client.request(TopicMessage::new("nobody-listens")),
    )
    .await
    .expect("fails without waiting for the timeout");

    assert!(matches!(result, Err(MessagingError::RequestReply(_))));
}

#[tokio::test]
async fn request_receives_single_reply() {
    let platform = start().await;
    let requester = platform.connect_client("app-a", ORIGIN_A);
    let replier = platform.connect_client("app-b", ORIGIN_B);

    let mut requests = replier.subscribe("echo").await.unwrap();
    let responder = replier.clone();
    let task = tokio::spawn(async move {
        let request = requests.recv().await.unwrap();
        let body = request.body.clone().unwrap_or_default();
        responder.reply(&request.headers, body.clone()).await.unwrap();
        // A second reply finds no one waiting
        responder.reply(&request.headers, body).await
    });

    let reply = requester
        .request(TopicMessage::new("echo").with_body("ping"))
        .await
        .unwrap();

    assert_eq!(reply.body, Some(json!("ping")));
    assert_eq!(reply.headers.app_symbolic_name(), Some("app-b"));
    let second = task.await.unwrap();
    assert!(matches!(second, Err(MessagingError::RequestReply(_))));
}

// =============================================================================
// Document Lifecycle
// =============================================================================

#[tokio::test]
async fn unloading_a_document_drops_its_subscriptions() {
    let platform = start().await;
    let mut document = platform.open_document(ORIGIN_A);

    let connect = Envelope::new(ClientCommand::Connect {
        app_symbolic_name: "app-a".into(),
    });
    document.post(serde_json::to_value(connect).unwrap()).unwrap();
    let reply = timeout(WAIT, document.recv()).await.unwrap().unwrap();
    let client = match serde_json::from_value::<Envelope<BrokerEvent>>(reply)
        .unwrap()
        .message
    {
        BrokerEvent::Connected { client_id } => client_id,
        other => panic!("expected connected, got {other:?}"),
    };

    let subscribe = Envelope::new(ClientCommand::Subscribe {
        topic: "news".into(),
        subscriber_id: SubscriberId::new(),
    })
    .from_client(client);
    document.post(serde_json::to_value(subscribe).unwrap()).unwrap();
    await_count(&platform, "news", 1).await;

    drop(document);

    await_count(&platform, "news", 0).await;
}
