mod common;

use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;

use gratitude_client::{
    ChangeKind, ClientOptions, Error, FeedEvent, MessageRow, SubscribeStatus, SubscriptionState,
};

use common::{JoinReply, TOPIC, change, client, fake_realtime, next, thanks};

#[tokio::test]
async fn insert_arrives_as_typed_change() {
    let (addr, _server) = fake_realtime(JoinReply::Ok, vec![change("INSERT", thanks(), json!({}))]).await;
    let mut feed = client(addr, ClientOptions::default())
        .subscribe_messages()
        .await
        .unwrap();

    assert_eq!(next(&mut feed).await, FeedEvent::Status(SubscribeStatus::Subscribed));
    feed.wait_subscribed().await.unwrap();
    assert_eq!(feed.state(), SubscriptionState::Subscribed);

    let FeedEvent::Change(event) = next(&mut feed).await else {
        panic!("expected a change event");
    };
    assert_eq!(event.kind, ChangeKind::Inserted);
    assert_eq!(
        event.row,
        Some(MessageRow {
            id: 1,
            message: "thanks".into(),
            author: "a".into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
            created_at: "2024-01-01T00:00:01Z".into(),
        })
    );
}

#[tokio::test]
async fn join_frame_filters_the_messages_table() {
    let (addr, server) = fake_realtime(JoinReply::Ok, vec![]).await;
    let mut feed = client(addr, ClientOptions::default())
        .subscribe_messages()
        .await
        .unwrap();
    assert_eq!(next(&mut feed).await, FeedEvent::Status(SubscribeStatus::Subscribed));
    drop(feed);

    let join = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(join["topic"], TOPIC);
    assert_eq!(join["event"], "phx_join");
    assert_eq!(join["payload"]["access_token"], "anon-key");
    assert_eq!(
        join["payload"]["config"]["postgres_changes"],
        json!([{ "event": "*", "schema": "public", "table": "gratitude_messages" }])
    );
}

#[tokio::test]
async fn delete_passes_through_and_malformed_is_reported() {
    let (addr, _server) = fake_realtime(
        JoinReply::Ok,
        vec![
            change("DELETE", json!({}), json!({ "id": 1 })),
            change("INSERT", json!({ "id": 2, "message": "no author" }), json!({})),
            change("UPDATE", thanks(), json!({ "id": 1 })),
        ],
    )
    .await;
    let mut feed = client(addr, ClientOptions::default())
        .subscribe_messages()
        .await
        .unwrap();
    assert_eq!(next(&mut feed).await, FeedEvent::Status(SubscribeStatus::Subscribed));

    let FeedEvent::Change(deleted) = next(&mut feed).await else {
        panic!("expected the delete");
    };
    assert_eq!(deleted.kind, ChangeKind::Deleted);
    assert_eq!(deleted.row, None);
    assert_eq!(deleted.row_id(), Some(1));

    assert!(matches!(next(&mut feed).await, FeedEvent::Malformed(_)));

    let updated = feed.next_change().await.unwrap();
    assert_eq!(updated.kind, ChangeKind::Updated);
    assert_eq!(updated.row.unwrap().message, "thanks");
}

#[tokio::test]
async fn paced_burst_keeps_the_connection_alive() {
    let burst = (1..=10)
        .map(|id| {
            let mut row = thanks();
            row["id"] = json!(id);
            change("INSERT", row, json!({}))
        })
        .collect();
    let (addr, _server) = fake_realtime(JoinReply::Ok, burst).await;

    let mut options = ClientOptions::default();
    options.realtime.events_per_second = 2;
    options.realtime.heartbeat_interval = Duration::from_millis(200);
    let mut feed = client(addr, options).subscribe_messages().await.unwrap();
    assert_eq!(next(&mut feed).await, FeedEvent::Status(SubscribeStatus::Subscribed));

    // Delivery takes several heartbeat intervals at two changes per second.
    for id in 1..=10 {
        let FeedEvent::Change(event) = next(&mut feed).await else {
            panic!("expected change {}", id);
        };
        assert_eq!(event.row_id(), Some(id));
    }

    let after = tokio::time::timeout(Duration::from_millis(600), feed.recv()).await;
    assert!(after.is_err(), "feed ended after the burst: {:?}", after);
    assert_eq!(feed.state(), SubscriptionState::Subscribed);
}

#[tokio::test]
async fn rejected_join_fails_once_and_closes() {
    let (addr, _server) = fake_realtime(JoinReply::Error, vec![]).await;
    let mut feed = client(addr, ClientOptions::default())
        .subscribe_messages()
        .await
        .unwrap();

    assert_eq!(next(&mut feed).await, FeedEvent::Status(SubscribeStatus::ChannelError));
    assert_eq!(next(&mut feed).await, FeedEvent::Closed);
    assert_eq!(feed.recv().await, None);

    assert_eq!(
        feed.state(),
        SubscriptionState::Failed(SubscribeStatus::ChannelError)
    );
    assert!(matches!(
        feed.wait_subscribed().await,
        Err(Error::SubscriptionFailed(SubscribeStatus::ChannelError))
    ));
}

#[tokio::test]
async fn unanswered_join_times_out() {
    let (addr, _server) = fake_realtime(JoinReply::Silent, vec![]).await;
    let mut options = ClientOptions::default();
    options.realtime.join_timeout = Duration::from_millis(200);

    let mut feed = client(addr, options).subscribe_messages().await.unwrap();

    assert_eq!(next(&mut feed).await, FeedEvent::Status(SubscribeStatus::TimedOut));
    assert_eq!(next(&mut feed).await, FeedEvent::Closed);
    assert_eq!(feed.state(), SubscriptionState::Failed(SubscribeStatus::TimedOut));
}

#[tokio::test]
async fn second_consumer_sees_the_same_changes() {
    let (addr, _server) = fake_realtime(JoinReply::Ok, vec![change("INSERT", thanks(), json!({}))]).await;
    let mut feed = client(addr, ClientOptions::default())
        .subscribe_messages()
        .await
        .unwrap();
    let mut other = feed.subscribe();

    let first = feed.next_change().await.unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let FeedEvent::Change(change) = other.recv().await.unwrap() {
                break change;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(seen, first);
}

#[tokio::test]
async fn unreachable_endpoint_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = client(addr, ClientOptions::default()).subscribe_messages().await;
    assert!(matches!(result, Err(Error::WebSocket(_))));
}
