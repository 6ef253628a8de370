#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use gratitude_client::{Client, ClientConfig, ClientOptions, FeedEvent, MessageFeed};

pub const TOPIC: &str = "realtime:gratitude_messages";

/// How the fake server answers the channel join.
#[derive(Clone, Copy)]
pub enum JoinReply {
    Ok,
    Error,
    Silent,
}

/// Accept one realtime connection, answer the join, then push `changes` as
/// `postgres_changes` frames and answer heartbeats. Returns the join frame
/// the client sent.
pub async fn fake_realtime(reply: JoinReply, changes: Vec<Value>) -> (SocketAddr, JoinHandle<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let join: Value = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => break serde_json::from_str(text.as_str()).unwrap(),
                _ => continue,
            }
        };
        let join_ref = join["ref"].clone();

        let status = match reply {
            JoinReply::Ok => Some("ok"),
            JoinReply::Error => Some("error"),
            JoinReply::Silent => None,
        };
        if let Some(status) = status {
            let reply = json!({
                "topic": TOPIC,
                "event": "phx_reply",
                "payload": { "status": status, "response": {} },
                "ref": join_ref,
            });
            ws.send(Message::text(reply.to_string())).await.unwrap();
        }

        for data in changes {
            let frame = json!({
                "topic": TOPIC,
                "event": "postgres_changes",
                "payload": { "data": data, "ids": [1] },
                "ref": null,
            });
            ws.send(Message::text(frame.to_string())).await.unwrap();
        }

        // Keep answering heartbeats until the client goes away.
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let frame: Value = serde_json::from_str(text.as_str()).unwrap();
            if frame["event"] == "heartbeat" {
                let reply = json!({
                    "topic": "phoenix",
                    "event": "phx_reply",
                    "payload": { "status": "ok", "response": {} },
                    "ref": frame["ref"],
                });
                if ws.send(Message::text(reply.to_string())).await.is_err() {
                    break;
                }
            }
        }
        join
    });

    (addr, server)
}

pub fn client(addr: SocketAddr, options: ClientOptions) -> Client {
    let config = ClientConfig::new(&format!("http://{}", addr), "anon-key", options).unwrap();
    Client::new(config).unwrap()
}

pub fn change(kind: &str, record: Value, old_record: Value) -> Value {
    json!({
        "schema": "public",
        "table": "gratitude_messages",
        "commit_timestamp": "2024-01-01T00:00:01Z",
        "type": kind,
        "record": record,
        "old_record": old_record,
        "columns": [],
        "errors": null,
    })
}

pub fn thanks() -> Value {
    json!({
        "id": 1,
        "message": "thanks",
        "author": "a",
        "timestamp": "2024-01-01T00:00:00Z",
        "created_at": "2024-01-01T00:00:01Z",
    })
}

pub async fn next(feed: &mut MessageFeed) -> FeedEvent {
    tokio::time::timeout(Duration::from_secs(5), feed.recv())
        .await
        .expect("feed event")
        .expect("feed open")
}
