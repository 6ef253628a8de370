use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::channel::{SubscribeStatus, map_change};
use crate::config::RealtimeOptions;
use crate::dispatcher::{Dispatcher, FeedEvent};
use crate::error::MalformedPayload;
use crate::protocol::{
    Frame, PHOENIX_TOPIC, PHX_CLOSE, PHX_ERROR, PHX_REPLY, POSTGRES_CHANGES, PostgresChangesEnvelope,
    REPLY_OK, ReplyPayload, SYSTEM,
};
use crate::throttle::Throttle;

pub(crate) type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

type Sender = SplitSink<Socket, Message>;

/// Consecutive unanswered heartbeats before the connection is dropped.
const MAX_MISSED_HEARTBEATS: u8 = 2;

enum Flow {
    Continue,
    Stop,
}

/// Per-connection bookkeeping shared by the frame handlers.
struct ChannelSession {
    topic: String,
    join_ref: Option<String>,
    dispatcher: Dispatcher,
    /// Raw `postgres_changes` payloads waiting for the pacer.
    changes_tx: mpsc::UnboundedSender<Value>,
    next_ref: u64,
    pending_heartbeat: Option<String>,
}

impl ChannelSession {
    fn make_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }
}

/// Drive one joined channel until the socket closes, the join fails or the
/// heartbeat times out. Always ends by publishing [`FeedEvent::Closed`].
pub(crate) async fn run_channel(
    socket: Socket,
    join: Frame,
    dispatcher: Dispatcher,
    options: RealtimeOptions,
) {
    let (mut sender, mut receiver) = socket.split();

    // Pacing runs beside the reader so throttled changes never hold up heartbeat replies.
    let (changes_tx, changes_rx) = mpsc::unbounded_channel();
    let pacer = tokio::spawn(deliver_changes(
        changes_rx,
        dispatcher.clone(),
        Throttle::per_second(options.events_per_second),
    ));

    let mut session = ChannelSession {
        topic: join.topic.clone(),
        join_ref: join.msg_ref.clone(),
        dispatcher: dispatcher.clone(),
        changes_tx,
        next_ref: 1,
        pending_heartbeat: None,
    };

    if send_frame(&mut sender, &join).await.is_err() {
        dispatcher.resolve(SubscribeStatus::ChannelError);
        drop(session);
        let _ = pacer.await;
        dispatcher.broadcast(FeedEvent::Closed);
        return;
    }
    debug!("Joined {}", session.topic);

    let mut heartbeat = tokio::time::interval(options.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    let join_deadline = tokio::time::sleep(options.join_timeout);
    tokio::pin!(join_deadline);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        info!("Realtime socket closed by server: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Realtime socket error: {}", e);
                        break;
                    }
                    None => break,
                };

                let frame = match serde_json::from_str::<Frame>(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("Bad realtime frame: {} -- raw: {}", e, raw);
                        continue;
                    }
                };

                if let Flow::Stop = handle_frame(&mut session, frame) {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if session.pending_heartbeat.is_some() {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= MAX_MISSED_HEARTBEATS {
                        warn!("Heartbeat timeout (missed {} replies), dropping connection", missed_heartbeats);
                        break;
                    }
                } else {
                    missed_heartbeats = 0;
                }

                let msg_ref = session.make_ref();
                if send_frame(&mut sender, &Frame::heartbeat(msg_ref.clone())).await.is_err() {
                    break;
                }
                session.pending_heartbeat = Some(msg_ref);
            }
            _ = &mut join_deadline, if dispatcher.is_pending() => {
                dispatcher.resolve(SubscribeStatus::TimedOut);
                break;
            }
        }
    }

    // A connection that never confirmed the join counts as closed.
    dispatcher.resolve(SubscribeStatus::Closed);
    let _ = sender.close().await;

    // Changes already received are still delivered before `Closed`.
    drop(session);
    let _ = pacer.await;
    dispatcher.broadcast(FeedEvent::Closed);
}

/// Log, map and publish received changes in arrival order, at most
/// `events_per_second` of them per second.
async fn deliver_changes(
    mut changes_rx: mpsc::UnboundedReceiver<Value>,
    dispatcher: Dispatcher,
    mut throttle: Throttle,
) {
    while let Some(payload) = changes_rx.recv().await {
        throttle.acquire().await;
        info!(payload = %payload, "Message change received");

        let event = serde_json::from_value::<PostgresChangesEnvelope>(payload)
            .map_err(|e| MalformedPayload::new(format!("change envelope: {}", e)))
            .and_then(|envelope| {
                if let Some(errors) = envelope.data.errors.as_ref().filter(|e| !e.is_null()) {
                    warn!("Provider reported errors for change {:?}: {}", envelope.ids, errors);
                }
                map_change(envelope.data)
            });

        match event {
            Ok(change) => dispatcher.broadcast(FeedEvent::Change(change)),
            Err(malformed) => {
                warn!("{}", malformed);
                dispatcher.broadcast(FeedEvent::Malformed(malformed));
            }
        }
    }
}

fn handle_frame(session: &mut ChannelSession, frame: Frame) -> Flow {
    if frame.topic == PHOENIX_TOPIC {
        if frame.event == PHX_REPLY && frame.msg_ref == session.pending_heartbeat {
            session.pending_heartbeat = None;
        }
        return Flow::Continue;
    }

    if frame.topic != session.topic {
        trace!("Ignoring frame for topic {}", frame.topic);
        return Flow::Continue;
    }

    match frame.event.as_str() {
        PHX_REPLY if frame.msg_ref == session.join_ref => {
            let status = match serde_json::from_value::<ReplyPayload>(frame.payload) {
                Ok(reply) if reply.status == REPLY_OK => SubscribeStatus::Subscribed,
                Ok(reply) => {
                    warn!("Join rejected ({}): {}", reply.status, reply.response);
                    SubscribeStatus::ChannelError
                }
                Err(e) => {
                    warn!("Unreadable join reply: {}", e);
                    SubscribeStatus::ChannelError
                }
            };
            session.dispatcher.resolve(status);
            if status == SubscribeStatus::Subscribed {
                Flow::Continue
            } else {
                Flow::Stop
            }
        }
        POSTGRES_CHANGES => {
            // The pacer only stops after this session is dropped.
            let _ = session.changes_tx.send(frame.payload);
            Flow::Continue
        }
        SYSTEM => {
            debug!(payload = %frame.payload, "Realtime system message");
            Flow::Continue
        }
        PHX_ERROR => {
            warn!("Channel {} errored", session.topic);
            session.dispatcher.resolve(SubscribeStatus::ChannelError);
            Flow::Stop
        }
        PHX_CLOSE => {
            info!("Channel {} closed", session.topic);
            session.dispatcher.resolve(SubscribeStatus::Closed);
            Flow::Stop
        }
        _ => {
            trace!("Ignoring {} on {}", frame.event, session.topic);
            Flow::Continue
        }
    }
}

async fn send_frame(sender: &mut Sender, frame: &Frame) -> Result<(), ()> {
    let text = serde_json::to_string(frame).map_err(|e| warn!("Unserializable frame: {}", e))?;
    sender
        .send(Message::text(text))
        .await
        .map_err(|e| warn!("Realtime send failed: {}", e))
}
