use std::fmt;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use gratitude_types::models::{MESSAGES_TABLE, SCHEMA};
use gratitude_types::{ChangeEvent, ChangeKind, MessageRow, MessageUpdate};

use crate::client::Client;
use crate::connection;
use crate::dispatcher::{Dispatcher, FeedEvent};
use crate::error::{Error, MalformedPayload, Result};
use crate::protocol::{Frame, JoinPayload, PostgresChangeData, PostgresChangesFilter, channel_topic};

/// Confirmation status reported for a channel join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscribeStatus {
    Subscribed,
    TimedOut,
    Closed,
    ChannelError,
}

impl SubscribeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribed => "SUBSCRIBED",
            Self::TimedOut => "TIMED_OUT",
            Self::Closed => "CLOSED",
            Self::ChannelError => "CHANNEL_ERROR",
        }
    }
}

impl fmt::Display for SubscribeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one subscription. Leaves `Pending` exactly once and never
/// comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Pending,
    Subscribed,
    Failed(SubscribeStatus),
}

impl SubscriptionState {
    /// Apply a confirmation status. Only `Pending` reacts; returns whether
    /// the state changed. The outcome is logged on the transition.
    pub fn on_status(&mut self, status: SubscribeStatus) -> bool {
        if *self != Self::Pending {
            return false;
        }

        *self = match status {
            SubscribeStatus::Subscribed => {
                info!("Successfully subscribed to message updates");
                Self::Subscribed
            }
            other => {
                error!("Failed to subscribe to message updates: {}", other);
                Self::Failed(other)
            }
        };
        true
    }

    pub fn is_pending(&self) -> bool {
        *self == Self::Pending
    }
}

/// Narrow the provider's generic change record to a message [`ChangeEvent`].
///
/// The new record must be a complete message row for inserts and updates.
/// Deletes pass the new record through when present and carry `None` otherwise.
pub fn map_change(data: PostgresChangeData) -> std::result::Result<ChangeEvent, MalformedPayload> {
    if data.schema != SCHEMA || data.table != MESSAGES_TABLE {
        return Err(MalformedPayload::new(format!(
            "unexpected table {}.{}",
            data.schema, data.table
        )));
    }

    let kind = ChangeKind::from_wire(&data.kind)
        .ok_or_else(|| MalformedPayload::new(format!("unknown operation '{}'", data.kind)))?;

    let row = match non_empty(data.record) {
        Some(record) => Some(
            serde_json::from_value::<MessageRow>(record)
                .map_err(|e| MalformedPayload::new(format!("{} record: {}", kind, e)))?,
        ),
        None if kind == ChangeKind::Deleted => None,
        None => return Err(MalformedPayload::new(format!("{} without a record", kind))),
    };

    let old = non_empty(data.old_record)
        .map(serde_json::from_value::<MessageUpdate>)
        .transpose()
        .map_err(|e| MalformedPayload::new(format!("{} old record: {}", kind, e)))?;

    Ok(ChangeEvent {
        kind,
        row,
        old,
        commit_timestamp: data.commit_timestamp,
    })
}

fn non_empty(value: Option<Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        other => other,
    }
}

/// Configures one realtime channel before joining it.
pub struct ChannelBuilder {
    client: Client,
    name: String,
    filters: Vec<PostgresChangesFilter>,
}

impl ChannelBuilder {
    pub(crate) fn new(client: Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            filters: Vec::new(),
        }
    }

    pub fn on_postgres_changes(mut self, filter: PostgresChangesFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Open the realtime socket and send the channel join.
    ///
    /// Returns once the join is sent; confirmation arrives as
    /// [`FeedEvent::Status`] (see also [`MessageFeed::wait_subscribed`]).
    /// Failing to open the socket is an error; a rejected join is not.
    pub async fn subscribe(self) -> Result<MessageFeed> {
        let options = self.client.config().options.realtime.clone();
        let url = self.client.config().realtime_url();

        let topic = channel_topic(&self.name);
        let payload = JoinPayload::postgres_changes(self.filters, Some(self.client.bearer_token()));
        let join = Frame::join(topic, &payload, "1".to_string())?;

        let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        info!("Connected to realtime at {}", url.host_str().unwrap_or("?"));

        let dispatcher = Dispatcher::new();
        // Taken before the task starts so the first status can't be missed.
        let events = dispatcher.subscribe();
        let task = tokio::spawn(connection::run_channel(
            socket,
            join,
            dispatcher.clone(),
            options,
        ));

        Ok(MessageFeed {
            dispatcher,
            events,
            task,
            finished: false,
        })
    }
}

/// A live subscription to the message change feed.
///
/// Dropping the feed closes the underlying connection.
pub struct MessageFeed {
    dispatcher: Dispatcher,
    events: broadcast::Receiver<FeedEvent>,
    task: JoinHandle<()>,
    finished: bool,
}

impl MessageFeed {
    pub fn state(&self) -> SubscriptionState {
        self.dispatcher.state()
    }

    /// Additional receiver for another consumer of the same subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.dispatcher.subscribe()
    }

    /// Next feed event, or `None` once the connection has closed.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        if self.finished {
            return None;
        }

        loop {
            match self.events.recv().await {
                Ok(event) => {
                    if event == FeedEvent::Closed {
                        self.finished = true;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Message feed lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Next row change, skipping status and malformed-payload events.
    pub async fn next_change(&mut self) -> Option<ChangeEvent> {
        while let Some(event) = self.recv().await {
            if let FeedEvent::Change(change) = event {
                return Some(change);
            }
        }
        None
    }

    /// Wait until the subscription leaves `Pending`.
    pub async fn wait_subscribed(&self) -> Result<()> {
        let mut rx = self.dispatcher.watch_state();
        let state = *rx
            .wait_for(|state| !state.is_pending())
            .await
            .map_err(|_| Error::Closed)?;

        match state {
            SubscriptionState::Subscribed => Ok(()),
            SubscriptionState::Failed(status) => Err(Error::SubscriptionFailed(status)),
            SubscriptionState::Pending => Err(Error::Closed),
        }
    }
}

impl Drop for MessageFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}
