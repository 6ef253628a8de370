//! Phoenix channels v1.0.0 frames as spoken by the Supabase realtime service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PHOENIX_TOPIC: &str = "phoenix";

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const POSTGRES_CHANGES: &str = "postgres_changes";
pub const SYSTEM: &str = "system";

/// Status of a successful `phx_reply`.
pub const REPLY_OK: &str = "ok";

/// One JSON frame in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl Frame {
    pub fn heartbeat(msg_ref: String) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: HEARTBEAT.to_string(),
            payload: Value::Object(Default::default()),
            msg_ref: Some(msg_ref),
            join_ref: None,
        }
    }

    /// Join frame for a channel topic. The join's `ref` doubles as its `join_ref`.
    pub fn join(topic: String, payload: &JoinPayload, msg_ref: String) -> serde_json::Result<Self> {
        Ok(Self {
            topic,
            event: PHX_JOIN.to_string(),
            payload: serde_json::to_value(payload)?,
            msg_ref: Some(msg_ref.clone()),
            join_ref: Some(msg_ref),
        })
    }
}

/// Topic under which a named channel is joined.
pub fn channel_topic(name: &str) -> String {
    format!("realtime:{}", name)
}

/// Row-change filter registered with a channel join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresChangesFilter {
    /// `INSERT`, `UPDATE`, `DELETE` or `*`.
    pub event: String,
    pub schema: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl PostgresChangesFilter {
    /// Every operation on one table.
    pub fn all(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            event: "*".to_string(),
            schema: schema.into(),
            table: table.into(),
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinPayload {
    pub config: JoinConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinConfig {
    pub broadcast: BroadcastConfig,
    pub presence: PresenceConfig,
    pub postgres_changes: Vec<PostgresChangesFilter>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BroadcastConfig {
    pub ack: bool,
    #[serde(rename = "self")]
    pub self_echo: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PresenceConfig {
    pub key: String,
}

impl JoinPayload {
    pub fn postgres_changes(filters: Vec<PostgresChangesFilter>, access_token: Option<String>) -> Self {
        Self {
            config: JoinConfig {
                broadcast: BroadcastConfig::default(),
                presence: PresenceConfig::default(),
                postgres_changes: filters,
            },
            access_token,
        }
    }
}

/// Payload of a `phx_reply` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyPayload {
    pub status: String,
    #[serde(default)]
    pub response: Value,
}

/// Payload of a `postgres_changes` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresChangesEnvelope {
    pub data: PostgresChangeData,
    #[serde(default)]
    pub ids: Vec<i64>,
}

/// The provider's generic change record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostgresChangeData {
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
    /// Operation tag: `INSERT`, `UPDATE` or `DELETE`.
    #[serde(rename = "type")]
    pub kind: String,
    /// New row values.
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
    #[serde(default)]
    pub errors: Option<Value>,
}
