use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Schema --

/// Postgres schema that owns the messages table.
pub const SCHEMA: &str = "public";

/// Remote table holding gratitude messages.
pub const MESSAGES_TABLE: &str = "gratitude_messages";

/// Column names of `public.gratitude_messages`, in table order.
pub const MESSAGE_COLUMNS: [&str; 5] = ["id", "message", "author", "timestamp", "created_at"];

// -- Rows --

/// A fully materialized row of `gratitude_messages`.
///
/// `id` and `created_at` are assigned by the database on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: i64,
    pub message: String,
    pub author: String,
    /// Client-supplied event time.
    pub timestamp: String,
    pub created_at: String,
}

impl MessageRow {
    /// Client-supplied event time, if it is valid RFC 3339.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        parse_utc(&self.timestamp)
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_utc(&self.created_at)
    }
}

/// Insert payload. The server fills `id` and `created_at` when they are left unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInsert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub message: String,
    pub author: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl MessageInsert {
    pub fn new(
        message: impl Into<String>,
        author: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            message: message.into(),
            author: author.into(),
            timestamp: timestamp.into(),
            created_at: None,
        }
    }

    /// Insert payload stamped with the current time.
    pub fn now(message: impl Into<String>, author: impl Into<String>) -> Self {
        Self::new(message, author, Utc::now().to_rfc3339())
    }
}

/// Update payload. Unset columns are left untouched on the server.
///
/// Also used for the provider's old-record snapshot, which usually only
/// carries the primary key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl MessageUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
