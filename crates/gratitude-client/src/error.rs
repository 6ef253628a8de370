use thiserror::Error;

use crate::channel::SubscribeStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required connection parameter is missing or blank.
    #[error("missing Supabase configuration: {0}")]
    MissingConfig(&'static str),

    #[error("invalid Supabase configuration: {0}")]
    InvalidConfig(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned {status}: {body}")]
    Rest {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Malformed(#[from] MalformedPayload),

    #[error("subscription failed with status {0}")]
    SubscriptionFailed(SubscribeStatus),

    #[error("realtime connection closed")]
    Closed,
}

/// A change notification whose payload does not fit the message row shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed change payload: {reason}")]
pub struct MalformedPayload {
    pub reason: String,
}

impl MalformedPayload {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
