use std::sync::{Arc, RwLock};

use gratitude_types::models::{MESSAGES_TABLE, SCHEMA};

use crate::channel::{ChannelBuilder, MessageFeed};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::PostgresChangesFilter;
use crate::rest::MessagesTable;

/// Handle to one Supabase project. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    http: reqwest::Client,
    /// Session token supplied by the auth layer. Falls back to the anon key.
    access_token: RwLock<Option<String>>,
}

impl Client {
    /// Build a client. Performs no network I/O.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                http,
                access_token: RwLock::new(None),
            }),
        })
    }

    /// Build a client from `VITE_SUPABASE_URL` / `VITE_SUPABASE_ANON_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Install (or clear) the user session token used for REST and realtime auth.
    pub fn set_access_token(&self, token: Option<String>) {
        let mut slot = self
            .inner
            .access_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = token;
    }

    /// Token sent as `Authorization: Bearer`.
    pub fn bearer_token(&self) -> String {
        self.inner
            .access_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .unwrap_or_else(|| self.inner.config.anon_key().to_string())
    }

    /// Start configuring a realtime channel.
    pub fn channel(&self, name: impl Into<String>) -> ChannelBuilder {
        ChannelBuilder::new(self.clone(), name)
    }

    /// Subscribe to every insert, update and delete on `gratitude_messages`.
    pub async fn subscribe_messages(&self) -> Result<MessageFeed> {
        self.channel(MESSAGES_TABLE)
            .on_postgres_changes(PostgresChangesFilter::all(SCHEMA, MESSAGES_TABLE))
            .subscribe()
            .await
    }

    pub fn messages(&self) -> MessagesTable {
        MessagesTable::new(self.clone())
    }
}
