//! Typed client for the `gratitude_messages` table of a hosted Supabase project.
//!
//! A [`Client`] is built once from the project URL and public anon key and is
//! passed explicitly to whatever needs it. [`Client::subscribe_messages`] opens
//! the realtime change feed; [`Client::messages`] reaches the table over REST.
//!
//! ```no_run
//! use gratitude_client::{Client, FeedEvent};
//!
//! # async fn run() -> gratitude_client::Result<()> {
//! let client = Client::from_env()?;
//! let mut feed = client.subscribe_messages().await?;
//!
//! while let Some(event) = feed.recv().await {
//!     if let FeedEvent::Change(change) = event {
//!         println!("{} {:?}", change.kind, change.row);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod rest;

pub(crate) mod connection;
pub(crate) mod protocol;
pub(crate) mod throttle;

pub use channel::{ChannelBuilder, MessageFeed, SubscribeStatus, SubscriptionState, map_change};
pub use client::Client;
pub use config::{AuthOptions, ClientConfig, ClientOptions, RealtimeOptions};
pub use dispatcher::{Dispatcher, FeedEvent};
pub use error::{Error, MalformedPayload, Result};
pub use protocol::{PostgresChangeData, PostgresChangesFilter};
pub use rest::MessagesTable;

pub use gratitude_types::{ChangeEvent, ChangeKind, MessageInsert, MessageRow, MessageUpdate};
