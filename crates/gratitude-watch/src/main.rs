use anyhow::Context;
use tracing::{error, info, warn};

use gratitude_client::{Client, FeedEvent, SubscribeStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gratitude_client=debug,gratitude_watch=debug".into()),
        )
        .init();

    // Config: both variables are required, there is no fallback
    let client = Client::from_env().context("Missing Supabase environment variables")?;
    info!("Watching gratitude messages on {}", client.config().url());

    let mut feed = client.subscribe_messages().await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = feed.recv() => {
                let Some(event) = event else { break };
                match event {
                    FeedEvent::Status(SubscribeStatus::Subscribed) => {}
                    FeedEvent::Status(status) => {
                        // No automatic retry; the process exits and the supervisor decides.
                        anyhow::bail!("subscription failed: {}", status);
                    }
                    FeedEvent::Change(change) => {
                        info!("{} {}", change.kind, serde_json::to_string(&change.row)?);
                    }
                    FeedEvent::Malformed(malformed) => warn!("{}", malformed),
                    FeedEvent::Closed => {
                        error!("Realtime connection closed");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
