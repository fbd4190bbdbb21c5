use std::future::Future;

use echobot_config::{BotConfig, SyncConfig};
use echobot_matrix::SyncOptions;
use tracing::info;

pub mod dispatcher;
pub mod error;
pub mod session;

pub use dispatcher::{echo_reply, EventDispatcher, Outcome, REPLY_PREFIX};
pub use error::{BotError, BotResult};
pub use session::{ConnectedSession, SessionHandle};

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    /// Filter from `RUST_LOG` as it is set right now, `info` otherwise.
    pub fn env_filter() -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }

    pub fn init_tracing() -> Result<()> {
        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::DEBUG)
            .with_env_filter(env_filter())
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Lifecycle of one connection:
/// `Disconnected -> Connected -> Listening -> Stopped | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Listening,
    Stopped,
    Failed,
}

pub fn sync_options(config: &SyncConfig) -> SyncOptions {
    SyncOptions {
        timeout_ms: config.timeout_ms,
        full_state: config.full_state,
        replay_backlog: config.replay_backlog,
        channel_capacity: config.channel_capacity,
    }
}

/// Validate the configuration, authenticate and dispatch events until
/// `shutdown` resolves or the connection fails.
pub async fn run_bot<S>(config: &BotConfig, shutdown: S) -> BotResult<()>
where
    S: Future<Output = ()>,
{
    let session = SessionHandle::from_config(&config.matrix)?;

    info!(server = %config.matrix.server, user_id = %session.user_id(), "connecting to homeserver");
    let connected = session.connect().await?;

    let mut dispatcher = EventDispatcher::new(connected);
    dispatcher.listen(sync_options(&config.sync), shutdown).await
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
        // Without a signal handler the bot runs until the connection ends.
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
