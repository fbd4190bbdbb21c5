//! Session manager: validated account settings and the authenticated connection.

use std::sync::Arc;
use std::time::Duration;

use echobot_config::MatrixConfig;
use echobot_matrix::{MatrixApi, MatrixClient};
use tracing::{info, warn};

use crate::{BotError, BotResult};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Account settings that passed validation, plus the transport built from them.
/// Nothing has touched the network yet.
#[derive(Clone)]
pub struct SessionHandle {
    user_id: String,
    api: Arc<dyn MatrixApi>,
}

impl SessionHandle {
    pub fn initialize(server: &str, user_id: &str, access_token: &str) -> BotResult<Self> {
        Self::initialize_with_timeout(server, user_id, access_token, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn from_config(config: &MatrixConfig) -> BotResult<Self> {
        Self::initialize_with_timeout(
            &config.server,
            &config.user_id,
            &config.access_token,
            Duration::from_secs(config.request_timeout_seconds),
        )
    }

    fn initialize_with_timeout(
        server: &str,
        user_id: &str,
        access_token: &str,
        request_timeout: Duration,
    ) -> BotResult<Self> {
        let server = required("matrix.server", "MATRIX_SERVER", server)?;
        let user_id = required("matrix.user_id", "MATRIX_BOT_USER", user_id)?;
        let access_token = required("matrix.access_token", "MATRIX_ACCESS_TOKEN", access_token)?;

        let client = MatrixClient::new(server, access_token, request_timeout)
            .map_err(|error| BotError::configuration(format!("matrix.server: {error}")))?;

        Ok(Self::from_parts(user_id, Arc::new(client)))
    }

    /// Build a session over any transport, e.g. an in-memory homeserver.
    pub fn from_parts(user_id: impl Into<String>, api: Arc<dyn MatrixApi>) -> Self {
        Self {
            user_id: user_id.into(),
            api,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Verify the access token with the homeserver.
    pub async fn connect(self) -> BotResult<ConnectedSession> {
        let confirmed = self.api.whoami().await.map_err(|error| {
            if error.is_auth_failure() || error.is_forbidden() {
                BotError::Authentication {
                    message: error.to_string(),
                }
            } else {
                BotError::connectivity(error.to_string())
            }
        })?;

        if confirmed != self.user_id {
            warn!(
                configured = %self.user_id,
                confirmed = %confirmed,
                "access token belongs to a different user id, using the confirmed one"
            );
        }

        info!(user_id = %confirmed, "authenticated with homeserver");

        Ok(ConnectedSession {
            user_id: confirmed,
            configured_user_id: self.user_id,
            api: self.api,
        })
    }
}

fn required<'a>(key: &str, env: &str, value: &'a str) -> BotResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BotError::configuration(format!(
            "{key} is required (set {env})"
        )));
    }
    Ok(value)
}

/// An authenticated session. `user_id` is the identity the homeserver
/// confirmed for the token; the configured one is kept alongside it.
#[derive(Clone)]
pub struct ConnectedSession {
    user_id: String,
    configured_user_id: String,
    api: Arc<dyn MatrixApi>,
}

impl ConnectedSession {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn configured_user_id(&self) -> &str {
        &self.configured_user_id
    }

    /// Whether `sender` is the bot under either identity.
    pub fn is_self(&self, sender: &str) -> bool {
        sender == self.user_id || sender == self.configured_user_id
    }

    pub fn api(&self) -> Arc<dyn MatrixApi> {
        Arc::clone(&self.api)
    }
}
