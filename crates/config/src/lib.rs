use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "echobot.toml",
    "config/echobot.toml",
    "crates/config/echobot.toml",
];

/// Variables the bot has always been configured with. They take precedence
/// over everything else so an existing `.env` keeps working.
const SERVER_ENV: &str = "MATRIX_SERVER";
const USER_ENV: &str = "MATRIX_BOT_USER";
const TOKEN_ENV: &str = "MATRIX_ACCESS_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub matrix: MatrixConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Connection settings for the homeserver account the bot runs as.
///
/// ```
/// use echobot_config::MatrixConfig;
///
/// let matrix = MatrixConfig::default();
/// assert!(matrix.server.is_empty());
/// assert_eq!(matrix.request_timeout_seconds, 60);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "MatrixConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl MatrixConfig {
    const fn default_request_timeout() -> u64 {
        60
    }
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            user_id: String::new(),
            access_token: String::new(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

impl fmt::Debug for MatrixConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.access_token.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };

        f.debug_struct("MatrixConfig")
            .field("server", &self.server)
            .field("user_id", &self.user_id)
            .field("access_token", &token)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "SyncConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "SyncConfig::default_full_state")]
    pub full_state: bool,
    /// Deliver the timeline of the very first sync. Off by default so a
    /// restart does not answer old messages a second time.
    #[serde(default)]
    pub replay_backlog: bool,
    #[serde(default = "SyncConfig::default_channel_capacity")]
    pub channel_capacity: usize,
}

impl SyncConfig {
    const fn default_timeout_ms() -> u64 {
        30_000
    }

    const fn default_full_state() -> bool {
        true
    }

    const fn default_channel_capacity() -> usize {
        64
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
            full_state: Self::default_full_state(),
            replay_backlog: false,
            channel_capacity: Self::default_channel_capacity(),
        }
    }
}

/// Load the bot configuration by combining defaults, files, and environment overrides.
///
/// Missing account values are not an error here; they surface when the
/// session is initialised.
///
/// ```
/// use echobot_config::load;
///
/// std::env::remove_var("ECHOBOT_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(config.sync.timeout_ms > 0);
/// ```
pub fn load() -> anyhow::Result<BotConfig> {
    let defaults = BotConfig::default();

    let request_timeout =
        i64::try_from(defaults.matrix.request_timeout_seconds).unwrap_or(i64::MAX);
    let sync_timeout = i64::try_from(defaults.sync.timeout_ms).unwrap_or(i64::MAX);
    let channel_capacity = i64::try_from(defaults.sync.channel_capacity).unwrap_or(i64::MAX);

    let mut builder = config::Config::builder()
        .set_default("matrix.server", defaults.matrix.server.clone())
        .context("invalid default for matrix.server")?
        .set_default("matrix.user_id", defaults.matrix.user_id.clone())
        .context("invalid default for matrix.user_id")?
        .set_default("matrix.access_token", defaults.matrix.access_token.clone())
        .context("invalid default for matrix.access_token")?
        .set_default("matrix.request_timeout_seconds", request_timeout)
        .context("invalid default for matrix.request_timeout_seconds")?
        .set_default("sync.timeout_ms", sync_timeout)
        .context("invalid default for sync.timeout_ms")?
        .set_default("sync.full_state", defaults.sync.full_state)
        .context("invalid default for sync.full_state")?
        .set_default("sync.replay_backlog", defaults.sync.replay_backlog)
        .context("invalid default for sync.replay_backlog")?
        .set_default("sync.channel_capacity", channel_capacity)
        .context("invalid default for sync.channel_capacity")?;

    let environment_overrides = config::Environment::with_prefix("ECHOBOT").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("ECHOBOT_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via ECHOBOT_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder
        .add_source(environment_overrides)
        .set_override_option("matrix.server", std::env::var(SERVER_ENV).ok())
        .context("invalid MATRIX_SERVER")?
        .set_override_option("matrix.user_id", std::env::var(USER_ENV).ok())
        .context("invalid MATRIX_BOT_USER")?
        .set_override_option("matrix.access_token", std::env::var(TOKEN_ENV).ok())
        .context("invalid MATRIX_ACCESS_TOKEN")?;

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<BotConfig>()
        .context("invalid configuration")?;

    if config.sync.channel_capacity == 0 {
        config.sync.channel_capacity = 1;
    }

    debug!(?config, "loaded bot configuration");
    Ok(config)
}
