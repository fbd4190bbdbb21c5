use echobot_matrix::MatrixError;
use thiserror::Error;

/// Result type alias for bot operations
pub type BotResult<T> = Result<T, BotError>;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("authentication failed: {message}")]
    Authentication { message: String },

    #[error("connection failed: {message}")]
    Connectivity { message: String },

    #[error("failed to handle event in {room_id}: {source}")]
    Handler {
        room_id: String,
        #[source]
        source: MatrixError,
    },
}

impl BotError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    /// Classify a transport failure that ends the connection.
    pub fn from_transport(error: MatrixError) -> Self {
        if error.is_auth_failure() {
            Self::Authentication {
                message: error.to_string(),
            }
        } else {
            Self::Connectivity {
                message: error.to_string(),
            }
        }
    }

    pub fn handler(room_id: impl Into<String>, source: MatrixError) -> Self {
        Self::Handler {
            room_id: room_id.into(),
            source,
        }
    }

    /// Fatal errors end the process; handler errors only end one event.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Handler { .. })
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration { .. } => 2,
            _ => 1,
        }
    }
}
