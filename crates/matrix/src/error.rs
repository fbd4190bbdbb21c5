//! Error types for the Matrix transport.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Result type alias for transport operations
pub type MatrixResult<T> = Result<T, MatrixError>;

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("invalid homeserver url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported homeserver url {url}: expected http or https")]
    UnsupportedUrl { url: String },

    #[error("homeserver request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("access token rejected ({errcode}): {message}")]
    Unauthorized {
        status: u16,
        errcode: String,
        message: String,
    },

    #[error("homeserver returned {status} ({errcode}): {message}")]
    Api {
        status: u16,
        errcode: String,
        message: String,
    },

    #[error("invalid homeserver response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Standard Matrix error body: `{"errcode": "M_...", "error": "..."}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub errcode: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl MatrixError {
    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
        let errcode = parsed.errcode.unwrap_or_else(|| "M_UNKNOWN".to_string());
        let message = parsed.error.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

        let token_problem = matches!(errcode.as_str(), "M_UNKNOWN_TOKEN" | "M_MISSING_TOKEN");
        if status == StatusCode::UNAUTHORIZED || token_problem {
            Self::Unauthorized {
                status: status.as_u16(),
                errcode,
                message,
            }
        } else {
            Self::Api {
                status: status.as_u16(),
                errcode,
                message,
            }
        }
    }

    /// True when the homeserver refused the access token itself.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// True for HTTP 403 answers, e.g. `M_FORBIDDEN` on a join the bot may not perform.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == StatusCode::FORBIDDEN.as_u16())
    }

    /// True when the request never produced an HTTP answer.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
