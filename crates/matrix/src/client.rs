use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::{MatrixApi, MatrixError, MatrixResult, SyncRequest, SyncResponse};

const CLIENT_API_PREFIX: [&str; 3] = ["_matrix", "client", "v3"];

/// HTTP client for one homeserver, authenticated with a pre-issued access token.
#[derive(Clone)]
pub struct MatrixClient {
    http: Client,
    homeserver: Url,
    access_token: String,
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    event_id: String,
}

#[derive(Debug, Deserialize)]
struct JoinResponse {
    room_id: String,
}

impl MatrixClient {
    pub fn new(
        homeserver: &str,
        access_token: impl Into<String>,
        request_timeout: Duration,
    ) -> MatrixResult<Self> {
        let homeserver = parse_homeserver(homeserver)?;
        let http = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            http,
            homeserver,
            access_token: access_token.into(),
            request_timeout,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> MatrixResult<Url> {
        let mut url = self.homeserver.clone();
        url.path_segments_mut()
            .map_err(|_| MatrixError::UnsupportedUrl {
                url: self.homeserver.to_string(),
            })?
            .pop_if_empty()
            .extend(CLIENT_API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> MatrixResult<T> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MatrixError::from_response(status, &body));
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Accepts `https://matrix.example.org` as well as bare hosts with a path prefix.
pub(crate) fn parse_homeserver(raw: &str) -> MatrixResult<Url> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" if !url.cannot_be_a_base() => Ok(url),
        _ => Err(MatrixError::UnsupportedUrl {
            url: raw.to_string(),
        }),
    }
}

/// The homeserver may hold a sync for the whole long-poll window, so the
/// HTTP deadline covers both. Saturates instead of overflowing.
fn long_poll_timeout(request_timeout: Duration, timeout_ms: u64) -> Duration {
    request_timeout.saturating_add(Duration::from_millis(timeout_ms))
}

#[async_trait]
impl MatrixApi for MatrixClient {
    async fn whoami(&self) -> MatrixResult<String> {
        let url = self.endpoint(&["account", "whoami"])?;
        let identity: WhoAmI = self.execute(self.http.get(url)).await?;
        Ok(identity.user_id)
    }

    async fn sync(&self, request: SyncRequest) -> MatrixResult<SyncResponse> {
        let url = self.endpoint(&["sync"])?;

        let mut query = vec![
            ("timeout", request.timeout_ms.to_string()),
            ("full_state", request.full_state.to_string()),
        ];
        if let Some(since) = &request.since {
            query.push(("since", since.clone()));
        }

        let timeout = long_poll_timeout(self.request_timeout, request.timeout_ms);

        debug!(since = ?request.since, timeout_ms = request.timeout_ms, "syncing");
        self.execute(self.http.get(url).query(&query).timeout(timeout))
            .await
    }

    async fn join_room(&self, room_id: &str) -> MatrixResult<String> {
        let url = self.endpoint(&["join", room_id])?;
        let joined: JoinResponse = self.execute(self.http.post(url).json(&json!({}))).await?;
        Ok(joined.room_id)
    }

    async fn send_text(&self, room_id: &str, body: &str) -> MatrixResult<String> {
        let txn_id = Uuid::new_v4().to_string();
        let url = self.endpoint(&["rooms", room_id, "send", "m.room.message", &txn_id])?;
        let content = json!({
            "msgtype": "m.text",
            "body": body,
        });

        let sent: SendResponse = self.execute(self.http.put(url).json(&content)).await?;
        Ok(sent.event_id)
    }
}
