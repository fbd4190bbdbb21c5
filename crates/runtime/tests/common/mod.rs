//! In-memory homeserver used by the runtime tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use echobot_matrix::{
    BotEvent, MatrixApi, MatrixError, MatrixResult, RoomInvite, RoomMessage, SyncRequest,
    SyncResponse,
};
use echobot_runtime::{ConnectedSession, SessionHandle};

pub const BOT: &str = "@bot:server";
pub const ALICE: &str = "@alice:server";
pub const ROOM: &str = "!abc:server";

/// Records every join and send; failures can be queued per operation.
pub struct RecordingApi {
    identity: Result<String, fn() -> MatrixError>,
    failing_joins: AtomicUsize,
    failing_sends: AtomicUsize,
    pub whoami_calls: AtomicUsize,
    pub joins: Mutex<Vec<String>>,
    pub sends: Mutex<Vec<(String, String)>>,
}

impl RecordingApi {
    pub fn new() -> Arc<Self> {
        Self::with_identity(Ok(BOT.to_string()))
    }

    pub fn with_identity(identity: Result<String, fn() -> MatrixError>) -> Arc<Self> {
        Arc::new(Self {
            identity,
            failing_joins: AtomicUsize::new(0),
            failing_sends: AtomicUsize::new(0),
            whoami_calls: AtomicUsize::new(0),
            joins: Mutex::new(Vec::new()),
            sends: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_next_joins(&self, count: usize) {
        self.failing_joins.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    pub fn joins(&self) -> Vec<String> {
        self.joins.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<(String, String)> {
        self.sends.lock().unwrap().clone()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

pub fn transport_error() -> MatrixError {
    MatrixError::Api {
        status: 500,
        errcode: "M_UNKNOWN".to_string(),
        message: "connection reset mid-send".to_string(),
    }
}

pub fn unknown_token() -> MatrixError {
    MatrixError::Unauthorized {
        status: 401,
        errcode: "M_UNKNOWN_TOKEN".to_string(),
        message: "Invalid access token passed.".to_string(),
    }
}

#[async_trait]
impl MatrixApi for RecordingApi {
    async fn whoami(&self) -> MatrixResult<String> {
        self.whoami_calls.fetch_add(1, Ordering::SeqCst);
        match &self.identity {
            Ok(user_id) => Ok(user_id.clone()),
            Err(make_error) => Err(make_error()),
        }
    }

    async fn sync(&self, _request: SyncRequest) -> MatrixResult<SyncResponse> {
        // Events are fed to the dispatcher directly in these tests.
        std::future::pending().await
    }

    async fn join_room(&self, room_id: &str) -> MatrixResult<String> {
        if Self::take_failure(&self.failing_joins) {
            return Err(transport_error());
        }
        self.joins.lock().unwrap().push(room_id.to_string());
        Ok(room_id.to_string())
    }

    async fn send_text(&self, room_id: &str, body: &str) -> MatrixResult<String> {
        if Self::take_failure(&self.failing_sends) {
            return Err(transport_error());
        }
        let mut sends = self.sends.lock().unwrap();
        sends.push((room_id.to_string(), body.to_string()));
        Ok(format!("$reply{}", sends.len()))
    }
}

pub async fn connected(api: &Arc<RecordingApi>) -> ConnectedSession {
    let api: Arc<dyn MatrixApi> = api.clone();
    SessionHandle::from_parts(BOT, api)
        .connect()
        .await
        .expect("recording homeserver accepts the token")
}

pub fn invite(room_id: &str) -> BotEvent {
    BotEvent::Invite(RoomInvite {
        room_id: room_id.to_string(),
        inviter: Some(ALICE.to_string()),
    })
}

pub fn message(room_id: &str, sender: &str, body: &str) -> BotEvent {
    BotEvent::Message(RoomMessage {
        room_id: room_id.to_string(),
        event_id: Some(format!("${body}")),
        sender: sender.to_string(),
        body: body.to_string(),
        is_own: sender == BOT,
    })
}
