//! # echobot Matrix transport
//!
//! A deliberately small client for the Matrix client-server API. It knows how
//! to verify an access token, long-poll `/sync`, join rooms and send text
//! messages, which is everything the bot does on the wire.
//!
//! - **client**: [`MatrixClient`], the `reqwest` implementation of [`MatrixApi`]
//! - **events**: sync response types and their translation into [`BotEvent`]s
//! - **sync**: the producer task feeding events into a single-consumer channel

use async_trait::async_trait;

pub mod client;
pub mod error;
pub mod events;
pub mod sync;

pub use client::MatrixClient;
pub use error::{MatrixError, MatrixResult};
pub use events::{events_from_sync, joined_rooms, BotEvent, RoomInvite, RoomMessage, SyncResponse};
pub use sync::{spawn_sync, EventStream, SyncOptions};

/// Parameters of a single `/sync` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequest {
    pub since: Option<String>,
    pub timeout_ms: u64,
    pub full_state: bool,
}

/// The homeserver operations the bot relies on.
#[async_trait]
pub trait MatrixApi: Send + Sync {
    /// Returns the user id the access token belongs to.
    async fn whoami(&self) -> MatrixResult<String>;

    async fn sync(&self, request: SyncRequest) -> MatrixResult<SyncResponse>;

    /// Joins a room by id or alias and returns the joined room id.
    async fn join_room(&self, room_id: &str) -> MatrixResult<String>;

    /// Sends an `m.text` message and returns the new event id.
    async fn send_text(&self, room_id: &str, body: &str) -> MatrixResult<String>;
}
