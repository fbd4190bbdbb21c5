//! Long-poll producer feeding the dispatcher.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{events_from_sync, joined_rooms, BotEvent, MatrixApi, MatrixResult, SyncRequest};

/// Receiving half handed to the single consumer. An `Err` item is the last
/// one: the producer stops after reporting a failed sync.
pub type EventStream = mpsc::Receiver<MatrixResult<BotEvent>>;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub timeout_ms: u64,
    pub full_state: bool,
    pub replay_backlog: bool,
    pub channel_capacity: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            full_state: true,
            replay_backlog: false,
            channel_capacity: 64,
        }
    }
}

/// Start syncing as `user_id`. The task ends when the receiver is dropped or
/// after forwarding the first sync error.
pub fn spawn_sync(
    api: Arc<dyn MatrixApi>,
    user_id: String,
    options: SyncOptions,
) -> (EventStream, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
    let handle = tokio::spawn(run_sync(api, user_id, options, tx));
    (rx, handle)
}

async fn run_sync(
    api: Arc<dyn MatrixApi>,
    user_id: String,
    options: SyncOptions,
    tx: mpsc::Sender<MatrixResult<BotEvent>>,
) {
    let mut since: Option<String> = None;

    loop {
        let initial = since.is_none();
        let request = SyncRequest {
            since: since.clone(),
            timeout_ms: options.timeout_ms,
            // The first sync always carries full state.
            full_state: options.full_state && !initial,
        };

        let result = tokio::select! {
            _ = tx.closed() => {
                debug!("event consumer gone, stopping sync");
                return;
            }
            result = api.sync(request) => result,
        };

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "sync failed");
                let _ = tx.send(Err(error)).await;
                return;
            }
        };

        let mut events = events_from_sync(&response, &user_id);
        if initial {
            if !options.replay_backlog {
                let before = events.len();
                events.retain(|event| !event.is_message());
                debug!(skipped = before - events.len(), "skipping initial sync backlog");
            }
            // Rooms joined before startup lead the batch, ahead of any invite for them.
            let mut seeded = joined_rooms(&response);
            debug!(rooms = seeded.len(), "seeding joined rooms");
            seeded.append(&mut events);
            events = seeded;
        }

        for event in events {
            if tx.send(Ok(event)).await.is_err() {
                debug!("event consumer gone, stopping sync");
                return;
            }
        }

        if initial {
            info!("initial sync complete");
        }
        since = Some(response.next_batch);
    }
}
