//! Event dispatcher: accepts invites and echoes messages, one event at a time.

use std::collections::HashSet;
use std::future::Future;

use echobot_matrix::{spawn_sync, BotEvent, EventStream, RoomInvite, RoomMessage, SyncOptions};
use tracing::{debug, error, info, warn};

use crate::{BotError, BotResult, ConnectedSession, ConnectionState};

pub const REPLY_PREFIX: &str = "You said: ";

/// The response text for an incoming message body.
///
/// ```
/// assert_eq!(echobot_runtime::echo_reply("hello"), "You said: hello");
/// ```
pub fn echo_reply(body: &str) -> String {
    format!("{REPLY_PREFIX}{body}")
}

/// What handling a single event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Joined { room_id: String },
    AlreadyJoined { room_id: String },
    Replied { room_id: String, event_id: String },
    IgnoredOwnMessage { room_id: String },
    Forgotten { room_id: String },
}

pub struct EventDispatcher {
    session: ConnectedSession,
    state: ConnectionState,
    joined: HashSet<String>,
}

impl EventDispatcher {
    pub fn new(session: ConnectedSession) -> Self {
        Self {
            session,
            state: ConnectionState::Connected,
            joined: HashSet::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn user_id(&self) -> &str {
        self.session.user_id()
    }

    pub fn is_joined(&self, room_id: &str) -> bool {
        self.joined.contains(room_id)
    }

    /// Start the sync producer for this session and consume its events until
    /// `shutdown` resolves or the connection fails.
    pub async fn listen<S>(&mut self, options: SyncOptions, shutdown: S) -> BotResult<()>
    where
        S: Future<Output = ()>,
    {
        let (events, producer) =
            spawn_sync(self.session.api(), self.user_id().to_string(), options);

        let result = self.run(events, shutdown).await;
        producer.abort();
        result
    }

    /// Consume `events` in delivery order. Handler failures are logged and
    /// skipped; a transport failure ends the loop in [`ConnectionState::Failed`].
    /// `shutdown` is only observed between events.
    pub async fn run<S>(&mut self, mut events: EventStream, shutdown: S) -> BotResult<()>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        self.state = ConnectionState::Listening;
        info!(user_id = %self.user_id(), "listening for events");

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    self.state = ConnectionState::Stopped;
                    info!("dispatcher stopped");
                    return Ok(());
                }
                next = events.recv() => next,
            };

            match next {
                Some(Ok(event)) => {
                    if let Err(error) = self.handle_event(event).await {
                        warn!(%error, "event handling failed, continuing");
                    }
                }
                Some(Err(transport)) => {
                    self.state = ConnectionState::Failed;
                    let error = BotError::from_transport(transport);
                    error!(%error, "connection lost");
                    return Err(error);
                }
                None => {
                    self.state = ConnectionState::Failed;
                    error!("event stream closed unexpectedly");
                    return Err(BotError::connectivity("event stream closed unexpectedly"));
                }
            }
        }
    }

    pub async fn handle_event(&mut self, event: BotEvent) -> BotResult<Outcome> {
        match event {
            BotEvent::Invite(invite) => self.handle_invite(invite).await,
            BotEvent::Message(message) => self.handle_message(message).await,
            BotEvent::Joined { room_id } => {
                debug!(room_id = %room_id, "already a member of room");
                self.joined.insert(room_id.clone());
                Ok(Outcome::AlreadyJoined { room_id })
            }
            BotEvent::Left { room_id } => {
                self.joined.remove(&room_id);
                info!(room_id = %room_id, "no longer a member of room");
                Ok(Outcome::Forgotten { room_id })
            }
        }
    }

    /// Join the invited room unless it is already joined.
    pub async fn handle_invite(&mut self, invite: RoomInvite) -> BotResult<Outcome> {
        let RoomInvite { room_id, inviter } = invite;

        if self.joined.contains(&room_id) {
            debug!(room_id = %room_id, "invite for a joined room, ignoring");
            return Ok(Outcome::AlreadyJoined { room_id });
        }

        info!(room_id = %room_id, inviter = ?inviter, "received invite");

        let joined = self
            .session
            .api()
            .join_room(&room_id)
            .await
            .map_err(|source| BotError::handler(room_id.clone(), source))?;

        if joined != room_id {
            self.joined.insert(joined);
        }
        self.joined.insert(room_id.clone());
        info!(room_id = %room_id, "joined room");

        Ok(Outcome::Joined { room_id })
    }

    /// Echo the message back to its room unless the bot sent it.
    pub async fn handle_message(&mut self, message: RoomMessage) -> BotResult<Outcome> {
        let RoomMessage {
            room_id,
            event_id,
            sender,
            body,
            is_own,
        } = message;

        if is_own || self.session.is_self(&sender) {
            return Ok(Outcome::IgnoredOwnMessage { room_id });
        }

        // Timeline events only arrive for rooms the bot is in.
        self.joined.insert(room_id.clone());

        info!(room_id = %room_id, sender = %sender, event_id = ?event_id, "received message");
        debug!(body = %body, "message body");

        let sent = self
            .session
            .api()
            .send_text(&room_id, &echo_reply(&body))
            .await
            .map_err(|source| BotError::handler(room_id.clone(), source))?;

        info!(room_id = %room_id, event_id = %sent, "sent reply");

        Ok(Outcome::Replied {
            room_id,
            event_id: sent,
        })
    }
}
