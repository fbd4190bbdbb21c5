//! Sync response wire types and their translation into bot events.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// Body of `GET /_matrix/client/v3/sync`, reduced to the parts the bot reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: SyncRooms,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRooms {
    #[serde(default)]
    pub join: BTreeMap<String, JoinedRoom>,
    #[serde(default)]
    pub invite: BTreeMap<String, InvitedRoom>,
    #[serde(default)]
    pub leave: BTreeMap<String, LeftRoom>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinedRoom {
    #[serde(default)]
    pub timeline: Timeline,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvitedRoom {
    #[serde(default)]
    pub invite_state: InviteState,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InviteState {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeftRoom {}

/// A client event or stripped state event. Stripped events carry no `event_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub state_key: Option<String>,
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInvite {
    pub room_id: String,
    pub inviter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMessage {
    pub room_id: String,
    pub event_id: Option<String>,
    pub sender: String,
    pub body: String,
    pub is_own: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotEvent {
    Invite(RoomInvite),
    Message(RoomMessage),
    /// The bot is no longer a member of the room (left, kicked, banned).
    Left { room_id: String },
    /// The bot was already a member of the room when syncing started.
    Joined { room_id: String },
}

impl BotEvent {
    pub fn is_message(&self) -> bool {
        matches!(self, Self::Message(_))
    }
}

const MEMBER_EVENT: &str = "m.room.member";
const MESSAGE_EVENT: &str = "m.room.message";
const TEXT_MSGTYPE: &str = "m.text";

/// Membership snapshot of an initial sync: every room listed under `rooms.join`.
pub fn joined_rooms(response: &SyncResponse) -> Vec<BotEvent> {
    response
        .rooms
        .join
        .keys()
        .map(|room_id| BotEvent::Joined {
            room_id: room_id.clone(),
        })
        .collect()
}

/// Translate one sync batch into events, leaves first, then invites, then
/// timeline messages in server order per room.
pub fn events_from_sync(response: &SyncResponse, user_id: &str) -> Vec<BotEvent> {
    let rooms = &response.rooms;
    let mut events = Vec::new();

    events.extend(rooms.leave.keys().map(|room_id| BotEvent::Left {
        room_id: room_id.clone(),
    }));

    for (room_id, room) in &rooms.invite {
        events.push(BotEvent::Invite(RoomInvite {
            room_id: room_id.clone(),
            inviter: inviter_of(room, user_id),
        }));
    }

    for (room_id, room) in &rooms.join {
        for event in &room.timeline.events {
            if let Some(message) = message_from(room_id, event, user_id) {
                events.push(BotEvent::Message(message));
            }
        }
    }

    events
}

fn inviter_of(room: &InvitedRoom, user_id: &str) -> Option<String> {
    room.invite_state
        .events
        .iter()
        .find(|event| {
            event.kind == MEMBER_EVENT
                && event.state_key.as_deref() == Some(user_id)
                && event.content.get("membership").and_then(Value::as_str) == Some("invite")
        })
        .map(|event| event.sender.clone())
        .filter(|sender| !sender.is_empty())
}

fn message_from(room_id: &str, event: &RawEvent, user_id: &str) -> Option<RoomMessage> {
    if event.kind != MESSAGE_EVENT {
        return None;
    }

    // Only plain text is echoed; notices, emotes and media are skipped.
    if event.content.get("msgtype").and_then(Value::as_str) != Some(TEXT_MSGTYPE) {
        return None;
    }

    let body = event.content.get("body").and_then(Value::as_str)?;

    Some(RoomMessage {
        room_id: room_id.to_string(),
        event_id: event.event_id.clone(),
        sender: event.sender.clone(),
        body: body.to_string(),
        is_own: event.sender == user_id,
    })
}
