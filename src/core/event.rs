use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::service::ServiceId;

#[derive(Debug, Serialize, Deserialize)]
pub struct Event {
    pub service_id: ServiceId,
    pub kind: EventKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum EventKind {
    DirectMessage {
        user_id: String,
        body: String,
    },
    RoomMessage {
        room_id: String,
        body: String,
        sender_nickname: String,
        is_self: bool,
    },
    RoomPresence {
        room_id: String,
        nickname: String,
        role: String,
        is_self: bool,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", &self.service_id)?;
        match &self.kind {
            EventKind::DirectMessage { user_id, body } => {
                write!(f, "[DM] {user_id}: {body}")
            }
            EventKind::RoomMessage { room_id, body, sender_nickname, .. } => {
                write!(f, "[RM] {room_id} <{sender_nickname}>: {body}")
            }
            EventKind::RoomPresence { room_id, nickname, role, .. } => {
                write!(f, "[Presence] {room_id}: {nickname} ({role})")
            }
        }
    }
}
