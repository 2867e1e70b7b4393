use crate::core::{
    bus::Command,
    event::{Event, EventKind},
    service::ServiceId,
};

/// A chat message received in a room, as seen by the command router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub body: String,
    /// Room address; room-scoped replies go here.
    pub sender_bare_address: String,
    pub sender_nickname: String,
}

impl IncomingMessage {
    pub fn from_event(event: &Event) -> Option<Self> {
        let EventKind::RoomMessage { room_id, body, sender_nickname, .. } = &event.kind else {
            return None;
        };
        Some(Self {
            body: body.clone(),
            sender_bare_address: room_id.clone(),
            sender_nickname: sender_nickname.clone(),
        })
    }
}

/// A room member that just became available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingPresence {
    pub nickname: String,
    pub role: String,
    pub bare_address: String,
}

impl IncomingPresence {
    pub fn from_event(event: &Event) -> Option<Self> {
        let EventKind::RoomPresence { room_id, nickname, role, .. } = &event.kind else {
            return None;
        };
        Some(Self { nickname: nickname.clone(), role: role.clone(), bare_address: room_id.clone() })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    RoomBroadcast,
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub target: String,
    pub body: String,
    pub delivery_mode: DeliveryMode,
}

impl OutboundMessage {
    pub fn room_broadcast(target: impl Into<String>, body: impl Into<String>) -> Self {
        Self { target: target.into(), body: body.into(), delivery_mode: DeliveryMode::RoomBroadcast }
    }

    pub fn direct(target: impl Into<String>, body: impl Into<String>) -> Self {
        Self { target: target.into(), body: body.into(), delivery_mode: DeliveryMode::Direct }
    }

    /// Wraps this message in a bus command addressed to `service_id`.
    pub fn into_command(self, service_id: ServiceId) -> Command {
        match self.delivery_mode {
            DeliveryMode::RoomBroadcast => {
                Command::SendRoomMessage { service_id, room_id: self.target, body: self.body }
            }
            DeliveryMode::Direct => {
                Command::SendDirectMessage { service_id, user_id: self.target, body: self.body }
            }
        }
    }
}
