use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Sender};
use tokio_util::sync::CancellationToken;
use tokio_xmpp::{AsyncClient as Client, Event as XmppEvent};
use xmpp_parsers::{
    iq::Iq,
    jid::{BareJid, Jid},
    message::{Body, Message, MessageType},
    minidom::Element,
    muc::{
        Muc, MucUser,
        user::{Role, Status},
    },
    ns,
    presence::{Presence, Type as PresenceType},
    roster::Roster,
};
use tracing::{debug, error, info, warn};

use crate::core::bus::Command;
use crate::core::event::{Event, EventKind};
use crate::core::service::{Service, ServiceId};

/// A MUC occupant presence, reduced to what the bot cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupantPresence {
    pub room: String,
    pub nickname: String,
    pub role: String,
    pub available: bool,
    pub is_self: bool,
}

/// Occupants seen per room during one connection.
///
/// Presences that arrive before our own join completes are the room's existing
/// occupant list and are only recorded.
#[derive(Debug, Default)]
pub struct RoomState {
    occupants: HashMap<String, HashSet<String>>,
    joined: HashSet<String>,
}

impl RoomState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_joined(&self, room: &str) -> bool {
        self.joined.contains(room)
    }

    /// Records the presence and returns an event when a member newly entered the room.
    pub fn apply(&mut self, presence: OccupantPresence) -> Option<EventKind> {
        let occupants = self.occupants.entry(presence.room.clone()).or_default();

        if !presence.available {
            occupants.remove(&presence.nickname);
            if presence.is_self {
                self.joined.remove(&presence.room);
            }
            return None;
        }

        let is_new = occupants.insert(presence.nickname.clone());
        if presence.is_self {
            self.joined.insert(presence.room.clone());
        } else if !self.joined.contains(&presence.room) {
            return None;
        }

        is_new.then(|| EventKind::RoomPresence {
            room_id: presence.room,
            nickname: presence.nickname,
            role: presence.role,
            is_self: presence.is_self,
        })
    }
}

fn role_name(role: &Role) -> &'static str {
    match role {
        Role::Moderator => "moderator",
        Role::Participant => "participant",
        Role::Visitor => "visitor",
        Role::None => "none",
    }
}

/// Converts an incoming message stanza to a bus event.
///
/// Room history replayed on join carries a delay marker and is dropped.
pub fn message_event(message: Message, own_nickname: &str) -> Option<EventKind> {
    let from = message.from.as_ref()?;
    let body = message.bodies.values().next()?.0.clone();

    match message.type_ {
        MessageType::Groupchat => {
            if message.payloads.iter().any(|p| p.is("delay", ns::DELAY)) {
                debug!(from=%from, "skipping delayed room message");
                return None;
            }
            // Messages from the room itself (subject, status) have no nickname
            let sender_nickname = from.resource()?.to_string();
            Some(EventKind::RoomMessage {
                room_id: from.to_bare().to_string(),
                is_self: sender_nickname == own_nickname,
                sender_nickname,
                body,
            })
        }
        MessageType::Chat | MessageType::Normal => {
            Some(EventKind::DirectMessage { user_id: from.to_bare().to_string(), body })
        }
        _ => None,
    }
}

/// Extracts the occupant information from a MUC presence stanza.
pub fn occupant_presence(presence: Presence, own_nickname: &str) -> Option<OccupantPresence> {
    let from = presence.from.as_ref()?;
    let nickname = from.resource()?.to_string();
    let available = match presence.type_ {
        PresenceType::None => true,
        PresenceType::Unavailable => false,
        _ => return None,
    };

    let payload = presence.payloads.iter().find(|p| p.is("x", ns::MUC_USER))?;
    let muc_user = match MucUser::try_from(payload.clone()) {
        Ok(muc_user) => muc_user,
        Err(e) => {
            debug!(error=?e, from=%from, "invalid muc user payload");
            return None;
        }
    };

    let role = muc_user.items.first().map(|item| role_name(&item.role)).unwrap_or("none");
    let is_self = muc_user.status.contains(&Status::SelfPresence) || nickname == own_nickname;

    Some(OccupantPresence {
        room: from.to_bare().to_string(),
        nickname,
        role: role.to_string(),
        available,
        is_self,
    })
}

pub fn join_presence(room: &BareJid, nickname: &str, password: Option<&str>) -> Result<Element> {
    let occupant: Jid = format!("{room}/{nickname}").parse()?;
    let mut muc = Muc::new();
    muc.password = password.map(str::to_string);
    Ok(Presence::new(PresenceType::None).with_to(occupant).with_payloads(vec![muc.into()]).into())
}

pub fn session_stanzas(room: &BareJid, nickname: &str, password: Option<&str>) -> Result<Vec<Element>> {
    let roster = Iq::from_get("roster", Roster { ver: None, items: vec![] });
    Ok(vec![
        roster.into(),
        Presence::new(PresenceType::None).into(),
        join_presence(room, nickname, password)?,
    ])
}

pub fn outbound_message(to: &str, body: String, type_: MessageType) -> Result<Element> {
    let to: Jid = to.parse().map_err(|e| anyhow!("invalid address '{to}': {e}"))?;
    let mut message = Message::new(Some(to));
    message.type_ = type_;
    message.bodies.insert(String::new(), Body(body));
    Ok(message.into())
}

pub struct XmppService {
    id: ServiceId,
    jid: Jid,
    password: SecretString,
    room: BareJid,
    room_password: Option<SecretString>,
    nickname: String,
    evt_tx: Sender<Event>,
    msg_tx: Arc<Mutex<Option<Sender<Element>>>>,
}

impl XmppService {
    pub fn create(
        id: ServiceId,
        jid: &str,
        password: SecretString,
        room: &str,
        room_password: Option<SecretString>,
        nickname: String,
        evt_tx: Sender<Event>,
    ) -> Result<Self> {
        if nickname.is_empty() {
            return Err(anyhow!("nickname cannot be empty"));
        }

        let jid: Jid = jid.parse().map_err(|e| anyhow!("invalid jid '{jid}': {e}"))?;
        let room: BareJid = room.parse().map_err(|e| anyhow!("invalid room '{room}': {e}"))?;

        Ok(Self {
            id,
            jid,
            password,
            room,
            room_password,
            nickname,
            evt_tx,
            msg_tx: Arc::new(Mutex::new(None)),
        })
    }

    /// Stanzas sent once per session: roster request, initial presence, then the room join.
    fn session_stanzas(&self) -> Result<Vec<Element>> {
        let password = self.room_password.as_ref().map(|p| p.expose_secret());
        session_stanzas(&self.room, &self.nickname, password)
    }

    async fn on_stanza(&self, stanza: Element, rooms: &mut RoomState) -> Result<()> {
        let name = stanza.name().to_string();
        let kind = match name.as_str() {
            "message" => match Message::try_from(stanza) {
                Ok(message) => message_event(message, &self.nickname),
                Err(e) => {
                    debug!(error=?e, "ignoring unparsable message");
                    None
                }
            },
            "presence" => match Presence::try_from(stanza) {
                Ok(presence) => {
                    let occupant = occupant_presence(presence, &self.nickname);
                    occupant.and_then(|occupant| {
                        let room = occupant.room.clone();
                        let was_joined = rooms.is_joined(&room);
                        let event = rooms.apply(occupant);
                        if !was_joined && rooms.is_joined(&room) {
                            info!(service=%self.id, room=%room, "joined room");
                        }
                        event
                    })
                }
                Err(e) => {
                    debug!(error=?e, "ignoring unparsable presence");
                    None
                }
            },
            other => {
                debug!(stanza=%other, "ignoring stanza");
                None
            }
        };

        if let Some(kind) = kind {
            self.evt_tx.send(Event { service_id: self.id.clone(), kind }).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Service for XmppService {
    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(id=%self.id, jid=%self.jid, "xmpp service starting");

        let mut client = Client::new(self.jid.clone(), self.password.expose_secret().to_string());

        let (send_tx, mut send_rx) = mpsc::channel::<Element>(32);
        *self.msg_tx.lock().await = Some(send_tx);

        let mut rooms = RoomState::new();

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(id=%self.id, "xmpp service shutting down");
                    if let Err(e) = client.send_end().await {
                        warn!(error=%e, "failed to close xmpp stream");
                    }
                    break Ok(());
                }
                event = client.next() => {
                    match event {
                        Some(XmppEvent::Online { bound_jid, .. }) => {
                            info!(service=%self.id, jid=%bound_jid, "session established");
                            let stanzas = match self.session_stanzas() {
                                Ok(stanzas) => stanzas,
                                Err(e) => break Err(e),
                            };
                            let mut sent = Ok(());
                            for stanza in stanzas {
                                sent = client.send_stanza(stanza).await;
                                if sent.is_err() {
                                    break;
                                }
                            }
                            if let Err(e) = sent {
                                error!(error=%e, "failed to join room");
                                break Err(e.into());
                            }
                            info!(service=%self.id, room=%self.room, nickname=%self.nickname, "joining room");
                        }
                        Some(XmppEvent::Stanza(stanza)) => {
                            if let Err(e) = self.on_stanza(stanza, &mut rooms).await {
                                error!(error=%e, "failed to handle stanza");
                            }
                        }
                        Some(XmppEvent::Disconnected(e)) => {
                            warn!(error=%e, "xmpp connection lost");
                            break Err(anyhow!("disconnected: {e}"));
                        }
                        None => {
                            warn!("xmpp stream ended");
                            break Err(anyhow!("connection closed"));
                        }
                    }
                }
                Some(stanza) = send_rx.recv() => {
                    if let Err(e) = client.send_stanza(stanza).await {
                        error!(error=%e, "failed to send stanza");
                        break Err(e.into());
                    }
                }
            }
        };

        *self.msg_tx.lock().await = None;
        result
    }

    async fn handle_command(&self, command: Command) -> Result<()> {
        let stanza = match command {
            Command::SendDirectMessage { user_id, body, .. } => {
                debug!(to=%user_id, "sending direct message");
                outbound_message(&user_id, body, MessageType::Normal)?
            }
            Command::SendRoomMessage { room_id, body, .. } => {
                debug!(room_id=%room_id, "sending room message");
                outbound_message(&room_id, body, MessageType::Groupchat)?
            }
        };

        // Clone out so the lock is not held while the send waits for capacity
        let tx = self.msg_tx.lock().await.clone();
        let Some(tx) = tx else {
            return Err(anyhow!("xmpp service not connected"));
        };

        tx.send(stanza).await?;
        Ok(())
    }
}
