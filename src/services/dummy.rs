use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::{
    bus::Command,
    event::{Event, EventKind},
    service::{Service, ServiceId},
};

pub const DUMMY_ROOM: &str = "room@dummy.local";
pub const DUMMY_SENDER: &str = "dummy";

/// Emits the same room message on a fixed interval and logs outbound commands.
pub struct DummyService {
    pub id: ServiceId,
    pub interval_ms: u64,
    pub body: String,
    pub evt_tx: tokio::sync::mpsc::Sender<Event>,
}

#[async_trait::async_trait]
impl Service for DummyService {
    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(self.interval_ms));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(service=%self.id, "shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    let msg = Event {
                        service_id: self.id.clone(),
                        kind: EventKind::RoomMessage {
                            room_id: DUMMY_ROOM.into(),
                            body: self.body.clone(),
                            sender_nickname: DUMMY_SENDER.into(),
                            is_self: false,
                        },
                    };
                    if let Err(e) = self.evt_tx.send(msg).await {
                        tracing::error!(?e, "bus event receiver dropped");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_command(&self, command: Command) -> Result<()> {
        match command {
            Command::SendDirectMessage { user_id, body, .. } => {
                info!(service=%self.id, user_id=%user_id, body=%body, "dummy service: would send direct message");
            }
            Command::SendRoomMessage { room_id, body, .. } => {
                info!(service=%self.id, room_id=%room_id, body=%body, "dummy service: would send room message");
            }
        }
        Ok(())
    }
}
