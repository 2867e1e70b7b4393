use async_trait::async_trait;
use pingbot::core::bus::Command;
use pingbot::core::config::{Config, ReconnectionConfig, ServiceCfg, ServiceKind, StaticConfiguration};
use pingbot::core::event::{Event, EventKind};
use pingbot::core::service::{Service, ServiceId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

#[allow(dead_code)] // Suppress spurious warning - some compilation units don't include this code.
pub fn bot_config() -> StaticConfiguration {
    StaticConfiguration {
        own_nickname: "pingbot".to_string(),
        broadcast_service_domain: "broadcast.example.com".to_string(),
        direct_message_domain: "example.com".to_string(),
    }
}

/// Creates a test configuration with a dummy service for testing
#[allow(dead_code)]
pub fn create_test_config() -> Config {
    let mut services = HashMap::new();
    services.insert(
        "test_dummy".to_string(),
        ServiceCfg {
            kind: ServiceKind::Dummy { interval_ms: Some(100), body: None },
            middleware: None,
        },
    );
    Config {
        bot: bot_config(),
        services,
        middlewares: HashMap::new(),
        reconnection: ReconnectionConfig::default(),
    }
}

/// A controllable mock service: room messages to emit are pushed through a channel,
/// and every command it receives is recorded.
#[allow(dead_code)] // Used by integration tests, not unit tests
pub struct MockService {
    pub id: ServiceId,
    pub evt_tx: mpsc::Sender<Event>,
    pub control_rx: Arc<Mutex<mpsc::Receiver<EventKind>>>,
    pub received: Arc<Mutex<Vec<Command>>>,
}

impl MockService {
    #[allow(dead_code)]
    pub fn new(id: ServiceId, evt_tx: mpsc::Sender<Event>) -> (Self, mpsc::Sender<EventKind>) {
        let (control_tx, control_rx) = mpsc::channel(10);

        let service = MockService {
            id,
            evt_tx,
            control_rx: Arc::new(Mutex::new(control_rx)),
            received: Arc::new(Mutex::new(Vec::new())),
        };

        (service, control_tx)
    }
}

#[async_trait]
impl Service for MockService {
    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut control_rx = self.control_rx.lock().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                }
                maybe_kind = control_rx.recv() => {
                    let Some(kind) = maybe_kind else { break };
                    let event = Event { service_id: self.id.clone(), kind };
                    if self.evt_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_command(&self, command: Command) -> anyhow::Result<()> {
        self.received.lock().await.push(command);
        Ok(())
    }
}

#[allow(dead_code)]
pub fn room_message(sender: &str, body: &str) -> EventKind {
    EventKind::RoomMessage {
        room_id: "lobby@conference.example.com".to_string(),
        body: body.to_string(),
        sender_nickname: sender.to_string(),
        is_self: sender == "pingbot",
    }
}

#[allow(dead_code)]
pub fn room_presence(nickname: &str, role: &str) -> EventKind {
    EventKind::RoomPresence {
        room_id: "lobby@conference.example.com".to_string(),
        nickname: nickname.to_string(),
        role: role.to_string(),
        is_self: nickname == "pingbot",
    }
}
