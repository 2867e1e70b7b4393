use std::{collections::HashMap, fmt, sync::Arc};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    core::{
        bus::Command,
        config::{Config, ServiceKind},
        event::Event,
    },
    services::{dummy::DummyService, xmpp::XmppService},
};

const DEFAULT_DUMMY_INTERVAL_MS: u64 = 1000;
const DEFAULT_DUMMY_BODY: &str = "!help";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub String);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait::async_trait]
pub trait Service: Send + Sync {
    async fn run(&self, cancel: CancellationToken) -> Result<()>;
    async fn handle_command(&self, command: Command) -> Result<()>;
}

/// Instantiates a map of Services based on given config
pub fn instantiate_services_from_config(
    config: &Config,
    evt_tx: &Sender<Event>,
) -> Result<HashMap<ServiceId, Arc<dyn Service>>> {
    let mut services: HashMap<ServiceId, Arc<dyn Service>> = HashMap::new();
    for (id, scfg) in &config.services {
        let service_id = ServiceId(id.clone());
        match &scfg.kind {
            ServiceKind::Dummy { interval_ms, body } => {
                let svc = Arc::new(DummyService {
                    id: service_id.clone(),
                    interval_ms: interval_ms.unwrap_or(DEFAULT_DUMMY_INTERVAL_MS),
                    body: body.clone().unwrap_or_else(|| DEFAULT_DUMMY_BODY.to_string()),
                    evt_tx: evt_tx.clone(),
                });
                services.insert(service_id, svc);
            }
            ServiceKind::Xmpp { jid, password, room, room_password } => {
                let svc = Arc::new(XmppService::create(
                    service_id.clone(),
                    jid,
                    password.clone(),
                    room,
                    room_password.clone(),
                    config.bot.own_nickname.clone(),
                    evt_tx.clone(),
                )?);
                services.insert(service_id, svc);
            }
            ServiceKind::Unknown => warn!(id=%id, "unknown service kind, skipping"),
        }
    }
    Ok(services)
}
