use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::{
    bus::Command,
    config::StaticConfiguration,
    event::{Event, EventKind},
    message::{IncomingPresence, OutboundMessage},
    middleware::{Middleware, Verdict},
};

/// Greets a member who entered the room. Our own presence is never greeted.
pub fn greet(presence: &IncomingPresence, config: &StaticConfiguration) -> Option<OutboundMessage> {
    if presence.nickname == config.own_nickname {
        return None;
    }
    Some(OutboundMessage::room_broadcast(
        &presence.bare_address,
        format!("Hello, {} {}", presence.role, presence.nickname),
    ))
}

pub struct Greeter {
    cmd_tx: Sender<Command>,
    config: Arc<StaticConfiguration>,
}

impl Greeter {
    pub fn new(cmd_tx: Sender<Command>, config: Arc<StaticConfiguration>) -> Self {
        Self { cmd_tx, config }
    }
}

#[async_trait]
impl Middleware for Greeter {
    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(nickname=%self.config.own_nickname, "greeter middleware running...");
        cancel.cancelled().await;
        info!("greeter middleware shutting down...");
        Ok(())
    }

    fn on_event(&self, evt: &Event) -> Result<Verdict> {
        // The server may have rewritten our nickname, so trust the adapter's flag
        if let EventKind::RoomPresence { is_self: true, .. } = evt.kind {
            return Ok(Verdict::Continue);
        }

        let Some(presence) = IncomingPresence::from_event(evt) else {
            return Ok(Verdict::Continue);
        };

        let Some(greeting) = greet(&presence, &self.config) else {
            debug!(nickname=%presence.nickname, "not greeting own presence");
            return Ok(Verdict::Continue);
        };

        let command = greeting.into_command(evt.service_id.clone());
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = cmd_tx.send(command).await {
                error!(error=%e, "failed to send greeting");
            }
        });

        info!(nickname=%presence.nickname, role=%presence.role, "greeted room member");
        Ok(Verdict::Continue)
    }
}
