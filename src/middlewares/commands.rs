//! Exclamation-prefixed chat commands.
//!
//! The routing itself is a pure function of the incoming message and the
//! static configuration; the [`Commands`] middleware only feeds it events from
//! the bus and forwards the resulting messages back as commands.

use std::sync::{Arc, LazyLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::{
    bus::Command,
    config::StaticConfiguration,
    event::{Event, EventKind},
    message::{IncomingMessage, OutboundMessage},
    middleware::{Middleware, Verdict},
};

pub const HELP_TEXT: &str = "Type !ping group_name yourmessage to ping.";
pub const INVALID_GROUP_NAME_TEXT: &str = "That is not a valid group name.";
pub const MAJESTIC_TEXT: &str = "Holy shit, this is amazing";

const PING_SEPARATOR: &str = "###### PING ######";
const TIMESTAMP_FORMAT: &str = "%a, %d %b %Y at %H:%M:%S UTC";

// Characters a JID local part may not contain (RFC 7622 plus the separators)
const FORBIDDEN_LOCAL_PART: [char; 8] = ['@', '/', '"', '&', '\'', ':', '<', '>'];

static WORD_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word-run pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Ping { group: String, body: String },
    Help,
    Majestic,
    Msg { user: String, body: String },
}

/// Problems with a recognized command. The `Display` text is the reply sent back to the room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{}", HELP_TEXT)]
    MalformedCommand { command: String },
    #[error("{}", INVALID_GROUP_NAME_TEXT)]
    InvalidGroupName { group: String },
}

/// Splits on the first single space. A missing space yields `None` for the remainder.
fn split_first_space(s: &str) -> (&str, Option<&str>) {
    match s.split_once(' ') {
        Some((head, rest)) => (head, Some(rest)),
        None => (s, None),
    }
}

/// Number of maximal runs of word characters (letters, digits, underscore).
pub fn word_run_count(s: &str) -> usize {
    WORD_RUN.find_iter(s).count()
}

pub fn is_valid_group_name(group: &str) -> bool {
    word_run_count(group) == 1
}

/// A direct-message target must be a bare local part so it cannot pick its own domain or resource.
pub fn is_valid_user_name(user: &str) -> bool {
    !user.is_empty()
        && !user.chars().any(|c| c.is_whitespace() || FORBIDDEN_LOCAL_PART.contains(&c))
}

/// Parses a message body. `Ok(None)` means the body is not a known command.
pub fn parse(body: &str) -> Result<Option<ChatCommand>, CommandError> {
    let (token, rest) = split_first_space(body);
    let token = token.to_lowercase();

    let command = match token.as_str() {
        "!ping" | "!p" => {
            let (group, ping_body) = split_arguments(&token, rest)?;
            if !is_valid_group_name(group) {
                return Err(CommandError::InvalidGroupName { group: group.to_string() });
            }
            ChatCommand::Ping { group: group.to_string(), body: ping_body.to_string() }
        }
        "!help" | "!h" => ChatCommand::Help,
        "!majestic" => ChatCommand::Majestic,
        "!msg" | "!m" => {
            let (user, msg_body) = split_arguments(&token, rest)?;
            if !is_valid_user_name(user) {
                return Err(CommandError::MalformedCommand { command: token.clone() });
            }
            ChatCommand::Msg { user: user.to_string(), body: msg_body.to_string() }
        }
        _ => return Ok(None),
    };

    Ok(Some(command))
}

fn split_arguments<'a>(
    token: &str,
    rest: Option<&'a str>,
) -> Result<(&'a str, &'a str), CommandError> {
    let malformed = || CommandError::MalformedCommand { command: token.to_string() };
    let (target, body) = split_first_space(rest.ok_or_else(malformed)?);
    Ok((target, body.ok_or_else(malformed)?))
}

pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

pub fn render_ping(group: &str, body: &str, sender: &str, now: DateTime<Utc>) -> String {
    format!(
        "\n{PING_SEPARATOR}\n\nMessage: {body}\nSent from user {sender} to group {group} on {}\n\n{PING_SEPARATOR}",
        format_timestamp(now)
    )
}

pub fn render_direct(body: &str, sender: &str) -> String {
    format!("Message: {body}\nFrom: {sender}")
}

/// Routes a room message to zero or more outbound messages, stamping pings with the current time.
pub fn route(message: &IncomingMessage, config: &StaticConfiguration) -> Vec<OutboundMessage> {
    route_at(message, config, Utc::now())
}

pub fn route_at(
    message: &IncomingMessage,
    config: &StaticConfiguration,
    now: DateTime<Utc>,
) -> Vec<OutboundMessage> {
    if message.sender_nickname == config.own_nickname {
        return Vec::new();
    }

    let reply_to = &message.sender_bare_address;
    let command = match parse(&message.body) {
        Ok(Some(command)) => command,
        Ok(None) => return Vec::new(),
        Err(e) => {
            debug!(error=?e, sender=%message.sender_nickname, "rejected command");
            return vec![OutboundMessage::room_broadcast(reply_to, e.to_string())];
        }
    };

    let outbound = match command {
        ChatCommand::Ping { group, body } => OutboundMessage::direct(
            format!("{group}@{}", config.broadcast_service_domain),
            render_ping(&group, &body, &message.sender_nickname, now),
        ),
        ChatCommand::Help => OutboundMessage::room_broadcast(reply_to, HELP_TEXT),
        ChatCommand::Majestic => OutboundMessage::room_broadcast(reply_to, MAJESTIC_TEXT),
        ChatCommand::Msg { user, body } => OutboundMessage::direct(
            format!("{user}@{}", config.direct_message_domain),
            render_direct(&body, &message.sender_nickname),
        ),
    };

    vec![outbound]
}

pub struct Commands {
    cmd_tx: Sender<Command>,
    config: Arc<StaticConfiguration>,
}

impl Commands {
    pub fn new(cmd_tx: Sender<Command>, config: Arc<StaticConfiguration>) -> Self {
        Self { cmd_tx, config }
    }
}

#[async_trait]
impl Middleware for Commands {
    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            broadcast_domain=%self.config.broadcast_service_domain,
            direct_domain=%self.config.direct_message_domain,
            "commands middleware running..."
        );
        cancel.cancelled().await;
        info!("commands middleware shutting down...");
        Ok(())
    }

    fn on_event(&self, evt: &Event) -> Result<Verdict> {
        if let EventKind::RoomMessage { is_self: true, .. } = evt.kind {
            return Ok(Verdict::Continue);
        }
        let Some(message) = IncomingMessage::from_event(evt) else {
            return Ok(Verdict::Continue);
        };

        let outbound = route(&message, &self.config);
        if outbound.is_empty() {
            return Ok(Verdict::Continue);
        }

        info!(sender=%message.sender_nickname, replies=%outbound.len(), "processed command");

        let cmd_tx = self.cmd_tx.clone();
        let service_id = evt.service_id.clone();
        tokio::spawn(async move {
            for msg in outbound {
                if let Err(e) = cmd_tx.send(msg.into_command(service_id.clone())).await {
                    error!(error=%e, "failed to send command reply");
                    break;
                }
            }
        });

        Ok(Verdict::Continue)
    }
}
