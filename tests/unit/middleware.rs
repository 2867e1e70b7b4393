use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pingbot::core::{
    bus::{Command, create_command_channel},
    event::{Event, EventKind},
    middleware::{Middleware, Verdict},
    service::ServiceId,
};
use pingbot::middlewares::{commands::Commands, greeter::Greeter, logger::Logger};
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use crate::common::{bot_config, room_message, room_presence};

fn event(kind: EventKind) -> Event {
    Event { service_id: ServiceId("xmpp".to_string()), kind }
}

#[test]
fn test_verdict_copy_trait() {
    let verdict1 = Verdict::Continue;
    let verdict2 = verdict1;
    assert_matches!(verdict1, Verdict::Continue);
    assert_matches!(verdict2, Verdict::Continue);
}

#[tokio::test]
async fn test_logger_middleware_run() {
    let logger = Logger {};
    let cancel_token = CancellationToken::new();

    // Logger run should complete immediately when cancelled
    cancel_token.cancel();
    let result = logger.run(cancel_token).await;
    assert_ok!(result);
}

#[test]
fn test_logger_middleware_on_event() {
    let logger = Logger {};
    let result = logger.on_event(&event(room_message("alice", "hello")));
    assert!(result.is_ok());
    assert_matches!(result.unwrap(), Verdict::Continue);
}

#[tokio::test]
async fn test_commands_middleware_sends_reply_to_event_service() {
    let (cmd_tx, mut cmd_rx) = create_command_channel(10);
    let commands = Commands::new(cmd_tx, Arc::new(bot_config()));

    let verdict = commands.on_event(&event(room_message("alice", "!majestic"))).unwrap();
    assert_matches!(verdict, Verdict::Continue);

    let command = tokio::time::timeout(Duration::from_millis(200), cmd_rx.recv())
        .await
        .expect("Timeout waiting for command")
        .expect("Channel closed");

    assert_eq!(
        command,
        Command::SendRoomMessage {
            service_id: ServiceId("xmpp".to_string()),
            room_id: "lobby@conference.example.com".to_string(),
            body: "Holy shit, this is amazing".to_string(),
        }
    );
}

#[tokio::test]
async fn test_commands_middleware_routes_direct_messages() {
    let (cmd_tx, mut cmd_rx) = create_command_channel(10);
    let commands = Commands::new(cmd_tx, Arc::new(bot_config()));

    assert_ok!(commands.on_event(&event(room_message("alice", "!msg bob lunch?"))));

    let command = tokio::time::timeout(Duration::from_millis(200), cmd_rx.recv())
        .await
        .expect("Timeout waiting for command")
        .expect("Channel closed");

    assert_matches!(
        command,
        Command::SendDirectMessage { ref user_id, ref body, .. }
            if user_id == "bob@example.com" && body == "Message: lunch?\nFrom: alice"
    );
}

#[tokio::test]
async fn test_commands_middleware_ignores_chatter_and_self() {
    let (cmd_tx, mut cmd_rx) = create_command_channel(10);
    let commands = Commands::new(cmd_tx, Arc::new(bot_config()));

    assert_ok!(commands.on_event(&event(room_message("alice", "just chatting"))));
    assert_ok!(commands.on_event(&event(room_message("pingbot", "!help"))));
    assert_ok!(commands.on_event(&event(room_presence("bob", "participant"))));

    let result = tokio::time::timeout(Duration::from_millis(50), cmd_rx.recv()).await;
    assert!(result.is_err(), "expected no command, got {result:?}");
}

#[tokio::test]
async fn test_greeter_middleware_greets_presence() {
    let (cmd_tx, mut cmd_rx) = create_command_channel(10);
    let greeter = Greeter::new(cmd_tx, Arc::new(bot_config()));

    assert_ok!(greeter.on_event(&event(room_presence("pingbot", "moderator"))));
    assert_ok!(greeter.on_event(&event(room_message("alice", "!help"))));
    assert_ok!(greeter.on_event(&event(room_presence("bob", "participant"))));

    let command = tokio::time::timeout(Duration::from_millis(200), cmd_rx.recv())
        .await
        .expect("Timeout waiting for command")
        .expect("Channel closed");

    assert_matches!(
        command,
        Command::SendRoomMessage { ref body, .. } if body == "Hello, participant bob"
    );
}

#[tokio::test]
async fn test_greeter_middleware_skips_self_presence_with_rewritten_nickname() {
    let (cmd_tx, mut cmd_rx) = create_command_channel(10);
    let greeter = Greeter::new(cmd_tx, Arc::new(bot_config()));

    let own_presence = EventKind::RoomPresence {
        room_id: "lobby@conference.example.com".to_string(),
        nickname: "pingbot_".to_string(),
        role: "participant".to_string(),
        is_self: true,
    };
    let verdict = greeter.on_event(&event(own_presence)).unwrap();
    assert_matches!(verdict, Verdict::Continue);

    let result = tokio::time::timeout(Duration::from_millis(50), cmd_rx.recv()).await;
    assert!(result.is_err(), "expected no greeting, got {result:?}");
}
