use assert_matches::assert_matches;
use pingbot::core::{
    event::{Event, EventKind},
    message::{IncomingMessage, IncomingPresence},
    service::ServiceId,
};

use crate::common::{room_message, room_presence};

#[test]
fn test_event_display_direct_message() {
    let event = Event {
        service_id: ServiceId("test_service".to_string()),
        kind: EventKind::DirectMessage {
            user_id: "bob@example.com".to_string(),
            body: "Hello world".to_string(),
        },
    };

    let display = format!("{}", event);
    assert!(display.contains("[test_service]"));
    assert!(display.contains("[DM]"));
    assert!(display.contains("bob@example.com"));
    assert!(display.contains("Hello world"));
}

#[test]
fn test_event_display_room_message() {
    let event =
        Event { service_id: ServiceId("xmpp".to_string()), kind: room_message("alice", "!help") };

    let display = format!("{}", event);
    assert_eq!(display, "[xmpp][RM] lobby@conference.example.com <alice>: !help");
}

#[test]
fn test_event_display_room_presence() {
    let event = Event {
        service_id: ServiceId("xmpp".to_string()),
        kind: room_presence("bob", "participant"),
    };

    assert_eq!(format!("{event}"), "[xmpp][Presence] lobby@conference.example.com: bob (participant)");
}

#[test]
fn test_event_serialization() {
    let event = Event {
        service_id: ServiceId("test_service".to_string()),
        kind: room_message("alice", "Hello"),
    };

    let serialized = serde_json::to_string(&event).expect("Failed to serialize");
    assert!(serialized.contains("test_service"));
    assert!(serialized.contains("RoomMessage"));

    let deserialized: Event = serde_json::from_str(&serialized).expect("Failed to deserialize");
    assert_eq!(deserialized.service_id.0, "test_service");
    assert_matches!(deserialized.kind, EventKind::RoomMessage { .. });
}

#[test]
fn test_incoming_message_from_room_event() {
    let event =
        Event { service_id: ServiceId("xmpp".to_string()), kind: room_message("alice", "!h") };

    let message = IncomingMessage::from_event(&event).unwrap();
    assert_eq!(message.body, "!h");
    assert_eq!(message.sender_bare_address, "lobby@conference.example.com");
    assert_eq!(message.sender_nickname, "alice");

    assert!(IncomingPresence::from_event(&event).is_none());
}

#[test]
fn test_incoming_presence_from_presence_event() {
    let event = Event {
        service_id: ServiceId("xmpp".to_string()),
        kind: room_presence("carol", "moderator"),
    };

    let presence = IncomingPresence::from_event(&event).unwrap();
    assert_eq!(presence.nickname, "carol");
    assert_eq!(presence.role, "moderator");
    assert_eq!(presence.bare_address, "lobby@conference.example.com");

    assert!(IncomingMessage::from_event(&event).is_none());
}
