//! Property-based tests for the event protocol
//!
//! Inbound decoding must never panic and must refuse anything that is not a
//! known inbound kind.

use chatline::shared::event::{ClientEvent, DecodeError, EventKind};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_decode_never_panics(text in ".*") {
        let _ = ClientEvent::decode(&text);
    }

    #[test]
    fn test_unknown_source_is_rejected(source in "[a-z]{1,8}\\.[a-z]{1,8}") {
        prop_assume!(EventKind::from_str(&source).is_none());
        let frame = serde_json::json!({ "source": source }).to_string();
        let is_unknown = matches!(ClientEvent::decode(&frame), Err(DecodeError::UnknownKind(_)));
        prop_assert!(is_unknown);
    }

    #[test]
    fn test_typing_target_round_trips(username in "[a-z0-9_]{1,20}") {
        let frame = serde_json::json!({ "source": "message.type", "username": username }).to_string();
        match ClientEvent::decode(&frame) {
            Ok(ClientEvent::MessageType(request)) => prop_assert_eq!(request.username, username),
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}
