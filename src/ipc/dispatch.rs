//! Viewer message dispatch: decode a frame payload and route it.

use std::time::Instant;

use tracing::{debug, warn};

use super::messages::{InboundMessage, OutboundMessage};
use crate::state::StageState;

/// Decode and handle one inbound payload.  Returns an optional reply for
/// the sending client only.
pub fn handle_message(
    state: &mut StageState,
    client_id: u64,
    raw: &[u8],
    now: Instant,
) -> Option<String> {
    let message = match InboundMessage::decode_bytes(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!(client_id, "{}", e);
            return error_response(&e.to_string());
        }
    };

    match message {
        InboundMessage::GestureInput(input) => {
            let transition = state.handle_gesture_input(&input, now);
            debug!(client_id, gesture = input.label().as_str(), ?transition, "gesture input");
            None
        }
        InboundMessage::LandmarkFrame(frame) => {
            state.handle_landmark_frame(&frame, now);
            None
        }
        InboundMessage::Status => snapshot_message(state),
        InboundMessage::Ping => encode(&OutboundMessage::Pong),
    }
}

/// Current session snapshot as a `gesture_update` payload.
pub fn snapshot_message(state: &StageState) -> Option<String> {
    encode(&OutboundMessage::GestureUpdate {
        data: state.session.snapshot(),
    })
}

pub fn error_response(reason: &str) -> Option<String> {
    encode(&OutboundMessage::Error {
        reason: reason.to_string(),
    })
}

fn encode(message: &OutboundMessage) -> Option<String> {
    match message.encode() {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!("failed to encode {:?}: {}", message, e);
            None
        }
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DisplayMode;
    use crate::state::StageConfig;
    use serde_json::Value;

    fn state() -> StageState {
        StageState::new(StageConfig::default())
    }

    fn parse(reply: Option<String>) -> Value {
        serde_json::from_str(&reply.expect("expected a reply")).unwrap()
    }

    #[test]
    fn test_gesture_input_has_no_reply() {
        let mut s = state();
        let reply = handle_message(
            &mut s,
            1,
            br#"{"type":"gesture_input","gesture":"OPEN"}"#,
            Instant::now(),
        );
        assert!(reply.is_none());
        assert_eq!(s.session.mode(), DisplayMode::Scatter);
    }

    #[test]
    fn test_status_replies_with_snapshot() {
        let mut s = state();
        let v = parse(handle_message(&mut s, 1, br#"{"type":"status"}"#, Instant::now()));
        assert_eq!(v["event"], "gesture_update");
        assert_eq!(v["data"]["mode"], "TREE");
    }

    #[test]
    fn test_ping() {
        let mut s = state();
        let v = parse(handle_message(&mut s, 1, br#"{"type":"ping"}"#, Instant::now()));
        assert_eq!(v["event"], "pong");
    }

    #[test]
    fn test_malformed_gets_error_reply() {
        let mut s = state();
        let v = parse(handle_message(&mut s, 1, b"{{{", Instant::now()));
        assert_eq!(v["event"], "error");
        assert!(v["reason"].as_str().unwrap().starts_with("malformed message"));
        assert_eq!(s.session.mode(), DisplayMode::Tree);
    }

    #[test]
    fn test_invalid_utf8_gets_error_reply() {
        let mut s = state();
        let v = parse(handle_message(&mut s, 1, b"{\"type\":\"ping\xff\"}", Instant::now()));
        assert_eq!(v["event"], "error");
        assert!(v["reason"].as_str().unwrap().contains("UTF-8"));
    }
}
