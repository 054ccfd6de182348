//! Wire messages exchanged with viewers.
//!
//! Every frame payload is a JSON object.  Inbound objects are tagged by
//! `"type"`, outbound ones by `"event"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::session::{HandPosition, Snapshot};
use crate::tracking::{GestureLabel, LandmarkFrame};

/// Errors decoding or encoding a frame payload.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("message of {0} bytes exceeds maximum size")]
    Oversized(u32),
}

// ── Inbound ────────────────────────────────────────────────

/// A message sent by a viewer or input client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Pre-classified gesture from a client-side recognizer.
    GestureInput(GestureInput),
    /// Raw detector output for one video frame.
    LandmarkFrame(LandmarkFrame),
    /// Request a one-off snapshot.
    Status,
    Ping,
}

impl InboundMessage {
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Decode a raw frame payload, which must be UTF-8.
    pub fn decode_bytes(raw: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode(std::str::from_utf8(raw)?)
    }
}

/// Gesture label plus optional hand position.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GestureInput {
    /// Any JSON value; only the five known label strings count.
    #[serde(default)]
    pub gesture: Option<Value>,
    #[serde(default)]
    pub hand: Option<HandInput>,
}

impl GestureInput {
    /// The label carried by this input, `NONE` when missing or unknown.
    pub fn label(&self) -> GestureLabel {
        self.gesture
            .as_ref()
            .and_then(Value::as_str)
            .map(GestureLabel::from_wire)
            .unwrap_or_default()
    }
}

/// Hand position as reported by an input client.  Missing fields are zero
/// / not detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HandInput {
    pub x: f32,
    pub y: f32,
    pub detected: bool,
}

impl From<HandInput> for HandPosition {
    fn from(h: HandInput) -> Self {
        HandPosition {
            x: h.x,
            y: h.y,
            detected: h.detected,
        }
    }
}

// ── Outbound ───────────────────────────────────────────────

/// A message sent to viewers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundMessage {
    GestureUpdate { data: Snapshot },
    Pong,
    Error { reason: String },
}

impl OutboundMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    #[test]
    fn test_decode_gesture_input() {
        let msg = InboundMessage::decode(
            r#"{"type":"gesture_input","gesture":"PINCH","hand":{"x":0.1,"y":-0.3,"detected":true}}"#,
        )
        .unwrap();
        let InboundMessage::GestureInput(input) = msg else {
            panic!("expected gesture input, got {:?}", msg);
        };
        assert_eq!(input.label(), GestureLabel::Pinch);
        assert_eq!(
            input.hand,
            Some(HandInput { x: 0.1, y: -0.3, detected: true })
        );
    }

    #[test]
    fn test_missing_or_unknown_gesture_is_none() {
        for raw in [
            r#"{"type":"gesture_input"}"#,
            r#"{"type":"gesture_input","gesture":null}"#,
            r#"{"type":"gesture_input","gesture":"WAVE"}"#,
            r#"{"type":"gesture_input","gesture":42}"#,
        ] {
            let Ok(InboundMessage::GestureInput(input)) = InboundMessage::decode(raw) else {
                panic!("failed to decode {}", raw);
            };
            assert_eq!(input.label(), GestureLabel::None, "{}", raw);
            assert!(input.hand.is_none());
        }
    }

    #[test]
    fn test_partial_hand_defaults() {
        let Ok(InboundMessage::GestureInput(input)) =
            InboundMessage::decode(r#"{"type":"gesture_input","hand":{"x":0.5}}"#)
        else {
            panic!("decode failed");
        };
        assert_eq!(input.hand, Some(HandInput { x: 0.5, y: 0.0, detected: false }));
    }

    #[test]
    fn test_decode_landmark_frame() {
        let msg = InboundMessage::decode(
            r#"{"type":"landmark_frame","detected":true,"landmarks":[[0.5,0.8,0.0]]}"#,
        )
        .unwrap();
        assert!(matches!(msg, InboundMessage::LandmarkFrame(ref f) if f.detected && f.landmarks.len() == 1));
    }

    #[test]
    fn test_decode_simple_requests() {
        assert_eq!(InboundMessage::decode(r#"{"type":"status"}"#).unwrap(), InboundMessage::Status);
        assert_eq!(InboundMessage::decode(r#"{"type":"ping"}"#).unwrap(), InboundMessage::Ping);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(InboundMessage::decode("not json").is_err());
        assert!(InboundMessage::decode(r#"{"type":"explode"}"#).is_err());
        assert!(InboundMessage::decode(r#"{"gesture":"FIST"}"#).is_err());
    }

    #[test]
    fn test_decode_bytes_rejects_invalid_utf8() {
        let mut raw = br#"{"type":"gesture_input","gesture":"FIST"#.to_vec();
        raw.extend_from_slice(&[0xff, 0xfe]);
        raw.extend_from_slice(br#""}"#);
        let err = InboundMessage::decode_bytes(&raw).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidUtf8(_)));
        assert!(err.to_string().starts_with("message is not valid UTF-8"));

        assert_eq!(
            InboundMessage::decode_bytes(br#"{"type":"ping"}"#).unwrap(),
            InboundMessage::Ping
        );
    }

    #[test]
    fn test_encode_gesture_update() {
        let session = SessionState::default();
        let payload = OutboundMessage::GestureUpdate { data: session.snapshot() }
            .encode()
            .unwrap();
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["event"], "gesture_update");
        assert_eq!(
            value["data"],
            serde_json::json!({
                "gesture": "NONE",
                "mode": "TREE",
                "hand": {"x": 0.0, "y": 0.0, "detected": false},
                "photoIndex": 0,
                "autoPlay": false,
            })
        );
    }

    #[test]
    fn test_encode_error_and_pong() {
        let err = OutboundMessage::Error { reason: "bad".into() }.encode().unwrap();
        assert_eq!(err, r#"{"event":"error","reason":"bad"}"#);
        assert_eq!(OutboundMessage::Pong.encode().unwrap(), r#"{"event":"pong"}"#);
    }
}
