//! Signaling protocol types
//!
//! Messages on the signaling channel are JSON objects with a `type`
//! discriminator. Only one offer/answer exchange is supported per session;
//! anything that does not parse into [`SignalingMessage`] is a protocol
//! error and drives the session to `Failed`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Signaling messages carried on the session's WebSocket channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    /// Client offer opening the handshake
    Offer {
        /// Session description payload
        sdp: String,
    },

    /// Server answer completing the handshake
    Answer {
        /// Session description payload
        sdp: String,
    },
}

impl SignalingMessage {
    /// Convert message to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            Error::Serialization(format!("Failed to serialize signaling message: {}", e))
        })
    }

    /// Parse message from JSON string
    ///
    /// A message with a missing/unknown `type` or payload is a protocol
    /// error, not a serialization bug in this crate.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Protocol(format!("malformed signaling message: {}", e)))
    }
}

/// Why a session's channel is being closed
///
/// Every teardown path maps to one of these; the reason is the only
/// externally visible failure signal a client gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Frame source exhausted, all frames delivered
    EndOfStream,

    /// No asset uploaded for the session id
    AssetNotFound,

    /// Malformed or out-of-sequence signaling message
    ProtocolError,

    /// The negotiation capability rejected the offer
    NegotiationFailed,

    /// Asset unreadable or corrupt frame
    DecodeFailed,

    /// Frame write failed or the peer disconnected
    TransportFailed,

    /// A live session already exists for the id
    SessionConflict,

    /// Server is shutting down
    ServerShutdown,
}

impl CloseReason {
    /// WebSocket close code for this reason
    pub fn code(&self) -> u16 {
        match self {
            CloseReason::EndOfStream => 1000,
            CloseReason::ServerShutdown => 1001,
            CloseReason::ProtocolError => 1002,
            CloseReason::AssetNotFound | CloseReason::SessionConflict => 1008,
            CloseReason::NegotiationFailed
            | CloseReason::DecodeFailed
            | CloseReason::TransportFailed => 1011,
        }
    }

    /// Human-readable close reason text
    pub fn text(&self) -> &'static str {
        match self {
            CloseReason::EndOfStream => "end of stream",
            CloseReason::AssetNotFound => "asset not uploaded",
            CloseReason::ProtocolError => "malformed signaling message",
            CloseReason::NegotiationFailed => "negotiation failed",
            CloseReason::DecodeFailed => "frame decode failed",
            CloseReason::TransportFailed => "transport error",
            CloseReason::SessionConflict => "session already active",
            CloseReason::ServerShutdown => "server shutting down",
        }
    }

    /// Whether this reason represents a clean end of the session
    pub fn is_clean(&self) -> bool {
        matches!(self, CloseReason::EndOfStream)
    }

    /// Map a session-local error to its close reason
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::AssetNotFound(_) => CloseReason::AssetNotFound,
            Error::Protocol(_) => CloseReason::ProtocolError,
            Error::Negotiation(_) => CloseReason::NegotiationFailed,
            Error::Decode(_) => CloseReason::DecodeFailed,
            Error::Session(_) => CloseReason::SessionConflict,
            _ => CloseReason::TransportFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_round_trip() {
        let msg = SignalingMessage::Offer {
            sdp: "v=0\r\no=- ...".to_string(),
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"offer\""));

        let parsed = SignalingMessage::from_json(&json).unwrap();
        assert_eq!(msg, parsed);
    }

    #[test]
    fn test_answer_wire_shape() {
        let msg = SignalingMessage::Answer {
            sdp: "direct".to_string(),
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"answer\""));
        assert!(json.contains("\"sdp\":\"direct\""));
    }

    #[test]
    fn test_unknown_type_is_protocol_error() {
        let result = SignalingMessage::from_json(r#"{"kind": "hello"}"#);
        assert!(matches!(result, Err(Error::Protocol(_))));

        let result = SignalingMessage::from_json(r#"{"type": "hello", "sdp": "x"}"#);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_missing_payload_is_protocol_error() {
        let result = SignalingMessage::from_json(r#"{"type": "offer"}"#);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_invalid_json_is_protocol_error() {
        let result = SignalingMessage::from_json("not json");
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_close_reason_codes() {
        assert_eq!(CloseReason::EndOfStream.code(), 1000);
        assert_eq!(CloseReason::ProtocolError.code(), 1002);
        assert_eq!(CloseReason::AssetNotFound.code(), 1008);
        assert_eq!(CloseReason::TransportFailed.code(), 1011);
        assert!(CloseReason::EndOfStream.is_clean());
        assert!(!CloseReason::AssetNotFound.is_clean());
    }

    #[test]
    fn test_close_reason_from_error() {
        assert_eq!(
            CloseReason::from_error(&Error::AssetNotFound("s1".into())),
            CloseReason::AssetNotFound
        );
        assert_eq!(
            CloseReason::from_error(&Error::Protocol("bad".into())),
            CloseReason::ProtocolError
        );
        assert_eq!(
            CloseReason::from_error(&Error::Transport("gone".into())),
            CloseReason::TransportFailed
        );
    }
}
