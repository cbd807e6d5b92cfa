//! Message types exchanged with the voice service
//!
//! Audio travels as binary WebSocket messages holding encoded frames. The
//! only structured message from the server is the UID control message sent
//! at the start of a session; client text messages are free-form JSON.

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

// ============================================================================
// Server -> Client Messages
// ============================================================================

/// Control message received as a text frame
///
/// # Example
/// ```
/// use voxlink_lib::network::messages::ControlMessage;
///
/// let msg: ControlMessage = serde_json::from_str(r#"{"type":"UID","uid":"abc"}"#).unwrap();
/// assert_eq!(msg, ControlMessage::Uid { uid: "abc".to_string() });
/// ```
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Server-issued session identifier
    #[serde(rename = "UID")]
    Uid {
        /// Session identifier
        uid: String,
    },
}

impl ControlMessage {
    /// Parse a text frame, returning `None` when it is not a known control message
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!("Text frame is not a control message: {}", e);
                None
            }
        }
    }
}

/// Event read from the socket
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Text frame
    Text(String),

    /// Binary frame (an encoded audio frame)
    Binary(Vec<u8>),

    /// Peer closed the connection or the stream ended
    Closed {
        /// Close reason, if the peer gave one
        reason: Option<String>,
    },

    /// Socket error
    Failed(String),
}

impl TransportEvent {
    /// Convert a WebSocket message into an event
    ///
    /// Ping, pong and raw frames carry nothing for the session and map to `None`.
    pub fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self::Text(text.to_string())),
            Message::Binary(data) => Some(Self::Binary(data.to_vec())),
            Message::Close(frame) => Some(Self::Closed {
                reason: frame
                    .map(|f| f.reason.to_string())
                    .filter(|reason| !reason.is_empty()),
            }),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
        }
    }

    /// Whether this event ends the connection
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Failed(_))
    }
}

// ============================================================================
// Client -> Server Messages
// ============================================================================

/// Non-audio message for the writer task
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Compact JSON text
    Json(String),

    /// Send a close frame and stop writing
    Close,
}

impl OutboundMessage {
    /// Validate `json` and re-serialize it compactly
    ///
    /// # Errors
    /// Returns the parse error when `json` is not valid JSON
    pub fn json(json: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Ok(Self::Json(serde_json::to_string(&value)?))
    }
}
