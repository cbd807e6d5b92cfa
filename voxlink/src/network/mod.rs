//! Network communication and WebSocket handling
//!
//! This module provides the socket connection to the voice service, the
//! messages carried over it, and the reader/writer tasks.

/// WebSocket connection management
pub mod connection;

/// Network error types
pub mod error;

/// WebSocket message type definitions
pub mod messages;

/// Async tasks for concurrent send/receive operations
pub mod tasks;

// Re-export commonly used types
pub use connection::{ConnectionConfig, VoiceConnection, WsReader, WsWriter};
pub use error::{NetworkError, NetworkResult};
pub use messages::{ControlMessage, OutboundMessage, TransportEvent};
