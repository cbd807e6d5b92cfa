//! Wire frame codec
//!
//! Converts PCM audio payloads to and from the binary frame format
//! exchanged with the voice service.

/// Codec error types
pub mod error;

/// Frame type and protobuf wire messages
pub mod frame;

// Re-export commonly used types
pub use error::{DecodeError, DecodeResult, FrameError};
pub use frame::{decode, encode, AudioFrame, BYTES_PER_SAMPLE};
