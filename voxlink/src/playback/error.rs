use crate::audio::AudioError;
use crate::codec::DecodeError;
use thiserror::Error;

/// Playback errors
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Chunk could not be turned into a playable buffer
    #[error("Failed to decode audio chunk: {0}")]
    Decode(#[from] DecodeError),

    /// Output device failure
    #[error("Audio output error: {0}")]
    Output(#[from] AudioError),
}

/// Result type for playback operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;
