use thiserror::Error;

/// Errors produced while decoding an inbound frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The bytes do not conform to the frame schema
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// The frame carries no audio; callers treat this as a no-op
    #[error("Frame contains no audio")]
    EmptyAudio,
}

/// Errors produced while constructing a frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Channel count must be at least one
    #[error("Channel count must be greater than zero")]
    ZeroChannels,

    /// Payload is not a whole number of sample frames
    #[error("Payload of {len} bytes is not a multiple of {frame_bytes} bytes per sample frame")]
    PartialSampleFrame { len: usize, frame_bytes: usize },
}

/// Result type for frame decoding
pub type DecodeResult<T> = Result<T, DecodeError>;

impl From<prost::DecodeError> for DecodeError {
    fn from(err: prost::DecodeError) -> Self {
        DecodeError::Malformed(err.to_string())
    }
}

impl From<FrameError> for DecodeError {
    fn from(err: FrameError) -> Self {
        DecodeError::Malformed(err.to_string())
    }
}
