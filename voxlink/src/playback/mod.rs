//! Playback of received audio
//!
//! Decoded chunks are placed back to back on the output clock by the
//! scheduler and rendered by an output sink.

/// Playback error types
pub mod error;

/// Output sinks backed by audio devices
pub mod output;

/// Gapless chunk scheduling
pub mod scheduler;

pub use error::{PlaybackError, PlaybackResult};
pub use output::{CpalOutput, DeviceOutput, OutputDevice};
pub use scheduler::{
    DecodedChunk, EnqueueOutcome, PlaybackBuffer, PlaybackScheduler, PlaybackSink,
    DEFAULT_MAX_BACKLOG, DEFAULT_SCHEDULE_DELAY,
};
