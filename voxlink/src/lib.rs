/// Audio capture and devices
pub mod audio;

/// Wire frame codec
pub mod codec;

/// WebSocket transport
pub mod network;

/// Gapless playback of received audio
pub mod playback;

/// Session lifecycle
pub mod session;

/// Session state and configuration
pub mod state;

/// Utility modules
pub mod utils;
