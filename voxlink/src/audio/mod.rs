/// Microphone capture through cpal
pub mod capture;

/// Audio device enumeration
pub mod device;

/// Audio-related error types
pub mod error;

/// Capture pipeline: device samples to encoded frames
pub mod pipeline;

/// Audio resampling
pub mod resampler;

// Re-export commonly used types
pub use capture::{AudioCapture, CaptureConfig, InputDevice, InputFormat, InputStream};
pub use device::{
    find_device, get_default_input_device, get_default_output_device, list_input_devices,
    list_output_devices, AudioDevice, DeviceDirection,
};
pub use error::{AudioError, AudioResult};
pub use pipeline::{AcquiredInput, CaptureFramer, CapturePipeline, CaptureState};
pub use resampler::AudioResampler;
