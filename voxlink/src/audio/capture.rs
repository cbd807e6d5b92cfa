use crate::audio::device::{matching_config, resolve_device, DeviceDirection};
use crate::audio::error::{AudioError, AudioResult};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Requested capture format and processing constraints
///
/// `sample_rate` and `num_channels` describe the format of the frames sent
/// to the service. The device may run at a different native format; the
/// capture pipeline converts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Input device name (None for the host default)
    pub device_id: Option<String>,
    /// Session sample rate in Hz
    pub sample_rate: u32,
    /// Session channel count
    pub num_channels: u16,
    /// Samples per channel in each transmitted frame
    pub buffer_size: usize,
    /// Request acoustic echo cancellation
    pub echo_cancellation: bool,
    /// Request noise suppression
    pub noise_suppression: bool,
    /// Request automatic gain control
    pub auto_gain_control: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            sample_rate: 24000,
            num_channels: 1,
            buffer_size: 512,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Native format of an opened input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormat {
    /// Native sample rate in Hz
    pub sample_rate: u32,
    /// Native interleaved channel count
    pub channels: u16,
}

/// Handle to an open input stream
///
/// The device stays acquired for as long as this handle lives; dropping it
/// releases the device.
pub struct InputStream {
    format: InputFormat,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl InputStream {
    /// Wrap an open stream with the callback that releases it
    pub fn new(format: InputFormat, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            format,
            release: Some(Box::new(release)),
        }
    }

    /// Native format of the stream
    pub fn format(&self) -> InputFormat {
        self.format
    }

    /// Release the device now
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for InputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStream")
            .field("format", &self.format)
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// Source of microphone audio
///
/// `open` may wait an unbounded time (for instance on an OS permission
/// prompt). Interleaved f32 samples at the stream's native format are sent
/// through `samples` until the returned `InputStream` is dropped.
pub trait InputDevice: Send + Sync {
    /// Acquire the device and start streaming samples
    fn open(
        &self,
        config: &CaptureConfig,
        samples: mpsc::Sender<Vec<f32>>,
    ) -> BoxFuture<'static, AudioResult<InputStream>>;
}

/// Microphone capture through cpal
///
/// cpal streams are not `Send`, so each open stream lives on its own thread
/// which parks until the `InputStream` handle is released.
///
/// # Example
/// ```no_run
/// use voxlink_lib::audio::{AudioCapture, CaptureConfig, InputDevice};
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = mpsc::channel(100);
///     let stream = AudioCapture.open(&CaptureConfig::default(), tx).await.unwrap();
///
///     while let Some(samples) = rx.recv().await {
///         println!("Received {} samples at {:?}", samples.len(), stream.format());
///     }
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioCapture;

impl InputDevice for AudioCapture {
    fn open(
        &self,
        config: &CaptureConfig,
        samples: mpsc::Sender<Vec<f32>>,
    ) -> BoxFuture<'static, AudioResult<InputStream>> {
        let config = config.clone();

        Box::pin(async move {
            let (ready_tx, ready_rx) = oneshot::channel();
            let (stop_tx, stop_rx) = oneshot::channel::<()>();

            std::thread::Builder::new()
                .name("voxlink-capture".to_string())
                .spawn(move || run_input_stream(config, samples, ready_tx, stop_rx))
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

            let format = ready_rx.await.map_err(|_| {
                AudioError::DeviceUnavailable("capture thread exited before start".to_string())
            })??;

            Ok(InputStream::new(format, move || {
                let _ = stop_tx.send(());
            }))
        })
    }
}

/// Body of the capture thread: build, report, park, drop
fn run_input_stream(
    config: CaptureConfig,
    samples: mpsc::Sender<Vec<f32>>,
    ready_tx: oneshot::Sender<AudioResult<InputFormat>>,
    stop_rx: oneshot::Receiver<()>,
) {
    match build_input_stream(&config, samples) {
        Ok((stream, format)) => {
            if ready_tx.send(Ok(format)).is_err() {
                debug!("Capture request abandoned before the device was ready");
                return;
            }

            // Parks until the handle is released or dropped
            let _ = stop_rx.blocking_recv();
            drop(stream);
            info!("Audio capture stopped");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn build_input_stream(
    config: &CaptureConfig,
    samples: mpsc::Sender<Vec<f32>>,
) -> AudioResult<(Stream, InputFormat)> {
    let host = cpal::default_host();

    let device = resolve_device(&host, DeviceDirection::Input, config.device_id.as_deref())
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using audio input device: {}", device_name);

    if config.echo_cancellation || config.noise_suppression || config.auto_gain_control {
        debug!(
            echo_cancellation = config.echo_cancellation,
            noise_suppression = config.noise_suppression,
            auto_gain_control = config.auto_gain_control,
            "Voice processing requested; relying on the host input chain"
        );
    }

    let supported = device
        .supported_input_configs()
        .ok()
        .and_then(|ranges| matching_config(ranges, config.sample_rate, config.num_channels))
        .map(Ok)
        .unwrap_or_else(|| device.default_input_config())
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    let format = InputFormat {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
    };

    info!(
        "Device config: {} Hz, {} channels, {:?}",
        format.sample_rate,
        format.channels,
        supported.sample_format()
    );

    let stream_config = StreamConfig {
        channels: format.channels,
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_typed_stream::<f32>(&device, &stream_config, samples),
        SampleFormat::I16 => build_typed_stream::<i16>(&device, &stream_config, samples),
        SampleFormat::U16 => build_typed_stream::<u16>(&device, &stream_config, samples),
        SampleFormat::I32 => build_typed_stream::<i32>(&device, &stream_config, samples),
        other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    }?;

    stream
        .play()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    info!("Audio capture started successfully");
    Ok((stream, format))
}

fn build_typed_stream<T>(
    device: &Device,
    config: &StreamConfig,
    samples: mpsc::Sender<Vec<f32>>,
) -> AudioResult<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let buffer: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
                // Never block the audio thread; drop the batch if the consumer lags
                if samples.try_send(buffer).is_err() {
                    debug!("Capture channel full, dropping {} samples", data.len());
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_capture_config_default() {
        let config = CaptureConfig::default();
        assert_eq!(config.sample_rate, 24000);
        assert_eq!(config.num_channels, 1);
        assert_eq!(config.buffer_size, 512);
        assert!(config.echo_cancellation);
        assert!(config.noise_suppression);
        assert!(config.auto_gain_control);
    }

    #[test]
    fn test_input_stream_releases_once() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        let format = InputFormat {
            sample_rate: 48000,
            channels: 2,
        };

        let stream = InputStream::new(format, move || {
            assert!(!flag.swap(true, Ordering::SeqCst), "released twice");
        });
        assert_eq!(stream.format(), format);

        stream.release();
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_input_stream_releases_on_drop() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);

        {
            let _stream = InputStream::new(
                InputFormat {
                    sample_rate: 16000,
                    channels: 1,
                },
                move || flag.store(true, Ordering::SeqCst),
            );
        }

        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_audio_capture_open_close() {
        let (tx, mut rx) = mpsc::channel(100);

        let stream = match AudioCapture.open(&CaptureConfig::default(), tx).await {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("Warning: No audio device available for testing: {}", e);
                return;
            }
        };

        assert!(stream.format().sample_rate > 0);
        assert!(stream.format().channels > 0);

        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(data)) => assert!(!data.is_empty(), "Should receive non-empty data"),
            Ok(None) => eprintln!("Warning: Channel closed unexpectedly"),
            Err(_) => eprintln!("Warning: Timeout waiting for audio data"),
        }

        stream.release();
    }

    #[tokio::test]
    async fn test_audio_capture_with_missing_device() {
        let (tx, _rx) = mpsc::channel(100);
        let config = CaptureConfig {
            device_id: Some("NonExistentDevice".to_string()),
            ..CaptureConfig::default()
        };

        let result = AudioCapture.open(&config, tx).await;
        assert!(matches!(result, Err(AudioError::DeviceUnavailable(_))));
    }
}
