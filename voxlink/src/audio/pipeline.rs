use crate::audio::capture::{CaptureConfig, InputDevice, InputFormat, InputStream};
use crate::audio::error::{AudioError, AudioResult};
use crate::audio::resampler::AudioResampler;
use crate::codec;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the raw sample channel between device and processing task
const SAMPLE_CHANNEL_CAPACITY: usize = 100;

/// Capture pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No device held, nothing transmitted
    Stopped,
    /// Device held, frames flowing to the output channel
    Capturing,
}

/// An input device that has been acquired but not yet attached to a pipeline
///
/// Dropping it releases the device.
#[derive(Debug)]
pub struct AcquiredInput {
    stream: InputStream,
    samples: mpsc::Receiver<Vec<f32>>,
    config: CaptureConfig,
}

impl AcquiredInput {
    /// Native format of the acquired stream
    pub fn format(&self) -> InputFormat {
        self.stream.format()
    }
}

/// Microphone-to-wire pipeline
///
/// This pipeline:
/// 1. Receives interleaved f32 samples from an acquired input device
/// 2. Remixes to the session channel count
/// 3. Resamples to the session sample rate (when the device differs)
/// 4. Converts f32 samples to 16-bit PCM
/// 5. Cuts fixed-size buffers (`buffer_size` samples per channel)
/// 6. Encodes each buffer as a wire frame and sends it to the output channel
///
/// # Example
/// ```no_run
/// use voxlink_lib::audio::{AudioCapture, CaptureConfig, CapturePipeline};
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = mpsc::channel(32);
///     let mut pipeline = CapturePipeline::new();
///     pipeline.start(&AudioCapture, CaptureConfig::default(), tx).await.unwrap();
///
///     while let Some(frame) = rx.recv().await {
///         println!("Encoded frame: {} bytes", frame.len());
///     }
/// }
/// ```
pub struct CapturePipeline {
    /// Current state
    state: CaptureState,
    /// Held input stream (None when stopped)
    input: Option<InputStream>,
    /// Processing task handle
    processing_task: Option<JoinHandle<()>>,
    /// Stop signal sender
    stop_signal: Option<oneshot::Sender<()>>,
}

impl CapturePipeline {
    /// Create a stopped pipeline
    pub fn new() -> Self {
        Self {
            state: CaptureState::Stopped,
            input: None,
            processing_task: None,
            stop_signal: None,
        }
    }

    /// Acquire an input device for `config`
    ///
    /// The returned future owns everything it needs, so it can be spawned
    /// and its result delivered later (or discarded if it arrives stale).
    ///
    /// # Errors
    /// Resolves to `AudioError::DeviceUnavailable` when no device grants access.
    pub fn acquire(
        device: &dyn InputDevice,
        config: CaptureConfig,
    ) -> BoxFuture<'static, AudioResult<AcquiredInput>> {
        let (samples_tx, samples_rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        let open = device.open(&config, samples_tx);

        Box::pin(async move {
            let stream = open.await?;
            Ok(AcquiredInput {
                stream,
                samples: samples_rx,
                config,
            })
        })
    }

    /// Start streaming frames from an acquired device
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns `AudioError::AlreadyRunning` when already capturing, or a
    /// resampler error if the device format cannot be converted.
    pub fn attach(
        &mut self,
        acquired: AcquiredInput,
        frames: mpsc::Sender<Vec<u8>>,
    ) -> AudioResult<()> {
        if self.state == CaptureState::Capturing {
            return Err(AudioError::AlreadyRunning);
        }

        let AcquiredInput {
            stream,
            samples,
            config,
        } = acquired;

        let framer = CaptureFramer::new(stream.format(), &config)?;
        let (stop_tx, stop_rx) = oneshot::channel();

        info!(
            "Starting capture pipeline: {} Hz x{} -> {} Hz x{}, {} samples per frame",
            stream.format().sample_rate,
            stream.format().channels,
            config.sample_rate,
            config.num_channels,
            config.buffer_size
        );

        let processing_task = tokio::spawn(async move {
            if let Err(e) = Self::processing_loop(samples, frames, stop_rx, framer).await {
                error!("Capture processing loop error: {}", e);
            }
        });

        self.input = Some(stream);
        self.processing_task = Some(processing_task);
        self.stop_signal = Some(stop_tx);
        self.state = CaptureState::Capturing;

        Ok(())
    }

    /// Acquire a device and start streaming frames
    ///
    /// # Errors
    /// Returns `AudioError::DeviceUnavailable` when no device grants access.
    pub async fn start(
        &mut self,
        device: &dyn InputDevice,
        config: CaptureConfig,
        frames: mpsc::Sender<Vec<u8>>,
    ) -> AudioResult<()> {
        if self.state == CaptureState::Capturing {
            return Err(AudioError::AlreadyRunning);
        }

        let acquired = Self::acquire(device, config).await?;
        self.attach(acquired, frames)
    }

    /// Stop capturing and release the device
    ///
    /// Safe to call any number of times.
    pub fn stop(&mut self) {
        if self.state == CaptureState::Stopped {
            return;
        }

        info!("Stopping capture pipeline");

        if let Some(stop_tx) = self.stop_signal.take() {
            let _ = stop_tx.send(());
        }

        if let Some(input) = self.input.take() {
            input.release();
        }

        // The loop exits on the stop signal; no need to wait for it here
        self.processing_task.take();

        self.state = CaptureState::Stopped;
        debug!("Capture pipeline stopped");
    }

    /// Current state
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Check if the pipeline is capturing
    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    async fn processing_loop(
        mut input_rx: mpsc::Receiver<Vec<f32>>,
        output_tx: mpsc::Sender<Vec<u8>>,
        mut stop_rx: oneshot::Receiver<()>,
        mut framer: CaptureFramer,
    ) -> AudioResult<()> {
        let mut frames_sent = 0u64;

        loop {
            tokio::select! {
                Some(samples) = input_rx.recv() => {
                    let frames = match framer.push(&samples) {
                        Ok(frames) => frames,
                        Err(e) => {
                            warn!("Dropping capture buffer: {}", e);
                            continue;
                        }
                    };

                    for frame in frames {
                        if output_tx.send(frame).await.is_err() {
                            info!("Frame channel closed, stopping capture loop");
                            return Ok(());
                        }
                        frames_sent += 1;
                    }
                }

                _ = &mut stop_rx => {
                    debug!("Stop signal received");
                    break;
                }

                else => {
                    info!("Input channel closed");
                    break;
                }
            }
        }

        info!("Capture loop finished: {} frames sent", frames_sent);
        Ok(())
    }
}

impl Default for CapturePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Converts raw device buffers into encoded wire frames
///
/// Holds the remix/resample state and the partially filled PCM buffer
/// between device callbacks.
pub struct CaptureFramer {
    input_channels: usize,
    output_channels: usize,
    resampler: Option<AudioResampler>,
    pcm: Vec<i16>,
    samples_per_frame: usize,
    sample_rate: u32,
}

impl CaptureFramer {
    /// Create a framer converting `input` to the format in `config`
    ///
    /// # Errors
    /// Returns `AudioError::ResampleFailed` if the rates cannot be converted.
    pub fn new(input: InputFormat, config: &CaptureConfig) -> AudioResult<Self> {
        let output_channels = config.num_channels.max(1) as usize;

        let resampler = if input.sample_rate == config.sample_rate {
            None
        } else {
            Some(AudioResampler::new(
                input.sample_rate,
                config.sample_rate,
                output_channels,
            )?)
        };

        Ok(Self {
            input_channels: input.channels.max(1) as usize,
            output_channels,
            resampler,
            pcm: Vec::new(),
            samples_per_frame: config.buffer_size.max(1) * output_channels,
            sample_rate: config.sample_rate,
        })
    }

    /// Feed one device buffer; returns every frame completed by it
    pub fn push(&mut self, samples: &[f32]) -> AudioResult<Vec<Vec<u8>>> {
        let remixed = remix(samples, self.input_channels, self.output_channels);

        let resampled = match self.resampler.as_mut() {
            Some(resampler) => resampler.process_interleaved(&remixed)?,
            None => remixed,
        };

        self.pcm.extend(f32_to_i16_pcm(&resampled));

        let mut frames = Vec::new();
        while self.pcm.len() >= self.samples_per_frame {
            let chunk: Vec<i16> = self.pcm.drain(..self.samples_per_frame).collect();
            let bytes = i16_to_bytes(&chunk);
            frames.push(codec::encode(
                &bytes,
                self.sample_rate,
                self.output_channels as u32,
            ));
        }

        Ok(frames)
    }

    /// Samples held back waiting for a full frame
    pub fn pending_samples(&self) -> usize {
        self.pcm.len()
    }
}

/// Convert interleaved samples between channel counts
///
/// Downmixing to mono averages all channels; upmixing from mono duplicates
/// the channel; otherwise channels are truncated or the last one repeated.
pub fn remix(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to {
        return samples.to_vec();
    }

    let mut output = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            output.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for channel in 0..to {
                output.push(frame[channel.min(from - 1)]);
            }
        }
    }
    output
}

/// Convert one f32 sample to 16-bit PCM
///
/// The sample is clamped to [-1.0, 1.0], then scaled by 32768 when negative
/// and 32767 otherwise, truncating toward zero. Keep this exact rule: the
/// service expects these bit patterns.
pub fn f32_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

/// Convert f32 samples to 16-bit PCM
pub fn f32_to_i16_pcm(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&sample| f32_to_i16(sample)).collect()
}

/// Convert i16 samples to little-endian bytes
pub fn i16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}
