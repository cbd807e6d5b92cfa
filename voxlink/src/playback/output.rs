use crate::audio::device::{resolve_device, DeviceDirection};
use crate::audio::pipeline::remix;
use crate::audio::{AudioError, AudioResult};
use crate::playback::scheduler::{PlaybackBuffer, PlaybackSink};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use futures_util::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Source of playback sinks
pub trait OutputDevice: Send + Sync {
    /// Acquire the output and return a sink bound to it
    fn open(&self) -> BoxFuture<'static, AudioResult<Box<dyn PlaybackSink>>>;
}

/// Speaker output through cpal
#[derive(Debug, Clone, Default)]
pub struct CpalOutput {
    /// Output device name (None for the host default)
    pub device_id: Option<String>,
}

impl CpalOutput {
    /// Output on a named device
    pub fn with_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
        }
    }
}

impl OutputDevice for CpalOutput {
    fn open(&self) -> BoxFuture<'static, AudioResult<Box<dyn PlaybackSink>>> {
        let device_id = self.device_id.clone();

        Box::pin(async move {
            let sink = DeviceOutput::open(device_id).await?;
            Ok(Box::new(sink) as Box<dyn PlaybackSink>)
        })
    }
}

/// Tolerance when matching a start time to the end of the previous buffer
const CONTIGUOUS_EPSILON: f64 = 1e-6;

/// Format of an opened output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputFormat {
    sample_rate: u32,
    channels: u16,
}

/// Messages from the sink to the audio callback
enum OutputCommand {
    Play {
        start_frame: u64,
        samples: Vec<f32>,
    },
    Cancel {
        from_frame: u64,
    },
    Flush,
}

/// Where a scheduled buffer landed on the device clock
struct Span {
    start_at: f64,
    start_frame: u64,
    end_at: f64,
    end_frame: u64,
    /// Last frame of the buffer in device channels
    tail: Vec<f32>,
}

/// Buffer owned by the audio callback
struct Voice {
    start_frame: u64,
    samples: Vec<f32>,
}

/// Playback sink on a cpal output stream
///
/// The clock is the number of frames the callback has rendered, so `now()`
/// advances exactly as audio leaves the device. Buffers are converted to
/// the device format when scheduled and mixed in by the callback once the
/// clock reaches their start frame.
///
/// A buffer starting where the previous one ended takes over that buffer's
/// end frame and interpolation phase, so chunks the scheduler placed back to
/// back stay sample-contiguous whatever the rate ratio.
pub struct DeviceOutput {
    format: OutputFormat,
    rendered: Arc<AtomicU64>,
    commands: mpsc::UnboundedSender<OutputCommand>,
    stop: Option<oneshot::Sender<()>>,
    /// Buffers not yet finished, always keeping the last one scheduled
    spans: VecDeque<Span>,
}

impl DeviceOutput {
    /// Open the named output device (or the default)
    ///
    /// # Errors
    /// Returns `AudioError::DeviceUnavailable` when the output cannot be opened.
    pub async fn open(device_id: Option<String>) -> AudioResult<Self> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let rendered = Arc::new(AtomicU64::new(0));
        let clock = Arc::clone(&rendered);

        std::thread::Builder::new()
            .name("voxlink-playback".to_string())
            .spawn(move || run_output_stream(device_id, clock, commands_rx, ready_tx, stop_rx))
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

        let format = ready_rx.await.map_err(|_| {
            AudioError::DeviceUnavailable("playback thread exited before start".to_string())
        })??;

        Ok(Self {
            format,
            rendered,
            commands: commands_tx,
            stop: Some(stop_tx),
            spans: VecDeque::new(),
        })
    }
}

impl PlaybackSink for DeviceOutput {
    fn now(&self) -> f64 {
        self.rendered.load(Ordering::Acquire) as f64 / self.format.sample_rate as f64
    }

    fn schedule(&mut self, buffer: PlaybackBuffer, start_at: f64) {
        let rate = self.format.sample_rate as f64;
        let channels = self.format.channels as usize;
        let remixed = remix(&buffer.samples, buffer.channels.max(1) as usize, channels);
        let start_at = start_at.max(0.0);
        let end_at = start_at + buffer.duration_secs();

        let rendered = self.rendered.load(Ordering::Acquire);
        while self.spans.len() > 1
            && self.spans.front().is_some_and(|span| span.end_frame <= rendered)
        {
            self.spans.pop_front();
        }

        let previous = self
            .spans
            .back()
            .filter(|span| (span.end_at - start_at).abs() < CONTIGUOUS_EPSILON);
        let start_frame = match previous {
            Some(span) => span.end_frame,
            None => (start_at * rate).round() as u64,
        };
        let end_frame = ((end_at * rate).round() as u64).max(start_frame);
        let offset = (start_frame as f64 / rate - start_at) * buffer.sample_rate as f64;

        let samples = resample_span(
            &remixed,
            channels,
            buffer.sample_rate,
            self.format.sample_rate,
            offset,
            (end_frame - start_frame) as usize,
            previous.map(|span| span.tail.as_slice()),
        );
        let tail = remixed[remixed.len().saturating_sub(channels)..].to_vec();

        self.spans.push_back(Span {
            start_at,
            start_frame,
            end_at,
            end_frame,
            tail,
        });

        if self
            .commands
            .send(OutputCommand::Play {
                start_frame,
                samples,
            })
            .is_err()
        {
            debug!("Playback stream gone, dropping buffer");
        }
    }

    fn flush(&mut self) {
        self.spans.clear();
        let _ = self.commands.send(OutputCommand::Flush);
    }

    fn cancel_from(&mut self, start_at: f64) {
        let Some(index) = self
            .spans
            .iter()
            .position(|span| span.start_at >= start_at - CONTIGUOUS_EPSILON)
        else {
            return;
        };

        let from_frame = self.spans[index].start_frame;
        self.spans.truncate(index);
        let _ = self.commands.send(OutputCommand::Cancel { from_frame });
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

fn run_output_stream(
    device_id: Option<String>,
    rendered: Arc<AtomicU64>,
    commands: mpsc::UnboundedReceiver<OutputCommand>,
    ready_tx: oneshot::Sender<AudioResult<OutputFormat>>,
    stop_rx: oneshot::Receiver<()>,
) {
    match build_output_stream(device_id.as_deref(), rendered, commands) {
        Ok((stream, format)) => {
            if ready_tx.send(Ok(format)).is_err() {
                return;
            }
            let _ = stop_rx.blocking_recv();
            drop(stream);
            info!("Audio playback stopped");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn build_output_stream(
    device_id: Option<&str>,
    rendered: Arc<AtomicU64>,
    commands: mpsc::UnboundedReceiver<OutputCommand>,
) -> AudioResult<(Stream, OutputFormat)> {
    let host = cpal::default_host();
    let device = resolve_device(&host, DeviceDirection::Output, device_id)
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    info!(
        "Using audio output device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    let format = OutputFormat {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
    };
    let stream_config: StreamConfig = supported.config();
    let mixer = Mixer::new(format.channels as usize, rendered, commands);

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_typed_stream::<f32>(&device, &stream_config, mixer),
        SampleFormat::I16 => build_typed_stream::<i16>(&device, &stream_config, mixer),
        SampleFormat::U16 => build_typed_stream::<u16>(&device, &stream_config, mixer),
        SampleFormat::I32 => build_typed_stream::<i32>(&device, &stream_config, mixer),
        other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    }?;

    stream
        .play()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    info!(
        "Audio playback started: {} Hz, {} channels",
        format.sample_rate, format.channels
    );
    Ok((stream, format))
}

fn build_typed_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut mixer: Mixer,
) -> AudioResult<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.clear();
                scratch.resize(data.len(), 0.0f32);
                mixer.render(&mut scratch);
                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample);
                }
            },
            move |err| {
                error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))
}

/// Callback-side state: scheduled voices and the frame clock
struct Mixer {
    channels: usize,
    voices: Vec<Voice>,
    rendered: Arc<AtomicU64>,
    commands: mpsc::UnboundedReceiver<OutputCommand>,
}

impl Mixer {
    fn new(
        channels: usize,
        rendered: Arc<AtomicU64>,
        commands: mpsc::UnboundedReceiver<OutputCommand>,
    ) -> Self {
        Self {
            channels: channels.max(1),
            voices: Vec::new(),
            rendered,
            commands,
        }
    }

    /// Fill `out` (interleaved) and advance the clock
    fn render(&mut self, out: &mut [f32]) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                OutputCommand::Play {
                    start_frame,
                    samples,
                } => self.voices.push(Voice {
                    start_frame,
                    samples,
                }),
                OutputCommand::Cancel { from_frame } => {
                    self.voices.retain(|voice| voice.start_frame < from_frame)
                }
                OutputCommand::Flush => self.voices.clear(),
            }
        }

        let first = self.rendered.load(Ordering::Acquire);
        let frames = (out.len() / self.channels) as u64;
        let last = first + frames;
        let channels = self.channels as u64;

        for voice in &self.voices {
            let voice_frames = voice.samples.len() as u64 / channels;
            let voice_end = voice.start_frame + voice_frames;
            let from = voice.start_frame.max(first);
            let to = voice_end.min(last);

            for frame in from..to {
                let src = ((frame - voice.start_frame) * channels) as usize;
                let dst = ((frame - first) * channels) as usize;
                for c in 0..self.channels {
                    out[dst + c] += voice.samples[src + c];
                }
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.voices.retain(|voice| {
            voice.start_frame + voice.samples.len() as u64 / channels > last
        });
        self.rendered.store(last, Ordering::Release);
    }
}

/// Linear-interpolation resampling of interleaved samples onto exactly
/// `out_frames` device frames
///
/// `offset` is the input position of the first output frame. Positions
/// before the first input frame blend in from `previous`, the last frame of
/// the buffer this one continues; positions past the end hold the last frame.
fn resample_span(
    samples: &[f32],
    channels: usize,
    from: u32,
    to: u32,
    offset: f64,
    out_frames: usize,
    previous: Option<&[f32]>,
) -> Vec<f32> {
    let channels = channels.max(1);
    let in_frames = samples.len() / channels;
    if in_frames == 0 || from == 0 || to == 0 {
        return vec![0.0; out_frames * channels];
    }

    let step = from as f64 / to as f64;
    let first = &samples[..channels];
    let before = previous
        .filter(|frame| frame.len() == channels)
        .unwrap_or(first);

    let mut output = Vec::with_capacity(out_frames * channels);
    for i in 0..out_frames {
        let position = offset + i as f64 * step;

        if position < 0.0 {
            let frac = (position + 1.0).clamp(0.0, 1.0) as f32;
            for c in 0..channels {
                output.push(before[c] + (first[c] - before[c]) * frac);
            }
            continue;
        }

        let index = (position as usize).min(in_frames - 1);
        let next = (index + 1).min(in_frames - 1);
        let frac = (position - index as f64).clamp(0.0, 1.0) as f32;

        for c in 0..channels {
            let a = samples[index * channels + c];
            let b = samples[next * channels + c];
            output.push(a + (b - a) * frac);
        }
    }
    output
}
