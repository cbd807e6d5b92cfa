use crate::codec::{AudioFrame, DecodeError, BYTES_PER_SAMPLE};
use crate::playback::error::PlaybackResult;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default lead time added before the first chunk after a gap
pub const DEFAULT_SCHEDULE_DELAY: Duration = Duration::from_millis(50);

/// Default cap on audio queued ahead of the output clock
pub const DEFAULT_MAX_BACKLOG: Duration = Duration::from_secs(5);

/// Decoded audio ready for an output sink
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

impl PlaybackBuffer {
    /// Number of sample frames
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Playback duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Output with its own clock, accepting buffers at absolute start times
///
/// Times are seconds on the sink's clock. Once scheduled, a buffer belongs
/// to the sink.
pub trait PlaybackSink: Send {
    /// Current output-clock time in seconds
    fn now(&self) -> f64;

    /// Play `buffer` starting at `start_at`
    fn schedule(&mut self, buffer: PlaybackBuffer, start_at: f64);

    /// Drop every buffer not yet played
    fn flush(&mut self);

    /// Drop the buffers scheduled to start at or after `start_at`
    ///
    /// Buffers that start earlier, including the one playing, are kept.
    fn cancel_from(&mut self, start_at: f64);
}

/// A decoded chunk tagged with the scheduler epoch it was decoded in
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChunk {
    buffer: PlaybackBuffer,
    epoch: u64,
}

impl DecodedChunk {
    /// The playable buffer
    pub fn buffer(&self) -> &PlaybackBuffer {
        &self.buffer
    }

    /// Epoch the chunk was decoded in
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// What happened to an enqueued chunk
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnqueueOutcome {
    /// Handed to the sink
    Scheduled {
        /// Output-clock start time in seconds
        start_at: f64,
        /// Chunk duration in seconds
        duration: f64,
        /// Queued chunks dropped to respect the backlog cap
        dropped: usize,
    },
    /// Frame carried no audio
    Empty,
    /// Playback is not active
    Inactive,
    /// Chunk was decoded before the last reset
    Stale,
}

/// A chunk handed to the sink that has not finished playing
#[derive(Debug, Clone)]
struct QueuedChunk {
    start_at: f64,
    duration: f64,
    buffer: PlaybackBuffer,
}

impl QueuedChunk {
    fn end(&self) -> f64 {
        self.start_at + self.duration
    }
}

/// Gapless playback scheduler
///
/// Keeps `play_time`, the output-clock time at which the queued audio ends,
/// and places each incoming chunk right after it:
///
/// 1. on underrun (`play_time < now`) `play_time` snaps to `now`
/// 2. `start_at = max(play_time, now + schedule_delay)`
/// 3. `play_time = start_at + duration`
///
/// so consecutive chunks never overlap and leave no gap while the network
/// keeps up.
///
/// With a backlog cap, a chunk arriving while more than `max_backlog` is
/// already queued drops the oldest chunks that have not started yet and
/// moves the rest forward. The chunk playing (or about to) is never cut.
///
/// # Example
/// ```no_run
/// use voxlink_lib::codec::AudioFrame;
/// use voxlink_lib::playback::{CpalOutput, OutputDevice, PlaybackScheduler};
///
/// #[tokio::main]
/// async fn main() {
///     let mut scheduler = PlaybackScheduler::default();
///     scheduler.activate(CpalOutput::default().open().await.unwrap());
///
///     let frame = AudioFrame::new(vec![0u8; 960], 24000, 1).unwrap();
///     println!("{:?}", scheduler.enqueue(&frame).unwrap());
/// }
/// ```
pub struct PlaybackScheduler {
    /// Output sink (None while inactive)
    sink: Option<Box<dyn PlaybackSink>>,
    /// End of the queued audio on the sink clock
    play_time: f64,
    /// Bumped on every reset
    epoch: u64,
    /// Lead time in seconds
    schedule_delay: f64,
    /// Backlog cap in seconds
    max_backlog: Option<f64>,
    /// Chunks on the sink that have not ended yet, oldest first
    queued: VecDeque<QueuedChunk>,
}

impl PlaybackScheduler {
    /// Create an inactive scheduler
    ///
    /// # Arguments
    /// * `schedule_delay` - Minimum lead time for a chunk after a gap
    /// * `max_backlog` - Cap on queued-ahead audio (None disables the cap)
    pub fn new(schedule_delay: Duration, max_backlog: Option<Duration>) -> Self {
        Self {
            sink: None,
            play_time: 0.0,
            epoch: 0,
            schedule_delay: schedule_delay.as_secs_f64(),
            max_backlog: max_backlog.map(|d| d.as_secs_f64()),
            queued: VecDeque::new(),
        }
    }

    /// Take ownership of an output sink and start accepting chunks
    pub fn activate(&mut self, sink: Box<dyn PlaybackSink>) {
        if let Some(mut previous) = self.sink.replace(sink) {
            previous.flush();
            self.queued.clear();
            self.play_time = 0.0;
        }
        info!("Playback activated");
    }

    /// Stop playback and release the output sink
    ///
    /// `play_time` returns to zero and chunks decoded before this call are
    /// rejected as stale.
    pub fn reset(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.flush();
            debug!("Output sink released");
        }
        self.queued.clear();
        self.play_time = 0.0;
        self.epoch += 1;
    }

    /// Decode and schedule one frame
    ///
    /// # Errors
    /// Returns `PlaybackError::Decode` if the frame cannot be made playable;
    /// the chunk is skipped and the schedule is unchanged.
    pub fn enqueue(&mut self, frame: &AudioFrame) -> PlaybackResult<EnqueueOutcome> {
        if frame.is_empty() {
            return Ok(EnqueueOutcome::Empty);
        }
        if self.sink.is_none() {
            return Ok(EnqueueOutcome::Inactive);
        }

        let chunk = self.decode_chunk(frame)?;
        Ok(self.schedule_chunk(chunk))
    }

    /// Turn a frame into a playable buffer tagged with the current epoch
    ///
    /// # Errors
    /// Returns `PlaybackError::Decode` for a zero sample rate or a channel
    /// count the output cannot represent.
    pub fn decode_chunk(&self, frame: &AudioFrame) -> PlaybackResult<DecodedChunk> {
        if frame.sample_rate() == 0 {
            return Err(DecodeError::Malformed("sample rate is zero".to_string()).into());
        }
        let channels = u16::try_from(frame.num_channels()).map_err(|_| {
            DecodeError::Malformed(format!("{} channels not playable", frame.num_channels()))
        })?;

        Ok(DecodedChunk {
            buffer: PlaybackBuffer {
                samples: pcm_to_f32(frame.payload()),
                sample_rate: frame.sample_rate(),
                channels,
            },
            epoch: self.epoch,
        })
    }

    /// Place a decoded chunk on the output clock
    pub fn schedule_chunk(&mut self, chunk: DecodedChunk) -> EnqueueOutcome {
        if chunk.epoch != self.epoch {
            debug!(
                "Dropping chunk from epoch {} (current {})",
                chunk.epoch, self.epoch
            );
            return EnqueueOutcome::Stale;
        }

        let Some(now) = self.sink.as_ref().map(|sink| sink.now()) else {
            return EnqueueOutcome::Inactive;
        };
        let duration = chunk.buffer.duration_secs();

        while self.queued.front().is_some_and(|queued| queued.end() <= now) {
            self.queued.pop_front();
        }

        if self.play_time < now {
            if self.play_time > 0.0 {
                debug!("Playback underrun: {:.3}s behind", now - self.play_time);
            }
            self.play_time = now;
        }

        // Only audio already queued counts against the cap
        let dropped = match self.max_backlog {
            Some(max_backlog) if self.play_time - now > max_backlog => {
                self.trim_backlog(now, max_backlog)
            }
            _ => 0,
        };

        let start_at = self.play_time.max(now + self.schedule_delay);
        if let Some(sink) = self.sink.as_mut() {
            sink.schedule(chunk.buffer.clone(), start_at);
        }
        self.queued.push_back(QueuedChunk {
            start_at,
            duration,
            buffer: chunk.buffer,
        });
        self.play_time = start_at + duration;

        EnqueueOutcome::Scheduled {
            start_at,
            duration,
            dropped,
        }
    }

    /// Drop the oldest waiting chunks until the backlog fits the cap
    ///
    /// Chunks starting within `schedule_delay` of `now` are committed and
    /// kept. The surviving waiting chunks are rescheduled back to back after
    /// the last committed one. Returns the number of chunks dropped.
    fn trim_backlog(&mut self, now: f64, max_backlog: f64) -> usize {
        let commit_until = now + self.schedule_delay;
        let committed = self
            .queued
            .iter()
            .take_while(|queued| queued.start_at <= commit_until)
            .count();
        let base = match committed.checked_sub(1) {
            Some(last) => self.queued[last].end(),
            None => commit_until,
        };

        let waiting_secs: f64 = self.queued.iter().skip(committed).map(|q| q.duration).sum();
        let mut excess = base + waiting_secs - now - max_backlog;
        let mut drop_count = 0;
        for queued in self.queued.iter().skip(committed) {
            if excess <= 1e-9 {
                break;
            }
            excess -= queued.duration;
            drop_count += 1;
        }
        if drop_count == 0 {
            return 0;
        }

        let Some(sink) = self.sink.as_mut() else {
            return 0;
        };
        let mut waiting = self.queued.split_off(committed);
        if let Some(first) = waiting.front() {
            sink.cancel_from(first.start_at);
        }

        let survivors = waiting.split_off(drop_count);
        let mut start_at = base;
        for mut queued in survivors {
            queued.start_at = start_at;
            sink.schedule(queued.buffer.clone(), start_at);
            start_at = queued.end();
            self.queued.push_back(queued);
        }
        self.play_time = start_at;

        warn!(
            "Playback backlog over {:.2}s, dropped {} queued chunk(s)",
            max_backlog, drop_count
        );
        drop_count
    }

    /// End of the queued audio on the sink clock
    pub fn play_time(&self) -> f64 {
        self.play_time
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether an output sink is attached
    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEDULE_DELAY, Some(DEFAULT_MAX_BACKLOG))
    }
}

/// Convert 16-bit little-endian PCM to f32 samples
///
/// Negative values divide by 32768 and positive values by 32767, mirroring
/// the capture conversion so full scale maps back to exactly ±1.0.
pub fn pcm_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            if sample < 0 {
                sample as f32 / 32768.0
            } else {
                sample as f32 / 32767.0
            }
        })
        .collect()
}
