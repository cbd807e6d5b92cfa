use crate::audio::error::{AudioError, AudioResult};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::{debug, info};

/// Audio resampler for converting between sample rates
///
/// Wraps a rubato Sinc resampler for interleaved multi-channel audio. Input
/// of any length is accepted; samples are buffered internally until a full
/// resampler chunk (10ms of input) is available.
pub struct AudioResampler {
    /// The rubato resampler instance
    resampler: SincFixedIn<f32>,
    /// Input buffer for rubato (channels x frames)
    input_buffer: Vec<Vec<f32>>,
    /// Output buffer for rubato (channels x frames)
    output_buffer: Vec<Vec<f32>>,
    /// Interleaved samples waiting for a full chunk
    pending: Vec<f32>,
    /// Input sample rate
    input_rate: u32,
    /// Output sample rate
    output_rate: u32,
    /// Number of interleaved channels
    channels: usize,
    /// Number of input frames per chunk
    chunk_size: usize,
}

impl AudioResampler {
    /// Create a new audio resampler
    ///
    /// # Arguments
    /// * `input_rate` - Input sample rate in Hz
    /// * `output_rate` - Output sample rate in Hz
    /// * `channels` - Number of interleaved channels
    ///
    /// # Errors
    /// Returns `AudioError::ResampleFailed` if the resampler cannot be created.
    ///
    /// # Example
    /// ```no_run
    /// use voxlink_lib::audio::resampler::AudioResampler;
    ///
    /// // Resample a 48kHz microphone to the 24kHz session rate
    /// let resampler = AudioResampler::new(48000, 24000, 1).unwrap();
    /// ```
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> AudioResult<Self> {
        info!(
            "Creating resampler: {} Hz -> {} Hz ({} channels)",
            input_rate, output_rate, channels
        );

        if input_rate == 0 || output_rate == 0 || channels == 0 {
            return Err(AudioError::ResampleFailed(format!(
                "Invalid resampler format: {} Hz -> {} Hz, {} channels",
                input_rate, output_rate, channels
            )));
        }

        let ratio = output_rate as f64 / input_rate as f64;
        debug!("Resample ratio: {:.6}", ratio);

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        // 10ms worth of input frames
        let chunk_size = (input_rate / 100).max(1) as usize;

        let resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, channels)
            .map_err(|e| AudioError::ResampleFailed(format!("Failed to create resampler: {}", e)))?;

        let input_buffer = resampler.input_buffer_allocate(true);
        let output_buffer = resampler.output_buffer_allocate(true);

        debug!(
            "Resampler created: chunk_size={}, output_size={}",
            chunk_size,
            resampler.output_frames_max()
        );

        Ok(Self {
            resampler,
            input_buffer,
            output_buffer,
            pending: Vec::new(),
            input_rate,
            output_rate,
            channels,
            chunk_size,
        })
    }

    /// Resample interleaved samples of any length
    ///
    /// Returns interleaved output; it may be empty while less than one chunk
    /// has accumulated.
    pub fn process_interleaved(&mut self, input: &[f32]) -> AudioResult<Vec<f32>> {
        self.pending.extend_from_slice(input);

        let chunk_samples = self.chunk_size * self.channels;
        let mut output = Vec::new();

        while self.pending.len() >= chunk_samples {
            for (frame_index, frame) in self.pending[..chunk_samples]
                .chunks_exact(self.channels)
                .enumerate()
            {
                for (channel, &sample) in frame.iter().enumerate() {
                    self.input_buffer[channel][frame_index] = sample;
                }
            }
            self.pending.drain(..chunk_samples);

            let (_, frames_out) = self
                .resampler
                .process_into_buffer(&self.input_buffer, &mut self.output_buffer, None)
                .map_err(|e| AudioError::ResampleFailed(format!("Resampling failed: {}", e)))?;

            output.reserve(frames_out * self.channels);
            for frame_index in 0..frames_out {
                for channel in 0..self.channels {
                    output.push(self.output_buffer[channel][frame_index]);
                }
            }
        }

        Ok(output)
    }

    /// Reset the resampler state and drop buffered input
    pub fn reset(&mut self) {
        debug!("Resetting resampler");
        self.resampler.reset();
        self.pending.clear();
    }

    /// Get the input sample rate
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Get the output sample rate
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Get the number of channels
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Get the chunk size (input frames per rubato call)
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
