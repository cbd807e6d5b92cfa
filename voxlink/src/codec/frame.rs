//! Audio frame and its protobuf wire form
//!
//! The wire schema is fixed by the voice service:
//!
//! ```text
//! message AudioRawFrame {
//!     bytes  audio        = 3;
//!     uint32 sample_rate  = 4;
//!     uint32 num_channels = 5;
//! }
//!
//! message Frame {
//!     AudioRawFrame audio = 2;
//! }
//! ```
//!
//! Other fields the service may add (ids, names, text frames) are skipped
//! as unknown fields when decoding.

use crate::codec::error::{DecodeError, DecodeResult, FrameError};
use prost::Message;

/// Size in bytes of one 16-bit PCM sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Outer wire message
#[derive(Clone, PartialEq, Message)]
struct FrameMessage {
    #[prost(message, optional, tag = "2")]
    audio: Option<AudioRawMessage>,
}

/// Raw PCM payload with its format
#[derive(Clone, PartialEq, Message)]
struct AudioRawMessage {
    #[prost(bytes = "vec", tag = "3")]
    audio: Vec<u8>,
    #[prost(uint32, tag = "4")]
    sample_rate: u32,
    #[prost(uint32, tag = "5")]
    num_channels: u32,
}

/// One unit of audio exchanged with the service
///
/// The payload is 16-bit signed little-endian PCM, interleaved when
/// `num_channels > 1`. It always holds a whole number of sample frames.
///
/// # Example
/// ```
/// use voxlink_lib::codec::AudioFrame;
///
/// let frame = AudioFrame::new(vec![0u8; 960], 24000, 1).unwrap();
/// assert_eq!(frame.sample_frames(), 480);
/// assert!((frame.duration_secs() - 0.02).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    payload: Vec<u8>,
    sample_rate: u32,
    num_channels: u32,
}

impl AudioFrame {
    /// Create a frame, checking the whole-sample-frame invariant
    ///
    /// # Errors
    /// Returns `FrameError::ZeroChannels` or `FrameError::PartialSampleFrame`.
    pub fn new(payload: Vec<u8>, sample_rate: u32, num_channels: u32) -> Result<Self, FrameError> {
        if num_channels == 0 {
            return Err(FrameError::ZeroChannels);
        }

        let frame_bytes = BYTES_PER_SAMPLE * num_channels as usize;
        if payload.len() % frame_bytes != 0 {
            return Err(FrameError::PartialSampleFrame {
                len: payload.len(),
                frame_bytes,
            });
        }

        Ok(Self {
            payload,
            sample_rate,
            num_channels,
        })
    }

    /// Raw PCM bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the frame and return its PCM bytes
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels
    pub fn num_channels(&self) -> u32 {
        self.num_channels
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Number of sample frames (samples per channel)
    pub fn sample_frames(&self) -> usize {
        self.payload.len() / (BYTES_PER_SAMPLE * self.num_channels as usize)
    }

    /// Playback duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_frames() as f64 / self.sample_rate as f64
    }

    /// Serialize this frame to its wire form
    pub fn encode(&self) -> Vec<u8> {
        encode(&self.payload, self.sample_rate, self.num_channels)
    }
}

/// Serialize a PCM payload to the wire frame format
///
/// The payload must already be 16-bit PCM. Encoding is deterministic:
/// identical inputs always produce identical bytes.
///
/// # Example
/// ```
/// use voxlink_lib::codec::{decode, encode};
///
/// let bytes = encode(&[1, 0, 2, 0], 24000, 1);
/// let frame = decode(&bytes).unwrap();
/// assert_eq!(frame.payload(), &[1, 0, 2, 0]);
/// ```
pub fn encode(payload: &[u8], sample_rate: u32, num_channels: u32) -> Vec<u8> {
    FrameMessage {
        audio: Some(AudioRawMessage {
            audio: payload.to_vec(),
            sample_rate,
            num_channels,
        }),
    }
    .encode_to_vec()
}

/// Parse wire bytes into an `AudioFrame`
///
/// # Errors
/// * `DecodeError::Malformed` - the bytes are not a valid frame, the format
///   fields are zero, or the payload holds a partial sample frame
/// * `DecodeError::EmptyAudio` - the audio message is missing or empty
pub fn decode(bytes: &[u8]) -> DecodeResult<AudioFrame> {
    let message = FrameMessage::decode(bytes)?;

    let audio = match message.audio {
        Some(audio) if !audio.audio.is_empty() => audio,
        _ => return Err(DecodeError::EmptyAudio),
    };

    if audio.sample_rate == 0 {
        return Err(DecodeError::Malformed("sample rate is zero".to_string()));
    }

    Ok(AudioFrame::new(
        audio.audio,
        audio.sample_rate,
        audio.num_channels,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_mono() {
        let payload: Vec<u8> = (0..960).map(|i| (i % 251) as u8).collect();
        let bytes = encode(&payload, 24000, 1);
        let frame = decode(&bytes).unwrap();

        assert_eq!(frame.payload(), payload.as_slice());
        assert_eq!(frame.sample_rate(), 24000);
        assert_eq!(frame.num_channels(), 1);
    }

    #[test]
    fn test_round_trip_stereo() {
        let payload = vec![0x10, 0x00, 0x20, 0x00, 0xff, 0x7f, 0x00, 0x80];
        let frame = decode(&encode(&payload, 48000, 2)).unwrap();

        assert_eq!(frame.payload(), payload.as_slice());
        assert_eq!(frame.num_channels(), 2);
        assert_eq!(frame.sample_frames(), 2);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let payload = vec![1u8, 2, 3, 4];
        assert_eq!(encode(&payload, 24000, 1), encode(&payload, 24000, 1));
    }

    #[test]
    fn test_encode_field_layout() {
        // Frame.audio (field 2, length-delimited) wrapping
        // audio=3 (bytes), sample_rate=4 (varint), num_channels=5 (varint)
        let bytes = encode(&[0xAA, 0xBB], 1, 1);
        assert_eq!(
            bytes,
            vec![0x12, 0x08, 0x1A, 0x02, 0xAA, 0xBB, 0x20, 0x01, 0x28, 0x01]
        );
    }

    #[test]
    fn test_method_encode_matches_free_function() {
        let frame = AudioFrame::new(vec![0u8; 4], 16000, 1).unwrap();
        assert_eq!(frame.encode(), encode(&[0u8; 4], 16000, 1));
    }

    #[test]
    fn test_decode_empty_payload() {
        let bytes = encode(&[], 24000, 1);
        assert_eq!(decode(&bytes), Err(DecodeError::EmptyAudio));
    }

    #[test]
    fn test_decode_missing_audio() {
        assert_eq!(decode(&[]), Err(DecodeError::EmptyAudio));
    }

    #[test]
    fn test_decode_garbage() {
        let result = decode(&[0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = encode(&[0u8; 64], 24000, 1);
        let result = decode(&bytes[..bytes.len() - 10]);
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_partial_sample_frame() {
        let bytes = encode(&[0u8; 3], 24000, 1);
        assert!(matches!(decode(&bytes), Err(DecodeError::Malformed(_))));

        let bytes = encode(&[0u8; 6], 24000, 2);
        assert!(matches!(decode(&bytes), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_zero_format_fields() {
        assert!(matches!(
            decode(&encode(&[0u8; 4], 0, 1)),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode(&encode(&[0u8; 4], 24000, 0)),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_frame_invariant() {
        assert_eq!(
            AudioFrame::new(vec![0u8; 5], 24000, 1),
            Err(FrameError::PartialSampleFrame {
                len: 5,
                frame_bytes: 2
            })
        );
        assert_eq!(
            AudioFrame::new(vec![0u8; 4], 24000, 0),
            Err(FrameError::ZeroChannels)
        );
        assert!(AudioFrame::new(Vec::new(), 24000, 1).unwrap().is_empty());
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::new(vec![0u8; 960], 24000, 1).unwrap();
        assert!((frame.duration_secs() - 0.02).abs() < 1e-12);

        let frame = AudioFrame::new(vec![0u8; 960], 24000, 2).unwrap();
        assert!((frame.duration_secs() - 0.01).abs() < 1e-12);
    }
}
