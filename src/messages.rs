//! Message definitions for communication between the control thread and the
//! real-time audio thread.
//!
//! These enums are the wire format of the two ring buffers: [`ControlMessage`]
//! flows into the audio callback, [`AudioMessage`] flows back out.

use std::sync::Arc;

use crate::audio_engine::effects::Convolver;
use crate::audio_engine::frame::StereoFrame;
use crate::audio_engine::strip::StripParam;
use crate::audio_engine::voice::VoiceRequest;

/// Decoded, immutable audio shared between pads, library entries and voices.
///
/// Samples are interleaved; buffers keep the rate they were decoded at and
/// voices convert on the fly.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub channels: usize,
    pub sample_rate: u32,
    pub samples: Arc<[f32]>,
}

impl SampleBuffer {
    pub fn new(channels: usize, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            channels,
            sample_rate,
            samples: Arc::from(samples.into_boxed_slice()),
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    pub fn duration_s(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Frame `index` as stereo; mono buffers feed both sides.
    pub fn frame(&self, index: usize) -> StereoFrame {
        let base = index * self.channels;
        match self.channels {
            0 => StereoFrame::SILENT,
            1 => StereoFrame::mono(self.samples.get(base).copied().unwrap_or(0.0)),
            _ => StereoFrame {
                left: self.samples.get(base).copied().unwrap_or(0.0),
                right: self.samples.get(base + 1).copied().unwrap_or(0.0),
            },
        }
    }

    /// True when both handles point at the same decoded data.
    pub fn shares_data(&self, other: &SampleBuffer) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

/// Message that is emitted from the audio thread.
#[derive(Debug)]
pub enum AudioMessage {
    /// Response to a Ping message.
    Pong,

    /// Low-rate master meter (mono peak since the last report).
    MasterPeak { peak: f32 },

    /// The voice pool was full and a trigger was dropped.
    VoiceDropped { pad: Option<usize> },

    /// A reverb that was swapped out, returned so it is freed off the audio
    /// thread.
    RetiredReverb(Box<Convolver>),
}

/// Message that is emitted from the control side.
#[derive(Debug)]
pub enum ControlMessage {
    /// Used for testing message passing functionality.
    Ping,

    /// Apply a mapped parameter to one channel strip.
    SetChannelParam { channel: usize, param: StripParam },

    /// Set the global delay time in seconds.
    SetDelayTime(f32),

    /// Replace the reverb with a freshly prepared convolver.
    SetReverb(Box<Convolver>),

    /// Start a voice.
    PlayVoice(VoiceRequest),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_frames_and_duration() {
        let buffer = SampleBuffer::new(2, 4, vec![0.0; 16]);
        assert_eq!(buffer.frames(), 8);
        assert!((buffer.duration_s() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_mono_frame_feeds_both_sides() {
        let buffer = SampleBuffer::new(1, 44_100, vec![0.25, -0.5]);
        assert_eq!(buffer.frame(1), StereoFrame::new(-0.5, -0.5));
        assert_eq!(buffer.frame(5), StereoFrame::SILENT);
    }

    #[test]
    fn test_clones_share_data() {
        let buffer = SampleBuffer::new(2, 44_100, vec![0.1, 0.2]);
        let clone = buffer.clone();
        assert!(buffer.shares_data(&clone));

        let other = SampleBuffer::new(2, 44_100, vec![0.1, 0.2]);
        assert!(!buffer.shares_data(&other));
    }
}
