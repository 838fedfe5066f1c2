//! Voice slots for the real-time mixer.
//!
//! A voice plays one [`SampleBuffer`] once, at a fixed rate, through a
//! [`GainEnvelope`]. Slots are preallocated by the
//! [`RtMixer`](crate::audio_engine::mixer::RtMixer) and reused; starting or
//! stopping one never allocates.

use crate::audio_engine::envelope::GainEnvelope;
use crate::audio_engine::frame::StereoFrame;
use crate::messages::SampleBuffer;

/// Where a voice's output is summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceTarget {
    /// Input of a mixer channel strip.
    Channel(usize),
    /// Straight into the master bus, bypassing the strips.
    Master,
}

/// Everything the audio thread needs to start a voice.
#[derive(Debug, Clone)]
pub struct VoiceRequest {
    /// Pad that fired the voice, if any.
    pub pad: Option<usize>,
    pub target: VoiceTarget,
    pub sample: SampleBuffer,
    /// Playback rate, 1.0 being the buffer's own speed.
    pub rate: f32,
    pub gain: GainEnvelope,
}

pub struct VoiceSlot {
    active: bool,
    pad: Option<usize>,
    target: VoiceTarget,
    sample: Option<SampleBuffer>,
    position: f64,
    step: f64,
    gain: GainEnvelope,
    elapsed: u64,
    output_rate: f32,
}

impl VoiceSlot {
    pub fn new(output_rate: f32) -> Self {
        Self {
            active: false,
            pad: None,
            target: VoiceTarget::Master,
            sample: None,
            position: 0.0,
            step: 1.0,
            gain: GainEnvelope::constant(0.0, 0.0),
            elapsed: 0,
            output_rate,
        }
    }

    pub fn start(&mut self, request: VoiceRequest) {
        let rate = if request.rate.is_finite() && request.rate > 0.0 {
            request.rate
        } else {
            1.0
        };

        self.active = true;
        self.pad = request.pad;
        self.target = request.target;
        self.step = f64::from(rate) * f64::from(request.sample.sample_rate)
            / f64::from(self.output_rate);
        self.sample = Some(request.sample);
        self.position = 0.0;
        self.gain = request.gain;
        self.elapsed = 0;
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.pad = None;
        self.sample = None;
        self.position = 0.0;
        self.elapsed = 0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn pad(&self) -> Option<usize> {
        self.pad
    }

    pub fn target(&self) -> VoiceTarget {
        self.target
    }

    /// Renders the next output frame, or `None` once the voice has ended.
    pub fn next_frame(&mut self) -> Option<StereoFrame> {
        if !self.active {
            return None;
        }

        let t = self.elapsed as f32 / self.output_rate;
        let frame = match self.sample.as_ref() {
            Some(sample) if t < self.gain.end => read_interpolated(sample, self.position),
            _ => None,
        };

        let Some(frame) = frame else {
            self.stop();
            return None;
        };

        self.position += self.step;
        self.elapsed += 1;
        Some(frame * self.gain.value_at(t))
    }
}

fn read_interpolated(sample: &SampleBuffer, position: f64) -> Option<StereoFrame> {
    let frames = sample.frames();
    let index = position as usize;
    if index >= frames {
        return None;
    }

    let frac = (position - index as f64) as f32;
    let a = sample.frame(index);
    if frac == 0.0 || index + 1 >= frames {
        return Some(a);
    }

    let b = sample.frame(index + 1);
    Some(StereoFrame {
        left: a.left + (b.left - a.left) * frac,
        right: a.right + (b.right - a.right) * frac,
    })
}
