//! Pad envelopes and the gain curve they produce for one voice.

use crate::audio_engine::constants::{
    ENVELOPE_MIN_PHASE_S, ENVELOPE_MIN_TAIL_S, RATE_MAX, RATE_MIN, SUSTAIN_FLOOR,
};

pub const ATTACK_MAX_S: f32 = 2.0;
pub const DECAY_MAX_S: f32 = 2.0;
pub const RELEASE_MAX_S: f32 = 5.0;
pub const TAIL_MAX_S: f32 = 0.5;

/// Amplitude envelope settings stored on a pad.
///
/// `release` is kept for display and editing; voices always fade over the
/// `tail` at the end of the sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    pub tail: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack: 0.0,
            decay: 0.1,
            sustain: 1.0,
            release: 0.5,
            tail: 0.05,
        }
    }
}

/// Partial envelope update; `None` fields are left as they are.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvelopePatch {
    pub attack: Option<f32>,
    pub decay: Option<f32>,
    pub sustain: Option<f32>,
    pub release: Option<f32>,
    pub tail: Option<f32>,
}

impl Envelope {
    /// Applies `patch`, clamping every field into its range.
    pub fn patch(&mut self, patch: EnvelopePatch) {
        if let Some(attack) = patch.attack {
            self.attack = clamp_field(attack, ATTACK_MAX_S, self.attack);
        }
        if let Some(decay) = patch.decay {
            self.decay = clamp_field(decay, DECAY_MAX_S, self.decay);
        }
        if let Some(sustain) = patch.sustain {
            self.sustain = clamp_field(sustain, 1.0, self.sustain);
        }
        if let Some(release) = patch.release {
            self.release = clamp_field(release, RELEASE_MAX_S, self.release);
        }
        if let Some(tail) = patch.tail {
            self.tail = clamp_field(tail, TAIL_MAX_S, self.tail);
        }
    }
}

fn clamp_field(value: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        fallback
    }
}

/// Policy turning an incoming velocity into the one used for shaping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VelocityMode {
    #[default]
    Dynamic,
    Max,
    Mid,
    Min,
}

impl VelocityMode {
    pub fn resolve(self, input: u8) -> u8 {
        match self {
            VelocityMode::Dynamic => input.min(127),
            VelocityMode::Max => 127,
            VelocityMode::Mid => 64,
            VelocityMode::Min => 40,
        }
    }
}

/// Gain automation for one voice, in seconds from the voice start.
///
/// Phases in order: linear attack from 0 to `peak`, exponential decay to
/// `sustain`, hold, then a linear release to 0 at `end`. Attack and decay
/// always run their full length; when the sample is too short for them the
/// hold and release collapse to nothing and the voice simply stops when the
/// sample runs out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainEnvelope {
    pub peak: f32,
    pub sustain: f32,
    pub attack_end: f32,
    pub decay_end: f32,
    pub tail_start: f32,
    pub end: f32,
}

impl GainEnvelope {
    /// Shapes `envelope` for a voice of `duration_s` seconds at `velocity`.
    pub fn shaped(envelope: &Envelope, velocity: u8, duration_s: f32) -> Self {
        let duration_s = if duration_s.is_finite() {
            duration_s.max(0.0)
        } else {
            0.0
        };
        let peak = f32::from(velocity.min(127)) / 127.0;

        let attack_end = envelope.attack.max(ENVELOPE_MIN_PHASE_S);
        let decay_end = attack_end + envelope.decay.max(ENVELOPE_MIN_PHASE_S);
        let sustain = (peak * envelope.sustain).max(SUSTAIN_FLOOR);

        let tail = envelope.tail.max(ENVELOPE_MIN_TAIL_S);
        let tail_start = decay_end.max(duration_s - tail);
        let end = duration_s.max(tail_start);

        Self {
            peak,
            sustain,
            attack_end,
            decay_end,
            tail_start,
            end,
        }
    }

    /// Flat gain for the whole of `duration_s`.
    pub fn constant(gain: f32, duration_s: f32) -> Self {
        let duration_s = duration_s.max(0.0);
        Self {
            peak: gain,
            sustain: gain,
            attack_end: 0.0,
            decay_end: 0.0,
            tail_start: duration_s,
            end: duration_s,
        }
    }

    /// Duration of the hold phase.
    pub fn hold_s(&self) -> f32 {
        self.tail_start - self.decay_end
    }

    /// Gain at `t` seconds after the voice started.
    pub fn value_at(&self, t: f32) -> f32 {
        if t < 0.0 || t >= self.end {
            return 0.0;
        }

        if t < self.attack_end {
            return self.peak * t / self.attack_end;
        }

        if t < self.decay_end {
            let progress = (t - self.attack_end) / (self.decay_end - self.attack_end);
            if self.peak <= 0.0 {
                return self.sustain * progress;
            }
            return self.peak * (self.sustain / self.peak).powf(progress);
        }

        if t < self.tail_start {
            return self.sustain;
        }

        let release = self.end - self.tail_start;
        if release <= 0.0 {
            return 0.0;
        }
        self.sustain * (self.end - t) / release
    }
}

/// Playback rate for a channel's pitch bias in `[0, 1]`.
///
/// The lower half spans 0.5–1.0 and the upper half 1.0–2.0.
pub fn playback_rate(pitch_bias: f32) -> f32 {
    let p = if pitch_bias.is_finite() {
        pitch_bias.clamp(0.0, 1.0)
    } else {
        0.5
    };

    let rate = if p < 0.5 { 0.5 + p } else { 1.0 + (p - 0.5) * 2.0 };
    rate.clamp(RATE_MIN, RATE_MAX)
}
