//! Control-side view of the signal graph.
//!
//! [`SignalGraph`] maps knob values onto engine parameters, keeps the values
//! the audio thread cannot report back (pitch bias, the last raw value of
//! every parameter, delay and reverb settings) and owns the distortion curve
//! cache. It never touches audio; the engine ships whatever it returns.

use std::time::{Duration, Instant};

use crate::audio_engine::constants::{
    DELAY_DIVISIONS_S, DELAY_MIN_S, DELAY_SPAN_S, DRIVE_MAX, KNOBS_PER_CHANNEL, MIDI_MAX,
    NUM_CHANNELS, REVERB_DEBOUNCE_MS, REVERB_DECAY_MAX, REVERB_DECAY_MIN, REVERB_DURATION_MAX_S,
    REVERB_DURATION_MIN_S, REVERB_PARTITION,
};
use crate::audio_engine::curves::{DistortionCurveCache, impulse_response};
use crate::audio_engine::effects::Convolver;
use crate::audio_engine::errors::EngineError;
use crate::audio_engine::filter::{CUTOFF_MAX_HZ, CUTOFF_MIN_HZ};
use crate::audio_engine::strip::StripParam;

/// The eight per-channel parameters, in knob order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelParamKind {
    Volume,
    Pan,
    Pitch,
    Drive,
    ReverbSend,
    DelaySend,
    Cutoff,
    Resonance,
}

impl ChannelParamKind {
    pub const ALL: [ChannelParamKind; KNOBS_PER_CHANNEL] = [
        ChannelParamKind::Volume,
        ChannelParamKind::Pan,
        ChannelParamKind::Pitch,
        ChannelParamKind::Drive,
        ChannelParamKind::ReverbSend,
        ChannelParamKind::DelaySend,
        ChannelParamKind::Cutoff,
        ChannelParamKind::Resonance,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            ChannelParamKind::Volume => "VOL",
            ChannelParamKind::Pan => "PAN",
            ChannelParamKind::Pitch => "PITCH",
            ChannelParamKind::Drive => "DRV",
            ChannelParamKind::ReverbSend => "REV",
            ChannelParamKind::DelaySend => "DLY",
            ChannelParamKind::Cutoff => "CUT",
            ChannelParamKind::Resonance => "RES",
        }
    }

    /// Knob value a fresh channel starts from.
    pub fn default_value(self) -> u8 {
        match self {
            ChannelParamKind::Volume => 100,
            ChannelParamKind::Pan | ChannelParamKind::Pitch => 64,
            ChannelParamKind::Cutoff => 127,
            ChannelParamKind::Drive
            | ChannelParamKind::ReverbSend
            | ChannelParamKind::DelaySend
            | ChannelParamKind::Resonance => 0,
        }
    }
}

/// Knob value scaled to `[0, 1]`.
pub fn normalize(value: u8) -> f32 {
    f32::from(value.min(MIDI_MAX)) / f32::from(MIDI_MAX)
}

pub fn volume_gain(norm: f32) -> f32 {
    norm * norm * 1.2
}

pub fn pan_position(norm: f32) -> f32 {
    norm * 2.0 - 1.0
}

pub fn drive_amount(norm: f32) -> f32 {
    norm * DRIVE_MAX
}

pub fn reverb_send_gain(norm: f32) -> f32 {
    norm * 1.5
}

pub fn delay_send_gain(norm: f32) -> f32 {
    norm * 0.8
}

pub fn cutoff_hz(norm: f32) -> f32 {
    (20.0 * 1000.0_f32.powf(norm)).clamp(CUTOFF_MIN_HZ, CUTOFF_MAX_HZ)
}

pub fn resonance_db(norm: f32) -> f32 {
    norm * 20.0
}

/// Delay time for a knob value, optionally snapped to a note division at
/// 120 BPM.
pub fn delay_time_s(value: u8, snap: bool) -> f32 {
    if snap {
        let index = usize::from(value / 16).min(DELAY_DIVISIONS_S.len() - 1);
        DELAY_DIVISIONS_S[index]
    } else {
        DELAY_MIN_S + normalize(value) * DELAY_SPAN_S
    }
}

/// Impulse parameters derived from the reverb size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbShape {
    pub duration_s: f32,
    pub decay: f32,
}

impl ReverbShape {
    pub fn from_size(value: u8) -> Self {
        let norm = normalize(value);
        Self {
            duration_s: REVERB_DURATION_MIN_S
                + norm * (REVERB_DURATION_MAX_S - REVERB_DURATION_MIN_S),
            decay: REVERB_DECAY_MIN + norm * (REVERB_DECAY_MAX - REVERB_DECAY_MIN),
        }
    }
}

/// Engine-side values of one channel, for display and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStripState {
    pub volume: f32,
    pub pan: f32,
    pub pitch_bias: f32,
    pub drive: f32,
    pub reverb_send: f32,
    pub delay_send: f32,
    pub cutoff_hz: f32,
    pub resonance_db: f32,
}

pub struct SignalGraph {
    sample_rate: u32,
    curves: DistortionCurveCache,
    values: [[u8; KNOBS_PER_CHANNEL]; NUM_CHANNELS],
    delay_value: u8,
    delay_snap: bool,
    reverb_size: u8,
    pending_reverb: Option<(u8, Instant)>,
}

impl SignalGraph {
    pub fn new(sample_rate: u32) -> Self {
        let defaults = ChannelParamKind::ALL.map(ChannelParamKind::default_value);
        Self {
            sample_rate,
            curves: DistortionCurveCache::new(),
            values: [defaults; NUM_CHANNELS],
            delay_value: 0,
            delay_snap: true,
            reverb_size: 0,
            pending_reverb: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Records `value` for `(channel, index)` and returns the strip change
    /// to ship, or `None` for parameters the strip does not own (pitch).
    pub fn set_channel_param(
        &mut self,
        channel: usize,
        index: usize,
        value: u8,
    ) -> Result<Option<StripParam>, EngineError> {
        if channel >= NUM_CHANNELS {
            return Err(EngineError::UnknownChannel(channel));
        }
        let kind = ChannelParamKind::from_index(index).ok_or(EngineError::UnknownParam(index))?;

        let value = value.min(MIDI_MAX);
        self.values[channel][index] = value;

        let norm = normalize(value);
        let param = match kind {
            ChannelParamKind::Volume => StripParam::Volume(volume_gain(norm)),
            ChannelParamKind::Pan => StripParam::Pan(pan_position(norm)),
            ChannelParamKind::Pitch => return Ok(None),
            ChannelParamKind::Drive => StripParam::Drive(self.curves.get(drive_amount(norm))),
            ChannelParamKind::ReverbSend => StripParam::ReverbSend(reverb_send_gain(norm)),
            ChannelParamKind::DelaySend => StripParam::DelaySend(delay_send_gain(norm)),
            ChannelParamKind::Cutoff => StripParam::Cutoff(cutoff_hz(norm)),
            ChannelParamKind::Resonance => StripParam::Resonance(resonance_db(norm)),
        };
        Ok(Some(param))
    }

    /// Last value set for `(channel, index)`.
    pub fn channel_param(&self, channel: usize, index: usize) -> Option<u8> {
        self.values.get(channel)?.get(index).copied()
    }

    /// Pitch bias in `[0, 1]` consumed by the scheduler.
    pub fn pitch_bias(&self, channel: usize) -> f32 {
        self.channel_param(channel, ChannelParamKind::Pitch.index())
            .map(normalize)
            .unwrap_or(0.5)
    }

    pub fn channel_state(&self, channel: usize) -> Option<ChannelStripState> {
        let row = self.values.get(channel)?;
        let norm = |kind: ChannelParamKind| normalize(row[kind.index()]);
        Some(ChannelStripState {
            volume: volume_gain(norm(ChannelParamKind::Volume)),
            pan: pan_position(norm(ChannelParamKind::Pan)),
            pitch_bias: norm(ChannelParamKind::Pitch),
            drive: drive_amount(norm(ChannelParamKind::Drive)),
            reverb_send: reverb_send_gain(norm(ChannelParamKind::ReverbSend)),
            delay_send: delay_send_gain(norm(ChannelParamKind::DelaySend)),
            cutoff_hz: cutoff_hz(norm(ChannelParamKind::Cutoff)),
            resonance_db: resonance_db(norm(ChannelParamKind::Resonance)),
        })
    }

    pub fn curve_cache(&mut self) -> &mut DistortionCurveCache {
        &mut self.curves
    }

    /// Stores the delay setting and returns the resulting time in seconds.
    pub fn set_delay(&mut self, value: u8, snap: bool) -> f32 {
        self.delay_value = value.min(MIDI_MAX);
        self.delay_snap = snap;
        self.delay_time_s()
    }

    pub fn delay_time_s(&self) -> f32 {
        delay_time_s(self.delay_value, self.delay_snap)
    }

    pub fn delay_setting(&self) -> (u8, bool) {
        (self.delay_value, self.delay_snap)
    }

    pub fn reverb_size(&self) -> u8 {
        self.reverb_size
    }

    /// Queues a reverb regeneration. Requests arriving within the debounce
    /// window of each other collapse into one, using the latest size.
    pub fn request_reverb_size(&mut self, value: u8, now: Instant) {
        let due = now + Duration::from_millis(REVERB_DEBOUNCE_MS);
        self.pending_reverb = Some((value.min(MIDI_MAX), due));
    }

    pub fn has_pending_reverb(&self) -> bool {
        self.pending_reverb.is_some()
    }

    /// Size and shape of the reverb to build once the debounce window has
    /// passed. The request stays pending until [`Self::commit_reverb`].
    pub fn due_reverb(&self, now: Instant) -> Option<(u8, ReverbShape)> {
        let (value, due) = self.pending_reverb?;
        (now >= due).then(|| (value, ReverbShape::from_size(value)))
    }

    /// Marks the reverb of size `value` as delivered to the audio thread.
    pub fn commit_reverb(&mut self, value: u8) {
        if self.pending_reverb.is_some_and(|(pending, _)| pending == value) {
            self.pending_reverb = None;
        }
        self.reverb_size = value;
    }

    /// Generates a fresh impulse for `shape` and prepares its convolver.
    pub fn build_reverb(&self, shape: ReverbShape) -> Convolver {
        let ir = impulse_response(self.sample_rate, shape.duration_s, shape.decay, false);
        Convolver::new(&ir, REVERB_PARTITION)
    }
}
