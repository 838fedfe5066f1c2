//! Turns a pad trigger into a voice request.
//!
//! Scheduling is pure: it resolves the velocity, picks the playback rate from
//! the channel's pitch bias and shapes the gain envelope over the
//! rate-adjusted duration. The engine only has to ship the result.

use crate::audio_engine::constants::{NUM_CHANNELS, PREVIEW_GAIN};
use crate::audio_engine::envelope::{Envelope, GainEnvelope, VelocityMode, playback_rate};
use crate::audio_engine::voice::{VoiceRequest, VoiceTarget};
use crate::messages::SampleBuffer;

/// A pad trigger as seen by the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct TriggerRequest<'a> {
    pub pad: usize,
    pub velocity: u8,
    pub velocity_mode: VelocityMode,
    pub envelope: &'a Envelope,
    pub sample: Option<&'a SampleBuffer>,
}

/// What was scheduled, for callers that want to report it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledVoice {
    pub pad: usize,
    pub channel: usize,
    pub velocity: u8,
    pub rate: f32,
    pub duration_s: f32,
}

/// Channel a pad plays through.
pub fn channel_for_pad(pad: usize) -> usize {
    pad % NUM_CHANNELS
}

/// Builds the voice for `trigger`, or `None` if the pad has no sample.
pub fn schedule(trigger: &TriggerRequest<'_>, pitch_bias: f32) -> Option<(VoiceRequest, ScheduledVoice)> {
    let sample = trigger.sample?;

    let velocity = trigger.velocity_mode.resolve(trigger.velocity);
    let rate = playback_rate(pitch_bias);
    let duration_s = sample.duration_s() / rate;
    let channel = channel_for_pad(trigger.pad);

    let request = VoiceRequest {
        pad: Some(trigger.pad),
        target: VoiceTarget::Channel(channel),
        sample: sample.clone(),
        rate,
        gain: GainEnvelope::shaped(trigger.envelope, velocity, duration_s),
    };
    let scheduled = ScheduledVoice {
        pad: trigger.pad,
        channel,
        velocity,
        rate,
        duration_s,
    };

    Some((request, scheduled))
}

/// Builds an audition voice that plays `sample` unprocessed into the master.
pub fn preview(sample: &SampleBuffer) -> VoiceRequest {
    VoiceRequest {
        pad: None,
        target: VoiceTarget::Master,
        sample: sample.clone(),
        rate: 1.0,
        gain: GainEnvelope::constant(PREVIEW_GAIN, sample.duration_s()),
    }
}
