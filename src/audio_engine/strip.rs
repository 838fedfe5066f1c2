//! Per-channel signal chain.
//!
//! Fixed topology: `input → lowpass → waveshaper → panner → volume → master`,
//! with reverb and delay sends tapped from the input.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use crate::audio_engine::constants::PARAM_TIME_CONSTANT_S;
use crate::audio_engine::curves::make_distortion_curve;
use crate::audio_engine::filter::{CUTOFF_MAX_HZ, LowpassFilter};
use crate::audio_engine::frame::StereoFrame;
use crate::audio_engine::smoothing::SmoothedParam;

/// Volume of a freshly built strip, before any knob value is applied.
pub const DEFAULT_STRIP_VOLUME: f32 = 0.8;

/// A live parameter change for one strip, already mapped to engine units.
#[derive(Debug, Clone)]
pub enum StripParam {
    /// Linear gain.
    Volume(f32),
    /// Stereo position, -1 (left) to 1 (right).
    Pan(f32),
    /// Waveshaper transfer curve.
    Drive(Arc<[f32]>),
    /// Linear send gain into the reverb bus.
    ReverbSend(f32),
    /// Linear send gain into the delay bus.
    DelaySend(f32),
    /// Lowpass cutoff in Hz.
    Cutoff(f32),
    /// Lowpass resonance in dB.
    Resonance(f32),
}

/// What one strip contributes for one frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripOutput {
    pub main: StereoFrame,
    pub reverb: StereoFrame,
    pub delay: StereoFrame,
}

pub struct ChannelStrip {
    filter: LowpassFilter,
    curve: Arc<[f32]>,
    pan: SmoothedParam,
    volume: SmoothedParam,
    reverb_send: SmoothedParam,
    delay_send: SmoothedParam,
}

impl ChannelStrip {
    pub fn new(fs_hz: f32) -> Self {
        Self::with_curve(fs_hz, Arc::from(make_distortion_curve(0.0).into_boxed_slice()))
    }

    /// Builds a strip sharing an existing identity curve.
    pub fn with_curve(fs_hz: f32, curve: Arc<[f32]>) -> Self {
        let smoothed = |value| SmoothedParam::new(value, PARAM_TIME_CONSTANT_S, fs_hz);
        Self {
            filter: LowpassFilter::new(fs_hz, CUTOFF_MAX_HZ, 0.0),
            curve,
            pan: smoothed(0.0),
            volume: smoothed(DEFAULT_STRIP_VOLUME),
            reverb_send: smoothed(0.0),
            delay_send: smoothed(0.0),
        }
    }

    pub fn apply(&mut self, param: StripParam) {
        match param {
            StripParam::Volume(gain) => self.volume.set_target(gain),
            StripParam::Pan(pan) => self.pan.set_target(pan.clamp(-1.0, 1.0)),
            StripParam::Drive(curve) => self.curve = curve,
            StripParam::ReverbSend(gain) => self.reverb_send.set_target(gain),
            StripParam::DelaySend(gain) => self.delay_send.set_target(gain),
            StripParam::Cutoff(hz) => self.filter.set_cutoff(hz),
            StripParam::Resonance(db) => self.filter.set_resonance(db),
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume.value()
    }

    pub fn pan(&self) -> f32 {
        self.pan.value()
    }

    pub fn curve(&self) -> &Arc<[f32]> {
        &self.curve
    }

    pub fn process(&mut self, input: StereoFrame) -> StripOutput {
        let reverb = input * self.reverb_send.next();
        let delay = input * self.delay_send.next();

        let filtered = self.filter.process(input);
        let shaped = StereoFrame {
            left: shape(&self.curve, filtered.left),
            right: shape(&self.curve, filtered.right),
        };
        let panned = pan_stereo(shaped, self.pan.next());
        let main = panned * self.volume.next();

        StripOutput {
            main,
            reverb,
            delay,
        }
    }
}

/// Looks `x` up in a transfer curve spanning `[-1, 1]`.
pub fn shape(curve: &[f32], x: f32) -> f32 {
    let len = curve.len();
    if len < 2 {
        return x;
    }
    let x = if x.is_finite() { x.clamp(-1.0, 1.0) } else { 0.0 };

    let position = (len - 1) as f32 * (x + 1.0) * 0.5;
    let index = (position as usize).min(len - 2);
    let frac = position - index as f32;
    curve[index] + (curve[index + 1] - curve[index]) * frac
}

/// Equal-power panning of a stereo frame.
///
/// Left of centre, the right input is folded into the left output; right
/// of centre, the opposite. At centre both sides pass unchanged.
pub fn pan_stereo(input: StereoFrame, pan: f32) -> StereoFrame {
    let pan = pan.clamp(-1.0, 1.0);
    if pan <= 0.0 {
        let x = (pan + 1.0) * FRAC_PI_2;
        StereoFrame {
            left: input.left + input.right * x.cos(),
            right: input.right * x.sin(),
        }
    } else {
        let x = pan * FRAC_PI_2;
        StereoFrame {
            left: input.left * x.cos(),
            right: input.right + input.left * x.sin(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::curves::DistortionCurveCache;

    fn settled_strip(params: Vec<StripParam>) -> ChannelStrip {
        let mut strip = ChannelStrip::new(48_000.0);
        for param in params {
            strip.apply(param);
        }
        for _ in 0..48_000 {
            strip.process(StereoFrame::SILENT);
        }
        strip
    }

    #[test]
    fn test_identity_curve_passes_signal() {
        let curve = make_distortion_curve(0.0);
        for x in [-0.9, -0.25, 0.0, 0.3, 0.75] {
            assert!((shape(&curve, x) - x).abs() < 1e-4);
        }
    }

    #[test]
    fn test_shape_clamps_input() {
        let curve = make_distortion_curve(0.0);
        assert!((shape(&curve, 4.0) - shape(&curve, 1.0)).abs() < 1e-6);
        assert!((shape(&curve, -4.0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_center_pan_is_transparent() {
        let out = pan_stereo(StereoFrame::new(0.3, -0.2), 0.0);
        assert!((out.left - 0.3).abs() < 1e-6);
        assert!((out.right + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_hard_pan_moves_everything() {
        let left = pan_stereo(StereoFrame::new(0.5, 0.5), -1.0);
        assert!((left.left - 1.0).abs() < 1e-6);
        assert!(left.right.abs() < 1e-6);

        let right = pan_stereo(StereoFrame::new(0.5, 0.5), 1.0);
        assert!(right.left.abs() < 1e-6);
        assert!((right.right - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_default_strip_output() {
        let mut strip = ChannelStrip::new(48_000.0);
        let mut out = StripOutput::default();
        for _ in 0..4_800 {
            out = strip.process(StereoFrame::mono(0.5));
        }
        assert!((out.main.left - 0.5 * DEFAULT_STRIP_VOLUME).abs() < 1e-3);
        assert_eq!(out.reverb, StereoFrame::SILENT);
        assert_eq!(out.delay, StereoFrame::SILENT);
    }

    #[test]
    fn test_sends_tap_the_input() {
        let mut strip = settled_strip(vec![
            StripParam::ReverbSend(1.5),
            StripParam::DelaySend(0.8),
            StripParam::Volume(0.0),
        ]);
        let out = strip.process(StereoFrame::mono(0.2));
        assert!((out.reverb.left - 0.3).abs() < 1e-5);
        assert!((out.delay.right - 0.16).abs() < 1e-5);
        assert!(out.main.peak() < 1e-6);
    }

    #[test]
    fn test_volume_change_is_smoothed() {
        let mut strip = ChannelStrip::new(48_000.0);
        strip.apply(StripParam::Volume(0.0));
        strip.process(StereoFrame::SILENT);
        assert!(strip.volume() > 0.79);
    }

    #[test]
    fn test_drive_swaps_curve() {
        let mut cache = DistortionCurveCache::new();
        let curve = cache.get(200.0);
        let mut strip = ChannelStrip::new(48_000.0);
        strip.apply(StripParam::Drive(curve.clone()));
        assert!(Arc::ptr_eq(strip.curve(), &curve));
    }
}
