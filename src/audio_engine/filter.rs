use std::f32::consts::PI;

use crate::audio_engine::constants::PARAM_TIME_CONSTANT_S;
use crate::audio_engine::frame::StereoFrame;
use crate::audio_engine::smoothing::SmoothedParam;

/// Lowest cutoff the channel filter accepts.
pub const CUTOFF_MIN_HZ: f32 = 20.0;

/// Highest cutoff the channel filter accepts.
pub const CUTOFF_MAX_HZ: f32 = 20_000.0;

/// Samples between coefficient refreshes while cutoff or resonance is moving.
const REFRESH_INTERVAL: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    fn identity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

#[derive(Clone, Copy, Default)]
struct BiquadState {
    z1: f32,
    z2: f32,
}

fn biquad_process(coeffs: BiquadCoeffs, state: &mut BiquadState, x: f32) -> f32 {
    let y = coeffs.b0 * x + state.z1;
    state.z1 = coeffs.b1 * x - coeffs.a1 * y + state.z2;
    state.z2 = coeffs.b2 * x - coeffs.a2 * y;
    y
}

fn clamp_freq_hz(fs_hz: f32, freq_hz: f32) -> f32 {
    if !fs_hz.is_finite() || fs_hz <= 0.0 {
        return freq_hz.max(1.0);
    }

    let nyquist = fs_hz * 0.5;
    let max_hz = (nyquist * 0.99).max(1.0);
    freq_hz.clamp(1.0, max_hz)
}

fn normalize_biquad(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> BiquadCoeffs {
    if !a0.is_finite() || a0.abs() < 1e-12 {
        return BiquadCoeffs::identity();
    }

    let inv_a0 = 1.0 / a0;
    let coeffs = BiquadCoeffs {
        b0: b0 * inv_a0,
        b1: b1 * inv_a0,
        b2: b2 * inv_a0,
        a1: a1 * inv_a0,
        a2: a2 * inv_a0,
    };

    if [coeffs.b0, coeffs.b1, coeffs.b2, coeffs.a1, coeffs.a2]
        .iter()
        .all(|v| v.is_finite())
    {
        coeffs
    } else {
        BiquadCoeffs::identity()
    }
}

/// Lowpass coefficients with the resonance given as peak gain in dB.
///
/// A resonance of 0 dB gives the flat-topped response; 20 dB gives a
/// pronounced peak at the cutoff.
pub fn lowpass_coeffs(fs_hz: f32, freq_hz: f32, resonance_db: f32) -> BiquadCoeffs {
    if !fs_hz.is_finite() || fs_hz <= 0.0 {
        return BiquadCoeffs::identity();
    }

    let freq_hz = clamp_freq_hz(fs_hz, freq_hz);
    let resonance_db = if resonance_db.is_finite() {
        resonance_db
    } else {
        0.0
    };

    let w0 = 2.0 * PI * freq_hz / fs_hz;
    let cos_w0 = w0.cos();
    let sin_w0 = w0.sin();
    let alpha = sin_w0 / (2.0 * 10.0_f32.powf(resonance_db / 20.0));

    let b0 = (1.0 - cos_w0) * 0.5;
    let b1 = 1.0 - cos_w0;
    let b2 = (1.0 - cos_w0) * 0.5;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;

    normalize_biquad(b0, b1, b2, a0, a1, a2)
}

/// Stereo lowpass with smoothed cutoff and resonance.
pub struct LowpassFilter {
    fs_hz: f32,
    cutoff_hz: SmoothedParam,
    resonance_db: SmoothedParam,
    coeffs: BiquadCoeffs,
    state: [BiquadState; 2],
    refresh_in: u32,
}

impl LowpassFilter {
    pub fn new(fs_hz: f32, cutoff_hz: f32, resonance_db: f32) -> Self {
        Self {
            fs_hz,
            cutoff_hz: SmoothedParam::new(cutoff_hz, PARAM_TIME_CONSTANT_S, fs_hz),
            resonance_db: SmoothedParam::new(resonance_db, PARAM_TIME_CONSTANT_S, fs_hz),
            coeffs: lowpass_coeffs(fs_hz, cutoff_hz, resonance_db),
            state: [BiquadState::default(); 2],
            refresh_in: 0,
        }
    }

    pub fn set_cutoff(&mut self, hz: f32) {
        self.cutoff_hz
            .set_target(hz.clamp(CUTOFF_MIN_HZ, CUTOFF_MAX_HZ));
    }

    pub fn set_resonance(&mut self, db: f32) {
        self.resonance_db.set_target(db);
    }

    pub fn cutoff_hz(&self) -> f32 {
        self.cutoff_hz.value()
    }

    pub fn process(&mut self, input: StereoFrame) -> StereoFrame {
        if !(self.cutoff_hz.is_settled() && self.resonance_db.is_settled()) {
            let cutoff = self.cutoff_hz.next();
            let resonance = self.resonance_db.next();
            if self.refresh_in == 0 || (self.cutoff_hz.is_settled() && self.resonance_db.is_settled())
            {
                self.coeffs = lowpass_coeffs(self.fs_hz, cutoff, resonance);
                self.refresh_in = REFRESH_INTERVAL;
            }
            self.refresh_in -= 1;
        }

        StereoFrame {
            left: biquad_process(self.coeffs, &mut self.state[0], input.left),
            right: biquad_process(self.coeffs, &mut self.state[1], input.right),
        }
    }
}
