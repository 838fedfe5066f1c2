//! Waveshaper transfer curves and synthetic reverb impulses.
//!
//! Both are pure generators. Curves are cached per integer drive amount;
//! impulses are regenerated on every reverb size change and never cached.

use std::collections::HashMap;
use std::f32::consts::PI;
use std::sync::Arc;

use rand::Rng;

use crate::audio_engine::constants::{CURVE_LEN, DRIVE_MAX};

/// Builds the waveshaper transfer curve for drive amount `k`.
///
/// The curve samples `x` linearly across `[-1, 1]`, symmetric about the
/// middle so a silent input stays exactly silent. For `k == 0` the result is
/// the identity line.
pub fn make_distortion_curve(k: f32) -> Vec<f32> {
    let mut curve = Vec::with_capacity(CURVE_LEN);

    if k == 0.0 {
        curve.extend((0..CURVE_LEN).map(curve_x));
        return curve;
    }

    let deg = PI / 180.0;
    curve.extend((0..CURVE_LEN).map(|i| {
        let x = curve_x(i);
        (3.0 + k) * x * 20.0 * deg / (PI + k * x.abs())
    }));
    curve
}

#[inline]
fn curve_x(i: usize) -> f32 {
    let last = (CURVE_LEN - 1) as i64;
    (2 * i as i64 - last) as f32 / last as f32
}

/// Cache of transfer curves keyed by the rounded drive amount.
///
/// Keys are clamped to `0..=DRIVE_MAX`, so the cache never holds more than
/// 401 curves; that bound is what allows it to live for the whole engine
/// lifetime without eviction.
#[derive(Default)]
pub struct DistortionCurveCache {
    curves: HashMap<u32, Arc<[f32]>>,
}

impl DistortionCurveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the curve for `amount`, computing it on first use.
    ///
    /// Two calls whose amounts round to the same integer return the same
    /// allocation.
    pub fn get(&mut self, amount: f32) -> Arc<[f32]> {
        let key = curve_key(amount);
        self.curves
            .entry(key)
            .or_insert_with(|| Arc::from(make_distortion_curve(key as f32).into_boxed_slice()))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }
}

fn curve_key(amount: f32) -> u32 {
    if !amount.is_finite() {
        return 0;
    }
    amount.round().clamp(0.0, DRIVE_MAX) as u32
}

/// Two-channel reverb impulse.
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    pub sample_rate: u32,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl ImpulseResponse {
    /// Length per channel, in samples.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_s(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f32 / self.sample_rate as f32
    }
}

/// Generates a decaying noise impulse using the thread-local RNG.
pub fn impulse_response(
    sample_rate: u32,
    duration_s: f32,
    decay: f32,
    reverse: bool,
) -> ImpulseResponse {
    impulse_response_with_rng(sample_rate, duration_s, decay, reverse, &mut rand::thread_rng())
}

/// Generates a decaying noise impulse from the given RNG.
///
/// Sample `i` of each channel is `noise × (1 − n/len)^decay`, where `n` is
/// `i`, or `len − i` when `reverse` is set.
pub fn impulse_response_with_rng<R: Rng>(
    sample_rate: u32,
    duration_s: f32,
    decay: f32,
    reverse: bool,
    rng: &mut R,
) -> ImpulseResponse {
    let length = if duration_s.is_finite() && duration_s > 0.0 {
        (sample_rate as f32 * duration_s) as usize
    } else {
        0
    };

    let mut left = Vec::with_capacity(length);
    let mut right = Vec::with_capacity(length);
    for i in 0..length {
        let n = if reverse { length - i } else { i };
        let envelope = (1.0 - n as f32 / length as f32).powf(decay);
        left.push(rng.gen_range(-1.0_f32..1.0) * envelope);
        right.push(rng.gen_range(-1.0_f32..1.0) * envelope);
    }

    ImpulseResponse {
        sample_rate,
        left,
        right,
    }
}
