//! Global send effects and the master compressor.
//!
//! - [`DelayLine`]: stereo feedback delay fed by the channel delay sends
//! - [`Convolver`]: partitioned FFT convolution reverb fed by the reverb sends
//! - [`Compressor`]: feed-forward, stereo-linked master dynamics

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::audio_engine::constants::{
    COMPRESSOR_ATTACK_S, COMPRESSOR_RATIO, COMPRESSOR_RELEASE_S, COMPRESSOR_THRESHOLD_DB,
    DELAY_FEEDBACK, DELAY_MAX_S, DELAY_TIME_CONSTANT_S,
};
use crate::audio_engine::curves::ImpulseResponse;
use crate::audio_engine::frame::StereoFrame;
use crate::audio_engine::smoothing::SmoothedParam;

/// Stereo delay line with a feedback loop around it.
pub struct DelayLine {
    fs_hz: f32,
    left: Vec<f32>,
    right: Vec<f32>,
    write: usize,
    time_s: SmoothedParam,
    feedback: f32,
}

impl DelayLine {
    pub fn new(fs_hz: f32, time_s: f32) -> Self {
        let capacity = (DELAY_MAX_S * fs_hz).ceil() as usize + 2;
        Self {
            fs_hz,
            left: vec![0.0; capacity],
            right: vec![0.0; capacity],
            write: 0,
            time_s: SmoothedParam::new(time_s, DELAY_TIME_CONSTANT_S, fs_hz),
            feedback: DELAY_FEEDBACK,
        }
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.time_s.set_target(seconds.clamp(0.0, DELAY_MAX_S));
    }

    pub fn time_s(&self) -> f32 {
        self.time_s.value()
    }

    /// Feeds one frame in and returns the delayed (wet) frame.
    pub fn process(&mut self, input: StereoFrame) -> StereoFrame {
        let len = self.left.len();
        let delay = (self.time_s.next() * self.fs_hz).clamp(1.0, (len - 2) as f32);

        let read = self.write as f32 - delay;
        let read = if read < 0.0 { read + len as f32 } else { read };
        let i0 = read as usize % len;
        let i1 = (i0 + 1) % len;
        let frac = read - read.floor();

        let out = StereoFrame {
            left: self.left[i0] + (self.left[i1] - self.left[i0]) * frac,
            right: self.right[i0] + (self.right[i1] - self.right[i0]) * frac,
        };

        self.left[self.write] = input.left + out.left * self.feedback;
        self.right[self.write] = input.right + out.right * self.feedback;
        self.write = (self.write + 1) % len;

        out
    }
}

struct ConvolverChannel {
    /// Spectra of the impulse partitions.
    partitions: Vec<Vec<Complex<f32>>>,
    /// Spectra of past input frames, newest at `head`.
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    /// Previous block followed by the block being filled.
    input: Vec<f32>,
    /// Output of the last completed block.
    output: Vec<f32>,
}

/// Uniformly partitioned overlap-save convolution reverb.
///
/// Building one runs the forward FFT over the whole impulse, so it belongs
/// on the control side; the finished convolver is moved to the audio thread
/// in a single message. Latency is one partition.
pub struct Convolver {
    block: usize,
    pos: usize,
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    channels: [ConvolverChannel; 2],
    fft_in: Vec<f32>,
    fft_out: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    accum: Vec<Complex<f32>>,
    r2c_scratch: Vec<Complex<f32>>,
    c2r_scratch: Vec<Complex<f32>>,
    duration_s: f32,
}

impl std::fmt::Debug for Convolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Convolver")
            .field("block", &self.block)
            .field("partitions", &self.partition_count())
            .field("duration_s", &self.duration_s)
            .finish_non_exhaustive()
    }
}

impl Convolver {
    /// Prepares a convolver for `ir` with partitions of `block` samples.
    pub fn new(ir: &ImpulseResponse, block: usize) -> Self {
        let block = block.max(1);
        let fft_len = block * 2;

        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(fft_len);
        let c2r = planner.plan_fft_inverse(fft_len);

        let mut r2c_scratch = r2c.make_scratch_vec();
        let mut fft_in = r2c.make_input_vec();

        let mut channel = |impulse: &[f32]| {
            let count = impulse.len().div_ceil(block).max(1);
            let mut partitions = Vec::with_capacity(count);
            for index in 0..count {
                fft_in.fill(0.0);
                let start = (index * block).min(impulse.len());
                let end = (start + block).min(impulse.len());
                fft_in[..end - start].copy_from_slice(&impulse[start..end]);

                let mut spectrum = r2c.make_output_vec();
                if r2c
                    .process_with_scratch(&mut fft_in, &mut spectrum, &mut r2c_scratch)
                    .is_err()
                {
                    spectrum.fill(Complex::new(0.0, 0.0));
                }
                partitions.push(spectrum);
            }

            ConvolverChannel {
                history: vec![vec![Complex::new(0.0, 0.0); block + 1]; count],
                partitions,
                head: 0,
                input: vec![0.0; fft_len],
                output: vec![0.0; block],
            }
        };
        let channels = [channel(&ir.left), channel(&ir.right)];

        Self {
            block,
            pos: 0,
            fft_in,
            fft_out: c2r.make_output_vec(),
            spectrum: r2c.make_output_vec(),
            accum: c2r.make_input_vec(),
            c2r_scratch: c2r.make_scratch_vec(),
            r2c_scratch,
            r2c,
            c2r,
            channels,
            duration_s: ir.duration_s(),
        }
    }

    /// Duration of the loaded impulse.
    pub fn duration_s(&self) -> f32 {
        self.duration_s
    }

    pub fn partition_count(&self) -> usize {
        self.channels[0].partitions.len()
    }

    /// Feeds one frame in and returns one frame of reverb output.
    pub fn process(&mut self, input: StereoFrame) -> StereoFrame {
        let block = self.block;
        let pos = self.pos;

        self.channels[0].input[block + pos] = input.left;
        self.channels[1].input[block + pos] = input.right;
        let out = StereoFrame {
            left: self.channels[0].output[pos],
            right: self.channels[1].output[pos],
        };

        self.pos += 1;
        if self.pos == block {
            self.pos = 0;
            for index in 0..2 {
                self.process_block(index);
            }
        }

        out
    }

    fn process_block(&mut self, index: usize) {
        let block = self.block;
        let scale = 1.0 / (2 * block) as f32;
        let channel = &mut self.channels[index];

        self.fft_in.copy_from_slice(&channel.input);
        channel.input.copy_within(block.., 0);

        if self
            .r2c
            .process_with_scratch(&mut self.fft_in, &mut self.spectrum, &mut self.r2c_scratch)
            .is_err()
        {
            channel.output.fill(0.0);
            return;
        }

        let count = channel.partitions.len();
        channel.history[channel.head].copy_from_slice(&self.spectrum);

        self.accum.fill(Complex::new(0.0, 0.0));
        for (lag, partition) in channel.partitions.iter().enumerate() {
            let past = &channel.history[(channel.head + count - lag) % count];
            for ((acc, x), h) in self.accum.iter_mut().zip(past).zip(partition) {
                *acc += x * h;
            }
        }
        channel.head = (channel.head + 1) % count;

        // The inverse transform rejects imaginary parts at DC and Nyquist.
        self.accum[0].im = 0.0;
        self.accum[block].im = 0.0;
        if self
            .c2r
            .process_with_scratch(&mut self.accum, &mut self.fft_out, &mut self.c2r_scratch)
            .is_err()
        {
            channel.output.fill(0.0);
            return;
        }

        for (out, y) in channel.output.iter_mut().zip(&self.fft_out[block..]) {
            *out = y * scale;
        }
    }
}

/// Feed-forward compressor with stereo-linked detection.
pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    attack: f32,
    release: f32,
    reduction_db: f32,
}

impl Compressor {
    pub fn new(fs_hz: f32) -> Self {
        Self {
            threshold_db: COMPRESSOR_THRESHOLD_DB,
            ratio: COMPRESSOR_RATIO,
            attack: envelope_coeff(COMPRESSOR_ATTACK_S, fs_hz),
            release: envelope_coeff(COMPRESSOR_RELEASE_S, fs_hz),
            reduction_db: 0.0,
        }
    }

    /// Current gain reduction in dB (positive means quieter).
    pub fn reduction_db(&self) -> f32 {
        self.reduction_db
    }

    pub fn process(&mut self, input: StereoFrame) -> StereoFrame {
        let level = input.peak();
        let level_db = 20.0 * (level + 1e-9).log10();
        let over = level_db - self.threshold_db;
        let target = if over > 0.0 {
            over * (1.0 - 1.0 / self.ratio)
        } else {
            0.0
        };

        let coeff = if target > self.reduction_db {
            self.attack
        } else {
            self.release
        };
        self.reduction_db += (target - self.reduction_db) * coeff;

        input * 10.0_f32.powf(-self.reduction_db / 20.0)
    }
}

fn envelope_coeff(time_s: f32, fs_hz: f32) -> f32 {
    if time_s <= 0.0 || fs_hz <= 0.0 {
        return 1.0;
    }
    1.0 - (-1.0 / (time_s * fs_hz)).exp()
}
