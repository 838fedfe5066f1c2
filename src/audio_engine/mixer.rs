//! Real-time audio mixer implementation.
//!
//! [`RtMixer`] owns everything the audio callback touches: the voice pool,
//! the eight channel strips, the delay and reverb buses and the master
//! compressor. All of it is allocated up front; rendering never allocates.

use rtrb::Producer;

use crate::audio_engine::constants::{DELAY_INITIAL_S, MASTER_GAIN, MAX_VOICES, NUM_CHANNELS};
use crate::audio_engine::curves::make_distortion_curve;
use crate::audio_engine::effects::{Compressor, Convolver, DelayLine};
use crate::audio_engine::frame::StereoFrame;
use crate::audio_engine::strip::{ChannelStrip, StripParam};
use crate::audio_engine::voice::{VoiceRequest, VoiceSlot, VoiceTarget};
use cpal::Sample;
use std::sync::Arc;

pub struct RtMixer {
    /// Number of output channels (1 for mono, 2 or more for stereo).
    channels: usize,

    /// Voice pool with MAX_VOICES slots.
    voices: Box<[VoiceSlot]>,

    strips: [ChannelStrip; NUM_CHANNELS],
    delay: DelayLine,
    reverb: Box<Convolver>,
    compressor: Compressor,

    /// Mono master feed for visualisers; samples are dropped when it is full.
    analysis: Option<Producer<f32>>,
}

impl RtMixer {
    /// Creates a mixer rendering `channels` interleaved channels at
    /// `sample_rate`, starting with `reverb` on the reverb bus.
    pub fn new(channels: usize, sample_rate: u32, reverb: Box<Convolver>) -> Self {
        let fs = sample_rate as f32;
        let identity: Arc<[f32]> = Arc::from(make_distortion_curve(0.0).into_boxed_slice());

        Self {
            channels,
            voices: (0..MAX_VOICES).map(|_| VoiceSlot::new(fs)).collect(),
            strips: std::array::from_fn(|_| ChannelStrip::with_curve(fs, identity.clone())),
            delay: DelayLine::new(fs, DELAY_INITIAL_S),
            reverb,
            compressor: Compressor::new(fs),
            analysis: None,
        }
    }

    pub fn set_analysis_tap(&mut self, producer: Producer<f32>) {
        self.analysis = Some(producer);
    }

    /// Starts a voice in the first free slot.
    ///
    /// Returns `false` when every slot is busy; the request is dropped and
    /// nothing already playing is cut.
    pub fn play_voice(&mut self, request: VoiceRequest) -> bool {
        for voice in self.voices.iter_mut() {
            if !voice.is_active() {
                voice.start(request);
                return true;
            }
        }

        // No free voice slot: drop deterministically.
        false
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Invalid channel indices are ignored.
    pub fn apply_strip(&mut self, channel: usize, param: StripParam) {
        if let Some(strip) = self.strips.get_mut(channel) {
            strip.apply(param);
        }
    }

    pub fn set_delay_time(&mut self, seconds: f32) {
        if seconds.is_finite() {
            self.delay.set_time(seconds);
        }
    }

    /// Swaps in a new reverb and returns the old one.
    pub fn set_reverb(&mut self, reverb: Box<Convolver>) -> Box<Convolver> {
        std::mem::replace(&mut self.reverb, reverb)
    }

    /// Renders interleaved audio into `output` and returns the block's mono
    /// peak before the compressor.
    pub fn render(&mut self, output: &mut [f32]) -> f32 {
        output.fill(Sample::EQUILIBRIUM);

        if self.channels == 0 {
            return 0.0;
        }

        let mut peak = 0.0_f32;
        for frame in output.chunks_exact_mut(self.channels) {
            let master = self.next_master_frame();

            let mono = master.mid();
            peak = peak.max(mono.abs());
            if let Some(tap) = self.analysis.as_mut() {
                let _ = tap.push(mono);
            }

            let out = self.compressor.process(master);
            if self.channels == 1 {
                frame[0] = out.mid();
            } else {
                frame[0] = out.left;
                frame[1] = out.right;
            }
        }

        peak
    }

    fn next_master_frame(&mut self) -> StereoFrame {
        let mut inputs = [StereoFrame::SILENT; NUM_CHANNELS];
        let mut master = StereoFrame::SILENT;

        for voice in self.voices.iter_mut() {
            let target = voice.target();
            let Some(frame) = voice.next_frame() else {
                continue;
            };
            match target {
                VoiceTarget::Channel(channel) => {
                    if let Some(input) = inputs.get_mut(channel) {
                        *input += frame;
                    }
                }
                VoiceTarget::Master => master += frame,
            }
        }

        let mut reverb_bus = StereoFrame::SILENT;
        let mut delay_bus = StereoFrame::SILENT;
        for (strip, input) in self.strips.iter_mut().zip(inputs) {
            let out = strip.process(input);
            master += out.main;
            reverb_bus += out.reverb;
            delay_bus += out.delay;
        }

        master += self.delay.process(delay_bus);
        master += self.reverb.process(reverb_bus);

        master * MASTER_GAIN
    }

    /// Gets the number of channels configured for this mixer.
    pub fn channels(&self) -> usize {
        self.channels
    }
}
