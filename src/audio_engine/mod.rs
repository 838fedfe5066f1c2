//! Audio Engine Module
//!
//! This module provides the real-time signal engine. It is organized into
//! sub-modules, each with a specific responsibility:
//!
//! - [`audio_stream`]: CPAL stream management and the real-time [`Renderer`]
//! - [`constants`]: Configuration constants and limits
//! - [`errors`]: Audio-specific error types
//! - [`graph`]: Knob-to-parameter mapping on the control side
//! - [`strip`], [`filter`], [`effects`], [`curves`]: DSP building blocks
//! - [`envelope`], [`scheduler`], [`voice`]: Pad triggers and voices
//! - [`mixer`]: Real-time mixing engine
//! - [`sample_loader`]: Audio decoding
//!
//! The main [`AudioEngine`] struct is the control-side handle; the matching
//! [`Renderer`] runs inside the audio callback (or in a test, offline).

use rtrb::{Consumer, Producer, RingBuffer};
use std::time::Instant;

use crate::audio_engine::analysis::AnalysisTap;
use crate::audio_engine::constants::{
    KNOBS_PER_CHANNEL, REVERB_INITIAL_DECAY, REVERB_INITIAL_DURATION_S,
};
use crate::audio_engine::graph::{ReverbShape, SignalGraph};
use crate::audio_engine::mixer::RtMixer;
use crate::audio_engine::scheduler::{ScheduledVoice, TriggerRequest};
use crate::messages::{AudioMessage, ControlMessage, SampleBuffer};

pub use crate::audio_engine::audio_stream::{Renderer, setup_logger};
pub use crate::audio_engine::errors::{EngineError, SampleLoadError};

pub mod analysis;
pub mod audio_stream;
pub mod constants;
pub mod curves;
pub mod effects;
pub mod envelope;
pub mod errors;
pub mod filter;
pub mod frame;
pub mod graph;
pub mod mixer;
pub mod sample_loader;
pub mod scheduler;
pub mod smoothing;
pub mod strip;
pub mod voice;

/// Engine construction settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Frames per callback requested from the device.
    pub buffer_size: u32,
    /// Capacity of the control → audio ring.
    pub control_capacity: usize,
    /// Capacity of the audio → control ring.
    pub event_capacity: usize,
    /// Capacity of the analysis tap ring, in mono samples.
    pub analysis_capacity: usize,
    /// Sample rate used by [`AudioEngine::offline`].
    pub offline_sample_rate: u32,
    /// Output channel count used by [`AudioEngine::offline`].
    pub offline_channels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_size: 512,
            control_capacity: 1024,
            event_capacity: 1024,
            analysis_capacity: 8192,
            offline_sample_rate: 48_000,
            offline_channels: 2,
        }
    }
}

/// Control-side handle to the signal engine.
///
/// Created with [`AudioEngine::initialize`] (live output) or
/// [`AudioEngine::offline`] (caller drives the [`Renderer`]). Dropping it, or
/// calling [`AudioEngine::shut_down`], tears the stream down.
pub struct AudioEngine {
    graph: SignalGraph,
    producer: Producer<ControlMessage>,
    consumer: Consumer<AudioMessage>,
    stream: Option<cpal::Stream>,
    analysis: Option<AnalysisTap>,
    channels: usize,
}

impl AudioEngine {
    /// Opens the default output device and starts rendering.
    pub fn initialize(config: &EngineConfig) -> Result<Self, EngineError> {
        setup_logger();

        let (device, stream_config) = audio_stream::default_output(config.buffer_size)?;
        let (mut engine, renderer) = Self::build(
            config,
            stream_config.sample_rate,
            usize::from(stream_config.channels),
        );

        let stream = audio_stream::start_output_stream(&device, &stream_config, renderer)?;
        engine.stream = Some(stream);
        Ok(engine)
    }

    /// Builds an engine without a device; the caller renders.
    pub fn offline(config: &EngineConfig) -> (Self, Renderer) {
        Self::build(config, config.offline_sample_rate, config.offline_channels)
    }

    fn build(config: &EngineConfig, sample_rate: u32, channels: usize) -> (Self, Renderer) {
        let graph = SignalGraph::new(sample_rate);
        let reverb = graph.build_reverb(ReverbShape {
            duration_s: REVERB_INITIAL_DURATION_S,
            decay: REVERB_INITIAL_DECAY,
        });

        let (producer_in, consumer_in) = RingBuffer::new(config.control_capacity.max(1));
        let (producer_out, consumer_out) = RingBuffer::new(config.event_capacity.max(1));
        let (tap_producer, tap_consumer) = RingBuffer::new(config.analysis_capacity.max(1));

        let mut mixer = RtMixer::new(channels, sample_rate, Box::new(reverb));
        mixer.set_analysis_tap(tap_producer);

        let engine = Self {
            graph,
            producer: producer_in,
            consumer: consumer_out,
            stream: None,
            analysis: Some(AnalysisTap::new(tap_consumer, sample_rate)),
            channels,
        };
        let renderer = Renderer::new(consumer_in, producer_out, mixer, sample_rate);
        (engine, renderer)
    }

    /// Stops and drops the output stream.
    pub fn shut_down(&mut self) {
        if self.stream.take().is_some() {
            log::info!("AudioEngine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.sample_rate()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn graph(&self) -> &SignalGraph {
        &self.graph
    }

    /// Hands out the analysis tap; only the first call returns it.
    pub fn take_analysis_tap(&mut self) -> Option<AnalysisTap> {
        self.analysis.take()
    }

    fn send(&mut self, message: ControlMessage, what: &'static str) -> Result<(), EngineError> {
        self.producer.push(message).map_err(|_| {
            log::warn!("Control queue full, dropping {what}");
            EngineError::QueueFull(what)
        })
    }

    /// Sets parameter `index` of `channel` from a knob value.
    pub fn set_channel_param(
        &mut self,
        channel: usize,
        index: usize,
        value: u8,
    ) -> Result<(), EngineError> {
        if let Some(param) = self.graph.set_channel_param(channel, index, value)? {
            self.send(
                ControlMessage::SetChannelParam { channel, param },
                "channel parameter",
            )?;
        }
        Ok(())
    }

    /// Applies a whole matrix row to `channel`.
    pub fn apply_channel_row(
        &mut self,
        channel: usize,
        values: &[u8; KNOBS_PER_CHANNEL],
    ) -> Result<(), EngineError> {
        for (index, value) in values.iter().enumerate() {
            self.set_channel_param(channel, index, *value)?;
        }
        Ok(())
    }

    /// Sets the global delay time; returns the resulting time in seconds.
    pub fn set_delay(&mut self, value: u8, snap: bool) -> Result<f32, EngineError> {
        let seconds = self.graph.set_delay(value, snap);
        self.send(ControlMessage::SetDelayTime(seconds), "delay time")?;
        Ok(seconds)
    }

    /// Queues a reverb resize; the impulse is rebuilt by [`Self::tick`] once
    /// the debounce window has passed.
    pub fn request_reverb_size(&mut self, value: u8, now: Instant) {
        self.graph.request_reverb_size(value, now);
    }

    /// Performs time-based control work.
    ///
    /// A reverb that cannot be queued stays pending and is rebuilt on the
    /// next tick.
    pub fn tick(&mut self, now: Instant) -> Result<(), EngineError> {
        if let Some((size, shape)) = self.graph.due_reverb(now) {
            let reverb = self.graph.build_reverb(shape);
            log::debug!(
                "Rebuilt reverb: {:.2}s, decay {:.2}, {} partitions",
                shape.duration_s,
                shape.decay,
                reverb.partition_count()
            );
            self.send(ControlMessage::SetReverb(Box::new(reverb)), "reverb")?;
            self.graph.commit_reverb(size);
        }
        Ok(())
    }

    /// Schedules a pad voice. Returns `Ok(None)` when the pad has no sample.
    pub fn trigger(
        &mut self,
        trigger: &TriggerRequest<'_>,
    ) -> Result<Option<ScheduledVoice>, EngineError> {
        let channel = scheduler::channel_for_pad(trigger.pad);
        let pitch_bias = self.graph.pitch_bias(channel);

        let Some((request, scheduled)) = scheduler::schedule(trigger, pitch_bias) else {
            return Ok(None);
        };

        self.send(ControlMessage::PlayVoice(request), "trigger")?;
        Ok(Some(scheduled))
    }

    /// Plays `sample` straight to the master at preview gain.
    pub fn preview(&mut self, sample: &SampleBuffer) -> Result<(), EngineError> {
        self.send(ControlMessage::PlayVoice(scheduler::preview(sample)), "preview")
    }

    /// Send a ping message to the audio thread.
    pub fn ping(&mut self) -> Result<(), EngineError> {
        self.send(ControlMessage::Ping, "ping")
    }

    /// Receive a message from the audio thread.
    pub fn receive_msg(&mut self) -> Option<AudioMessage> {
        self.consumer.pop().ok()
    }
}
