//! Audio Stream Module
//!
//! This module handles CPAL audio stream management including:
//! - Logger setup
//! - Output device and stream configuration
//! - The real-time [`Renderer`] that drains control messages and mixes

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Stream, StreamConfig};
use env_logger::{Builder, Env};
use rtrb::{Consumer, Producer};

use crate::audio_engine::errors::EngineError;
use crate::audio_engine::mixer::RtMixer;
use crate::messages::{AudioMessage, ControlMessage};

/// How often the master peak is reported, in reports per second.
const METER_RATE_HZ: u32 = 20;

/// Event slots only a retired reverb may use, so it is never freed in the
/// callback while the host is slow to drain events.
const RESERVED_EVENT_SLOTS: usize = 1;

/// Setup and configure the logger for audio operations
pub fn setup_logger() {
    // Default to `info`; override via `RUST_LOG`, e.g. `RUST_LOG=debug`.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(()); // Ignore initialization errors
}

/// Audio-thread half of the engine.
///
/// Owns the mixer and both ring buffer ends used by the callback. Nothing in
/// here allocates or blocks.
pub struct Renderer {
    consumer: Consumer<ControlMessage>,
    producer: Producer<AudioMessage>,
    mixer: RtMixer,
    meter_every: usize,
    meter_frames: usize,
    meter_peak: f32,
}

impl Renderer {
    pub(crate) fn new(
        consumer: Consumer<ControlMessage>,
        producer: Producer<AudioMessage>,
        mixer: RtMixer,
        sample_rate: u32,
    ) -> Self {
        Self {
            consumer,
            producer,
            mixer,
            meter_every: (sample_rate / METER_RATE_HZ).max(1) as usize,
            meter_frames: 0,
            meter_peak: 0.0,
        }
    }

    pub fn channels(&self) -> usize {
        self.mixer.channels()
    }

    pub fn active_voices(&self) -> usize {
        self.mixer.active_voices()
    }

    /// Applies pending control messages then fills `data` with interleaved
    /// output.
    pub fn render(&mut self, data: &mut [f32]) {
        while let Ok(message) = self.consumer.pop() {
            self.handle(message);
        }

        let peak = self.mixer.render(data);
        self.meter(peak, data.len() / self.mixer.channels().max(1));
    }

    fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Ping => self.notify(AudioMessage::Pong),
            ControlMessage::SetChannelParam { channel, param } => {
                self.mixer.apply_strip(channel, param);
            }
            ControlMessage::SetDelayTime(seconds) => {
                self.mixer.set_delay_time(seconds);
            }
            ControlMessage::SetReverb(reverb) => {
                let retired = self.mixer.set_reverb(reverb);
                let _ = self.producer.push(AudioMessage::RetiredReverb(retired));
            }
            ControlMessage::PlayVoice(request) => {
                let pad = request.pad;
                if !self.mixer.play_voice(request) {
                    self.notify(AudioMessage::VoiceDropped { pad });
                }
            }
        }
    }

    fn meter(&mut self, peak: f32, frames: usize) {
        self.meter_peak = self.meter_peak.max(peak);
        self.meter_frames += frames;
        if self.meter_frames < self.meter_every {
            return;
        }

        self.notify(AudioMessage::MasterPeak {
            peak: self.meter_peak,
        });
        self.meter_frames = 0;
        self.meter_peak = 0.0;
    }

    /// Pushes a status event unless only reserved slots remain.
    fn notify(&mut self, message: AudioMessage) {
        if self.producer.slots() > RESERVED_EVENT_SLOTS {
            let _ = self.producer.push(message);
        }
    }
}

/// Opens the default output device and its preferred configuration.
pub fn default_output(buffer_size: u32) -> Result<(Device, StreamConfig), EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(EngineError::DeviceUnavailable)?;

    let config = device.default_output_config()?;
    let stream_config = StreamConfig {
        channels: config.channels(),
        sample_rate: config.sample_rate(),
        buffer_size: BufferSize::Fixed(buffer_size),
    };

    Ok((device, stream_config))
}

/// Builds the output stream around `renderer` and starts it.
pub fn start_output_stream(
    device: &Device,
    config: &StreamConfig,
    mut renderer: Renderer,
) -> Result<Stream, EngineError> {
    log::info!(
        "Starting AudioEngine... ({} ch@{} Hz)",
        config.channels,
        config.sample_rate
    );

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            renderer.render(data);
        },
        |err| {
            log::error!("Audio stream error: {}", err);
        },
        None,
    )?;

    stream.play()?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use rtrb::RingBuffer;

    use super::*;
    use crate::audio_engine::curves::ImpulseResponse;
    use crate::audio_engine::effects::Convolver;
    use crate::audio_engine::envelope::GainEnvelope;
    use crate::audio_engine::voice::{VoiceRequest, VoiceTarget};
    use crate::messages::SampleBuffer;

    const FS: u32 = 1_000;

    fn renderer() -> (
        Producer<ControlMessage>,
        Consumer<AudioMessage>,
        Renderer,
    ) {
        renderer_with_events(128)
    }

    fn renderer_with_events(
        capacity: usize,
    ) -> (Producer<ControlMessage>, Consumer<AudioMessage>, Renderer) {
        let (control_tx, control_rx) = RingBuffer::new(128);
        let (event_tx, event_rx) = RingBuffer::new(capacity);
        let ir = ImpulseResponse {
            sample_rate: FS,
            left: Vec::new(),
            right: Vec::new(),
        };
        let mixer = RtMixer::new(2, FS, Box::new(Convolver::new(&ir, 16)));
        (control_tx, event_rx, Renderer::new(control_rx, event_tx, mixer, FS))
    }

    fn voice() -> VoiceRequest {
        let sample = SampleBuffer::new(2, FS, vec![0.1; 200]);
        VoiceRequest {
            pad: Some(4),
            target: VoiceTarget::Master,
            gain: GainEnvelope::constant(1.0, sample.duration_s()),
            sample,
            rate: 1.0,
        }
    }

    #[test]
    fn test_logger_setup() {
        // Multiple calls should be safe (though only the first takes effect)
        setup_logger();
        setup_logger();
    }

    #[test]
    fn test_ping_pong() {
        let (mut tx, mut rx, mut renderer) = renderer();
        tx.push(ControlMessage::Ping).unwrap();

        let mut data = vec![0.0; 8];
        renderer.render(&mut data);
        assert!(matches!(rx.pop(), Ok(AudioMessage::Pong)));
    }

    #[test]
    fn test_full_pool_reports_dropped_voice() {
        let (mut tx, mut rx, mut renderer) = renderer();
        for _ in 0..crate::audio_engine::constants::MAX_VOICES + 1 {
            tx.push(ControlMessage::PlayVoice(voice())).unwrap();
        }

        let mut data = vec![0.0; 8];
        renderer.render(&mut data);
        assert!(matches!(
            rx.pop(),
            Ok(AudioMessage::VoiceDropped { pad: Some(4) })
        ));
    }

    #[test]
    fn test_swapped_reverb_is_returned() {
        let (mut tx, mut rx, mut renderer) = renderer();
        let ir = ImpulseResponse {
            sample_rate: FS,
            left: vec![0.5; 64],
            right: vec![0.5; 64],
        };
        tx.push(ControlMessage::SetReverb(Box::new(Convolver::new(&ir, 16))))
            .unwrap();

        let mut data = vec![0.0; 8];
        renderer.render(&mut data);
        match rx.pop() {
            Ok(AudioMessage::RetiredReverb(old)) => assert_eq!(old.partition_count(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_master_peak_is_reported_periodically() {
        let (mut tx, mut rx, mut renderer) = renderer();
        tx.push(ControlMessage::PlayVoice(voice())).unwrap();

        // 50 frames is one meter period at 1 kHz.
        let mut data = vec![0.0; 2 * 50];
        renderer.render(&mut data);
        match rx.pop() {
            Ok(AudioMessage::MasterPeak { peak }) => assert!((peak - 0.09).abs() < 1e-5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_retired_reverb_gets_reserved_slot() {
        let (mut tx, mut rx, mut renderer) = renderer_with_events(2);
        for _ in 0..3 {
            tx.push(ControlMessage::Ping).unwrap();
        }
        let ir = ImpulseResponse {
            sample_rate: FS,
            left: vec![0.5; 16],
            right: vec![0.5; 16],
        };
        tx.push(ControlMessage::SetReverb(Box::new(Convolver::new(&ir, 16))))
            .unwrap();

        let mut data = vec![0.0; 8];
        renderer.render(&mut data);
        assert!(matches!(rx.pop(), Ok(AudioMessage::Pong)));
        assert!(matches!(rx.pop(), Ok(AudioMessage::RetiredReverb(_))));
        assert!(rx.pop().is_err());
    }
}
