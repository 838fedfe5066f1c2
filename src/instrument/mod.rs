//! The instrument store.
//!
//! [`Instrument`] is the single owner of every table the performer can
//! change: pads, knobs, the channel matrix, the sample library and the
//! selections. All mutation happens through `&mut self`, either directly or
//! by draining [`Command`]s that other threads (MIDI callbacks, sample
//! decoders) post through a [`CommandSender`]. Readers get an
//! [`InstrumentSnapshot`].

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::audio_engine::constants::{
    KNOBS_PER_CHANNEL, MIDI_MAX, NUM_CHANNELS, NUM_PADS, TRIGGER_FLASH_MS,
};
use crate::audio_engine::envelope::{EnvelopePatch, VelocityMode};
use crate::audio_engine::sample_loader::decode_audio_bytes;
use crate::audio_engine::scheduler::{ScheduledVoice, TriggerRequest};
use crate::audio_engine::{AudioEngine, EngineError, SampleLoadError};
use crate::input::keyboard::KeyEvent;
use crate::input::midi::{MidiError, MidiInputService, MidiMessage};
use crate::input::{DebugRecord, InputMode, InputRouter, LearnTarget, RoutedAction, RoutingTable};
use crate::messages::{AudioMessage, SampleBuffer};

pub mod knob;
pub mod library;
pub mod loader;
pub mod pad;

use knob::{ChannelMatrix, Knob, default_knobs};
use library::{LibrarySample, LibrarySampleId, SampleLibrary};
use loader::{LoadTarget, spawn_decode};
use pad::{Bank, Pad, default_pads};

/// Delay knob value applied at start-up.
const INITIAL_DELAY_VALUE: u8 = 40;

/// Reverb size applied at start-up.
const INITIAL_REVERB_SIZE: u8 = 64;

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("unknown pad {0}")]
    UnknownPad(usize),

    #[error("unknown knob {0}")]
    UnknownKnob(usize),

    #[error("unknown mixer channel {0}")]
    UnknownChannel(usize),

    #[error("unknown library sample {0}")]
    UnknownLibrarySample(LibrarySampleId),

    #[error(transparent)]
    Load(#[from] SampleLoadError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Midi(#[from] MidiError),
}

/// Work submitted from other threads, applied in arrival order.
#[derive(Debug)]
pub enum Command {
    Midi(MidiMessage),
    Key(KeyEvent),
    TriggerPad {
        pad: usize,
        velocity: u8,
    },
    SetKnob {
        channel: usize,
        knob: usize,
        value: u8,
    },
    /// Result of a background decode.
    SampleDecoded {
        target: LoadTarget,
        name: String,
        result: Result<SampleBuffer, SampleLoadError>,
    },
}

/// Cloneable handle for posting [`Command`]s to an [`Instrument`].
#[derive(Debug, Clone)]
pub struct CommandSender(Sender<Command>);

impl CommandSender {
    /// Returns false once the instrument has been dropped.
    pub fn send(&self, command: Command) -> bool {
        self.0.send(command).is_ok()
    }
}

/// Notifications for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentEvent {
    PadFlash {
        pad: usize,
        lit: bool,
    },
    Debug(DebugRecord),
    SampleLoaded {
        target: LoadTarget,
        name: String,
    },
    SampleLoadFailed {
        target: LoadTarget,
        name: String,
        reason: String,
    },
    LearnChanged(InputMode),
}

/// Immutable copy of the instrument state for display.
#[derive(Debug, Clone)]
pub struct InstrumentSnapshot {
    pub pads: Vec<Pad>,
    pub knobs: [Knob; KNOBS_PER_CHANNEL],
    pub matrix: ChannelMatrix,
    pub library: Vec<LibrarySample>,
    pub selected_channel: usize,
    pub selected_bank: Bank,
    pub selected_pad: usize,
    pub delay_value: u8,
    pub delay_snap: bool,
    pub delay_time_s: f32,
    pub reverb_size: u8,
    pub input_mode: InputMode,
}

/// Tables the input router resolves against.
#[derive(Debug)]
struct InstrumentState {
    pads: Vec<Pad>,
    knobs: [Knob; KNOBS_PER_CHANNEL],
    matrix: ChannelMatrix,
    library: SampleLibrary,
    selected_channel: usize,
    selected_bank: Bank,
    selected_pad: usize,
    delay_value: u8,
    delay_snap: bool,
    reverb_size: u8,
}

impl Default for InstrumentState {
    fn default() -> Self {
        Self {
            pads: default_pads(),
            knobs: default_knobs(),
            matrix: ChannelMatrix::default(),
            library: SampleLibrary::new(),
            selected_channel: 0,
            selected_bank: Bank::A,
            selected_pad: 0,
            delay_value: INITIAL_DELAY_VALUE,
            delay_snap: true,
            reverb_size: INITIAL_REVERB_SIZE,
        }
    }
}

impl RoutingTable for InstrumentState {
    fn pad_for_note(&self, note: u8) -> Option<usize> {
        self.pads.iter().position(|pad| pad.responds_to_note(note))
    }

    fn pad_for_cc(&self, cc: u8) -> Option<usize> {
        self.pads.iter().position(|pad| pad.responds_to_cc(cc))
    }

    fn knob_for_cc(&self, cc: u8) -> Option<usize> {
        self.knobs.iter().position(|knob| knob.cc == Some(cc))
    }

    fn bank_offset(&self) -> usize {
        self.selected_bank.offset()
    }

    fn selected_channel(&self) -> usize {
        self.selected_channel
    }
}

pub struct Instrument {
    engine: AudioEngine,
    state: InstrumentState,
    router: InputRouter,
    commands: Receiver<Command>,
    sender: CommandSender,
    events: Sender<InstrumentEvent>,
    flash_until: [Option<Instant>; NUM_PADS],
}

impl Instrument {
    /// Takes ownership of `engine` and pushes the default state into it.
    ///
    /// Returns the instrument and the receiving end of its event stream.
    pub fn new(engine: AudioEngine) -> Result<(Self, Receiver<InstrumentEvent>), InstrumentError> {
        let (command_tx, commands) = mpsc::channel();
        let (events, event_rx) = mpsc::channel();

        let mut instrument = Self {
            engine,
            state: InstrumentState::default(),
            router: InputRouter::new(),
            commands,
            sender: CommandSender(command_tx),
            events,
            flash_until: [None; NUM_PADS],
        };

        for (channel, row) in instrument.state.matrix.rows().iter().enumerate() {
            instrument.engine.apply_channel_row(channel, row)?;
        }
        instrument
            .engine
            .set_delay(instrument.state.delay_value, instrument.state.delay_snap)?;
        instrument
            .engine
            .request_reverb_size(instrument.state.reverb_size, Instant::now());

        log::info!("Instrument ready: {} pads, {} channels", NUM_PADS, NUM_CHANNELS);
        Ok((instrument, event_rx))
    }

    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AudioEngine {
        &mut self.engine
    }

    /// Stops the audio stream; the tables stay intact.
    pub fn shut_down(&mut self) {
        self.engine.shut_down();
    }

    pub fn snapshot(&self) -> InstrumentSnapshot {
        let state = &self.state;
        InstrumentSnapshot {
            pads: state.pads.clone(),
            knobs: state.knobs,
            matrix: state.matrix.clone(),
            library: state.library.iter().cloned().collect(),
            selected_channel: state.selected_channel,
            selected_bank: state.selected_bank,
            selected_pad: state.selected_pad,
            delay_value: state.delay_value,
            delay_snap: state.delay_snap,
            delay_time_s: self.engine.graph().delay_time_s(),
            reverb_size: state.reverb_size,
            input_mode: self.router.mode(),
        }
    }

    /// Opens every MIDI input and forwards its messages as [`Command::Midi`].
    ///
    /// Keep the returned service alive for as long as input is wanted.
    pub fn connect_midi(&self) -> Result<MidiInputService, InstrumentError> {
        let sender = self.sender();
        let service = MidiInputService::connect_all(move |message| {
            sender.send(Command::Midi(message));
        })?;
        Ok(service)
    }

    // Pads

    /// Flashes the pad and plays its sample, if it has one.
    pub fn trigger_pad(
        &mut self,
        pad: usize,
        velocity: u8,
    ) -> Result<Option<ScheduledVoice>, InstrumentError> {
        self.trigger_pad_at(pad, velocity, Instant::now())
    }

    fn trigger_pad_at(
        &mut self,
        pad: usize,
        velocity: u8,
        now: Instant,
    ) -> Result<Option<ScheduledVoice>, InstrumentError> {
        let record = self.state.pads.get_mut(pad).ok_or(InstrumentError::UnknownPad(pad))?;
        record.is_triggered = true;
        self.flash_until[pad] = Some(now + Duration::from_millis(TRIGGER_FLASH_MS));
        self.emit(InstrumentEvent::PadFlash { pad, lit: true });

        let record = &self.state.pads[pad];
        let scheduled = self.engine.trigger(&TriggerRequest {
            pad,
            velocity,
            velocity_mode: record.velocity_mode,
            envelope: &record.envelope,
            sample: record.sample(),
        })?;
        Ok(scheduled)
    }

    pub fn select_pad(&mut self, pad: usize) -> Result<(), InstrumentError> {
        self.pad(pad)?;
        self.state.selected_pad = pad;
        Ok(())
    }

    pub fn select_bank(&mut self, bank: Bank) {
        self.state.selected_bank = bank;
    }

    /// Installs an already decoded buffer on a pad, naming the pad after it.
    pub fn set_pad_sample(
        &mut self,
        pad: usize,
        name: impl Into<String>,
        buffer: SampleBuffer,
    ) -> Result<(), InstrumentError> {
        let name = name.into();
        self.pad_mut(pad)?.assign_sample(name.clone(), buffer);
        self.emit(InstrumentEvent::SampleLoaded {
            target: LoadTarget::Pad(pad),
            name,
        });
        Ok(())
    }

    /// Decodes `bytes` and installs the result on `pad`.
    ///
    /// On a decode error the pad is left as it was.
    pub fn load_sample(&mut self, pad: usize, name: &str, bytes: Vec<u8>) -> Result<(), InstrumentError> {
        self.pad(pad)?;
        let buffer = decode_audio_bytes(bytes, extension(name))?;
        self.set_pad_sample(pad, name, buffer)
    }

    /// Decodes `path` in the background; the result is applied by
    /// [`Self::process_pending`].
    pub fn load_sample_file(&self, pad: usize, path: impl Into<PathBuf>) -> Result<JoinHandle<()>, InstrumentError> {
        self.pad(pad)?;
        Ok(spawn_decode(path.into(), LoadTarget::Pad(pad), self.sender()))
    }

    pub fn remove_pad_sample(&mut self, pad: usize) -> Result<(), InstrumentError> {
        self.pad_mut(pad)?.clear_sample();
        Ok(())
    }

    pub fn update_pad_envelope(&mut self, pad: usize, patch: EnvelopePatch) -> Result<(), InstrumentError> {
        self.pad_mut(pad)?.envelope.patch(patch);
        Ok(())
    }

    pub fn set_velocity_mode(&mut self, pad: usize, mode: VelocityMode) -> Result<(), InstrumentError> {
        self.pad_mut(pad)?.velocity_mode = mode;
        Ok(())
    }

    pub fn forget_pad_midi(&mut self, pad: usize) -> Result<(), InstrumentError> {
        self.pad_mut(pad)?.forget_midi();
        Ok(())
    }

    // Knobs and channels

    /// Stores a knob value for `channel` and forwards it to the engine.
    pub fn set_knob(&mut self, channel: usize, knob: usize, value: u8) -> Result<(), InstrumentError> {
        if channel >= NUM_CHANNELS {
            return Err(InstrumentError::UnknownChannel(channel));
        }
        if !self.state.matrix.set(channel, knob, value) {
            return Err(InstrumentError::UnknownKnob(knob));
        }
        if channel == self.state.selected_channel {
            self.state.knobs[knob].value = value.min(MIDI_MAX);
        }
        self.engine.set_channel_param(channel, knob, value)?;
        Ok(())
    }

    /// Makes `channel` the one the knobs edit and re-applies its row.
    pub fn select_channel(&mut self, channel: usize) -> Result<(), InstrumentError> {
        let row = *self
            .state
            .matrix
            .row(channel)
            .ok_or(InstrumentError::UnknownChannel(channel))?;

        self.state.selected_channel = channel;
        for (knob, value) in self.state.knobs.iter_mut().zip(row) {
            knob.value = value;
        }
        self.engine.apply_channel_row(channel, &row)?;
        log::debug!("Selected channel {}", channel + 1);
        Ok(())
    }

    /// Restores a knob's default on the selected channel.
    pub fn reset_knob(&mut self, knob: usize) -> Result<(), InstrumentError> {
        let default = self
            .state
            .knobs
            .get(knob)
            .ok_or(InstrumentError::UnknownKnob(knob))?
            .default_value();
        self.set_knob(self.state.selected_channel, knob, default)
    }

    pub fn forget_knob_midi(&mut self, knob: usize) -> Result<(), InstrumentError> {
        self.state
            .knobs
            .get_mut(knob)
            .ok_or(InstrumentError::UnknownKnob(knob))?
            .cc = None;
        Ok(())
    }

    // Global effects

    /// Returns the resulting delay time in seconds.
    pub fn set_delay_time(&mut self, value: u8) -> Result<f32, InstrumentError> {
        self.state.delay_value = value;
        Ok(self.engine.set_delay(value, self.state.delay_snap)?)
    }

    /// Re-quantizes the current delay value.
    pub fn set_delay_snap(&mut self, snap: bool) -> Result<f32, InstrumentError> {
        self.state.delay_snap = snap;
        Ok(self.engine.set_delay(self.state.delay_value, snap)?)
    }

    /// The impulse is rebuilt on a later [`Self::tick`].
    pub fn set_reverb_size(&mut self, value: u8) {
        self.set_reverb_size_at(value, Instant::now());
    }

    fn set_reverb_size_at(&mut self, value: u8, now: Instant) {
        self.state.reverb_size = value;
        self.engine.request_reverb_size(value, now);
    }

    // Library

    pub fn add_library_sample(&mut self, name: impl Into<String>, buffer: SampleBuffer) -> LibrarySampleId {
        let name = name.into();
        let id = self.state.library.add(name.clone(), buffer);
        self.emit(InstrumentEvent::SampleLoaded {
            target: LoadTarget::Library,
            name,
        });
        id
    }

    pub fn import_library_sample(&mut self, name: &str, bytes: Vec<u8>) -> Result<LibrarySampleId, InstrumentError> {
        let buffer = decode_audio_bytes(bytes, extension(name))?;
        Ok(self.add_library_sample(name, buffer))
    }

    pub fn import_library_file(&self, path: impl Into<PathBuf>) -> JoinHandle<()> {
        spawn_decode(path.into(), LoadTarget::Library, self.sender())
    }

    /// Shares the library buffer with `pad`.
    pub fn assign_library_sample_to_pad(&mut self, pad: usize, id: LibrarySampleId) -> Result<(), InstrumentError> {
        self.pad(pad)?;
        let sample = self.library_sample(id)?;
        let (name, buffer) = (sample.name.clone(), sample.buffer.clone());
        self.set_pad_sample(pad, name, buffer)
    }

    pub fn remove_library_sample(&mut self, id: LibrarySampleId) -> Result<LibrarySample, InstrumentError> {
        self.state
            .library
            .remove(id)
            .ok_or(InstrumentError::UnknownLibrarySample(id))
    }

    /// Plays a library sample straight to the master bus.
    pub fn preview_library_sample(&mut self, id: LibrarySampleId) -> Result<(), InstrumentError> {
        let buffer = self.library_sample(id)?.buffer.clone();
        self.engine.preview(&buffer)?;
        Ok(())
    }

    // Learn mode

    pub fn enter_learn_mode(&mut self) {
        self.router.enter_learn();
        self.emit(InstrumentEvent::LearnChanged(self.router.mode()));
    }

    pub fn exit_learn_mode(&mut self) {
        self.router.exit_learn();
        self.emit(InstrumentEvent::LearnChanged(self.router.mode()));
    }

    /// Returns false when not in learn mode.
    pub fn set_learn_target(&mut self, target: Option<LearnTarget>) -> Result<bool, InstrumentError> {
        match target {
            Some(LearnTarget::Pad(pad)) => {
                self.pad(pad)?;
            }
            Some(LearnTarget::Knob(knob)) if knob >= KNOBS_PER_CHANNEL => {
                return Err(InstrumentError::UnknownKnob(knob));
            }
            _ => {}
        }

        let set = self.router.set_learn_target(target);
        if set {
            self.emit(InstrumentEvent::LearnChanged(self.router.mode()));
        }
        Ok(set)
    }

    // Input

    pub fn handle_midi(&mut self, message: MidiMessage) -> DebugRecord {
        self.handle_midi_at(message, Instant::now())
    }

    fn handle_midi_at(&mut self, message: MidiMessage, now: Instant) -> DebugRecord {
        let record = self.router.route_midi(message, &self.state);
        self.apply(record, now)
    }

    pub fn handle_key(&mut self, event: KeyEvent) -> DebugRecord {
        self.handle_key_at(event, Instant::now())
    }

    fn handle_key_at(&mut self, event: KeyEvent, now: Instant) -> DebugRecord {
        let record = self.router.route_key(event, &self.state);
        self.apply(record, now)
    }

    fn apply(&mut self, record: DebugRecord, now: Instant) -> DebugRecord {
        log::debug!("{record}");
        let result = match record.action {
            RoutedAction::TriggerPad { pad, velocity } => {
                self.trigger_pad_at(pad, velocity, now).map(|_| ())
            }
            RoutedAction::SetKnob {
                channel,
                knob,
                value,
            } => self.set_knob(channel, knob, value),
            RoutedAction::SelectChannel(channel) => self.select_channel(channel),
            RoutedAction::MapPadNote { pad, note } => self.pad_mut(pad).map(|p| p.map_note(note)),
            RoutedAction::MapPadCc { pad, cc } => self.pad_mut(pad).map(|p| p.map_cc(cc)),
            RoutedAction::MapKnob { knob, cc } => match self.state.knobs.get_mut(knob) {
                Some(entry) => {
                    entry.cc = Some(cc);
                    Ok(())
                }
                None => Err(InstrumentError::UnknownKnob(knob)),
            },
            RoutedAction::Ignored(_) => Ok(()),
        };

        if let Err(err) = result {
            log::warn!("Failed to apply {}: {err}", record.action);
        }
        if matches!(
            record.action,
            RoutedAction::MapPadNote { .. } | RoutedAction::MapPadCc { .. } | RoutedAction::MapKnob { .. }
        ) {
            self.emit(InstrumentEvent::LearnChanged(self.router.mode()));
        }

        self.emit(InstrumentEvent::Debug(record));
        record
    }

    /// Applies every queued [`Command`]; returns how many were handled.
    pub fn process_pending(&mut self, now: Instant) -> usize {
        let mut handled = 0;
        while let Ok(command) = self.commands.try_recv() {
            self.execute(command, now);
            handled += 1;
        }
        handled
    }

    fn execute(&mut self, command: Command, now: Instant) {
        let result = match command {
            Command::Midi(message) => {
                self.handle_midi_at(message, now);
                Ok(())
            }
            Command::Key(event) => {
                self.handle_key_at(event, now);
                Ok(())
            }
            Command::TriggerPad { pad, velocity } => self.trigger_pad_at(pad, velocity, now).map(|_| ()),
            Command::SetKnob {
                channel,
                knob,
                value,
            } => self.set_knob(channel, knob, value),
            Command::SampleDecoded {
                target,
                name,
                result,
            } => {
                self.finish_load(target, name, result);
                Ok(())
            }
        };

        if let Err(err) = result {
            log::warn!("Command failed: {err}");
        }
    }

    fn finish_load(&mut self, target: LoadTarget, name: String, result: Result<SampleBuffer, SampleLoadError>) {
        let buffer = match result {
            Ok(buffer) => buffer,
            Err(err) => {
                log::warn!("Failed to load {name}: {err}");
                self.emit(InstrumentEvent::SampleLoadFailed {
                    target,
                    name,
                    reason: err.to_string(),
                });
                return;
            }
        };

        match target {
            LoadTarget::Pad(pad) => {
                if let Err(err) = self.set_pad_sample(pad, name, buffer) {
                    log::warn!("Dropping decoded sample: {err}");
                }
            }
            LoadTarget::Library => {
                self.add_library_sample(name, buffer);
            }
        }
    }

    /// Time-based work: expiring pad flashes, rebuilding a debounced reverb
    /// and draining engine messages.
    pub fn tick(&mut self, now: Instant) -> Result<(), InstrumentError> {
        for pad in 0..NUM_PADS {
            if self.flash_until[pad].is_some_and(|until| now >= until) {
                self.flash_until[pad] = None;
                self.state.pads[pad].is_triggered = false;
                self.emit(InstrumentEvent::PadFlash { pad, lit: false });
            }
        }

        // Engine messages are drained even when the reverb could not be queued.
        let ticked = self.engine.tick(now);

        while let Some(message) = self.engine.receive_msg() {
            match message {
                AudioMessage::Pong => log::debug!("Audio thread alive"),
                AudioMessage::MasterPeak { peak } => log::trace!("Master peak {peak:.3}"),
                AudioMessage::VoiceDropped { pad } => {
                    log::warn!("Voice pool full, dropped voice for pad {pad:?}");
                }
                AudioMessage::RetiredReverb(reverb) => {
                    log::debug!("Retired reverb with {} partitions", reverb.partition_count());
                }
            }
        }
        Ok(ticked?)
    }

    fn pad(&self, pad: usize) -> Result<&Pad, InstrumentError> {
        self.state.pads.get(pad).ok_or(InstrumentError::UnknownPad(pad))
    }

    fn pad_mut(&mut self, pad: usize) -> Result<&mut Pad, InstrumentError> {
        self.state.pads.get_mut(pad).ok_or(InstrumentError::UnknownPad(pad))
    }

    fn library_sample(&self, id: LibrarySampleId) -> Result<&LibrarySample, InstrumentError> {
        self.state
            .library
            .get(id)
            .ok_or(InstrumentError::UnknownLibrarySample(id))
    }

    fn emit(&self, event: InstrumentEvent) {
        // The host may not listen.
        let _ = self.events.send(event);
    }
}

fn extension(name: &str) -> Option<&str> {
    Path::new(name).extension().and_then(|ext| ext.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::audio_stream::Renderer;
    use crate::audio_engine::envelope::Envelope;
    use crate::audio_engine::sample_loader::tests::pcm16_wav;
    use crate::audio_engine::EngineConfig;
    use crate::input::IgnoreReason;

    fn instrument() -> (Instrument, Receiver<InstrumentEvent>, Renderer) {
        let config = EngineConfig {
            offline_sample_rate: 8_000,
            ..EngineConfig::default()
        };
        let (engine, renderer) = AudioEngine::offline(&config);
        let (instrument, events) = Instrument::new(engine).unwrap();
        (instrument, events, renderer)
    }

    fn buffer() -> SampleBuffer {
        SampleBuffer::new(2, 8_000, vec![0.2; 8_000])
    }

    fn drain(events: &Receiver<InstrumentEvent>) -> Vec<InstrumentEvent> {
        events.try_iter().collect()
    }

    #[test]
    fn test_startup_syncs_defaults() {
        let (instrument, _events, _renderer) = instrument();
        let snapshot = instrument.snapshot();
        assert_eq!(snapshot.delay_value, 40);
        assert!(snapshot.delay_snap);
        assert_eq!(snapshot.delay_time_s, 0.25);
        assert_eq!(snapshot.reverb_size, 64);
        assert!(instrument.engine().graph().has_pending_reverb());
        assert_eq!(snapshot.input_mode, InputMode::Play);
    }

    #[test]
    fn test_note_on_triggers_mapped_pad() {
        let (mut instrument, events, mut renderer) = instrument();
        instrument.set_pad_sample(0, "kick.wav", buffer()).unwrap();
        drain(&events);

        let record = instrument.handle_midi(MidiMessage::new(0x90, 36, 90));
        assert_eq!(record.action, RoutedAction::TriggerPad { pad: 0, velocity: 90 });
        assert_eq!(record.to_string(), "[144, 36, 90] NOTE TRIG PAD 1");

        let mut data = vec![0.0; 64];
        renderer.render(&mut data);
        assert_eq!(renderer.active_voices(), 1);

        let events = drain(&events);
        assert!(events.contains(&InstrumentEvent::PadFlash { pad: 0, lit: true }));
        assert!(events.contains(&InstrumentEvent::Debug(record)));
    }

    #[test]
    fn test_trigger_reports_channel_and_velocity() {
        let (mut instrument, _events, _renderer) = instrument();
        instrument.set_pad_sample(9, "hat.wav", buffer()).unwrap();

        let voice = instrument.trigger_pad(9, 90).unwrap().unwrap();
        assert_eq!(voice.channel, 1);
        assert_eq!(voice.velocity, 90);
    }

    #[test]
    fn test_max_velocity_mode_overrides_input() {
        let (mut instrument, _events, _renderer) = instrument();
        instrument.set_pad_sample(2, "snare.wav", buffer()).unwrap();
        instrument.set_velocity_mode(2, VelocityMode::Max).unwrap();

        let voice = instrument.trigger_pad(2, 10).unwrap().unwrap();
        assert_eq!(voice.velocity, 127);
    }

    #[test]
    fn test_empty_pad_flashes_without_voice() {
        let (mut instrument, events, _renderer) = instrument();
        let start = Instant::now();

        assert_eq!(instrument.trigger_pad_at(4, 100, start).unwrap(), None);
        assert!(instrument.snapshot().pads[4].is_triggered);

        instrument.tick(start + Duration::from_millis(50)).unwrap();
        assert!(instrument.snapshot().pads[4].is_triggered);

        instrument.tick(start + Duration::from_millis(100)).unwrap();
        assert!(!instrument.snapshot().pads[4].is_triggered);
        let events = drain(&events);
        assert_eq!(
            events,
            vec![
                InstrumentEvent::PadFlash { pad: 4, lit: true },
                InstrumentEvent::PadFlash { pad: 4, lit: false },
            ]
        );
    }

    #[test]
    fn test_unknown_pad_is_an_error() {
        let (mut instrument, _events, _renderer) = instrument();
        assert!(matches!(
            instrument.trigger_pad(16, 100),
            Err(InstrumentError::UnknownPad(16))
        ));
    }

    #[test]
    fn test_cc_knob_sets_cutoff_on_selected_channel() {
        let (mut instrument, _events, _renderer) = instrument();
        instrument.select_channel(3).unwrap();

        let record = instrument.handle_midi(MidiMessage::new(0xB0, 7, 100));
        assert_eq!(
            record.action,
            RoutedAction::SetKnob {
                channel: 3,
                knob: 6,
                value: 100
            }
        );

        let snapshot = instrument.snapshot();
        assert_eq!(snapshot.matrix.get(3, 6), Some(100));
        assert_eq!(snapshot.matrix.get(0, 6), Some(127));
        assert_eq!(snapshot.knobs[6].value, 100);

        let cutoff = instrument.engine().graph().channel_state(3).unwrap().cutoff_hz;
        let expected = 20.0 * 1000f32.powf(100.0 / 127.0);
        assert!((cutoff - expected).abs() < 1.0);
    }

    #[test]
    fn test_shared_cc_low_values_reach_knob() {
        let (mut instrument, _events, _renderer) = instrument();
        instrument.enter_learn_mode();
        instrument.set_learn_target(Some(LearnTarget::Pad(3))).unwrap();
        instrument.handle_midi(MidiMessage::new(0xB0, 7, 10));
        instrument.exit_learn_mode();

        let record = instrument.handle_midi(MidiMessage::new(0xB0, 7, 100));
        assert_eq!(record.action, RoutedAction::TriggerPad { pad: 3, velocity: 127 });
        assert_eq!(instrument.snapshot().matrix.get(0, 6), Some(127));

        let record = instrument.handle_midi(MidiMessage::new(0xB0, 7, 30));
        assert_eq!(
            record.action,
            RoutedAction::SetKnob {
                channel: 0,
                knob: 6,
                value: 30
            }
        );
        assert_eq!(instrument.snapshot().matrix.get(0, 6), Some(30));
        assert_eq!(instrument.snapshot().knobs[6].value, 30);
    }

    #[test]
    fn test_learn_mapping_switches_trigger_type() {
        let (mut instrument, _events, _renderer) = instrument();
        instrument.enter_learn_mode();

        instrument.set_learn_target(Some(LearnTarget::Pad(0))).unwrap();
        instrument.handle_midi(MidiMessage::new(0xB0, 20, 127));
        let pad = &instrument.snapshot().pads[0];
        assert_eq!((pad.note(), pad.cc()), (None, Some(20)));
        assert_eq!(instrument.router.learn_target(), None);

        instrument.set_learn_target(Some(LearnTarget::Pad(0))).unwrap();
        instrument.handle_midi(MidiMessage::new(0x90, 60, 100));
        let pad = &instrument.snapshot().pads[0];
        assert_eq!((pad.note(), pad.cc()), (Some(60), None));

        instrument.set_learn_target(Some(LearnTarget::Knob(2))).unwrap();
        instrument.handle_midi(MidiMessage::new(0xB0, 21, 5));
        assert_eq!(instrument.snapshot().knobs[2].cc, Some(21));
        assert!(instrument.router.is_learning());
    }

    #[test]
    fn test_learn_without_target_changes_nothing() {
        let (mut instrument, events, _renderer) = instrument();
        instrument.set_pad_sample(0, "kick.wav", buffer()).unwrap();
        instrument.enter_learn_mode();
        let before = instrument.snapshot();
        drain(&events);

        for message in [
            MidiMessage::new(0x90, 36, 100),
            MidiMessage::new(0xB0, 1, 64),
            MidiMessage::new(0x80, 36, 0),
        ] {
            let record = instrument.handle_midi(message);
            assert_eq!(record.action, RoutedAction::Ignored(IgnoreReason::NoLearnTarget));
        }

        let after = instrument.snapshot();
        assert_eq!(before.pads, after.pads);
        assert_eq!(before.knobs, after.knobs);
        assert_eq!(before.matrix, after.matrix);
        assert!(
            drain(&events)
                .iter()
                .all(|event| matches!(event, InstrumentEvent::Debug(_)))
        );
    }

    #[test]
    fn test_learn_target_needs_learn_mode() {
        let (mut instrument, _events, _renderer) = instrument();
        assert!(!instrument.set_learn_target(Some(LearnTarget::Pad(1))).unwrap());
        assert!(matches!(
            instrument.set_learn_target(Some(LearnTarget::Knob(8))),
            Err(InstrumentError::UnknownKnob(8))
        ));
    }

    #[test]
    fn test_keyboard_uses_selected_bank() {
        let (mut instrument, _events, _renderer) = instrument();
        instrument.select_bank(Bank::B);

        let record = instrument.handle_key(KeyEvent::new('S', false));
        assert_eq!(record.action, RoutedAction::TriggerPad { pad: 9, velocity: 127 });

        instrument.handle_key(KeyEvent::new('3', false));
        assert_eq!(instrument.snapshot().selected_channel, 2);
    }

    #[test]
    fn test_select_channel_mirrors_row() {
        let (mut instrument, _events, _renderer) = instrument();
        instrument.set_knob(5, 0, 12).unwrap();
        assert_eq!(instrument.snapshot().knobs[0].value, 100);

        instrument.select_channel(5).unwrap();
        assert_eq!(instrument.snapshot().knobs[0].value, 12);

        instrument.reset_knob(0).unwrap();
        assert_eq!(instrument.snapshot().matrix.get(5, 0), Some(100));
        assert!(matches!(
            instrument.select_channel(8),
            Err(InstrumentError::UnknownChannel(8))
        ));
    }

    #[test]
    fn test_knob_values_round_trip() {
        let (mut instrument, _events, _renderer) = instrument();
        for value in [0, 1, 63, 64, 126, 127] {
            for knob in 0..KNOBS_PER_CHANNEL {
                instrument.set_knob(0, knob, value).unwrap();
                assert_eq!(instrument.snapshot().knobs[knob].value, value);
                assert_eq!(instrument.snapshot().matrix.get(0, knob), Some(value));
            }
        }
    }

    #[test]
    fn test_delay_snap_values() {
        let (mut instrument, _events, _renderer) = instrument();
        assert_eq!(instrument.set_delay_time(0).unwrap(), 0.0625);
        assert_eq!(instrument.set_delay_time(127).unwrap(), 2.0);

        instrument.set_delay_time(0).unwrap();
        assert_eq!(instrument.set_delay_snap(false).unwrap(), 0.001);
    }

    #[test]
    fn test_reverb_rebuild_is_debounced() {
        let (mut instrument, _events, _renderer) = instrument();
        let start = Instant::now();
        instrument.set_reverb_size_at(10, start);
        instrument.set_reverb_size_at(90, start + Duration::from_millis(20));

        instrument.tick(start + Duration::from_millis(40)).unwrap();
        assert!(instrument.engine().graph().has_pending_reverb());

        instrument.tick(start + Duration::from_millis(80)).unwrap();
        assert!(!instrument.engine().graph().has_pending_reverb());
        assert_eq!(instrument.engine().graph().reverb_size(), 90);
    }

    #[test]
    fn test_tick_drains_events_when_reverb_queue_is_full() {
        let config = EngineConfig {
            offline_sample_rate: 8_000,
            control_capacity: 64,
            ..EngineConfig::default()
        };
        let (engine, mut renderer) = AudioEngine::offline(&config);
        let (mut instrument, _events) = Instrument::new(engine).unwrap();
        let start = Instant::now();

        let mut data = vec![0.0; 16];
        renderer.render(&mut data);
        instrument.engine_mut().ping().unwrap();
        renderer.render(&mut data);
        while instrument.set_knob(0, 0, 50).is_ok() {}

        let result = instrument.tick(start + Duration::from_millis(100));
        assert!(matches!(
            result,
            Err(InstrumentError::Engine(EngineError::QueueFull("reverb")))
        ));
        assert!(instrument.engine_mut().receive_msg().is_none());
        assert!(instrument.engine().graph().has_pending_reverb());

        renderer.render(&mut data);
        instrument.tick(start + Duration::from_millis(110)).unwrap();
        assert!(!instrument.engine().graph().has_pending_reverb());
        assert_eq!(instrument.engine().graph().reverb_size(), 64);
    }

    #[test]
    fn test_envelope_patch_is_clamped() {
        let (mut instrument, _events, _renderer) = instrument();
        instrument
            .update_pad_envelope(
                1,
                EnvelopePatch {
                    attack: Some(9.0),
                    sustain: Some(0.5),
                    ..EnvelopePatch::default()
                },
            )
            .unwrap();

        let envelope = instrument.snapshot().pads[1].envelope;
        assert_eq!(envelope.attack, 2.0);
        assert_eq!(envelope.sustain, 0.5);
        assert_eq!(envelope.release, Envelope::default().release);
    }

    #[test]
    fn test_decode_error_leaves_pad_unchanged() {
        let (mut instrument, events, _renderer) = instrument();
        drain(&events);

        let result = instrument.load_sample(0, "junk.wav", vec![1, 2, 3, 4]);
        assert!(matches!(result, Err(InstrumentError::Load(_))));

        let pad = &instrument.snapshot().pads[0];
        assert_eq!(pad.name(), "Pad 1");
        assert!(pad.sample().is_none());
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn test_load_sample_from_bytes() {
        let (mut instrument, _events, _renderer) = instrument();
        let wav = pcm16_wav(1, 8_000, &[0, 1000, -1000, 2000]);

        instrument.load_sample(3, "tom.wav", wav).unwrap();
        let pad = &instrument.snapshot().pads[3];
        assert_eq!(pad.name(), "tom.wav");
        assert_eq!(pad.sample().map(SampleBuffer::frames), Some(4));

        instrument.remove_pad_sample(3).unwrap();
        assert_eq!(instrument.snapshot().pads[3].name(), "Pad 4");
    }

    #[test]
    fn test_background_load_applies_on_process() {
        let (mut instrument, events, _renderer) = instrument();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clap.wav");
        std::fs::write(&path, pcm16_wav(2, 8_000, &[0, 0, 500, 500])).unwrap();

        instrument.load_sample_file(5, &path).unwrap().join().unwrap();
        instrument.import_library_file(dir.path().join("missing.wav")).join().unwrap();
        drain(&events);

        assert_eq!(instrument.process_pending(Instant::now()), 2);
        let snapshot = instrument.snapshot();
        assert_eq!(snapshot.pads[5].name(), "clap.wav");
        assert!(snapshot.library.is_empty());

        let events = drain(&events);
        assert!(events.contains(&InstrumentEvent::SampleLoaded {
            target: LoadTarget::Pad(5),
            name: "clap.wav".to_string(),
        }));
        assert!(events.iter().any(|event| matches!(
            event,
            InstrumentEvent::SampleLoadFailed { target: LoadTarget::Library, .. }
        )));
    }

    #[test]
    fn test_library_assignment_shares_buffer() {
        let (mut instrument, _events, mut renderer) = instrument();
        let id = instrument.add_library_sample("ride.wav", buffer());

        instrument.assign_library_sample_to_pad(7, id).unwrap();
        let snapshot = instrument.snapshot();
        let pad_buffer = snapshot.pads[7].sample().unwrap();
        assert!(pad_buffer.shares_data(&snapshot.library[0].buffer));
        assert_eq!(snapshot.pads[7].name(), "ride.wav");

        instrument.preview_library_sample(id).unwrap();
        let mut data = vec![0.0; 16];
        renderer.render(&mut data);
        assert_eq!(renderer.active_voices(), 1);

        instrument.remove_library_sample(id).unwrap();
        assert!(instrument.snapshot().pads[7].sample().is_some());
        assert!(matches!(
            instrument.assign_library_sample_to_pad(7, id),
            Err(InstrumentError::UnknownLibrarySample(_))
        ));
    }

    #[test]
    fn test_forget_midi_unbinds() {
        let (mut instrument, _events, _renderer) = instrument();
        instrument.forget_pad_midi(0).unwrap();
        instrument.forget_knob_midi(0).unwrap();

        let record = instrument.handle_midi(MidiMessage::new(0x90, 36, 100));
        assert_eq!(record.action, RoutedAction::Ignored(IgnoreReason::Unmapped));
        let record = instrument.handle_midi(MidiMessage::new(0xB0, 1, 100));
        assert_eq!(record.action, RoutedAction::Ignored(IgnoreReason::Unmapped));
    }

    #[test]
    fn test_commands_from_other_threads() {
        let (mut instrument, _events, _renderer) = instrument();
        instrument.set_pad_sample(0, "kick.wav", buffer()).unwrap();
        let sender = instrument.sender();

        std::thread::spawn(move || {
            sender.send(Command::Midi(MidiMessage::new(0x90, 36, 64)));
            sender.send(Command::SetKnob {
                channel: 2,
                knob: 1,
                value: 0,
            });
        })
        .join()
        .unwrap();

        assert_eq!(instrument.process_pending(Instant::now()), 2);
        assert_eq!(instrument.snapshot().matrix.get(2, 1), Some(0));
        assert!(instrument.snapshot().pads[0].is_triggered);
    }
}
