//! Input routing and the learn state machine.
//!
//! The router turns MIDI and keyboard events into [`RoutedAction`]s. It
//! only reads the binding tables (through [`RoutingTable`]) and owns the
//! learn mode; applying an action is up to the caller, which keeps every
//! table mutation on the owner's thread.

use std::fmt;

use crate::audio_engine::constants::PADS_PER_BANK;
use crate::audio_engine::graph::ChannelParamKind;

pub mod keyboard;
pub mod midi;

use keyboard::{KeyBinding, KeyEvent, key_binding};
use midi::{MidiEventKind, MidiMessage};

/// Velocity used for CC pad triggers and keyboard triggers.
pub const FULL_VELOCITY: u8 = 127;

/// A CC value above this fires a CC-bound pad.
pub const CC_TRIGGER_THRESHOLD: u8 = 64;

/// Read access to the current bindings and selections.
pub trait RoutingTable {
    /// First pad bound to `note` in note mode.
    fn pad_for_note(&self, note: u8) -> Option<usize>;
    /// First pad bound to `cc` in CC mode.
    fn pad_for_cc(&self, cc: u8) -> Option<usize>;
    /// First knob bound to `cc`.
    fn knob_for_cc(&self, cc: u8) -> Option<usize>;
    /// Pad index of the first pad in the selected bank.
    fn bank_offset(&self) -> usize;
    fn selected_channel(&self) -> usize;
}

/// What the next learned MIDI event gets bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnTarget {
    Pad(usize),
    Knob(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Play,
    Learn {
        target: Option<LearnTarget>,
    },
}

/// Why an event did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Nothing is bound to the event.
    Unmapped,
    /// Learn mode is on but no pad or knob is selected.
    NoLearnTarget,
    /// The event cannot be learned by the selected target.
    LearnMismatch,
    KeyRepeat,
    /// Keyboard input is disabled while learning.
    Learning,
}

/// The resolved outcome of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutedAction {
    TriggerPad { pad: usize, velocity: u8 },
    SetKnob { channel: usize, knob: usize, value: u8 },
    SelectChannel(usize),
    MapPadNote { pad: usize, note: u8 },
    MapPadCc { pad: usize, cc: u8 },
    MapKnob { knob: usize, cc: u8 },
    Ignored(IgnoreReason),
}

impl fmt::Display for RoutedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutedAction::TriggerPad { pad, .. } => write!(f, "TRIG PAD {}", pad + 1),
            RoutedAction::SetKnob { channel, knob, .. } => {
                let label = ChannelParamKind::from_index(*knob).map_or("?", |k| k.label());
                write!(f, "CH{} FX: {label}", channel + 1)
            }
            RoutedAction::SelectChannel(channel) => write!(f, "SELECT CH{}", channel + 1),
            RoutedAction::MapPadNote { pad, .. } | RoutedAction::MapPadCc { pad, .. } => {
                write!(f, "MAPPED PAD {}", pad + 1)
            }
            RoutedAction::MapKnob { knob, .. } => write!(f, "MAPPED KNOB {}", knob + 1),
            RoutedAction::Ignored(_) => f.write_str("IGNORED"),
        }
    }
}

/// How an event was classified before resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Note,
    Cc,
    Key(char),
    Unknown,
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventClass::Note => f.write_str("NOTE"),
            EventClass::Cc => f.write_str("CC"),
            EventClass::Key(key) => write!(f, "KEY {key}"),
            EventClass::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

/// Diagnostic record emitted for every routed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugRecord {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    pub class: EventClass,
    pub action: RoutedAction,
}

impl fmt::Display for DebugRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}] {} {}",
            self.status, self.data1, self.data2, self.class, self.action
        )
    }
}

#[derive(Debug, Default)]
pub struct InputRouter {
    mode: InputMode,
}

impl InputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn is_learning(&self) -> bool {
        matches!(self.mode, InputMode::Learn { .. })
    }

    pub fn learn_target(&self) -> Option<LearnTarget> {
        match self.mode {
            InputMode::Learn { target } => target,
            InputMode::Play => None,
        }
    }

    pub fn enter_learn(&mut self) {
        if !self.is_learning() {
            self.mode = InputMode::Learn { target: None };
        }
    }

    /// Leaves learn mode, dropping any pending target.
    pub fn exit_learn(&mut self) {
        self.mode = InputMode::Play;
    }

    /// Selects what the next learned event binds to. Only honoured in learn
    /// mode; returns whether the target was set.
    pub fn set_learn_target(&mut self, target: Option<LearnTarget>) -> bool {
        match &mut self.mode {
            InputMode::Learn { target: current } => {
                *current = target;
                true
            }
            InputMode::Play => false,
        }
    }

    pub fn route_midi(&mut self, message: MidiMessage, table: &impl RoutingTable) -> DebugRecord {
        let kind = message.kind();
        let mode = self.mode;
        let action = match mode {
            InputMode::Learn { target: None } => RoutedAction::Ignored(IgnoreReason::NoLearnTarget),
            InputMode::Learn {
                target: Some(target),
            } => self.learn(target, kind, message),
            InputMode::Play => play(kind, message, table),
        };

        DebugRecord {
            status: message.status,
            data1: message.data1,
            data2: message.data2,
            class: match kind {
                MidiEventKind::NoteOn => EventClass::Note,
                MidiEventKind::ControlChange => EventClass::Cc,
                MidiEventKind::NoteOff | MidiEventKind::Other => EventClass::Unknown,
            },
            action,
        }
    }

    fn learn(&mut self, target: LearnTarget, kind: MidiEventKind, message: MidiMessage) -> RoutedAction {
        let action = match (target, kind) {
            (LearnTarget::Pad(pad), MidiEventKind::NoteOn) => RoutedAction::MapPadNote {
                pad,
                note: message.data1,
            },
            (LearnTarget::Pad(pad), MidiEventKind::ControlChange) => RoutedAction::MapPadCc {
                pad,
                cc: message.data1,
            },
            (LearnTarget::Knob(knob), MidiEventKind::ControlChange) => RoutedAction::MapKnob {
                knob,
                cc: message.data1,
            },
            _ => return RoutedAction::Ignored(IgnoreReason::LearnMismatch),
        };

        // A completed mapping clears the target; learn mode stays on.
        self.mode = InputMode::Learn { target: None };
        action
    }

    pub fn route_key(&mut self, event: KeyEvent, table: &impl RoutingTable) -> DebugRecord {
        let action = if event.repeat {
            RoutedAction::Ignored(IgnoreReason::KeyRepeat)
        } else if self.is_learning() {
            RoutedAction::Ignored(IgnoreReason::Learning)
        } else {
            match key_binding(event.key) {
                Some(KeyBinding::SelectChannel(channel)) => RoutedAction::SelectChannel(channel),
                Some(KeyBinding::Pad(index)) => RoutedAction::TriggerPad {
                    pad: table.bank_offset() + index.min(PADS_PER_BANK - 1),
                    velocity: FULL_VELOCITY,
                },
                None => RoutedAction::Ignored(IgnoreReason::Unmapped),
            }
        };

        DebugRecord {
            status: 0,
            data1: u8::try_from(u32::from(event.key)).unwrap_or(0),
            data2: 0,
            class: EventClass::Key(event.key),
            action,
        }
    }
}

fn play(kind: MidiEventKind, message: MidiMessage, table: &impl RoutingTable) -> RoutedAction {
    match kind {
        MidiEventKind::NoteOn => match table.pad_for_note(message.data1) {
            Some(pad) => RoutedAction::TriggerPad {
                pad,
                velocity: message.data2,
            },
            None => RoutedAction::Ignored(IgnoreReason::Unmapped),
        },
        MidiEventKind::ControlChange => {
            // A pad only matches a CC above the threshold; anything else
            // goes to the knobs.
            if message.data2 > CC_TRIGGER_THRESHOLD {
                if let Some(pad) = table.pad_for_cc(message.data1) {
                    return RoutedAction::TriggerPad {
                        pad,
                        velocity: FULL_VELOCITY,
                    };
                }
            }

            match table.knob_for_cc(message.data1) {
                Some(knob) => RoutedAction::SetKnob {
                    channel: table.selected_channel(),
                    knob,
                    value: message.data2,
                },
                None => RoutedAction::Ignored(IgnoreReason::Unmapped),
            }
        }
        MidiEventKind::NoteOff | MidiEventKind::Other => RoutedAction::Ignored(IgnoreReason::Unmapped),
    }
}
