//! Pad records and banks.

use crate::audio_engine::constants::{NUM_PADS, PADS_PER_BANK};
use crate::audio_engine::envelope::{Envelope, VelocityMode};
use crate::messages::SampleBuffer;

/// First note of the default chromatic pad layout.
pub const BASE_NOTE: u8 = 36;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Bank {
    #[default]
    A,
    B,
}

impl Bank {
    /// Index of the bank's first pad.
    pub fn offset(self) -> usize {
        match self {
            Bank::A => 0,
            Bank::B => PADS_PER_BANK,
        }
    }

    pub fn of_pad(pad: usize) -> Self {
        if pad < PADS_PER_BANK { Bank::A } else { Bank::B }
    }
}

/// Which MIDI key fires a pad.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TriggerType {
    #[default]
    Note,
    Cc,
}

/// One sample-trigger slot.
///
/// Bindings are only changed through [`Pad::map_note`], [`Pad::map_cc`] and
/// [`Pad::forget_midi`], which keep `note` and `cc` consistent with
/// `trigger_type`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pad {
    id: usize,
    name: String,
    trigger_type: TriggerType,
    note: Option<u8>,
    cc: Option<u8>,
    pub velocity_mode: VelocityMode,
    pub envelope: Envelope,
    sample: Option<SampleBuffer>,
    pub is_triggered: bool,
}

impl Pad {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            name: default_name(id),
            trigger_type: TriggerType::Note,
            note: u8::try_from(id).ok().and_then(|i| BASE_NOTE.checked_add(i)),
            cc: None,
            velocity_mode: VelocityMode::Dynamic,
            envelope: Envelope::default(),
            sample: None,
            is_triggered: false,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger_type(&self) -> TriggerType {
        self.trigger_type
    }

    pub fn note(&self) -> Option<u8> {
        self.note
    }

    pub fn cc(&self) -> Option<u8> {
        self.cc
    }

    pub fn sample(&self) -> Option<&SampleBuffer> {
        self.sample.as_ref()
    }

    /// Mixer channel this pad plays through.
    pub fn channel(&self) -> usize {
        crate::audio_engine::scheduler::channel_for_pad(self.id)
    }

    pub fn bank(&self) -> Bank {
        Bank::of_pad(self.id)
    }

    pub fn responds_to_note(&self, note: u8) -> bool {
        self.trigger_type == TriggerType::Note && self.note == Some(note)
    }

    pub fn responds_to_cc(&self, cc: u8) -> bool {
        self.trigger_type == TriggerType::Cc && self.cc == Some(cc)
    }

    pub fn map_note(&mut self, note: u8) {
        self.trigger_type = TriggerType::Note;
        self.note = Some(note);
        self.cc = None;
    }

    pub fn map_cc(&mut self, cc: u8) {
        self.trigger_type = TriggerType::Cc;
        self.cc = Some(cc);
        self.note = None;
    }

    pub fn forget_midi(&mut self) {
        self.trigger_type = TriggerType::Note;
        self.note = None;
        self.cc = None;
    }

    pub fn assign_sample(&mut self, name: impl Into<String>, sample: SampleBuffer) {
        self.name = name.into();
        self.sample = Some(sample);
    }

    pub fn clear_sample(&mut self) {
        self.name = default_name(self.id);
        self.sample = None;
    }
}

fn default_name(id: usize) -> String {
    format!("Pad {}", id + 1)
}

/// The 16 pads in their default layout.
pub fn default_pads() -> Vec<Pad> {
    (0..NUM_PADS).map(Pad::new).collect()
}
