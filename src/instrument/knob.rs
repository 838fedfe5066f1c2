//! Knobs and the per-channel parameter matrix.

use crate::audio_engine::constants::{KNOBS_PER_CHANNEL, MIDI_MAX, NUM_CHANNELS};
use crate::audio_engine::graph::ChannelParamKind;

/// One of the eight effect knobs.
///
/// `value` mirrors the selected channel's row of the [`ChannelMatrix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Knob {
    pub id: usize,
    pub cc: Option<u8>,
    pub value: u8,
    pub label: &'static str,
}

impl Knob {
    pub fn kind(&self) -> Option<ChannelParamKind> {
        ChannelParamKind::from_index(self.id)
    }

    pub fn default_value(&self) -> u8 {
        self.kind().map_or(0, ChannelParamKind::default_value)
    }
}

/// Knobs bound to CC 1-8 with their default values.
pub fn default_knobs() -> [Knob; KNOBS_PER_CHANNEL] {
    ChannelParamKind::ALL.map(|kind| Knob {
        id: kind.index(),
        cc: u8::try_from(kind.index() + 1).ok(),
        value: kind.default_value(),
        label: kind.label(),
    })
}

/// Raw knob values for every channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMatrix {
    rows: [[u8; KNOBS_PER_CHANNEL]; NUM_CHANNELS],
}

impl Default for ChannelMatrix {
    fn default() -> Self {
        let defaults = ChannelParamKind::ALL.map(ChannelParamKind::default_value);
        Self {
            rows: [defaults; NUM_CHANNELS],
        }
    }
}

impl ChannelMatrix {
    pub fn get(&self, channel: usize, knob: usize) -> Option<u8> {
        self.rows.get(channel)?.get(knob).copied()
    }

    /// Stores `value` (clamped to 0-127); returns false for an invalid cell.
    pub fn set(&mut self, channel: usize, knob: usize, value: u8) -> bool {
        match self.rows.get_mut(channel).and_then(|row| row.get_mut(knob)) {
            Some(cell) => {
                *cell = value.min(MIDI_MAX);
                true
            }
            None => false,
        }
    }

    pub fn row(&self, channel: usize) -> Option<&[u8; KNOBS_PER_CHANNEL]> {
        self.rows.get(channel)
    }

    pub fn rows(&self) -> &[[u8; KNOBS_PER_CHANNEL]; NUM_CHANNELS] {
        &self.rows
    }
}
