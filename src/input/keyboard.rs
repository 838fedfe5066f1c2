//! Computer keyboard input.

use crate::audio_engine::constants::NUM_CHANNELS;

/// Bank-relative pad index for each mapped key.
pub const KEYBOARD_MAP: [(char, usize); 8] = [
    ('a', 0),
    ('s', 1),
    ('d', 2),
    ('f', 3),
    ('z', 4),
    ('x', 5),
    ('c', 6),
    ('v', 7),
];

/// A key-down event from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Lowercased key character.
    pub key: char,
    /// Set when the OS is auto-repeating a held key.
    pub repeat: bool,
}

impl KeyEvent {
    pub fn new(key: char, repeat: bool) -> Self {
        Self {
            key: key.to_ascii_lowercase(),
            repeat,
        }
    }

    /// Builds an event from a host key name such as `"A"` or `"7"`.
    /// Multi-character names (`"Shift"`, `"Enter"`) produce `None`.
    pub fn from_key_name(name: &str, repeat: bool) -> Option<Self> {
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(key), None) => Some(Self::new(key, repeat)),
            _ => None,
        }
    }
}

/// What a key does in play mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBinding {
    /// Digit keys 1-8 select a mixer channel (0-based here).
    SelectChannel(usize),
    /// Letter keys trigger a pad relative to the current bank.
    Pad(usize),
}

pub fn key_binding(key: char) -> Option<KeyBinding> {
    if let Some(digit) = key.to_digit(10) {
        let digit = digit as usize;
        return (1..=NUM_CHANNELS)
            .contains(&digit)
            .then(|| KeyBinding::SelectChannel(digit - 1));
    }

    let key = key.to_ascii_lowercase();
    KEYBOARD_MAP
        .iter()
        .find(|(mapped, _)| *mapped == key)
        .map(|(_, pad)| KeyBinding::Pad(*pad))
}
