//! MIDI transport and message parsing.
//!
//! [`MidiInputService`] opens every input port `midir` can see and forwards
//! each three-byte message to a handler. Without a transport the host keeps
//! running on keyboard input alone.

use midir::{Ignore, MidiInput, MidiInputConnection};
use thiserror::Error;

const CLIENT_NAME: &str = "pulsepad";

/// Errors raised while opening MIDI inputs.
#[derive(Debug, Error)]
pub enum MidiError {
    /// No MIDI transport or no input ports.
    #[error("no MIDI input devices available")]
    DeviceUnavailable,

    /// The MIDI client could not be created.
    #[error("failed to initialise MIDI: {0}")]
    Init(#[from] midir::InitError),

    /// A port was found but could not be opened.
    #[error("failed to connect to MIDI port {port}: {reason}")]
    Connect { port: String, reason: String },
}

/// Coarse classification of an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    /// Note-on with a non-zero velocity.
    NoteOn,
    /// Note-off, or note-on with velocity 0.
    NoteOff,
    ControlChange,
    Other,
}

/// A normalized `(status, data1, data2)` triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiMessage {
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            status,
            data1,
            data2,
        }
    }

    /// Parses raw bytes; messages shorter than three bytes are dropped.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [status, data1, data2, ..] => Some(Self::new(*status, *data1, *data2)),
            _ => None,
        }
    }

    /// MIDI channel, 0-15.
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    pub fn kind(&self) -> MidiEventKind {
        match self.status & 0xF0 {
            0x90 if self.data2 > 0 => MidiEventKind::NoteOn,
            0x90 | 0x80 => MidiEventKind::NoteOff,
            0xB0 => MidiEventKind::ControlChange,
            _ => MidiEventKind::Other,
        }
    }
}

/// Open connections to every MIDI input port.
///
/// Dropping the service closes all of them.
pub struct MidiInputService {
    connections: Vec<MidiInputConnection<()>>,
    port_names: Vec<String>,
}

impl MidiInputService {
    /// Lists the names of the available input ports.
    pub fn list_ports() -> Result<Vec<String>, MidiError> {
        let midi_in = MidiInput::new(CLIENT_NAME)?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }

    /// Connects to every input port and calls `handler` for each message.
    ///
    /// Ports that fail to open are skipped with a warning; if none open the
    /// error for the last one is returned.
    pub fn connect_all<F>(handler: F) -> Result<Self, MidiError>
    where
        F: FnMut(MidiMessage) + Clone + Send + 'static,
    {
        let port_count = MidiInput::new(CLIENT_NAME)?.port_count();
        if port_count == 0 {
            log::warn!("No MIDI inputs found, keyboard input only");
            return Err(MidiError::DeviceUnavailable);
        }

        let mut service = Self {
            connections: Vec::with_capacity(port_count),
            port_names: Vec::with_capacity(port_count),
        };
        let mut last_error = None;

        for index in 0..port_count {
            match connect_port(index, handler.clone()) {
                Ok((name, connection)) => {
                    log::info!("Connected MIDI input {name}");
                    service.port_names.push(name);
                    service.connections.push(connection);
                }
                Err(err) => {
                    log::warn!("Skipping MIDI input {index}: {err}");
                    last_error = Some(err);
                }
            }
        }

        match (service.connections.is_empty(), last_error) {
            (true, Some(err)) => Err(err),
            (true, None) => Err(MidiError::DeviceUnavailable),
            (false, _) => Ok(service),
        }
    }

    pub fn port_names(&self) -> &[String] {
        &self.port_names
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

fn connect_port<F>(index: usize, mut handler: F) -> Result<(String, MidiInputConnection<()>), MidiError>
where
    F: FnMut(MidiMessage) + Send + 'static,
{
    // Each midir client can hold one connection, so every port gets its own.
    let mut midi_in = MidiInput::new(CLIENT_NAME)?;
    midi_in.ignore(Ignore::Sysex | Ignore::Time);

    let ports = midi_in.ports();
    let port = ports.get(index).ok_or(MidiError::DeviceUnavailable)?;
    let name = midi_in
        .port_name(port)
        .unwrap_or_else(|_| format!("port {index}"));

    let connection = midi_in
        .connect(
            port,
            "pulsepad-input",
            move |_stamp, bytes, _| {
                if let Some(message) = MidiMessage::from_bytes(bytes) {
                    handler(message);
                }
            },
            (),
        )
        .map_err(|err| MidiError::Connect {
            port: name.clone(),
            reason: err.to_string(),
        })?;

    Ok((name, connection))
}
