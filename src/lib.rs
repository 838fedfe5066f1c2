//! Real-time core of a sample-based drum and mixer instrument.
//!
//! - [`audio_engine`]: signal graph, voices and the cpal output stream
//! - [`input`]: MIDI/keyboard routing and MIDI learn
//! - [`instrument`]: the single-owner store the host talks to

pub mod audio_engine;
pub mod input;
pub mod instrument;
pub mod messages;

pub use audio_engine::{AudioEngine, EngineConfig, EngineError, SampleLoadError, setup_logger};
pub use instrument::{Command, CommandSender, Instrument, InstrumentError, InstrumentEvent};
