//! Audio-specific error types.

use thiserror::Error;

/// Errors that can occur while decoding sample data.
///
/// Every variant leaves the pad and library tables untouched; callers report
/// the error and carry on.
#[derive(Debug, Error)]
pub enum SampleLoadError {
    /// Failed to open the audio file.
    #[error("failed to open file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the audio data.
    #[error("failed to decode audio data: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// Audio data has no default track.
    #[error("audio data has no default track")]
    NoDefaultTrack,

    /// Audio data is missing sample rate information.
    #[error("audio data is missing a sample rate")]
    MissingSampleRate,

    /// Audio data is missing channel information.
    #[error("audio data is missing channel information")]
    MissingChannels,

    /// Audio data decoded to zero frames.
    #[error("audio data contains no frames")]
    Empty,

    /// Unsupported channel layout.
    #[error("unsupported channel layout: {file_channels} channels (only mono and stereo supported)")]
    UnsupportedChannels {
        /// Number of channels in the source data.
        file_channels: usize,
    },
}

/// Errors raised by the engine's output stream and control queue.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No output device is present.
    #[error("no audio output device found")]
    DeviceUnavailable,

    /// The device refused to report a default output config.
    #[error("no default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    /// The output stream could not be built.
    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    /// The output stream could not be started.
    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    /// Channel index outside `0..NUM_CHANNELS`.
    #[error("unknown mixer channel {0}")]
    UnknownChannel(usize),

    /// Parameter index outside `0..KNOBS_PER_CHANNEL`.
    #[error("unknown channel parameter {0}")]
    UnknownParam(usize),

    /// The control ring buffer is full.
    #[error("control queue full, dropped {0}")]
    QueueFull(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SampleLoadError::UnsupportedChannels { file_channels: 6 };
        assert_eq!(
            err.to_string(),
            "unsupported channel layout: 6 channels (only mono and stereo supported)"
        );

        let err = EngineError::QueueFull("trigger");
        assert_eq!(err.to_string(), "control queue full, dropped trigger");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SampleLoadError = io.into();
        assert!(matches!(err, SampleLoadError::Io(_)));
    }
}
