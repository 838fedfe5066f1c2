//! Audio engine configuration constants and limits.

/// Number of pad banks available.
pub const NUM_BANKS: usize = 2;

/// Pads per bank.
pub const PADS_PER_BANK: usize = 8;

/// Total number of pads (pads × banks).
pub const NUM_PADS: usize = PADS_PER_BANK * NUM_BANKS;

/// Number of parallel mixer channel strips.
pub const NUM_CHANNELS: usize = 8;

/// Number of effect knobs per channel strip.
pub const KNOBS_PER_CHANNEL: usize = 8;

/// Maximum number of voices that can be active simultaneously.
pub const MAX_VOICES: usize = 64;

/// Highest value a MIDI data byte (and therefore a knob) can take.
pub const MIDI_MAX: u8 = 127;

/// Number of points in a waveshaper transfer curve.
pub const CURVE_LEN: usize = 44_100;

/// Drive amount at full knob travel.
pub const DRIVE_MAX: f32 = 400.0;

/// Time constant for channel parameter smoothing, in seconds.
pub const PARAM_TIME_CONSTANT_S: f32 = 0.02;

/// Time constant for delay time smoothing, in seconds.
pub const DELAY_TIME_CONSTANT_S: f32 = 0.1;

/// Longest delay the global delay line can hold, in seconds.
pub const DELAY_MAX_S: f32 = 4.0;

/// Delay time used until the first delay setting is applied.
pub const DELAY_INITIAL_S: f32 = 0.33;

/// Feedback gain of the global delay loop.
pub const DELAY_FEEDBACK: f32 = 0.4;

/// Shortest unsnapped delay time.
pub const DELAY_MIN_S: f32 = 0.001;

/// Span of the unsnapped delay range above [`DELAY_MIN_S`].
pub const DELAY_SPAN_S: f32 = 1.999;

/// Snapped delay divisions at 120 BPM: 1/32, 1/16, 1/8, 1/4, 3/8, 1/2, 3/4, 1/1.
pub const DELAY_DIVISIONS_S: [f32; 8] = [0.0625, 0.125, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0];

/// Shortest reverb impulse, in seconds.
pub const REVERB_DURATION_MIN_S: f32 = 0.1;

/// Longest reverb impulse, in seconds.
pub const REVERB_DURATION_MAX_S: f32 = 5.0;

/// Decay exponent at reverb size 0.
pub const REVERB_DECAY_MIN: f32 = 2.0;

/// Decay exponent at full reverb size.
pub const REVERB_DECAY_MAX: f32 = 5.0;

/// Impulse duration installed at start-up.
pub const REVERB_INITIAL_DURATION_S: f32 = 2.0;

/// Impulse decay installed at start-up.
pub const REVERB_INITIAL_DECAY: f32 = 2.0;

/// Window in which reverb size changes are coalesced, in milliseconds.
pub const REVERB_DEBOUNCE_MS: u64 = 50;

/// Partition length of the reverb convolver.
pub const REVERB_PARTITION: usize = 256;

/// Fixed master gain.
pub const MASTER_GAIN: f32 = 0.9;

/// Master compressor threshold in dBFS.
pub const COMPRESSOR_THRESHOLD_DB: f32 = -12.0;

/// Master compressor ratio.
pub const COMPRESSOR_RATIO: f32 = 4.0;

/// Master compressor attack, in seconds.
pub const COMPRESSOR_ATTACK_S: f32 = 0.003;

/// Master compressor release, in seconds.
pub const COMPRESSOR_RELEASE_S: f32 = 0.25;

/// Gain applied to library previews.
pub const PREVIEW_GAIN: f32 = 0.6;

/// Shortest attack and decay phase, in seconds.
pub const ENVELOPE_MIN_PHASE_S: f32 = 0.005;

/// Shortest release tail, in seconds.
pub const ENVELOPE_MIN_TAIL_S: f32 = 0.01;

/// Floor for the sustain level so the exponential decay stays defined.
pub const SUSTAIN_FLOOR: f32 = 0.001;

/// How long a pad stays lit after a trigger, in milliseconds.
pub const TRIGGER_FLASH_MS: u64 = 100;

/// Minimum playback rate from the pitch knob.
pub const RATE_MIN: f32 = 0.5;

/// Maximum playback rate from the pitch knob.
pub const RATE_MAX: f32 = 2.0;
