//! Fundamental audio types shared by every component of the engine.

/// The only sample rate this engine supports.
pub const SAMPLE_RATE: u32 = 44100;

/// Audio sample type (32-bit float, normalized to `[-1.0, 1.0]`).
pub type Sample = f32;
