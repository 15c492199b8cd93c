//! PCM float buffer to 16-bit little-endian stereo byte packing.

use crate::error::{EngineError, EngineResult};

/// Pack normalized float samples (`[-1.0, 1.0]`) into signed 16-bit
/// little-endian bytes, two bytes per sample. `dst.len()` must equal
/// `2 * src.len()`.
pub fn pack_pcm_to_bytes(dst: &mut [u8], src: &[f32]) -> EngineResult<()> {
    let expected = src.len() * 2;
    if dst.len() != expected {
        return Err(EngineError::LengthMismatch {
            expected,
            actual: dst.len(),
        });
    }
    for (i, &x) in src.iter().enumerate() {
        let sample = (x * 32767.0) as i16;
        let bytes = sample.to_le_bytes();
        dst[i * 2] = bytes[0];
        dst[i * 2 + 1] = bytes[1];
    }
    Ok(())
}
