//! WAV loading collaborator.
//!
//! Decodes a 16-bit stereo PCM WAV file into the engine's normalized float
//! format. Only the one format the engine plays is accepted; anything else
//! is a hard error rather than a silent best-effort conversion.

use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Frame counts beyond this are truncated on load, with a warning, rather
/// than rejected outright.
const MAX_FRAMES: usize = (i32::MAX / 2) as usize;

/// Load a 16-bit stereo PCM WAV file, returning interleaved normalized
/// float samples (`[-1.0, 1.0]`) and the frame count.
pub fn load_wav_stereo_f32(path: &Path) -> EngineResult<(Vec<f32>, usize)> {
    let mut reader = hound::WavReader::open(path).map_err(|e| map_open_error(path, e))?;
    let spec = reader.spec();

    if spec.channels != 2 {
        return Err(EngineError::UnsupportedAudioFileError(format!(
            "expected 2 channels, found {}",
            spec.channels
        )));
    }
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(EngineError::UnsupportedAudioFileError(format!(
            "expected 16-bit PCM, found {}-bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let mut total_frames = reader.duration() as usize;
    if total_frames > MAX_FRAMES {
        log::warn!(
            "load_wav_stereo_f32: {:?} has {} frames, truncating to {}",
            path,
            total_frames,
            MAX_FRAMES
        );
        total_frames = MAX_FRAMES;
    }

    let mut pcm = Vec::with_capacity(total_frames * 2);
    for sample in reader.samples::<i16>().take(total_frames * 2) {
        let sample = sample.map_err(|e| EngineError::IoError(hound_to_io_error(e)))?;
        pcm.push(sample as f32 / 32768.0);
    }

    Ok((pcm, total_frames))
}

/// Encode interleaved normalized float samples to a 16-bit stereo PCM WAV
/// file at 44.1kHz.
pub fn save_wav_stereo_f32(path: &Path, pcm: &[f32]) -> EngineResult<()> {
    if pcm.len() % 2 != 0 {
        return Err(EngineError::InvalidPcm(
            "pcm buffer length must be even for stereo".to_string(),
        ));
    }
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: crate::types::SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| EngineError::IoError(hound_to_io_error(e)))?;
    for &x in pcm {
        let sample = (x.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer
            .write_sample(sample)
            .map_err(|e| EngineError::IoError(hound_to_io_error(e)))?;
    }
    writer
        .finalize()
        .map_err(|e| EngineError::IoError(hound_to_io_error(e)))?;
    Ok(())
}

fn map_open_error(path: &Path, e: hound::Error) -> EngineError {
    match e {
        hound::Error::IoError(io) => EngineError::IoError(io),
        other => EngineError::UnsupportedAudioFileError(format!("{:?}: {}", path, other)),
    }
}

fn hound_to_io_error(e: hound::Error) -> std::io::Error {
    match e {
        hound::Error::IoError(io) => io,
        other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
    }
}
