//! Engine error types

use thiserror::Error;

/// Errors surfaced synchronously from cue/mixer control operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Operation targeted an instance currently sitting in the availability pool.
    #[error("instance {0} is not active")]
    InactiveInstance(usize),

    /// A position-mutating call was made while the instance is playing.
    #[error("instance {0} is playing")]
    InstancePlaying(usize),

    /// `open()` called on a cue or mixer that is already open/running.
    #[error("already open")]
    AlreadyOpen,

    /// `close()` called on a cue or mixer that is already closed.
    #[error("already closed")]
    AlreadyClosed,

    /// `start()` called on a mixer that is already running.
    #[error("already running")]
    AlreadyRunning,

    /// `stop()` called on a mixer that is already stopped.
    #[error("already stopped")]
    AlreadyStopped,

    /// The output sink could not be acquired.
    #[error("output sink unavailable: {0}")]
    SinkUnavailable(String),

    /// The audio file is not 16-bit stereo PCM.
    #[error("unsupported audio file: {0}")]
    UnsupportedAudioFileError(String),

    /// I/O failure while reading or writing an audio file or config file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A byte buffer didn't match the length the packer contract requires.
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// PCM buffer has odd length, or polyphony is zero.
    #[error("invalid pcm: {0}")]
    InvalidPcm(String),

    /// A parameter (e.g. thread priority) is outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure domain for the [`crate::sink::AudioSink`] trait, kept separate
/// from [`EngineError`] since sinks are a pluggable collaborator and their
/// failures don't overlap with cue/mixer control errors.
#[derive(Error, Debug)]
pub enum AudioSinkError {
    #[error("no audio output devices found")]
    NoDevices,

    #[error("failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    #[error("failed to get device config: {0}")]
    ConfigError(String),

    #[error("failed to build audio stream: {0}")]
    StreamBuildError(String),
}

pub type AudioSinkResult<T> = Result<T, AudioSinkError>;

impl From<AudioSinkError> for EngineError {
    fn from(e: AudioSinkError) -> Self {
        EngineError::SinkUnavailable(e.to_string())
    }
}
