//! Error types for scab
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Configuration and data errors abort before any audio begins; everything
//! else ends the session and closes the device.

use thiserror::Error;

/// Main error type for scab
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (unknown device, channel mismatch, bad session file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio device errors (stream open/start/stop failures)
    #[error("Audio device error: {0}")]
    Device(String),

    /// Sample format not supported (only 16-bit signed and 8-bit unsigned PCM)
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Data errors (duplicate source id, missing source for a plan entry)
    #[error("Data error: {0}")]
    Data(String),

    /// Playback errors (invalid target channels, play on a closed session)
    #[error("Playback error: {0}")]
    Playback(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// WAV decoding errors
    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using scab Error
pub type Result<T> = std::result::Result<T, Error>;
