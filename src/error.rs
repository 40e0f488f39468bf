//! Error types for the voice pipeline

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio engine errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Failed to spawn engine thread: {0}")]
    ThreadSpawn(String),

    #[error("Engine already running")]
    AlreadyRunning,

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Codec initialization failed: {0}")]
    Init(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("No codec available for the negotiated parameters")]
    NoCodecAvailable,

    #[error("Codec registry not initialized")]
    NotInitialized,
}

/// Wire packet errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Empty packet")]
    Empty,

    #[error("Truncated packet: needed {needed} more bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("Negative sequence number: {0}")]
    NegativeSequence(i64),

    #[error("Malformed packet: {0}")]
    Malformed(&'static str),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
