//! Core error types for drover

use drover_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the drover ecosystem
#[derive(Error, Debug)]
pub enum DroverError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Authentication error
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session-related errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// No live session for the agent
    #[error("Agent not connected: {0}")]
    NotConnected(String),

    /// The session closed while the operation was in flight
    #[error("Session closed")]
    Closed,

    /// The session's outbound queue is full
    #[error("Outbound queue full")]
    QueueFull,

    /// Underlying transport failed
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Storage-related errors, distinct from session and transport failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend failure
    #[error("Storage backend error: {0}")]
    Internal(String),
}

/// Authentication and credential errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Registration token missing, expired, or already used
    #[error("Invalid registration token")]
    InvalidToken,

    /// Credential failed verification
    #[error("Invalid credential")]
    InvalidCredential,

    /// No credential supplied where one is required
    #[error("Missing credential")]
    MissingCredential,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
