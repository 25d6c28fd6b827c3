//! Error types for fleetshow.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for fleetshow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Host-list entry could not be turned into a host record
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session state machine errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// File transfer errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local I/O error (output artifacts)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Classify this error for status reporting and exit codes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Transport(e) => match e {
                TransportError::AuthenticationFailed { .. } | TransportError::Key(_) => {
                    ErrorKind::Auth
                }
                TransportError::Timeout(_) => ErrorKind::Timeout,
                _ => ErrorKind::Connect,
            },
            Error::Channel(_) => ErrorKind::Protocol,
            Error::Session(e) => match e {
                SessionError::PromptNotFound { .. } => ErrorKind::Timeout,
                _ => ErrorKind::Protocol,
            },
            Error::Transfer(_) => ErrorKind::Transfer,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Connect,
    Auth,
    Protocol,
    Timeout,
    Transfer,
    Config,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Connect => "connect",
            ErrorKind::Auth => "auth",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transfer => "transfer",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// Host-list line validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Line did not split into address, username and credential
    #[error("expected 3 comma-separated fields, found {found}")]
    FieldCount { found: usize },

    /// Address is not an IPv4 literal
    #[error("invalid IPv4 address '{address}'")]
    InvalidAddress { address: String },
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host not present in known_hosts under strict checking
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Channel layer errors.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open the interactive shell
    #[error("Failed to request shell")]
    ShellRequestFailed,

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),
}

/// Session state machine errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A transition not present in the state table was attempted
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    /// None of the expected prompt literals appeared in time
    #[error("no prompt from {expected:?} in state {state} within {waited:?}")]
    PromptNotFound {
        state: String,
        expected: Vec<String>,
        waited: Duration,
    },

    /// The worker pool refused to schedule a session
    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),

    /// A session task panicked
    #[error("session task aborted: {0}")]
    Aborted(String),
}

/// File transfer errors.
#[derive(Error, Debug)]
pub enum TransferError {
    /// SFTP subsystem could not be started
    #[error("SFTP subsystem unavailable: {0}")]
    Subsystem(String),

    /// Remote path does not exist
    #[error("remote path not found: {path}")]
    NotFound { path: String },

    /// Remote operation failed
    #[error("remote operation on {path} failed: {message}")]
    Remote { path: String, message: String },

    /// Local file could not be read or written
    #[error("local file {path}: {source}")]
    Local {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Configuration and argument errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config or input file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Config file is not valid TOML for the expected shape
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required local file is missing
    #[error("missing local file: {}", .0.display())]
    MissingFile(PathBuf),

    /// Mutually exclusive options were combined
    #[error("{0}")]
    ConflictingFlags(String),

    /// Invalid value
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias using fleetshow's Error.
pub type Result<T> = std::result::Result<T, Error>;
