use std::path::PathBuf;
use std::{fmt, io};

use crate::error::server::ErrorInfo;

/// Crate-wide `Result` type using [`ShelasticError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ShelasticError>;

/// Top-level error type for shelastic operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate. Cancellation of a
/// transfer is not represented here: it is a normal outcome.
#[derive(Debug)]
pub enum ShelasticError {
    /// Network-level failures talking to the cluster.
    Transport(TransportError),

    /// Responses that do not have the expected shape.
    Protocol(ProtocolError),

    /// Failures in the bulk transfer pipeline.
    Transfer(TransferError),

    /// Configuration errors.
    Config(ConfigError),

    /// Local I/O errors.
    Io(io::Error),

    /// JSON encoding/decoding errors.
    Json(serde_json::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Transport-specific errors.
#[derive(Debug)]
pub enum TransportError {
    /// The request could not be sent or the response could not be read.
    RequestFailed { url: String, message: String },

    /// The request did not complete within the configured timeout.
    Timeout(String),

    /// The server answered with a non-success status and no error body.
    Status { url: String, status: u16, body: String },

    /// Invalid cluster address.
    InvalidUrl(String),
}

/// Protocol decode errors.
///
/// These point at an unexpected server version or a bug, so they are
/// surfaced verbatim and never retried.
#[derive(Debug)]
pub enum ProtocolError {
    /// Scroll response does not contain `_scroll_id`.
    MissingScrollId,

    /// Search response does not contain `hits` or `hits.total`.
    MissingHits,

    /// A search hit lacks a required field.
    MalformedHit(String),

    /// Body is not the JSON document we expected.
    InvalidBody(String),

    /// The server reported an error object.
    Server(ErrorInfo),
}

/// Bulk transfer errors.
#[derive(Debug)]
pub enum TransferError {
    /// Query text is not a JSON object.
    InvalidQuery(String),

    /// Source-only export hit a record without `_source`.
    MissingSource { id: String },

    /// Import record lacks the configured id field.
    MissingIdField { field: String, record: u64 },

    /// Import record could not be decoded.
    InvalidRecord { record: u64, message: String },

    /// Import record has no destination index.
    MissingIndex { record: u64 },

    /// One or more bulk requests reported item failures.
    PartialFailure { failed_batches: u64, artifact: PathBuf },

    /// A pipeline stage ended abnormally.
    StageAborted(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// Generic configuration error.
    Generic(String),
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ShelasticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShelasticError::Transport(e) => write!(f, "Transport error: {e}"),
            ShelasticError::Protocol(e) => write!(f, "Unexpected response: {e}"),
            ShelasticError::Transfer(e) => write!(f, "{e}"),
            ShelasticError::Config(e) => write!(f, "Configuration error: {e}"),
            ShelasticError::Io(e) => write!(f, "I/O error: {e}"),
            ShelasticError::Json(e) => write!(f, "JSON error: {e}"),
            ShelasticError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::RequestFailed { url, message } => {
                write!(f, "Request to {url} failed: {message}")
            }
            TransportError::Timeout(url) => write!(f, "Request to {url} timed out"),
            TransportError::Status { url, status, body } => {
                write!(f, "{url} answered with status {status}: {body}")
            }
            TransportError::InvalidUrl(url) => write!(f, "Invalid cluster URL: {url}"),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MissingScrollId => {
                write!(f, "Response does not contain _scroll_id")
            }
            ProtocolError::MissingHits => write!(f, "no hits or total"),
            ProtocolError::MalformedHit(msg) => write!(f, "Malformed search hit: {msg}"),
            ProtocolError::InvalidBody(msg) => write!(f, "Invalid response body: {msg}"),
            ProtocolError::Server(info) => write!(f, "Server error: {info}"),
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::InvalidQuery(msg) => write!(f, "Invalid query JSON: {msg}"),
            TransferError::MissingSource { id } => {
                write!(f, "Search result '{id}' does not contain '_source' field")
            }
            TransferError::MissingIdField { field, record } => {
                write!(f, "No field '{field}' in record #{record}")
            }
            TransferError::InvalidRecord { record, message } => {
                write!(f, "Cannot parse record #{record}: {message}")
            }
            TransferError::MissingIndex { record } => {
                write!(f, "Record #{record} has no destination index, use --index")
            }
            TransferError::PartialFailure {
                failed_batches,
                artifact,
            } => write!(
                f,
                "There were errors during the transfer ({failed_batches} failed batch(es)). \
                 Server responses are saved to {}",
                artifact.display()
            ),
            TransferError::StageAborted(msg) => write!(f, "Transfer stage aborted: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ShelasticError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShelasticError::Io(e) => Some(e),
            ShelasticError::Json(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for TransportError {}
impl std::error::Error for ProtocolError {}
impl std::error::Error for TransferError {}
impl std::error::Error for ConfigError {}

impl ShelasticError {
    /// Whether this error means the cluster could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, ShelasticError::Transport(_))
    }

    /// Whether this error only reports failed bulk items.
    pub fn is_partial_failure(&self) -> bool {
        matches!(
            self,
            ShelasticError::Transfer(TransferError::PartialFailure { .. })
        )
    }
}

/* ========================= Conversions to ShelasticError ========================= */

impl From<io::Error> for ShelasticError {
    fn from(err: io::Error) -> Self {
        ShelasticError::Io(err)
    }
}

impl From<serde_json::Error> for ShelasticError {
    fn from(err: serde_json::Error) -> Self {
        ShelasticError::Json(err)
    }
}

impl From<TransportError> for ShelasticError {
    fn from(err: TransportError) -> Self {
        ShelasticError::Transport(err)
    }
}

impl From<ProtocolError> for ShelasticError {
    fn from(err: ProtocolError) -> Self {
        ShelasticError::Protocol(err)
    }
}

impl From<TransferError> for ShelasticError {
    fn from(err: TransferError) -> Self {
        ShelasticError::Transfer(err)
    }
}

impl From<ConfigError> for ShelasticError {
    fn from(err: ConfigError) -> Self {
        ShelasticError::Config(err)
    }
}

impl From<String> for ShelasticError {
    fn from(msg: String) -> Self {
        ShelasticError::Generic(msg)
    }
}

impl From<&str> for ShelasticError {
    fn from(msg: &str) -> Self {
        ShelasticError::Generic(msg.to_owned())
    }
}

impl From<toml::de::Error> for ShelasticError {
    fn from(err: toml::de::Error) -> Self {
        ShelasticError::Config(ConfigError::InvalidFormat(err.to_string()))
    }
}
