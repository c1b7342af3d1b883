use thiserror::Error;

use crate::config::ConfigError;

/// Main client error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum SruError {
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url} - {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Endpoint not found: {url}")]
    NotFound { url: String },

    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid extra request parameter: {name} - must start with '{prefix}'")]
    InvalidExtraParameter { name: String, prefix: &'static str },

    #[error("Record data parser already registered for schema: {schema}")]
    DuplicateRecordParser { schema: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request rejected: client is {state}")]
    Rejected { state: String },

    #[error("Request queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Worker panicked while servicing request: {details}")]
    WorkerPanic { details: String },

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },
}

/// Structural and protocol errors raised while walking a response.
///
/// Every variant carries the byte offset into the stream being read when the
/// error was detected. For records delivered as escaped strings this is the
/// offset into the re-parsed record text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("Malformed XML at byte {position}: {details}")]
    Malformed { position: u64, details: String },

    #[error("Expected element <{name}> ({namespace}) at byte {position}, found {found}")]
    MissingElement {
        namespace: String,
        name: String,
        found: String,
        position: u64,
    },

    #[error("Unexpected {found} inside <{name}> at byte {position}")]
    UnexpectedContent {
        name: String,
        found: String,
        position: u64,
    },

    #[error("Expected end tag </{expected}> at byte {position}, found </{found}>")]
    MismatchedEndTag {
        expected: String,
        found: String,
        position: u64,
    },

    #[error("Element <{name}> at byte {position} must not be empty")]
    EmptyContent { name: String, position: u64 },

    #[error("Element <{name}> at byte {position} is not a valid integer: '{value}'")]
    InvalidNumber {
        name: String,
        value: String,
        position: u64,
    },

    #[error("Unknown response namespace '{namespace}' at byte {position}")]
    UnknownNamespace { namespace: String, position: u64 },

    #[error("Unsupported protocol version '{version}' at byte {position}")]
    InvalidVersion { version: String, position: u64 },

    #[error("Invalid value '{value}' for <{name}> at byte {position}")]
    InvalidEnumValue {
        name: String,
        value: String,
        position: u64,
    },

    #[error("Protocol violation at byte {position}: {details}")]
    ProtocolViolation { details: String, position: u64 },

    #[error("Unexpected end of input at byte {position}")]
    UnexpectedEof { position: u64 },
}

impl XmlError {
    /// Byte offset at which the error was detected
    pub fn position(&self) -> u64 {
        match self {
            XmlError::Malformed { position, .. }
            | XmlError::MissingElement { position, .. }
            | XmlError::UnexpectedContent { position, .. }
            | XmlError::MismatchedEndTag { position, .. }
            | XmlError::EmptyContent { position, .. }
            | XmlError::InvalidNumber { position, .. }
            | XmlError::UnknownNamespace { position, .. }
            | XmlError::InvalidVersion { position, .. }
            | XmlError::InvalidEnumValue { position, .. }
            | XmlError::ProtocolViolation { position, .. }
            | XmlError::UnexpectedEof { position } => *position,
        }
    }
}

impl From<ConfigError> for SruError {
    fn from(err: ConfigError) -> Self {
        SruError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SruError>;

/// Result type alias for the XML navigation layer
pub type XmlResult<T> = std::result::Result<T, XmlError>;
