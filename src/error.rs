//! Error types for the AS2 client pipeline.

use thiserror::Error;

/// Result type for AS2 client operations.
pub type As2Result<T> = Result<T, As2ClientError>;

/// Errors that can occur while preparing or dispatching an AS2 message.
#[derive(Debug, Error)]
pub enum As2ClientError {
    /// Configuration error (missing or invalid field).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// SMP lookup error.
    #[error("SMP lookup error: {0}")]
    SmpLookup(String),

    /// Certificate decoding or inspection error.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// The business document could not be read or parsed as XML.
    #[error("failed to read business document {source_name}: {reason}")]
    DocumentRead { source_name: String, reason: String },

    /// The SBDH envelope could not be serialized.
    #[error("failed to serialize SBDH envelope: {0}")]
    EnvelopeSerialization(String),

    /// The SBDH envelope could not be parsed.
    #[error("failed to parse SBDH envelope: {0}")]
    EnvelopeParse(String),

    /// Transport error surfaced unchanged from the AS2 sender.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
