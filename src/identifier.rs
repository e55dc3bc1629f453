//! Peppol routing identifiers.
//!
//! Participants, document types and processes are each addressed by a
//! scheme+value pair. The URI-encoded form `scheme::value` is the one used in
//! SMP URLs and log messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default scheme for participant identifiers.
pub const DEFAULT_PARTICIPANT_SCHEME: &str = "iso6523-actorid-upis";

/// Default scheme for document type identifiers.
pub const DEFAULT_DOCUMENT_TYPE_SCHEME: &str = "busdox-docid-qns";

/// Default scheme for process identifiers.
pub const DEFAULT_PROCESS_SCHEME: &str = "cenbii-procid-ubl";

/// A Peppol participant identifier (scheme + value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId {
    scheme: String,
    value: String,
}

impl ParticipantId {
    /// Creates an identifier with an explicit scheme.
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    /// Creates an identifier using [`DEFAULT_PARTICIPANT_SCHEME`].
    pub fn with_default_scheme(value: impl Into<String>) -> Self {
        Self::new(DEFAULT_PARTICIPANT_SCHEME, value)
    }

    /// The identifier scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The identifier value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether this identifier uses the default Peppol scheme.
    pub fn has_default_scheme(&self) -> bool {
        self.scheme == DEFAULT_PARTICIPANT_SCHEME
    }

    /// The URI-encoded form `scheme::value`.
    pub fn as_uri(&self) -> String {
        format!("{}::{}", self.scheme, self.value)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.scheme, self.value)
    }
}

/// A Peppol document type identifier (scheme + value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentTypeId {
    scheme: String,
    value: String,
}

impl DocumentTypeId {
    /// Creates an identifier with an explicit scheme.
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    /// Creates an identifier using [`DEFAULT_DOCUMENT_TYPE_SCHEME`].
    pub fn with_default_scheme(value: impl Into<String>) -> Self {
        Self::new(DEFAULT_DOCUMENT_TYPE_SCHEME, value)
    }

    /// The identifier scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The identifier value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether this identifier uses the default Peppol scheme.
    pub fn has_default_scheme(&self) -> bool {
        self.scheme == DEFAULT_DOCUMENT_TYPE_SCHEME
    }

    /// The URI-encoded form `scheme::value`.
    pub fn as_uri(&self) -> String {
        format!("{}::{}", self.scheme, self.value)
    }
}

impl fmt::Display for DocumentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.scheme, self.value)
    }
}

/// A Peppol process identifier (scheme + value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId {
    scheme: String,
    value: String,
}

impl ProcessId {
    /// Creates an identifier with an explicit scheme.
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    /// Creates an identifier using [`DEFAULT_PROCESS_SCHEME`].
    pub fn with_default_scheme(value: impl Into<String>) -> Self {
        Self::new(DEFAULT_PROCESS_SCHEME, value)
    }

    /// The identifier scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The identifier value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether this identifier uses the default Peppol scheme.
    pub fn has_default_scheme(&self) -> bool {
        self.scheme == DEFAULT_PROCESS_SCHEME
    }

    /// The URI-encoded form `scheme::value`.
    pub fn as_uri(&self) -> String {
        format!("{}::{}", self.scheme, self.value)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.scheme, self.value)
    }
}
