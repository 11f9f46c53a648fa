//! Error handling for the pte workspace
//!
//! Every library crate reports failures through [`PteError`]; binaries wrap
//! it in `anyhow` at the outer edge.

use std::fmt;
use std::path::{Path, PathBuf};

/// Result type alias for pte operations
pub type PteResult<T> = Result<T, PteError>;

/// Error type shared by finders, processors, decoders and loaders
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum PteError {
    /// Search directory does not exist
    DirectoryNotFound {
        /// Directory that was requested
        directory: PathBuf,
    },

    /// Unknown finder datatype requested
    FinderNotFound {
        /// Datatype that was requested
        datatype: String,
        /// Datatypes that are accepted
        allowed: Vec<&'static str>,
    },

    /// Hemisphere filter used for a subject without a hemisphere entry
    HemisphereNotSpecified {
        /// Subject found in the filename
        subject: String,
        /// Hemisphere map that was searched, rendered as `subject: side`
        specified: Vec<String>,
    },

    /// Filter keyword could not be interpreted
    InvalidKeyword {
        /// Kind of keyword (medication, stimulation, hemisphere)
        kind: &'static str,
        /// Keyword as given
        value: String,
    },

    /// Filename is not a valid BIDS name
    InvalidBidsName {
        /// Offending path
        path: String,
        /// Why parsing failed
        reason: String,
    },

    /// Signal data is inconsistent
    InvalidSignalData {
        /// Description of the inconsistency
        reason: String,
    },

    /// Invalid parameter value
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Description of the problem
        reason: String,
    },

    /// Two array dimensions disagree
    DimensionMismatch {
        /// What was compared
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Label channel produced an odd number of onset/offset events
    OddEventCount {
        /// Number of events detected
        events: usize,
    },

    /// No trial survived epoching
    NoTrials {
        /// Why no trial was kept
        reason: String,
    },

    /// Table column not present
    MissingColumn {
        /// Column that was requested
        column: String,
        /// Table or file searched
        source: String,
    },

    /// Malformed file content
    FormatError {
        /// Description of format issue
        reason: String,
    },

    /// Serialization/deserialization error
    SerializationError {
        /// Serialization error description
        reason: String,
    },

    /// Filesystem error
    Io {
        /// Path involved, if known
        path: Option<PathBuf>,
        /// Underlying error message
        reason: String,
    },

    /// Model fitting or prediction failed
    ModelError {
        /// Description of the failure
        reason: String,
    },
}

impl PteError {
    /// Wrap an I/O error together with the path that caused it
    pub fn io(path: impl AsRef<Path>, err: std::io::Error) -> Self {
        PteError::Io {
            path: Some(path.as_ref().to_path_buf()),
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for PteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PteError::DirectoryNotFound { directory } => {
                write!(f, "Input directory was not found.\nGot: {}.", directory.display())
            }
            PteError::FinderNotFound { datatype, allowed } => {
                write!(f, "Input `datatype` is not an allowed value. Allowed values: {:?}. Got: {}.",
                       allowed, datatype)
            }
            PteError::HemisphereNotSpecified { subject, specified } => {
                write!(f, "Input ECOG hemisphere is not specified for given subject.\n\
                           Unspecified subject: {}.\nSpecified hemispheres: {{{}}}.",
                       subject, specified.join(", "))
            }
            PteError::InvalidKeyword { kind, value } => {
                write!(f, "Keyword for {} not valid: {}", kind, value)
            }
            PteError::InvalidBidsName { path, reason } => {
                write!(f, "Invalid BIDS filename {}: {}", path, reason)
            }
            PteError::InvalidSignalData { reason } => {
                write!(f, "Invalid signal data: {}", reason)
            }
            PteError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter `{}`: {}", name, reason)
            }
            PteError::DimensionMismatch { what, expected, actual } => {
                write!(f, "Dimension mismatch for {}: expected {}, got {}", what, expected, actual)
            }
            PteError::OddEventCount { events } => {
                write!(f, "Number of events is odd. Found {} events. Please check your data.", events)
            }
            PteError::NoTrials { reason } => {
                write!(f, "No trials available: {}", reason)
            }
            PteError::MissingColumn { column, source } => {
                write!(f, "Column '{}' not found in {}", column, source)
            }
            PteError::FormatError { reason } => {
                write!(f, "Format error: {}", reason)
            }
            PteError::SerializationError { reason } => {
                write!(f, "Serialization error: {}", reason)
            }
            PteError::Io { path: Some(path), reason } => {
                write!(f, "I/O error at {}: {}", path.display(), reason)
            }
            PteError::Io { path: None, reason } => {
                write!(f, "I/O error: {}", reason)
            }
            PteError::ModelError { reason } => {
                write!(f, "Model error: {}", reason)
            }
        }
    }
}

impl std::error::Error for PteError {}

impl From<std::io::Error> for PteError {
    fn from(err: std::io::Error) -> Self {
        PteError::Io { path: None, reason: err.to_string() }
    }
}

impl From<serde_json::Error> for PteError {
    fn from(err: serde_json::Error) -> Self {
        PteError::SerializationError { reason: err.to_string() }
    }
}

/// Convenience macro for creating parameter errors
#[macro_export]
macro_rules! param_error {
    ($name:literal, $($arg:tt)+) => {
        $crate::error::PteError::InvalidParameter {
            name: $name,
            reason: format!($($arg)+),
        }
    };
}
