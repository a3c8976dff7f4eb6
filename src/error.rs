//! Error types for the edgequake-docconv library.
//!
//! One error type covers every way a request can fail. Each variant knows its
//! HTTP-style classification ([`DocConvError::status`]) and the optional
//! diagnostic detail shown to the caller ([`DocConvError::details`]), so the
//! transport layer never has to pattern-match on internals.
//!
//! | Class | Variants | Status |
//! |-------|----------|--------|
//! | Validation | `UnsupportedInputFormat`, `UnsupportedOutputFormat`, `MissingFile`, `EmptyFilename` | 400 |
//! | Engine | `EngineUnavailable` | 503 |
//! | Conversion | `ConversionFailed`, `OutputNotFound` | 500 |
//! | Storage | `PersistenceFailed`, `Workspace`, `Internal` | 500 |
//! | Download | `NotFound` (404), `BadPath` (400) |
//!
//! Cleanup failures (workspace removal, expiry sweeps) are deliberately absent:
//! they are logged where they happen and never reach a caller.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which engine invocation of a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionPhase {
    /// The only invocation of a single-pass conversion.
    Direct,
    /// First half of a two-phase conversion (input → intermediate).
    Intermediate,
    /// Second half of a two-phase conversion (intermediate → target).
    Final,
}

impl fmt::Display for ConversionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionPhase::Direct => f.write_str("conversion"),
            ConversionPhase::Intermediate => f.write_str("intermediate conversion"),
            ConversionPhase::Final => f.write_str("final conversion"),
        }
    }
}

/// All errors returned by the edgequake-docconv library.
#[derive(Debug, Error)]
pub enum DocConvError {
    // ── Validation errors ────────────────────────────────────────────────
    /// The uploaded file's extension is not in the input allow-list.
    #[error("Unsupported input format '{extension}'")]
    UnsupportedInputFormat { extension: String },

    /// The requested target format is not in the output allow-list.
    #[error("Unsupported output format '{format}'")]
    UnsupportedOutputFormat { format: String },

    /// The request carried no file part.
    #[error("No file uploaded")]
    MissingFile,

    /// The file part had no (or an empty) filename.
    #[error("Uploaded file has an empty filename")]
    EmptyFilename,

    // ── Engine errors ────────────────────────────────────────────────────
    /// The engine could not be located or executed at startup.
    #[error("Document engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    /// The engine exited non-zero, timed out, or reported failure in its output.
    #[error("Document {phase} failed")]
    ConversionFailed {
        phase: ConversionPhase,
        detail: String,
    },

    /// The engine reported success but no file with the target extension appeared.
    #[error("Converted file with extension '.{extension}' not found")]
    OutputNotFound {
        extension: String,
        listing: Vec<String>,
    },

    // ── Storage errors ───────────────────────────────────────────────────
    /// Copying or syncing the artifact into the durable store failed.
    #[error("Failed to persist converted file to '{path}': {source}")]
    PersistenceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request workspace could not be created or written.
    #[error("Workspace error at '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Download errors ──────────────────────────────────────────────────
    /// The requested artifact does not exist (or has expired).
    #[error("File not found: '{identifier}'")]
    NotFound { identifier: String },

    /// The download identifier is malformed, a traversal attempt, or a directory.
    #[error("Invalid file path: {reason}")]
    BadPath { reason: String },

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocConvError {
    /// HTTP-style status classification for the transport layer.
    pub fn status(&self) -> u16 {
        match self {
            DocConvError::UnsupportedInputFormat { .. }
            | DocConvError::UnsupportedOutputFormat { .. }
            | DocConvError::MissingFile
            | DocConvError::EmptyFilename
            | DocConvError::BadPath { .. } => 400,
            DocConvError::NotFound { .. } => 404,
            DocConvError::EngineUnavailable { .. } => 503,
            DocConvError::ConversionFailed { .. }
            | DocConvError::OutputNotFound { .. }
            | DocConvError::PersistenceFailed { .. }
            | DocConvError::Workspace { .. }
            | DocConvError::InvalidConfig(_)
            | DocConvError::Internal(_) => 500,
        }
    }

    /// `true` for errors caused by the request itself rather than the service.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DocConvError::UnsupportedInputFormat { .. }
                | DocConvError::UnsupportedOutputFormat { .. }
                | DocConvError::MissingFile
                | DocConvError::EmptyFilename
        )
    }

    /// Optional diagnostic detail to show next to the error message.
    pub fn details(&self) -> Option<String> {
        match self {
            DocConvError::UnsupportedInputFormat { extension } => Some(format!(
                "Files with extension '{extension}' cannot be converted"
            )),
            DocConvError::UnsupportedOutputFormat { format } => {
                Some(format!("Conversion to '{format}' is not supported"))
            }
            DocConvError::EngineUnavailable { reason } => Some(reason.clone()),
            DocConvError::ConversionFailed { detail, .. } => Some(detail.clone()),
            DocConvError::OutputNotFound { extension, listing } => Some(format!(
                "No file ending in '.{extension}' was produced. Possible causes: the input \
                 format cannot be converted to the target format, the input is damaged, or \
                 the engine did not run the conversion. Workspace contents: [{}]",
                listing.join(", ")
            )),
            DocConvError::PersistenceFailed { source, .. }
            | DocConvError::Workspace { source, .. } => Some(source.to_string()),
            _ => None,
        }
    }
}
