//! Response bodies returned to callers.
//!
//! Field names are part of the public wire contract and match what existing
//! clients of the service parse.

use serde::{Deserialize, Serialize};

/// Successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    /// Name of the file as uploaded.
    pub filename: String,
    /// Absolute URL for `GET /download/...`.
    pub download_url: String,
    /// Relative download identifier, e.g. `20240115/report_1705301234567.pdf`.
    pub download_filename: String,
    /// Artifact content, only for plain-text targets.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS` local time, or `never`.
    pub expiry: String,
}

/// Error body for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<String>,
}

impl From<&crate::error::DocConvError> for ErrorBody {
    fn from(e: &crate::error::DocConvError) -> Self {
        Self {
            error: e.to_string(),
            details: e.details(),
        }
    }
}

/// `GET /health` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `ok` when the engine is usable, otherwise `degraded`.
    pub status: String,
    /// `available` or `unavailable`.
    pub libreoffice: String,
    /// Engine version banner, or `unknown`.
    pub version: String,
    pub data_dir: String,
    /// `0` means artifacts never expire.
    pub file_expiry_hours: u64,
    pub port: u16,
}
