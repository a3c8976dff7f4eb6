//! # edgequake-docconv
//!
//! Convert office documents with LibreOffice behind a small HTTP service:
//! upload a file, get back a download link (and the text itself for `txt`
//! targets), and let stored results expire on their own.
//!
//! ## Request lifecycle
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate   input extension + target directive against allow-lists
//!  ├─ 2. Workspace  <tmp>/work_<uuid>/<uuid><ext>
//!  ├─ 3. Engine     soffice --headless --convert-to <fmt> ... (PDF→txt via odt)
//!  ├─ 4. Locate     scan the workspace for the produced file
//!  ├─ 5. Persist    <data>/<YYYYMMDD>/<base>_<millis>.<ext>, fsync'd
//!  └─ 6. Respond    download URL + expiry; workspace removed on every path
//! ```
//!
//! A background [`expiry`] task deletes persisted artifacts once they outlive
//! the configured TTL.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docconv::{ConversionRequest, ConversionService, RequestOrigin, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(ServiceConfig::builder().data_dir("data").tmp_dir("tmp").build()?);
//!     let service = ConversionService::start(config).await;
//!
//!     let bytes = std::fs::read("report.docx")?;
//!     let request = ConversionRequest {
//!         reader: &bytes[..],
//!         filename: "report.docx".to_string(),
//!         format: Some("pdf".to_string()),
//!     };
//!     let result = service
//!         .convert(request, &RequestOrigin::new(false, "localhost:15000"))
//!         .await?;
//!     println!("{}", result.download_url);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docconv` binary (clap + anyhow + tracing-subscriber + dotenvy) |
//!
//! Disable `cli` when embedding the library:
//! ```toml
//! edgequake-docconv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod expiry;
pub mod formats;
pub mod mime;
pub mod output;
pub mod pipeline;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExpiryPolicy, ServiceConfig, ServiceConfigBuilder};
pub use convert::{ConversionRequest, ConversionService, RequestOrigin};
pub use error::{ConversionPhase, DocConvError};
pub use expiry::{spawn_scheduler, sweep_expired, ExpiryHandle, ShutdownOutcome, SweepReport};
pub use formats::{ConversionRoute, TargetFormat};
pub use output::{ConversionResult, ErrorBody, HealthReport};
pub use pipeline::engine::{
    classify_output, DocumentEngine, EngineAvailability, EngineInvocation, EngineOutcome,
    EngineRun, SofficeEngine,
};
pub use pipeline::store::{ArtifactStore, PersistedArtifact, ResolvedDownload};
pub use server::{build_router, serve, AppState};
