//! The conversion orchestrator.
//!
//! [`ConversionService`] drives one request through
//! `validate → save → convert → locate → persist → respond`. The request's
//! workspace is destroyed on every exit path before the outcome is returned.
//!
//! All service state is immutable after construction apart from the optional
//! semaphore that bounds simultaneous engine runs.

use crate::config::ServiceConfig;
use crate::error::{ConversionPhase, DocConvError};
use crate::formats::{self, ConversionRoute, IntermediateStep, TargetFormat};
use crate::output::ConversionResult;
use crate::pipeline::engine::{
    DocumentEngine, EngineAvailability, EngineInvocation, SofficeEngine,
};
use crate::pipeline::locate;
use crate::pipeline::store::{ArtifactStore, PersistedArtifact, ResolvedDownload};
use crate::pipeline::workspace::Workspace;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Expiry marker used when artifacts are kept forever.
pub const NEVER_EXPIRES: &str = "never";

/// One upload to convert.
#[derive(Debug)]
pub struct ConversionRequest<R> {
    /// Upload body.
    pub reader: R,
    /// File name as sent by the client.
    pub filename: String,
    /// Raw target directive; `None` or empty selects `txt`.
    pub format: Option<String>,
}

/// Where the request came from, for building absolute download URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub secure: bool,
    pub host: String,
}

impl RequestOrigin {
    pub fn new(secure: bool, host: impl Into<String>) -> Self {
        Self {
            secure,
            host: host.into(),
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }
}

/// Shared orchestrator for all conversion and download requests.
pub struct ConversionService {
    config: Arc<ServiceConfig>,
    engine: Arc<dyn DocumentEngine>,
    availability: EngineAvailability,
    store: ArtifactStore,
    limiter: Option<Arc<Semaphore>>,
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService")
            .field("config", &self.config)
            .field("availability", &self.availability)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ConversionService {
    /// Assemble a service from parts. `availability` is normally the result of
    /// [`DocumentEngine::probe`].
    pub fn new(
        config: Arc<ServiceConfig>,
        engine: Arc<dyn DocumentEngine>,
        availability: EngineAvailability,
    ) -> Self {
        let limiter = match config.max_concurrent_conversions {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        let store = ArtifactStore::new(config.data_dir.clone());
        Self {
            config,
            engine,
            availability,
            store,
            limiter,
        }
    }

    /// Build a service backed by the real `soffice` engine and probe it.
    ///
    /// A failed probe does not abort startup: the service comes up in the
    /// unavailable state and rejects conversions with 503.
    pub async fn start(config: Arc<ServiceConfig>) -> Self {
        let (engine, availability) =
            SofficeEngine::new(config.soffice_path.clone(), config.engine_timeout)
                .resolved()
                .await;
        match &availability {
            EngineAvailability::Available { path, version } => info!(
                program = %path.display(),
                version = %version,
                "Document engine available"
            ),
            EngineAvailability::Unavailable { reason } => warn!(
                program = %config.soffice_path.display(),
                reason = %reason,
                "Document engine unavailable; conversions will be rejected"
            ),
        }
        Self::new(config, Arc::new(engine), availability)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn availability(&self) -> &EngineAvailability {
        &self.availability
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Convert one upload and persist the result.
    pub async fn convert<R>(
        &self,
        request: ConversionRequest<R>,
        origin: &RequestOrigin,
    ) -> Result<ConversionResult, DocConvError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if let EngineAvailability::Unavailable { reason } = &self.availability {
            return Err(DocConvError::EngineUnavailable {
                reason: reason.clone(),
            });
        }

        let ConversionRequest {
            reader,
            filename,
            format,
        } = request;

        // ── Step 1: Validate ─────────────────────────────────────────────
        let input_ext = formats::validate_input(&filename)?;
        let target = TargetFormat::parse(format.as_deref())?;
        let route = formats::route_for(&input_ext, &target);

        let _permit = match &self.limiter {
            Some(limiter) => Some(
                Arc::clone(limiter).acquire_owned().await.map_err(|e| {
                    DocConvError::Internal(format!("Conversion limiter closed: {e}"))
                })?,
            ),
            None => None,
        };

        let started = Instant::now();
        let id = Uuid::new_v4();
        info!(
            request_id = %id,
            filename = %filename,
            input = %input_ext,
            target = %target.directive(),
            "Conversion started"
        );

        // ── Step 2: Workspace ────────────────────────────────────────────
        let workspace = Workspace::create(&self.config.tmp_dir, id).await?;
        let outcome = self
            .convert_in(
                &workspace,
                reader,
                &filename,
                &input_ext,
                &target,
                &route,
            )
            .await;
        workspace.destroy().await;

        let artifact = match outcome {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(request_id = %id, error = %e, "Conversion failed");
                return Err(e);
            }
        };

        // ── Step 6: Respond ──────────────────────────────────────────────
        let text = if target.is_plain_text() {
            read_text(&artifact.absolute).await
        } else {
            None
        };

        let result = ConversionResult {
            success: true,
            filename,
            download_url: download_url(origin, &artifact.relative),
            download_filename: artifact.relative,
            text,
            expiry: expiry_description(&self.config, Local::now()),
        };

        info!(
            request_id = %id,
            download = %result.download_filename,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Conversion complete"
        );
        Ok(result)
    }

    /// Resolve a decoded download identifier to a stored artifact.
    pub async fn resolve_download(
        &self,
        identifier: &str,
    ) -> Result<ResolvedDownload, DocConvError> {
        self.store.resolve(identifier).await
    }

    async fn convert_in<R>(
        &self,
        workspace: &Workspace,
        reader: R,
        original_filename: &str,
        input_ext: &str,
        target: &TargetFormat,
        route: &ConversionRoute,
    ) -> Result<PersistedArtifact, DocConvError>
    where
        R: AsyncRead + Unpin + Send,
    {
        // ── Step 3: Save upload ──────────────────────────────────────────
        let input_path = workspace.input_path(input_ext);
        let bytes = save_upload(reader, &input_path).await?;
        debug!(path = %input_path.display(), bytes, "Upload saved");

        let stem = workspace.id().to_string();
        let input_name = file_name_of(&input_path);

        // ── Step 4: Convert and locate ───────────────────────────────────
        let output = match route {
            ConversionRoute::Direct => {
                let invocation =
                    EngineInvocation::new(&input_path, target.directive(), workspace.path());
                self.run_phase(&invocation, ConversionPhase::Direct).await?;
                locate::find_output(workspace.path(), &stem, target.extension(), &[&input_name])
                    .await?
            }
            ConversionRoute::TwoPhase(step) => {
                self.convert_two_phase(workspace, &input_path, &stem, target, step)
                    .await?
            }
        };

        // ── Step 5: Persist ──────────────────────────────────────────────
        self.store
            .persist(&output, original_filename, target.extension())
            .await
    }

    async fn convert_two_phase(
        &self,
        workspace: &Workspace,
        input_path: &Path,
        stem: &str,
        target: &TargetFormat,
        step: &IntermediateStep,
    ) -> Result<PathBuf, DocConvError> {
        let input_name = file_name_of(input_path);

        let mut first = EngineInvocation::new(input_path, step.directive, workspace.path());
        if let Some(filter) = step.input_filter {
            first = first.with_input_filter(filter);
        }
        self.run_phase(&first, ConversionPhase::Intermediate).await?;

        let intermediate =
            locate::find_output(workspace.path(), stem, step.extension, &[&input_name])
                .await
                .map_err(|e| match e {
                    DocConvError::OutputNotFound { .. } => DocConvError::ConversionFailed {
                        phase: ConversionPhase::Intermediate,
                        detail: e.details().unwrap_or_default(),
                    },
                    other => other,
                })?;
        debug!(intermediate = %intermediate.display(), "Intermediate document located");

        let intermediate_name = file_name_of(&intermediate);
        let second = EngineInvocation::new(&intermediate, target.directive(), workspace.path());
        self.run_phase(&second, ConversionPhase::Final).await?;

        locate::find_output(
            workspace.path(),
            stem,
            target.extension(),
            &[&input_name, &intermediate_name],
        )
        .await
    }

    async fn run_phase(
        &self,
        invocation: &EngineInvocation,
        phase: ConversionPhase,
    ) -> Result<(), DocConvError> {
        let started = Instant::now();
        let run = self.engine.convert(invocation).await?;
        if !run.is_success() {
            warn!(
                phase = %phase,
                outcome = ?run.outcome,
                output = %run.output.trim(),
                "Engine run failed"
            );
            return Err(DocConvError::ConversionFailed {
                phase,
                detail: run.failure_detail(),
            });
        }
        debug!(
            phase = %phase,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Engine run succeeded"
        );
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

async fn save_upload<R>(mut reader: R, path: &Path) -> Result<u64, DocConvError>
where
    R: AsyncRead + Unpin + Send,
{
    let workspace_err = |e: std::io::Error| DocConvError::Workspace {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = tokio::fs::File::create(path).await.map_err(workspace_err)?;
    let bytes = tokio::io::copy(&mut reader, &mut file)
        .await
        .map_err(workspace_err)?;
    file.flush().await.map_err(workspace_err)?;
    Ok(bytes)
}

async fn read_text(path: &Path) -> Option<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read converted text");
            None
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `scheme://host/download/<percent-encoded segments>`.
pub fn download_url(origin: &RequestOrigin, relative: &str) -> String {
    let encoded: Vec<String> = relative
        .trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!(
        "{}://{}/download/{}",
        origin.scheme(),
        origin.host,
        encoded.join("/")
    )
}

/// Human-readable expiry time of an artifact persisted at `now`.
pub fn expiry_description(config: &ServiceConfig, now: DateTime<Local>) -> String {
    config
        .expiry
        .ttl()
        .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
        .and_then(|ttl| now.checked_add_signed(ttl))
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| NEVER_EXPIRES.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExpiryPolicy;
    use chrono::TimeZone;

    #[test]
    fn download_url_encodes_segments() {
        let origin = RequestOrigin::new(false, "localhost:15000");
        assert_eq!(
            download_url(&origin, "20240115/Q3 plan_1.pdf"),
            "http://localhost:15000/download/20240115/Q3%20plan_1.pdf"
        );

        let secure = RequestOrigin::new(true, "docs.example.com");
        assert!(download_url(&secure, "20240115/a_1.txt").starts_with("https://docs.example.com/"));
    }

    #[test]
    fn expiry_formats() {
        let now = Local.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();

        let config = ServiceConfig::builder()
            .expiry(ExpiryPolicy::from_hours(24))
            .build()
            .unwrap();
        assert_eq!(expiry_description(&config, now), "2024-01-16 10:00:00");

        let config = ServiceConfig::builder()
            .expiry(ExpiryPolicy::Never)
            .build()
            .unwrap();
        assert_eq!(expiry_description(&config, now), NEVER_EXPIRES);
    }

    #[test]
    fn expiry_past_calendar_range_does_not_panic() {
        let now = Local.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let config = ServiceConfig {
            expiry: ExpiryPolicy::from_hours(10_000_000_000),
            ..ServiceConfig::default()
        };
        assert_eq!(expiry_description(&config, now), NEVER_EXPIRES);
    }
}
