//! Adapter around the external LibreOffice converter.
//!
//! The engine is a black box that reads one file and writes zero or more files
//! into an output directory. It is unreliable in a specific way: it often exits
//! with status 0 after printing `Error: source file could not be loaded` or
//! `no export filter for ...`. [`classify_output`] turns exit status plus the
//! captured text into an [`EngineOutcome`] so that such soft failures are never
//! mistaken for success.
//!
//! [`DocumentEngine`] is the seam the orchestrator depends on; tests swap in a
//! scripted implementation instead of a real `soffice`.

use crate::error::DocConvError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Substrings that mark a run as failed even when the exit status is 0.
/// Matched case-sensitively against combined stdout and stderr.
pub const FAILURE_MARKERS: &[&str] = &["Error:", "error", "Failed", "failed", "no export filter"];

// ── Invocation ───────────────────────────────────────────────────────────────

/// One request to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    /// File to convert.
    pub input: PathBuf,
    /// Target directive passed to `--convert-to`, e.g. `pdf` or `txt:Text`.
    pub directive: String,
    /// Directory the engine writes into.
    pub out_dir: PathBuf,
    /// Optional import filter used to open `input`.
    pub input_filter: Option<String>,
}

impl EngineInvocation {
    pub fn new(
        input: impl Into<PathBuf>,
        directive: impl Into<String>,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            directive: directive.into(),
            out_dir: out_dir.into(),
            input_filter: None,
        }
    }

    pub fn with_input_filter(mut self, filter: impl Into<String>) -> Self {
        self.input_filter = Some(filter.into());
        self
    }

    /// Command-line arguments for `soffice`, in order.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["--headless".to_string()];
        if let Some(filter) = &self.input_filter {
            args.push(format!("--infilter={filter}"));
        }
        args.push("--convert-to".to_string());
        args.push(self.directive.clone());
        args.push(self.input.to_string_lossy().into_owned());
        args.push("--outdir".to_string());
        args.push(self.out_dir.to_string_lossy().into_owned());
        args
    }
}

// ── Outcome ──────────────────────────────────────────────────────────────────

/// How a finished engine run is classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Succeeded,
    /// Non-zero exit status (`None` when killed by a signal).
    ExitFailure { code: Option<i32> },
    /// Exit status 0 but the output contained a failure marker.
    ReportedFailure { marker: &'static str },
    /// The run exceeded the configured limit and was killed.
    TimedOut { after: Duration },
}

/// The classified result of one engine invocation.
#[derive(Debug, Clone)]
pub struct EngineRun {
    pub outcome: EngineOutcome,
    /// Combined stdout and stderr, decoded lossily.
    pub output: String,
}

impl EngineRun {
    pub fn is_success(&self) -> bool {
        self.outcome == EngineOutcome::Succeeded
    }

    /// Diagnostic text for a failed run.
    pub fn failure_detail(&self) -> String {
        let output = self.output.trim();
        match &self.outcome {
            EngineOutcome::Succeeded => output.to_string(),
            EngineOutcome::ExitFailure { code: Some(code) } => {
                format!("engine exited with status {code}: {output}")
            }
            EngineOutcome::ExitFailure { code: None } => {
                format!("engine terminated by signal: {output}")
            }
            EngineOutcome::ReportedFailure { .. } => format!("engine reported an error: {output}"),
            EngineOutcome::TimedOut { after } => {
                format!("engine did not finish within {}s", after.as_secs())
            }
        }
    }
}

/// Classify a finished run. Exit failure wins over marker detection.
pub fn classify_output(success: bool, code: Option<i32>, captured: &str) -> EngineOutcome {
    if !success {
        return EngineOutcome::ExitFailure { code };
    }
    match FAILURE_MARKERS.iter().copied().find(|m| captured.contains(m)) {
        Some(marker) => EngineOutcome::ReportedFailure { marker },
        None => EngineOutcome::Succeeded,
    }
}

/// Result of the startup probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAvailability {
    /// `path` is the executable that answered the probe.
    Available { path: PathBuf, version: String },
    Unavailable { reason: String },
}

impl EngineAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, EngineAvailability::Available { .. })
    }

    /// Version banner, or `"unknown"` when unavailable.
    pub fn version(&self) -> &str {
        match self {
            EngineAvailability::Available { version, .. } => version,
            EngineAvailability::Unavailable { .. } => "unknown",
        }
    }
}

// ── Engine trait ─────────────────────────────────────────────────────────────

/// Anything that can turn one file into another inside a directory.
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    /// Run one conversion and classify it.
    ///
    /// `Err` is reserved for "the engine could not be started at all"; every
    /// run that actually happened comes back as `Ok` with its outcome.
    async fn convert(&self, invocation: &EngineInvocation) -> Result<EngineRun, DocConvError>;

    /// Check whether the engine can run, e.g. by asking for its version.
    async fn probe(&self) -> EngineAvailability;
}

// ── LibreOffice implementation ───────────────────────────────────────────────

/// Runs the `soffice` executable as a child process.
#[derive(Debug, Clone)]
pub struct SofficeEngine {
    program: PathBuf,
    timeout: Duration,
    search_dirs: Option<Vec<PathBuf>>,
}

impl SofficeEngine {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            search_dirs: None,
        }
    }

    /// Look a bare program name up in `dirs` only, instead of `PATH` and the
    /// well-known install locations.
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = Some(dirs);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Probe the engine and, when it is available, rebind it to the executable
    /// the probe found so that conversions spawn the same binary.
    pub async fn resolved(self) -> (Self, EngineAvailability) {
        let availability = self.probe().await;
        let engine = match &availability {
            EngineAvailability::Available { path, .. } => Self {
                program: path.clone(),
                ..self
            },
            EngineAvailability::Unavailable { .. } => self,
        };
        (engine, availability)
    }
}

#[async_trait]
impl DocumentEngine for SofficeEngine {
    async fn convert(&self, invocation: &EngineInvocation) -> Result<EngineRun, DocConvError> {
        let args = invocation.args();
        debug!(program = %self.program.display(), args = ?args, "Running engine");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DocConvError::EngineUnavailable {
                reason: format!("failed to start '{}': {}", self.program.display(), e),
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(DocConvError::Internal(format!(
                    "failed waiting for engine: {e}"
                )))
            }
            Err(_) => {
                warn!(
                    input = %invocation.input.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "Engine timed out and was killed"
                );
                return Ok(EngineRun {
                    outcome: EngineOutcome::TimedOut {
                        after: self.timeout,
                    },
                    output: String::new(),
                });
            }
        };

        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));

        let outcome = classify_output(output.status.success(), output.status.code(), &captured);
        debug!(outcome = ?outcome, output = %captured.trim(), "Engine finished");
        Ok(EngineRun {
            outcome,
            output: captured,
        })
    }

    async fn probe(&self) -> EngineAvailability {
        let program = self.program.to_string_lossy().into_owned();
        let search_dirs = self.search_dirs.clone();
        let result = tokio::task::spawn_blocking(move || {
            let path = match search_dirs {
                Some(dirs) => soffice_locate::locate_soffice_in(&program, dirs)?,
                None => soffice_locate::locate_soffice(&program)?,
            };
            let version =
                soffice_locate::probe_version(&path, soffice_locate::DEFAULT_PROBE_TIMEOUT)?;
            Ok::<_, soffice_locate::LocateError>((path, version))
        })
        .await;

        match result {
            Ok(Ok((path, version))) => EngineAvailability::Available { path, version },
            Ok(Err(e)) => EngineAvailability::Unavailable {
                reason: e.to_string(),
            },
            Err(e) => EngineAvailability::Unavailable {
                reason: format!("probe task panicked: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_without_filter() {
        let inv = EngineInvocation::new("/w/in.docx", "pdf", "/w");
        assert_eq!(
            inv.args(),
            vec!["--headless", "--convert-to", "pdf", "/w/in.docx", "--outdir", "/w"]
        );
    }

    #[test]
    fn args_with_filter() {
        let inv =
            EngineInvocation::new("/w/in.pdf", "odt", "/w").with_input_filter("writer_pdf_import");
        assert_eq!(inv.args()[1], "--infilter=writer_pdf_import");
        assert_eq!(inv.args().len(), 7);
    }

    #[test]
    fn classify_clean_success() {
        let out = "convert /w/a.docx -> /w/a.pdf using filter : writer_pdf_Export\n";
        assert_eq!(classify_output(true, Some(0), out), EngineOutcome::Succeeded);
    }

    #[test]
    fn classify_soft_failures() {
        assert_eq!(
            classify_output(true, Some(0), "Error: source file could not be loaded"),
            EngineOutcome::ReportedFailure { marker: "Error:" }
        );
        assert!(matches!(
            classify_output(true, Some(0), "Export failed"),
            EngineOutcome::ReportedFailure { .. }
        ));
        assert!(matches!(
            classify_output(true, Some(0), "convert: no export filter for /w/a.txt"),
            EngineOutcome::ReportedFailure { .. }
        ));
    }

    #[test]
    fn markers_are_case_sensitive() {
        assert_eq!(classify_output(true, Some(0), "ERROR happened"), EngineOutcome::Succeeded);
        assert_eq!(classify_output(true, Some(0), "FAILED"), EngineOutcome::Succeeded);
    }

    #[test]
    fn exit_failure_wins() {
        assert_eq!(
            classify_output(false, Some(1), "Error: x"),
            EngineOutcome::ExitFailure { code: Some(1) }
        );
    }

    #[test]
    fn failure_detail_mentions_status() {
        let run = EngineRun {
            outcome: EngineOutcome::ExitFailure { code: Some(81) },
            output: "  boom \n".into(),
        };
        assert_eq!(run.failure_detail(), "engine exited with status 81: boom");
        assert!(!run.is_success());
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let engine = SofficeEngine::new("/nonexistent/soffice-4242", Duration::from_secs(5));
        let inv = EngineInvocation::new("/tmp/x.docx", "pdf", "/tmp");
        let err = engine.convert(&inv).await.unwrap_err();
        assert!(matches!(err, DocConvError::EngineUnavailable { .. }));

        assert!(!engine.probe().await.is_available());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scripted_engine_soft_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("soffice");
        std::fs::write(
            &script,
            b"#!/bin/sh\necho 'Error: source file could not be loaded'\nexit 0\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = SofficeEngine::new(&script, Duration::from_secs(10));
        let run = engine
            .convert(&EngineInvocation::new(dir.path().join("a.docx"), "pdf", dir.path()))
            .await
            .unwrap();
        assert_eq!(run.outcome, EngineOutcome::ReportedFailure { marker: "Error:" });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolved_engine_runs_the_located_binary() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let install = root.path().join("opt/libreoffice7.6/program");
        std::fs::create_dir_all(&install).unwrap();
        let script = install.join("soffice");
        std::fs::write(
            &script,
            b"#!/bin/sh\n[ \"$1\" = --version ] && echo 'LibreOffice 7.6 test' && exit 0\n\
              echo 'convert ok'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let (engine, availability) = SofficeEngine::new("soffice", Duration::from_secs(10))
            .with_search_dirs(vec![root.path().join("bin"), install.clone()])
            .resolved()
            .await;

        assert_eq!(
            availability,
            EngineAvailability::Available {
                path: script.clone(),
                version: "LibreOffice 7.6 test".to_string(),
            }
        );
        assert_eq!(engine.program(), script.as_path());

        let run = engine
            .convert(&EngineInvocation::new(root.path().join("a.docx"), "pdf", root.path()))
            .await
            .unwrap();
        assert!(run.is_success(), "{run:?}");
    }

    #[tokio::test]
    async fn unresolved_engine_keeps_configured_program() {
        let (engine, availability) = SofficeEngine::new("soffice", Duration::from_secs(5))
            .with_search_dirs(Vec::new())
            .resolved()
            .await;
        assert!(!availability.is_available());
        assert_eq!(engine.program(), Path::new("soffice"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scripted_engine_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("soffice");
        std::fs::write(&script, b"#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = SofficeEngine::new(&script, Duration::from_millis(200));
        let run = engine
            .convert(&EngineInvocation::new(dir.path().join("a.docx"), "pdf", dir.path()))
            .await
            .unwrap();
        assert!(matches!(run.outcome, EngineOutcome::TimedOut { .. }));
    }
}
