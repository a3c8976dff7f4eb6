//! Shared helpers for integration tests: a scripted engine that never spawns
//! a process, and a service wired to temporary directories.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_docconv::{
    ConversionService, DocConvError, DocumentEngine, EngineAvailability, EngineInvocation,
    EngineOutcome, EngineRun, ServiceConfig, ServiceConfigBuilder,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// What the scripted engine does on each call.
#[derive(Debug, Clone)]
pub enum Script {
    /// Write `<input-stem>.<ext>` with a fixed body and report success.
    Produce,
    /// Exit 0 but print the given diagnostic text.
    SoftFail(&'static str),
    /// Exit non-zero.
    ExitFail(i32),
    /// Report success without writing anything.
    ProduceNothing,
    /// Fail only on the given call number (1-based), produce otherwise.
    FailOnCall(usize, &'static str),
}

/// A [`DocumentEngine`] that records every invocation.
pub struct ScriptedEngine {
    script: Script,
    delay: Duration,
    calls: Mutex<Vec<EngineInvocation>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Arc<Self> {
        Self::with_delay(script, Duration::ZERO)
    }

    pub fn with_delay(script: Script, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script,
            delay,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> Vec<EngineInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Body the scripted engine writes for a given invocation.
pub fn produced_body(inv: &EngineInvocation) -> String {
    format!(
        "converted {} to {}\n",
        inv.input.file_name().unwrap().to_string_lossy(),
        inv.directive
    )
}

fn produce(inv: &EngineInvocation) {
    let ext = inv.directive.split(':').next().unwrap().to_ascii_lowercase();
    let stem = inv.input.file_stem().unwrap().to_string_lossy().into_owned();
    let out = inv.out_dir.join(format!("{stem}.{ext}"));
    std::fs::write(out, produced_body(inv)).unwrap();
}

#[async_trait]
impl DocumentEngine for ScriptedEngine {
    async fn convert(&self, invocation: &EngineInvocation) -> Result<EngineRun, DocConvError> {
        let call_no = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(invocation.clone());
            calls.len()
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let (outcome, output) = match &self.script {
            Script::Produce => {
                produce(invocation);
                (EngineOutcome::Succeeded, "convert ok".to_string())
            }
            Script::SoftFail(text) => (
                edgequake_docconv::classify_output(true, Some(0), text),
                text.to_string(),
            ),
            Script::ExitFail(code) => (
                EngineOutcome::ExitFailure { code: Some(*code) },
                "crashed".to_string(),
            ),
            Script::ProduceNothing => (EngineOutcome::Succeeded, String::new()),
            Script::FailOnCall(n, text) if *n == call_no => (
                edgequake_docconv::classify_output(true, Some(0), text),
                text.to_string(),
            ),
            Script::FailOnCall(..) => {
                produce(invocation);
                (EngineOutcome::Succeeded, "convert ok".to_string())
            }
        };
        Ok(EngineRun { outcome, output })
    }

    async fn probe(&self) -> EngineAvailability {
        EngineAvailability::Available {
            path: "scripted-office".into(),
            version: "ScriptedOffice 1.0".to_string(),
        }
    }
}

/// Temporary data and tmp roots plus a service using them.
pub struct Harness {
    pub root: TempDir,
    pub service: Arc<ConversionService>,
    pub engine: Arc<ScriptedEngine>,
}

impl Harness {
    pub fn new(script: Script) -> Self {
        Self::build(ScriptedEngine::new(script), |b| b, true)
    }

    pub fn unavailable() -> Self {
        Self::build(ScriptedEngine::new(Script::Produce), |b| b, false)
    }

    pub fn build(
        engine: Arc<ScriptedEngine>,
        configure: impl FnOnce(ServiceConfigBuilder) -> ServiceConfigBuilder,
        available: bool,
    ) -> Self {
        init_tracing();
        let root = tempfile::tempdir().unwrap();
        let builder = ServiceConfig::builder()
            .data_dir(root.path().join("data"))
            .tmp_dir(root.path().join("tmp"));
        let config = Arc::new(configure(builder).build().unwrap());

        let availability = if available {
            EngineAvailability::Available {
                path: "scripted-office".into(),
                version: "ScriptedOffice 1.0".to_string(),
            }
        } else {
            EngineAvailability::Unavailable {
                reason: "soffice not found".to_string(),
            }
        };
        let service = Arc::new(ConversionService::new(
            config,
            engine.clone() as Arc<dyn DocumentEngine>,
            availability,
        ));
        Self {
            root,
            service,
            engine,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.path().join("data")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.path().join("tmp")
    }
}

/// Route library logs to the test harness; `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Names under `dir`, empty when `dir` does not exist.
pub fn entries(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(rd) => {
            let mut names: Vec<String> = rd
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
        Err(_) => Vec::new(),
    }
}
