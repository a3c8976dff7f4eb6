//! End-to-end tests against a real LibreOffice installation.
//!
//! Gated behind `E2E_ENABLED` so they do not run in CI unless explicitly
//! requested. `SOFFICE_PATH` selects the executable (default: `soffice`).
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use edgequake_docconv::{
    ConversionRequest, ConversionResult, ConversionService, RequestOrigin, ServiceConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set and the engine probes OK.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let live = Live::start().await;
        if !live.service.availability().is_available() {
            println!("SKIP: LibreOffice not usable: {:?}", live.service.availability());
            return;
        }
        live
    }};
}

struct Live {
    _root: TempDir,
    service: ConversionService,
}

impl Live {
    async fn start() -> Self {
        let root = tempfile::tempdir().unwrap();
        let soffice = std::env::var("SOFFICE_PATH").unwrap_or_else(|_| "soffice".to_string());
        let config = ServiceConfig::builder()
            .soffice_path(PathBuf::from(soffice))
            .data_dir(root.path().join("data"))
            .tmp_dir(root.path().join("tmp"))
            .engine_timeout(Duration::from_secs(180))
            .build()
            .unwrap();
        let service = ConversionService::start(Arc::new(config)).await;
        Self {
            _root: root,
            service,
        }
    }

    async fn convert(&self, body: &[u8], filename: &str, format: &str) -> ConversionResult {
        let request = ConversionRequest {
            reader: body,
            filename: filename.to_string(),
            format: Some(format.to_string()),
        };
        self.service
            .convert(request, &RequestOrigin::new(false, "localhost:15000"))
            .await
            .unwrap_or_else(|e| panic!("{filename} -> {format}: {e} ({:?})", e.details()))
    }

    async fn read(&self, result: &ConversionResult) -> Vec<u8> {
        let resolved = self
            .service
            .resolve_download(&result.download_filename)
            .await
            .unwrap();
        std::fs::read(resolved.path).unwrap()
    }
}

const SAMPLE_TEXT: &str = "Quarterly report\n\nRevenue grew in every region.\n";

const SAMPLE_HTML: &str = "<!DOCTYPE html><html><head><title>Notes</title></head>\
    <body><h1>Meeting notes</h1><p>Ship the converter on Friday.</p></body></html>";

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_txt_to_pdf() {
    let live = e2e_skip_unless_ready!();

    let result = live.convert(SAMPLE_TEXT.as_bytes(), "report.txt", "pdf").await;
    assert!(result.download_filename.ends_with(".pdf"));
    assert!(result.text.is_none());

    let bytes = live.read(&result).await;
    assert!(bytes.starts_with(b"%PDF"), "not a PDF");
    println!("✓ {} ({} bytes)", result.download_filename, bytes.len());
}

#[tokio::test]
async fn test_html_to_txt() {
    let live = e2e_skip_unless_ready!();

    let result = live.convert(SAMPLE_HTML.as_bytes(), "notes.html", "txt").await;
    let text = result.text.expect("txt conversion returns text");
    assert!(text.contains("Ship the converter"), "{text}");
}

#[tokio::test]
async fn test_txt_to_docx() {
    let live = e2e_skip_unless_ready!();

    let result = live.convert(SAMPLE_TEXT.as_bytes(), "report.txt", "docx").await;
    let bytes = live.read(&result).await;
    assert!(bytes.starts_with(b"PK"), "docx is a zip container");
}

#[tokio::test]
async fn test_pdf_to_txt_round_trip() {
    let live = e2e_skip_unless_ready!();

    let pdf = live.convert(SAMPLE_TEXT.as_bytes(), "report.txt", "pdf").await;
    let pdf_bytes = live.read(&pdf).await;

    let result = live.convert(&pdf_bytes, "report.pdf", "txt").await;
    let text = result.text.expect("txt conversion returns text");
    assert!(text.contains("Revenue grew"), "{text}");
    println!("✓ PDF → odt → txt: {} chars", text.len());
}

#[tokio::test]
async fn test_workspace_is_cleaned() {
    let live = e2e_skip_unless_ready!();

    live.convert(SAMPLE_TEXT.as_bytes(), "report.txt", "odt").await;

    let tmp = live.service.config().tmp_dir.clone();
    let leftovers: Vec<_> = std::fs::read_dir(&tmp)
        .map(|rd| rd.filter_map(Result::ok).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "workspaces left in {}", tmp.display());
}
