//! # soffice-locate
//!
//! Find a usable LibreOffice `soffice` executable and ask it for its version,
//! so that a service can decide at startup whether document conversion is
//! available at all.
//!
//! ## How it works
//!
//! [`locate_soffice`] resolves the configured program name in three steps
//! (first match wins):
//!
//! 1. The configured value contains a path separator → it must name an
//!    existing file; no searching is done.
//! 2. Every directory on `PATH` is checked for the bare program name
//!    (plus `.exe` on Windows).
//! 3. A short list of well-known install locations for the current platform.
//!
//! [`probe_version`] then runs `soffice --version` with a hard timeout and
//! returns the trimmed banner, e.g. `LibreOffice 7.5.3.2 50(Build:2)`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use soffice_locate::{locate_soffice, probe_version, DEFAULT_PROBE_TIMEOUT};
//!
//! let path = locate_soffice("soffice").expect("LibreOffice not installed");
//! let version = probe_version(&path, DEFAULT_PROBE_TIMEOUT).expect("probe failed");
//! println!("{} → {}", path.display(), version);
//! ```
//!
//! ## Platform support
//!
//! | OS      | Well-known locations                                   |
//! |---------|--------------------------------------------------------|
//! | Linux   | `/usr/bin`, `/usr/local/bin`, `/usr/lib/libreoffice/program`, `/opt/libreoffice*/program`, `/snap/bin` |
//! | macOS   | `/Applications/LibreOffice.app/Contents/MacOS`         |
//! | Windows | `C:\Program Files\LibreOffice\program`, `C:\Program Files (x86)\LibreOffice\program` |

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Program name used when nothing else is configured.
pub const DEFAULT_PROGRAM: &str = "soffice";

/// Upper bound for `soffice --version`. A cold start on a slow disk takes a
/// few seconds; anything beyond this is treated as a hung installation.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by soffice-locate operations.
#[derive(Error, Debug)]
pub enum LocateError {
    /// An explicit path was configured but nothing exists there.
    #[error("soffice executable not found at '{path}'")]
    MissingPath { path: PathBuf },

    /// The bare program name was not found on `PATH` or in any well-known location.
    #[error("'{program}' not found on PATH or in any well-known LibreOffice location")]
    NotFound { program: String },

    /// The executable exists but could not be started.
    #[error("failed to run '{path}': {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `--version` exited with a failure status.
    #[error("'{path}' --version exited with {status}: {output}")]
    ProbeFailed {
        path: PathBuf,
        status: String,
        output: String,
    },

    /// `--version` did not finish in time; the child was killed.
    #[error("'{path}' --version did not finish within {secs}s")]
    ProbeTimeout { path: PathBuf, secs: u64 },
}

// ── Internal: platform metadata ──────────────────────────────────────────────

fn executable_names(program: &str) -> Vec<String> {
    if cfg!(windows) && !program.to_ascii_lowercase().ends_with(".exe") {
        vec![format!("{program}.exe"), program.to_string()]
    } else {
        vec![program.to_string()]
    }
}

fn well_known_dirs() -> Vec<PathBuf> {
    match std::env::consts::OS {
        "linux" | "freebsd" | "openbsd" | "netbsd" => {
            let mut dirs = vec![
                PathBuf::from("/usr/bin"),
                PathBuf::from("/usr/local/bin"),
                PathBuf::from("/usr/lib/libreoffice/program"),
                PathBuf::from("/usr/lib64/libreoffice/program"),
                PathBuf::from("/snap/bin"),
            ];
            // Vendor tarballs install as /opt/libreofficeX.Y/program
            if let Ok(entries) = std::fs::read_dir("/opt") {
                let mut opt: Vec<PathBuf> = entries
                    .filter_map(Result::ok)
                    .filter(|e| e.file_name().to_string_lossy().starts_with("libreoffice"))
                    .map(|e| e.path().join("program"))
                    .collect();
                opt.sort();
                opt.reverse();
                dirs.extend(opt);
            }
            dirs
        }
        "macos" => vec![PathBuf::from("/Applications/LibreOffice.app/Contents/MacOS")],
        "windows" => vec![
            PathBuf::from(r"C:\Program Files\LibreOffice\program"),
            PathBuf::from(r"C:\Program Files (x86)\LibreOffice\program"),
        ],
        _ => Vec::new(),
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Resolve `program` to an existing executable path.
///
/// An empty `program` falls back to [`DEFAULT_PROGRAM`]. A bare name is looked
/// up on `PATH` first, then in the well-known install locations.
pub fn locate_soffice(program: &str) -> Result<PathBuf, LocateError> {
    let mut dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|v| std::env::split_paths(&v).collect())
        .unwrap_or_default();
    dirs.extend(well_known_dirs());
    locate_soffice_in(program, dirs)
}

/// Like [`locate_soffice`], but a bare name is only looked up in `dirs`.
pub fn locate_soffice_in<I>(program: &str, dirs: I) -> Result<PathBuf, LocateError>
where
    I: IntoIterator<Item = PathBuf>,
{
    let program = if program.trim().is_empty() {
        DEFAULT_PROGRAM
    } else {
        program.trim()
    };

    // Explicit path.
    if program.contains('/') || program.contains('\\') {
        let path = PathBuf::from(program);
        return if path.is_file() {
            Ok(path)
        } else {
            Err(LocateError::MissingPath { path })
        };
    }

    find_in_dirs(program, dirs).ok_or_else(|| LocateError::NotFound {
        program: program.to_string(),
    })
}

/// Run `<path> --version` and return the trimmed combined output.
///
/// The child is killed if it has not exited after `timeout`.
pub fn probe_version(path: &Path, timeout: Duration) -> Result<String, LocateError> {
    let mut child = Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| LocateError::Spawn {
            path: path.to_path_buf(),
            source: e,
        })?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(LocateError::ProbeTimeout {
                    path: path.to_path_buf(),
                    secs: timeout.as_secs(),
                });
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                return Err(LocateError::Spawn {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    };

    let mut text = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut text);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut text);
    }
    let text = text.trim().to_string();

    if !status.success() {
        return Err(LocateError::ProbeFailed {
            path: path.to_path_buf(),
            status: status.to_string(),
            output: text,
        });
    }

    Ok(text)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn find_in_dirs<I>(program: &str, dirs: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let names = executable_names(program);
    dirs.into_iter()
        .filter(|d| !d.as_os_str().is_empty())
        .flat_map(|d| names.iter().map(move |n| d.join(n)))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
