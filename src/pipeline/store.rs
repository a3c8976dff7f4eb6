//! Durable, date-partitioned artifact storage.
//!
//! Converted files land at `<root>/<YYYYMMDD>/<base>_<millis>.<ext>` where
//! `<base>` is the uploaded file name without directories or extension. The
//! relative part (`<YYYYMMDD>/<file>`) is the public download identifier.
//!
//! Files are created with create-new semantics, so two requests that finish in
//! the same millisecond with the same base name never overwrite each other:
//! the later one bumps its millisecond suffix.

use crate::error::DocConvError;
use crate::formats::base_file_name;
use chrono::{DateTime, TimeZone};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Copy buffer size used when persisting.
const COPY_BUFFER_BYTES: usize = 1024 * 1024;

/// How many suffixes to try before giving up on a name collision.
const MAX_NAME_ATTEMPTS: i64 = 64;

/// Base name used when the uploaded name has nothing usable left.
const FALLBACK_BASE: &str = "document";

/// A file written into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifact {
    /// Full path on disk.
    pub absolute: PathBuf,
    /// `YYYYMMDD/<file>`, always `/`-separated.
    pub relative: String,
    /// Final file name (`<base>_<millis>.<ext>`).
    pub file_name: String,
}

/// A download identifier resolved to an existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDownload {
    pub path: PathBuf,
    pub file_name: String,
    pub len: u64,
}

/// The artifact store rooted at the configured data directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `source` using the current local time.
    pub async fn persist(
        &self,
        source: &Path,
        original_filename: &str,
        ext: &str,
    ) -> Result<PersistedArtifact, DocConvError> {
        self.persist_at(source, original_filename, ext, &chrono::Local::now())
            .await
    }

    /// Persist `source` as if it were `now`. The date directory follows `now`'s
    /// time zone; the millisecond suffix is the Unix epoch value.
    pub async fn persist_at<Tz: TimeZone>(
        &self,
        source: &Path,
        original_filename: &str,
        ext: &str,
        now: &DateTime<Tz>,
    ) -> Result<PersistedArtifact, DocConvError> {
        let date = now.date_naive().format("%Y%m%d").to_string();
        let millis = now.timestamp_millis();
        let base = artifact_base_name(original_filename);
        let ext = ext.to_ascii_lowercase();
        let root = self.root.clone();
        let source = source.to_path_buf();

        let artifact = tokio::task::spawn_blocking(move || {
            persist_blocking(&root, &source, &date, &base, millis, &ext)
        })
        .await
        .map_err(|e| DocConvError::Internal(format!("Persist task panicked: {e}")))??;

        info!(
            path = %artifact.absolute.display(),
            relative = %artifact.relative,
            "Artifact persisted"
        );
        Ok(artifact)
    }

    /// Map a decoded download identifier to a stored file.
    ///
    /// Accepts `YYYYMMDD/<file>` or a bare `<file>` directly under the root.
    pub async fn resolve(&self, identifier: &str) -> Result<ResolvedDownload, DocConvError> {
        let relative = validate_identifier(identifier)?;
        let path = self.root.join(&relative);

        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Download target missing");
                return Err(DocConvError::NotFound {
                    identifier: identifier.to_string(),
                });
            }
            Err(e) => {
                return Err(DocConvError::Internal(format!(
                    "File access error for '{}': {e}",
                    path.display()
                )))
            }
        };

        if meta.is_dir() {
            return Err(DocConvError::BadPath {
                reason: "cannot download a directory".into(),
            });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(ResolvedDownload {
            path,
            file_name,
            len: meta.len(),
        })
    }
}

/// Uploaded name reduced to a bare base: directories and extension dropped.
pub fn artifact_base_name(original_filename: &str) -> String {
    let name = base_file_name(original_filename);
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };
    if stem.trim().is_empty() || stem == "." || stem == ".." {
        FALLBACK_BASE.to_string()
    } else {
        stem.to_string()
    }
}

/// Reject traversal and malformed identifiers; return the relative path.
fn validate_identifier(identifier: &str) -> Result<PathBuf, DocConvError> {
    let bad = |reason: &str| DocConvError::BadPath {
        reason: reason.to_string(),
    };

    let trimmed = identifier.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(bad("no file path given"));
    }
    if trimmed.contains('\\') {
        return Err(bad("backslashes are not allowed"));
    }
    if trimmed.contains('\0') {
        return Err(bad("NUL bytes are not allowed"));
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.len() > 2 {
        return Err(bad("expected <date>/<file> or <file>"));
    }
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == "..")
    {
        return Err(bad("path traversal is not allowed"));
    }

    let relative: PathBuf = segments.iter().collect();
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(bad("path traversal is not allowed"));
    }
    Ok(relative)
}

fn persist_blocking(
    root: &Path,
    source: &Path,
    date: &str,
    base: &str,
    millis: i64,
    ext: &str,
) -> Result<PersistedArtifact, DocConvError> {
    let date_dir = root.join(date);
    std::fs::create_dir_all(&date_dir).map_err(|e| DocConvError::PersistenceFailed {
        path: date_dir.clone(),
        source: e,
    })?;

    let input = File::open(source).map_err(|e| DocConvError::PersistenceFailed {
        path: source.to_path_buf(),
        source: e,
    })?;

    let (file_name, absolute, out) = create_unique(&date_dir, base, millis, ext)?;

    let fail = |e: std::io::Error| DocConvError::PersistenceFailed {
        path: absolute.clone(),
        source: e,
    };

    let mut reader = BufReader::with_capacity(COPY_BUFFER_BYTES, input);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_BYTES, out);
    let copied = std::io::copy(&mut reader, &mut writer);
    let result = copied
        .and_then(|_| writer.flush())
        .and_then(|_| writer.get_ref().sync_all());

    if let Err(e) = result {
        drop(writer);
        let _ = std::fs::remove_file(&absolute);
        return Err(fail(e));
    }

    Ok(PersistedArtifact {
        relative: format!("{date}/{file_name}"),
        absolute,
        file_name,
    })
}

fn create_unique(
    dir: &Path,
    base: &str,
    millis: i64,
    ext: &str,
) -> Result<(String, PathBuf, File), DocConvError> {
    let mut last_path = dir.to_path_buf();
    let mut recreated = false;
    let mut bump = 0;
    while bump < MAX_NAME_ATTEMPTS {
        let file_name = format!("{base}_{}.{ext}", millis + bump);
        let path = dir.join(&file_name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file_name, path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "Artifact name taken, bumping suffix");
                last_path = path;
                bump += 1;
            }
            // An expiry sweep may prune the freshly created date directory.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !recreated => {
                debug!(dir = %dir.display(), "Date directory vanished, recreating");
                std::fs::create_dir_all(dir).map_err(|e| DocConvError::PersistenceFailed {
                    path: dir.to_path_buf(),
                    source: e,
                })?;
                recreated = true;
            }
            Err(e) => return Err(DocConvError::PersistenceFailed { path, source: e }),
        }
    }
    Err(DocConvError::PersistenceFailed {
        path: last_path,
        source: std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "no free artifact name",
        ),
    })
}
