//! Find the file the engine produced.
//!
//! The engine names its output after the input stem (`<uuid>.pdf` for
//! `<uuid>.docx`), but some filters append suffixes or change case. The exact
//! `<stem>.<ext>` name is preferred; otherwise the lexically first entry whose
//! name ends in `.<ext>` (ASCII case-insensitive) wins. Inputs of the current
//! phase are never returned, even when their extension matches.

use crate::error::DocConvError;
use std::path::{Path, PathBuf};

/// Locate the output with extension `ext` (no dot) in `dir`.
///
/// `stem` is the expected file stem; `exclude` lists file names that must not
/// be returned (the phase input). On failure the error carries the sorted
/// directory listing.
pub async fn find_output(
    dir: &Path,
    stem: &str,
    ext: &str,
    exclude: &[&str],
) -> Result<PathBuf, DocConvError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| DocConvError::Workspace {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DocConvError::Workspace {
            path: dir.to_path_buf(),
            source: e,
        })?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        names.push((entry.file_name().to_string_lossy().into_owned(), is_file));
    }
    names.sort();

    match pick_output(&names, stem, ext, exclude) {
        Some(name) => Ok(dir.join(name)),
        None => Err(DocConvError::OutputNotFound {
            extension: ext.to_string(),
            listing: names.into_iter().map(|(n, _)| n).collect(),
        }),
    }
}

fn pick_output<'a>(
    names: &'a [(String, bool)],
    stem: &str,
    ext: &str,
    exclude: &[&str],
) -> Option<&'a str> {
    let suffix = format!(".{}", ext.to_ascii_lowercase());
    let preferred = format!("{stem}{suffix}");

    let mut candidates = names
        .iter()
        .filter(|(name, is_file)| *is_file && !exclude.contains(&name.as_str()))
        .map(|(name, _)| name.as_str())
        .filter(|name| name.to_ascii_lowercase().ends_with(&suffix));

    let first = candidates.next()?;
    if first.eq_ignore_ascii_case(&preferred) {
        return Some(first);
    }
    Some(
        candidates
            .find(|name| name.eq_ignore_ascii_case(&preferred))
            .unwrap_or(first),
    )
}
