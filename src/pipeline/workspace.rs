//! Request-scoped scratch directories.
//!
//! Every conversion runs inside its own `<tmp_root>/work_<uuid>` directory so
//! concurrent requests never see each other's files, and the engine's habit of
//! leaving lock files and logs behind cannot leak between requests.
//!
//! Removal happens exactly once: [`Workspace::destroy`] consumes the value, and
//! the `Drop` impl only acts if `destroy` never ran (early return through `?`,
//! a panic, or the request future being dropped). Removal failures are logged
//! and swallowed.

use crate::error::DocConvError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// An isolated scratch directory owned by one request.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    destroyed: bool,
}

impl Workspace {
    /// Create `<tmp_root>/work_<id>`, creating `tmp_root` if needed.
    pub async fn create(tmp_root: &Path, id: Uuid) -> Result<Self, DocConvError> {
        let dir = tmp_root.join(format!("work_{id}"));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DocConvError::Workspace {
                path: dir.clone(),
                source: e,
            })?;
        debug!(workspace = %dir.display(), "Workspace created");
        Ok(Self {
            id,
            dir,
            destroyed: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path for the saved upload: `<uuid><ext>`, never the user-supplied name.
    pub fn input_path(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("{}{}", self.id, extension))
    }

    /// Sorted names of every entry in the workspace.
    pub async fn list(&self) -> Result<Vec<String>, DocConvError> {
        let mut entries =
            tokio::fs::read_dir(&self.dir)
                .await
                .map_err(|e| DocConvError::Workspace {
                    path: self.dir.clone(),
                    source: e,
                })?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DocConvError::Workspace {
                path: self.dir.clone(),
                source: e,
            })?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Recursively remove the workspace. Best-effort: failures are logged only.
    pub async fn destroy(mut self) {
        self.destroyed = true;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(workspace = %self.dir.display(), "Workspace removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                workspace = %self.dir.display(),
                error = %e,
                "Failed to remove workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(workspace = %self.dir.display(), "Workspace removed on drop"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                workspace = %self.dir.display(),
                error = %e,
                "Failed to remove workspace on drop"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_destroy() {
        let root = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let ws = Workspace::create(root.path(), id).await.unwrap();

        let expected = root.path().join(format!("work_{id}"));
        assert_eq!(ws.path(), expected);
        assert!(expected.is_dir());
        assert_eq!(ws.input_path(".docx"), expected.join(format!("{id}.docx")));

        tokio::fs::write(ws.input_path(".docx"), b"x").await.unwrap();
        tokio::fs::create_dir(ws.path().join("nested")).await.unwrap();
        assert_eq!(ws.list().await.unwrap().len(), 2);

        ws.destroy().await;
        assert!(!expected.exists());
    }

    #[tokio::test]
    async fn drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let ws = Workspace::create(root.path(), Uuid::new_v4()).await.unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn destroy_tolerates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), Uuid::new_v4()).await.unwrap();
        std::fs::remove_dir_all(ws.path()).unwrap();
        ws.destroy().await;
    }
}
