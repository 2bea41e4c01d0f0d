//! Per-run ephemeral workspace

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::EngineError;

/// Ephemeral local directory holding source and build artifacts for one run
///
/// Created before the build phase and removed after the run regardless of
/// outcome. `remove` is the normal path; `Drop` is the fallback when the
/// run unwinds without reaching it.
pub struct Workspace {
    root: PathBuf,
    removed: bool,
}

impl Workspace {
    /// Create a fresh workspace directory under `base`
    pub async fn create(base: &Path, deployment_id: Uuid) -> Result<Self, EngineError> {
        let root = base.join(format!(
            "deploy-{}-{}",
            deployment_id.simple(),
            Uuid::new_v4().simple()
        ));
        tokio::fs::create_dir_all(&root).await?;
        debug!("Created workspace: {}", root.display());
        Ok(Self {
            root,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Directory the source is checked out into; doubles as the build
    /// output directory, bind-mounted into the build container
    pub fn repo_dir(&self) -> PathBuf {
        self.root.join("repo")
    }

    /// Local staging path for the transfer archive
    pub fn archive_path(&self) -> PathBuf {
        self.root.join("artifact.tar.gz")
    }

    /// Remove the workspace directory
    pub async fn remove(mut self) {
        self.removed = true;
        if let Err(e) = tokio::fs::remove_dir_all(&self.root).await {
            warn!("Failed to remove workspace {}: {}", self.root.display(), e);
        } else {
            debug!("Removed workspace: {}", self.root.display());
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_workspace_removed_explicitly() {
        let base = std::env::temp_dir().join("slipway-ws-test");
        let ws = Workspace::create(&base, Uuid::new_v4()).await.unwrap();
        let path = ws.path().to_path_buf();
        assert!(path.exists());

        ws.remove().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_workspace_removed_on_drop() {
        let base = std::env::temp_dir().join("slipway-ws-test");
        let path = {
            let ws = Workspace::create(&base, Uuid::new_v4()).await.unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
