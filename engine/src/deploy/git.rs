//! Source checkout at a pinned commit

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::deploy::sink::LogSink;
use crate::errors::EngineError;
use crate::utils::short_commit;

/// Clone a repository into `dest` and check out the exact commit
pub async fn checkout_commit(
    repo_url: &str,
    commit_hash: &str,
    dest: &Path,
    sink: &LogSink,
) -> Result<(), EngineError> {
    sink.info(format!("Cloning repository: {}", repo_url));
    debug!("Cloning {} into {}", repo_url, dest.display());

    let output = Command::new("git")
        .args(["clone", repo_url])
        .arg(dest)
        .output()
        .await
        .map_err(|e| EngineError::SourceError(format!("failed to run git clone: {}", e)))?;

    if !output.status.success() {
        return Err(EngineError::SourceError(format!(
            "git clone failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    sink.info(format!("Checking out commit: {}", short_commit(commit_hash)));

    let output = Command::new("git")
        .arg("-C")
        .arg(dest)
        .args(["checkout", "--detach", commit_hash])
        .output()
        .await
        .map_err(|e| EngineError::SourceError(format!("failed to run git checkout: {}", e)))?;

    if !output.status.success() {
        return Err(EngineError::SourceError(format!(
            "git checkout of {} failed: {}",
            short_commit(commit_hash),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    sink.success("Source checkout complete");
    Ok(())
}
