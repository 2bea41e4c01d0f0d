//! Artifact transfer and activation over SSH
//!
//! Packages the build output into one archive, uploads it to the target
//! host, extracts it at the deploy path, normalizes permissions, and runs
//! the restart command. Remote access goes through the ssh/scp CLIs
//! (key file preferred, password via sshpass) with a bounded connect
//! timeout; every subprocess is scoped to the call.

use std::path::PathBuf;
use std::process::Output;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use tokio::process::Command;
use tracing::debug;

use crate::deploy::sink::LogSink;
use crate::deploy::PhaseReport;
use crate::errors::EngineError;
use crate::models::project::Credential;

const ARCHIVE_NAME: &str = "slipway-artifact.tar.gz";

/// Transfer phase inputs
pub struct TransferRequest {
    /// Local directory holding the build output
    pub artifact_dir: PathBuf,

    /// Local staging path for the archive, inside the run workspace
    pub archive_path: PathBuf,

    /// Target host address
    pub host: String,

    /// SSH port
    pub port: u16,

    /// SSH username
    pub username: String,

    /// SSH credential
    pub credential: Credential,

    /// Deploy path on the target host
    pub deploy_path: String,

    /// Optional restart command run after activation
    pub restart_command: Option<String>,
}

/// Transfer executor options
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// SSH connect timeout
    pub connect_timeout: Duration,

    /// Delay after the restart command, letting the application come up
    pub settle_delay: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// Transfer phase seam, mocked in pipeline tests
#[async_trait]
pub trait ArtifactTransfer: Send + Sync {
    async fn transfer(
        &self,
        request: &TransferRequest,
        sink: &LogSink,
    ) -> Result<PhaseReport, EngineError>;
}

/// SSH-backed transfer executor
pub struct SshTransfer {
    options: TransferOptions,
}

impl SshTransfer {
    pub fn new(options: TransferOptions) -> Self {
        Self { options }
    }

    fn destination(request: &TransferRequest) -> String {
        format!("{}@{}", request.username, request.host)
    }

    fn common_options(&self, credential: &Credential) -> Vec<String> {
        let mut opts = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.options.connect_timeout.as_secs()),
        ];
        if let Credential::KeyFile(path) = credential {
            opts.push("-o".to_string());
            opts.push("BatchMode=yes".to_string());
            opts.push("-i".to_string());
            opts.push(path.display().to_string());
        }
        opts
    }

    /// Base ssh/scp command, wrapped in sshpass for password credentials
    fn base_command(program: &str, credential: &Credential) -> Command {
        match credential {
            Credential::Password(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.args(["-p", password.expose_secret(), program]);
                cmd
            }
            Credential::KeyFile(_) => Command::new(program),
        }
    }

    async fn run_remote(
        &self,
        request: &TransferRequest,
        remote_command: &str,
    ) -> std::io::Result<Output> {
        debug!("Remote command on {}: {}", request.host, remote_command);
        let mut cmd = Self::base_command("ssh", &request.credential);
        cmd.args(["-p", &request.port.to_string()])
            .args(self.common_options(&request.credential))
            .arg(Self::destination(request))
            .arg(remote_command);
        cmd.output().await
    }

    async fn establish_session(
        &self,
        request: &TransferRequest,
        sink: &LogSink,
    ) -> Result<(), EngineError> {
        sink.info(format!(
            "Connecting to {}:{}",
            request.host, request.port
        ));

        let output = self
            .run_remote(request, "true")
            .await
            .map_err(|e| EngineError::ConnectionError(format!("failed to run ssh: {}", e)))?;

        if !output.status.success() {
            return Err(EngineError::ConnectionError(format!(
                "SSH session to {}:{} failed: {}",
                request.host,
                request.port,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        sink.success("SSH session established");
        Ok(())
    }

    async fn ensure_deploy_path(
        &self,
        request: &TransferRequest,
        sink: &LogSink,
    ) -> Result<(), EngineError> {
        sink.info(format!("Ensuring deploy path exists: {}", request.deploy_path));

        let output = self
            .run_remote(request, &format!("mkdir -p '{}'", request.deploy_path))
            .await
            .map_err(|e| EngineError::TransferError(format!("failed to run ssh: {}", e)))?;

        if !output.status.success() {
            return Err(EngineError::TransferError(format!(
                "failed to create deploy path {}: {}",
                request.deploy_path,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Best-effort backup of the current version; failure is a warning only
    async fn backup_current_version(&self, request: &TransferRequest, sink: &LogSink) {
        let listing = match self
            .run_remote(request, &format!("ls -A '{}'", request.deploy_path))
            .await
        {
            Ok(output) if output.status.success() => output.stdout,
            Ok(output) => {
                sink.error(format!(
                    "Backup skipped, could not inspect deploy path: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ));
                return;
            }
            Err(e) => {
                sink.error(format!("Backup skipped, could not inspect deploy path: {}", e));
                return;
            }
        };

        if String::from_utf8_lossy(&listing).trim().is_empty() {
            // Nothing deployed yet
            return;
        }

        let backup_path = backup_sibling(&request.deploy_path, &Utc::now().format("%Y%m%d_%H%M%S").to_string());
        sink.info(format!("Backing up current version to: {}", backup_path));

        let result = self
            .run_remote(
                request,
                &format!("cp -r '{}' '{}'", request.deploy_path, backup_path),
            )
            .await;

        match result {
            Ok(output) if output.status.success() => {
                sink.success("Backup created");
            }
            Ok(output) => {
                sink.error(format!(
                    "Backup failed, continuing without it: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ));
            }
            Err(e) => {
                sink.error(format!("Backup failed, continuing without it: {}", e));
            }
        }
    }

    async fn upload_artifacts(
        &self,
        request: &TransferRequest,
        sink: &LogSink,
    ) -> Result<(), EngineError> {
        // Package the artifact directory into one archive
        let output = Command::new("tar")
            .arg("-czf")
            .arg(&request.archive_path)
            .arg("-C")
            .arg(&request.artifact_dir)
            .arg(".")
            .output()
            .await
            .map_err(|e| EngineError::TransferError(format!("failed to run tar: {}", e)))?;

        if !output.status.success() {
            return Err(EngineError::TransferError(format!(
                "failed to package artifacts: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        sink.info("Uploading build artifacts");

        let remote_archive = format!(
            "{}:{}/{}",
            Self::destination(request),
            request.deploy_path,
            ARCHIVE_NAME
        );
        let mut cmd = Self::base_command("scp", &request.credential);
        cmd.args(["-P", &request.port.to_string()])
            .args(self.common_options(&request.credential))
            .arg(&request.archive_path)
            .arg(&remote_archive);
        let output = cmd
            .output()
            .await
            .map_err(|e| EngineError::TransferError(format!("failed to run scp: {}", e)))?;

        if !output.status.success() {
            return Err(EngineError::TransferError(format!(
                "artifact upload failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // Extract remotely and drop the archive
        let extract = format!(
            "cd '{}' && tar -xzf {} && rm {}",
            request.deploy_path, ARCHIVE_NAME, ARCHIVE_NAME
        );
        let output = self
            .run_remote(request, &extract)
            .await
            .map_err(|e| EngineError::TransferError(format!("failed to run ssh: {}", e)))?;

        if !output.status.success() {
            return Err(EngineError::TransferError(format!(
                "artifact extraction failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        sink.success("Artifacts uploaded and extracted");
        Ok(())
    }

    /// Normalize permissions: dirs 755, files 644, shell scripts 755
    async fn set_permissions(&self, request: &TransferRequest, sink: &LogSink) {
        sink.info("Normalizing file permissions");

        let path = &request.deploy_path;
        let commands = [
            format!("find '{}' -type d -exec chmod 755 {{}} +", path),
            format!("find '{}' -type f -exec chmod 644 {{}} +", path),
            format!("find '{}' -name '*.sh' -exec chmod 755 {{}} +", path),
        ];

        for command in &commands {
            match self.run_remote(request, command).await {
                Ok(output) if output.status.success() => {}
                Ok(output) => {
                    sink.error(format!(
                        "Permission update warning: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    ));
                }
                Err(e) => {
                    sink.error(format!("Permission update warning: {}", e));
                }
            }
        }
    }

    async fn run_restart(
        &self,
        request: &TransferRequest,
        sink: &LogSink,
    ) -> Result<(), EngineError> {
        let Some(command) = request
            .restart_command
            .as_deref()
            .filter(|cmd| !cmd.trim().is_empty())
        else {
            return Ok(());
        };

        sink.info(format!("Running restart command: {}", command));

        let output = self
            .run_remote(request, command)
            .await
            .map_err(|e| EngineError::TransferError(format!("failed to run ssh: {}", e)))?;

        // Restart stderr is a warning, never an error
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            sink.error(format!("Restart command warning: {}", stderr.trim()));
        }

        sink.info("Waiting for application to settle...");
        tokio::time::sleep(self.options.settle_delay).await;
        Ok(())
    }
}

/// Timestamped sibling path the current version is backed up to
fn backup_sibling(deploy_path: &str, timestamp: &str) -> String {
    format!("{}_backup_{}", deploy_path.trim_end_matches('/'), timestamp)
}

#[async_trait]
impl ArtifactTransfer for SshTransfer {
    async fn transfer(
        &self,
        request: &TransferRequest,
        sink: &LogSink,
    ) -> Result<PhaseReport, EngineError> {
        let started = Instant::now();

        // Ordered steps, each gating the next
        self.establish_session(request, sink).await?;
        self.ensure_deploy_path(request, sink).await?;
        self.backup_current_version(request, sink).await;
        self.upload_artifacts(request, sink).await?;
        self.set_permissions(request, sink).await;
        self.run_restart(request, sink).await?;

        let elapsed_secs = started.elapsed().as_secs() as i64;
        sink.success(format!("Transfer completed in {} seconds", elapsed_secs));
        Ok(PhaseReport { elapsed_secs })
    }
}
