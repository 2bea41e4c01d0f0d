//! Containerized build executor
//!
//! Runs the project's build command inside one throwaway container with a
//! memory ceiling and a CPU quota, streaming combined output to the log
//! sink. The container is force-removed after the run in all cases.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::deploy::git;
use crate::deploy::languages;
use crate::deploy::sink::LogSink;
use crate::deploy::PhaseReport;
use crate::errors::EngineError;

/// Build phase inputs
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Git repository URL
    pub repo_url: String,

    /// Commit to build
    pub commit_hash: String,

    /// Language key resolved against the static table
    pub language: String,

    /// Optional build command overriding the language default
    pub build_command: Option<String>,

    /// Workspace directory the source is checked out into and built in;
    /// bind-mounted into the container, so build output lands here too
    pub repo_dir: PathBuf,
}

/// Build executor options
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Container memory ceiling, docker syntax
    pub memory_limit: String,

    /// CPU quota as a fraction of one core
    pub cpu_quota: f64,

    /// CPU scheduling period in microseconds
    pub cpu_period_us: u64,

    /// Timeout for the container runtime preflight check
    pub runtime_timeout: Duration,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            memory_limit: "1g".to_string(),
            cpu_quota: 0.5,
            cpu_period_us: 100_000,
            runtime_timeout: Duration::from_secs(10),
        }
    }
}

/// Build phase seam, mocked in pipeline tests
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    async fn build(&self, request: &BuildRequest, sink: &LogSink)
        -> Result<PhaseReport, EngineError>;
}

/// Docker-backed build executor
pub struct ContainerBuildExecutor {
    options: BuildOptions,
}

impl ContainerBuildExecutor {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    /// Check the container runtime is reachable within a bounded timeout
    async fn preflight(&self) -> Result<(), EngineError> {
        let check = Command::new("docker")
            .args(["version", "--format", "{{.Server.Version}}"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match tokio::time::timeout(self.options.runtime_timeout, check).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(_)) => Err(EngineError::BuildError(
                "container runtime is not available".to_string(),
            )),
            Ok(Err(e)) => Err(EngineError::BuildError(format!(
                "failed to reach container runtime: {}",
                e
            ))),
            Err(_) => Err(EngineError::BuildError(format!(
                "container runtime did not respond within {:?}",
                self.options.runtime_timeout
            ))),
        }
    }

    async fn run_build_container(
        &self,
        request: &BuildRequest,
        image: &str,
        build_command: &str,
        sink: &LogSink,
    ) -> Result<(), EngineError> {
        let container_name = format!("slipway-build-{}", Uuid::new_v4().simple());
        let cpu_quota_us = (self.options.cpu_quota * self.options.cpu_period_us as f64) as u64;

        sink.info("Starting build container...");
        debug!("Build container: {} ({})", container_name, image);

        let result = self
            .stream_container(request, image, build_command, &container_name, cpu_quota_us, sink)
            .await;

        // Destroy the container on every path, mirroring a forced remove
        let removed = Command::new("docker")
            .args(["rm", "-f", &container_name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = removed {
            warn!("Failed to remove build container {}: {}", container_name, e);
        }

        result
    }

    async fn stream_container(
        &self,
        request: &BuildRequest,
        image: &str,
        build_command: &str,
        container_name: &str,
        cpu_quota_us: u64,
        sink: &LogSink,
    ) -> Result<(), EngineError> {
        let mount = format!("{}:/workspace", request.repo_dir.display());

        let mut child = Command::new("docker")
            .args(["run", "--name", container_name])
            .args(["-v", &mount, "-w", "/workspace"])
            .args(["--memory", &self.options.memory_limit])
            .args(["--cpu-period", &self.options.cpu_period_us.to_string()])
            .args(["--cpu-quota", &cpu_quota_us.to_string()])
            .args([image, "bash", "-c", build_command])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::BuildError(format!("failed to start container: {}", e)))?;

        // Stream both pipes into the sink; the sink channel serializes
        // arrival so persisted order matches emission order
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_task = stdout.map(|out| {
            let sink = sink.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    sink.info(line);
                }
            })
        });
        let stderr_task = stderr.map(|err| {
            let sink = sink.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(err).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    sink.info(line);
                }
            })
        });

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::BuildError(format!("container wait failed: {}", e)))?;

        // Let the readers flush remaining output before returning
        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        if !status.success() {
            return Err(EngineError::BuildError(format!(
                "build command exited with status {}",
                status.code().map_or_else(|| "unknown".to_string(), |c| c.to_string())
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl BuildExecutor for ContainerBuildExecutor {
    async fn build(
        &self,
        request: &BuildRequest,
        sink: &LogSink,
    ) -> Result<PhaseReport, EngineError> {
        let started = Instant::now();

        // Unknown language fails before any environment is touched
        let spec = languages::lookup(&request.language)?;
        let build_command = request
            .build_command
            .as_deref()
            .filter(|cmd| !cmd.trim().is_empty())
            .unwrap_or(spec.build_command);

        self.preflight().await?;

        git::checkout_commit(
            &request.repo_url,
            &request.commit_hash,
            &request.repo_dir,
            sink,
        )
        .await?;

        sink.info(format!("Using build image: {}", spec.image));
        sink.info(format!("Running build command: {}", build_command));

        self.run_build_container(request, spec.image, build_command, sink)
            .await?;

        sink.success("Build completed");
        Ok(PhaseReport {
            elapsed_secs: started.elapsed().as_secs() as i64,
        })
    }
}
