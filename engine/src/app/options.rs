//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::build::BuildOptions;
use crate::deploy::pipeline::PipelineOptions;
use crate::deploy::transfer::TransferOptions;
use crate::hub::HubOptions;
use crate::storage::settings::Settings;
use crate::workers::runner;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Directory per-run workspaces are created under
    pub workspace_root: PathBuf,

    /// Task runner options
    pub runner: runner::Options,

    /// Log hub options
    pub hub: HubOptions,

    /// Build executor options
    pub build: BuildOptions,

    /// Transfer executor options
    pub transfer: TransferOptions,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("slipway"),
            runner: runner::Options::default(),
            hub: HubOptions::default(),
            build: BuildOptions::default(),
            transfer: TransferOptions::default(),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

impl AppOptions {
    /// Derive options from the settings file
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        Self {
            workspace_root: settings
                .workspace_root
                .clone()
                .unwrap_or(defaults.workspace_root),
            runner: runner::Options {
                worker_count: settings.runner.worker_count,
                queue_capacity: settings.runner.queue_capacity,
                max_deliveries: settings.runner.max_deliveries,
            },
            hub: HubOptions::default(),
            build: BuildOptions {
                memory_limit: settings.build.memory_limit.clone(),
                cpu_quota: settings.build.cpu_quota,
                ..BuildOptions::default()
            },
            transfer: TransferOptions {
                connect_timeout: Duration::from_secs(settings.transfer.connect_timeout_secs),
                settle_delay: Duration::from_secs(settings.transfer.settle_delay_secs),
            },
            max_shutdown_delay: defaults.max_shutdown_delay,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            workspace_root: self.workspace_root.clone(),
        }
    }
}
