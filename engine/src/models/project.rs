//! Project models

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::EngineError;

/// SSH credential for the target host, key file preferred over password
#[derive(Debug, Clone)]
pub enum Credential {
    KeyFile(PathBuf),
    Password(SecretString),
}

/// Project snapshot, read-only during a deployment run
///
/// Deserialize-only: the password field must never be written back out
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    /// Unique project ID
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Git repository URL
    pub repo_url: String,

    /// Language key: java, python, node, go
    pub language: String,

    /// Custom build command overriding the language default
    #[serde(default)]
    pub build_command: Option<String>,

    /// Deploy path on the target host
    pub deploy_path: String,

    /// Command to restart the application after activation
    #[serde(default)]
    pub restart_command: Option<String>,

    /// Target host address
    pub target_host: String,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub target_port: u16,

    /// SSH username
    pub target_username: String,

    /// Path to an SSH private key file
    #[serde(default)]
    pub ssh_key_path: Option<PathBuf>,

    /// SSH password, used only when no key file is configured
    #[serde(default)]
    pub ssh_password: Option<SecretString>,
}

fn default_ssh_port() -> u16 {
    22
}

impl Project {
    /// Resolve the SSH credential, preferring the key file
    pub fn credential(&self) -> Result<Credential, EngineError> {
        if let Some(path) = &self.ssh_key_path {
            return Ok(Credential::KeyFile(path.clone()));
        }
        if let Some(password) = &self.ssh_password {
            return Ok(Credential::Password(password.clone()));
        }
        Err(EngineError::ConfigError(format!(
            "project {} has neither an SSH key path nor a password",
            self.name
        )))
    }
}
