//! Toolchain discovery.
//!
//! Sessions need the runtime and standard-library directories of an
//! installed toolchain. The toolchain reports them itself via
//! `<cmd> --runtime-path` and `<cmd> --std-path`.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;

use crate::types::ToolchainConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prerequisites {
    pub runtime_dir: PathBuf,
    pub std_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum PrerequisiteError {
    #[error("{command} not found in PATH")]
    NotInstalled {
        command: String,
        #[source]
        source: which::Error,
    },
    #[error("running {command} {flag}")]
    Spawn {
        command: String,
        flag: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} {flag} exited with {status}")]
    Failed {
        command: String,
        flag: &'static str,
        status: ExitStatus,
    },
    #[error("{command} {flag} printed no path")]
    Empty { command: String, flag: &'static str },
}

/// Source of [`Prerequisites`].
#[allow(async_fn_in_trait)]
pub trait Discover {
    async fn discover(&self) -> Result<Prerequisites, PrerequisiteError>;
}

/// Probes the installed toolchain, honoring configured overrides.
#[derive(Debug, Clone)]
pub struct Toolchain {
    command: String,
    runtime_dir: Option<PathBuf>,
    std_dir: Option<PathBuf>,
}

impl Toolchain {
    #[must_use]
    pub fn new(config: &ToolchainConfig) -> Self {
        Self {
            command: config.command.clone(),
            runtime_dir: config.runtime_dir.clone(),
            std_dir: config.std_dir.clone(),
        }
    }

    async fn query(&self, flag: &'static str) -> Result<PathBuf, PrerequisiteError> {
        let resolved = which::which(&self.command).map_err(|source| {
            PrerequisiteError::NotInstalled {
                command: self.command.clone(),
                source,
            }
        })?;

        let output = Command::new(&resolved)
            .arg(flag)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|source| PrerequisiteError::Spawn {
                command: self.command.clone(),
                flag,
                source,
            })?;

        if !output.status.success() {
            return Err(PrerequisiteError::Failed {
                command: self.command.clone(),
                flag,
                status: output.status,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout.trim_end_matches(['\r', '\n']);
        if path.trim().is_empty() {
            return Err(PrerequisiteError::Empty {
                command: self.command.clone(),
                flag,
            });
        }
        Ok(PathBuf::from(path))
    }
}

impl Discover for Toolchain {
    async fn discover(&self) -> Result<Prerequisites, PrerequisiteError> {
        let runtime_dir = match &self.runtime_dir {
            Some(dir) => dir.clone(),
            None => self.query("--runtime-path").await?,
        };
        let std_dir = match &self.std_dir {
            Some(dir) => dir.clone(),
            None => self.query("--std-path").await?,
        };
        tracing::info!(
            runtime_dir = %runtime_dir.display(),
            std_dir = %std_dir.display(),
            "Toolchain discovered"
        );
        Ok(Prerequisites {
            runtime_dir,
            std_dir,
        })
    }
}
