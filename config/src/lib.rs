//! Configuration file discovery and parsing for the Lichen language server.
//!
//! The file is TOML, read from `$LICHEN_CONFIG` or `~/.lichen/config.toml`.
//! A missing file means defaults. `${VAR}` references in command and path
//! values are expanded from the environment.

use std::env;
use std::path::{Path, PathBuf};

use lichen_lsp::LspConfig;
use serde::Deserialize;

const CONFIG_ENV: &str = "LICHEN_CONFIG";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LichenConfig {
    /// `[toolchain]`, `[analysis]` and `[engine]` tables.
    #[serde(flatten)]
    pub lsp: LspConfig,
    pub log: LogConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    pub filter: Option<String>,
    /// Log file; replaces the default location.
    pub file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(end_rel) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + end_rel];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + end_rel + 1..];
    }

    out.push_str(rest);
    out
}

fn expand_path(path: &mut Option<PathBuf>) {
    if let Some(value) = path
        && let Some(raw) = value.to_str()
    {
        *value = PathBuf::from(expand_env_vars(raw));
    }
}

impl LichenConfig {
    /// Load the config file if there is one.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {}: {source}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::parse(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {}: {source}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        config.expand();
        Ok(config)
    }

    fn expand(&mut self) {
        let toolchain = &mut self.lsp.toolchain;
        toolchain.command = expand_env_vars(&toolchain.command);
        expand_path(&mut toolchain.runtime_dir);
        expand_path(&mut toolchain.std_dir);
        if let Some(command) = &mut self.lsp.engine.command {
            *command = expand_env_vars(command);
        }
        expand_path(&mut self.log.file);
    }
}

/// `$LICHEN_CONFIG` if set, else `~/.lichen/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os(CONFIG_ENV)
        && !explicit.is_empty()
    {
        return Some(PathBuf::from(explicit));
    }
    dirs::home_dir().map(|home| home.join(".lichen").join("config.toml"))
}
