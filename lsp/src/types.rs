//! Configuration consumed by the server.
//!
//! `lichen-config` deserializes these from the user's config file; the
//! binary hands them to [`crate::Toolchain`], [`crate::ProcessEngineFactory`],
//! and [`crate::serve`].

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TOOLCHAIN_COMMAND: &str = "lsc";
const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_SEARCH_DIR_NAME: &str = "node_modules";

/// Configuration for the language server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LspConfig {
    pub toolchain: ToolchainConfig,
    pub analysis: AnalysisConfig,
    pub engine: EngineHostConfig,
}

/// How to locate the installed LichenScript toolchain.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Toolchain executable (e.g. "lsc").
    pub command: String,
    /// Runtime directory; skips discovery together with `std_dir`.
    pub runtime_dir: Option<PathBuf>,
    /// Standard library directory.
    pub std_dir: Option<PathBuf>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_TOOLCHAIN_COMMAND.to_string(),
            runtime_dir: None,
            std_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Idle window before a buffered edit is analyzed.
    pub debounce_ms: u64,
    /// Withhold completions while the session's last analysis had errors.
    pub require_clean_session: bool,
    /// Dependency directory name searched in every ancestor.
    pub search_dir_name: String,
}

impl AnalysisConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            require_clean_session: false,
            search_dir_name: DEFAULT_SEARCH_DIR_NAME.to_string(),
        }
    }
}

/// Engine host process. `command` falls back to the toolchain command.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineHostConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl EngineHostConfig {
    #[must_use]
    pub fn command<'a>(&'a self, toolchain: &'a ToolchainConfig) -> &'a str {
        self.command.as_deref().unwrap_or(&toolchain.command)
    }
}

impl Default for EngineHostConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: vec!["intellisense".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LspConfig::default();
        assert_eq!(config.toolchain.command, "lsc");
        assert_eq!(config.analysis.debounce(), Duration::from_millis(300));
        assert!(!config.analysis.require_clean_session);
        assert_eq!(config.analysis.search_dir_name, "node_modules");
        assert_eq!(config.engine.command(&config.toolchain), "lsc");
        assert_eq!(config.engine.args, ["intellisense"]);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: LspConfig = serde_json::from_value(serde_json::json!({
            "analysis": { "debounce_ms": 50 },
            "engine": { "command": "lsc-intellisense" }
        }))
        .unwrap();
        assert_eq!(config.analysis.debounce_ms, 50);
        assert_eq!(config.analysis.search_dir_name, "node_modules");
        assert_eq!(config.engine.command(&config.toolchain), "lsc-intellisense");
        assert_eq!(config.engine.args, ["intellisense"]);
    }

    #[test]
    fn test_toolchain_overrides() {
        let config: ToolchainConfig = serde_json::from_value(serde_json::json!({
            "runtime_dir": "/opt/lsc/runtime",
            "std_dir": "/opt/lsc/std"
        }))
        .unwrap();
        assert_eq!(config.command, "lsc");
        assert_eq!(config.std_dir, Some(PathBuf::from("/opt/lsc/std")));
    }
}
