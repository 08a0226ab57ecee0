//! lichen-ls - LichenScript language server binary.
//!
//! Speaks LSP over stdio. Logs go to `~/.lichen/logs/lichen-ls.log` (or the
//! file named in config) because stdout carries the protocol.

use std::{
    env,
    fs::{self, OpenOptions},
    path::PathBuf,
    process::ExitCode,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lichen_config::{ConfigError, LichenConfig, LogConfig, config_path};
use lichen_lsp::{LocalFileSystem, ProcessEngineFactory, SessionCache, Toolchain, serve};

const LOG_FILE_NAME: &str = "lichen-ls.log";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    if env::args().skip(1).any(|arg| arg == "--version" || arg == "-V") {
        println!("lichen-ls {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let (config, config_error) = match LichenConfig::load() {
        Ok(config) => (config.unwrap_or_default(), None),
        Err(e) => (LichenConfig::default(), Some(e)),
    };

    init_tracing(&config.log, config_error.as_ref());

    let lsp = config.lsp;
    let filesystem = Arc::new(LocalFileSystem);
    let factory = ProcessEngineFactory::new(&lsp);
    let toolchain = Toolchain::new(&lsp.toolchain);
    let sessions = SessionCache::new(factory, toolchain, filesystem, &lsp.analysis.search_dir_name);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        toolchain = %lsp.toolchain.command,
        debounce_ms = lsp.analysis.debounce_ms,
        "Starting language server"
    );

    let reason = serve(tokio::io::stdin(), tokio::io::stdout(), sessions, &lsp.analysis).await?;
    tracing::info!(?reason, "Language server stopped");

    // A pending stdin read blocks runtime shutdown.
    std::process::exit(i32::from(!reason.is_clean()));
}

fn init_tracing(log: &LogConfig, config_error: Option<&ConfigError>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log.filter.as_deref().unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, mut init_warnings) = open_log_file(log);
    if let Some(e) = config_error {
        init_warnings.push(format!("Ignoring config at {}: {e}", e.path().display()));
    }

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    }

    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file(log: &LogConfig) -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates(log) {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates(log: &LogConfig) -> Vec<PathBuf> {
    if let Some(file) = &log.file {
        return vec![file.clone()];
    }

    let mut candidates = Vec::new();

    // Primary: ~/.lichen/logs/lichen-ls.log
    if let Some(config_path) = config_path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join(LOG_FILE_NAME));
    }

    // Fallback: ./.lichen/logs/lichen-ls.log
    candidates.push(PathBuf::from(".lichen").join("logs").join(LOG_FILE_NAME));

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_log_file_is_the_only_candidate() {
        let log = LogConfig {
            filter: None,
            file: Some(PathBuf::from("/var/log/lichen.log")),
        };
        assert_eq!(
            log_file_candidates(&log),
            vec![PathBuf::from("/var/log/lichen.log")]
        );
    }

    #[test]
    fn default_candidates_end_with_working_directory_fallback() {
        let candidates = log_file_candidates(&LogConfig::default());
        assert_eq!(
            candidates.last(),
            Some(&PathBuf::from(".lichen").join("logs").join(LOG_FILE_NAME))
        );
    }

    #[test]
    fn open_log_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("server.log");
        let log = LogConfig {
            filter: None,
            file: Some(path.clone()),
        };

        let (opened, warnings) = open_log_file(&log);
        assert!(warnings.is_empty());
        assert_eq!(opened.map(|(p, _)| p), Some(path.clone()));
        assert!(path.exists());
    }
}
