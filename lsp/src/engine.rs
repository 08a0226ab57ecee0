//! Analysis engine capability.
//!
//! The engine parses and type-checks LichenScript sources. The server only
//! drives it: one instance per project directory, created through an
//! [`EngineFactory`] and queried through [`AnalysisEngine`]. Positions in
//! engine payloads use 1-based lines; [`crate::diagnostics`] is the single
//! place that converts them to protocol coordinates.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lichen_types::{CompletionItem, DiagnosticSeverity};
use serde::{Deserialize, Serialize};

use crate::fs::FileSystem;

/// Inputs fixed for the lifetime of one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    /// Module search paths, standard library first.
    pub find_paths: Vec<PathBuf>,
    pub runtime_dir: PathBuf,
    pub preclude_dir: PathBuf,
}

/// Source span in engine coordinates: 1-based lines, 0-based columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSpan {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

/// A diagnostic as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDiagnostic {
    /// LSP severity. Absent in rejection payloads, which are errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<DiagnosticSeverity>,
    #[serde(flatten)]
    pub span: EngineSpan,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLocation {
    pub path: PathBuf,
    #[serde(flatten)]
    pub span: EngineSpan,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine refused the source and reported why.
    #[error("engine rejected source with {} diagnostic(s)", .0.len())]
    Rejected(Vec<EngineDiagnostic>),
    #[error("invalid engine options: {0}")]
    InvalidOptions(String),
    #[error("engine internal error: {0}")]
    Internal(String),
    #[error("engine host failure: {0:#}")]
    Host(#[from] anyhow::Error),
}

/// One engine instance bound to a project directory.
///
/// Calls are serialized by the caller; implementations need not be
/// reentrant.
#[allow(async_fn_in_trait)]
pub trait AnalysisEngine {
    /// Parse `content` as the current text of `path`, cache it, and return
    /// syntax-phase diagnostics for that document.
    async fn submit_source(
        &mut self,
        path: &Path,
        content: &str,
    ) -> Result<Vec<EngineDiagnostic>, EngineError>;

    /// Type-check every cached document under `directory`.
    async fn typecheck_directory(
        &mut self,
        directory: &Path,
    ) -> Result<Vec<EngineDiagnostic>, EngineError>;

    /// `offset` is a byte offset into the last submitted content of `path`.
    async fn locate_definition(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> Result<Option<EngineLocation>, EngineError>;

    async fn locate_completions(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> Result<Vec<CompletionItem>, EngineError>;
}

/// Constructs engine instances.
#[allow(async_fn_in_trait)]
pub trait EngineFactory {
    type Engine: AnalysisEngine;

    async fn create(
        &self,
        fs: Arc<dyn FileSystem>,
        options: EngineOptions,
    ) -> Result<Self::Engine, EngineError>;
}
