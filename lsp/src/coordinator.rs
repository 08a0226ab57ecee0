//! Request and notification handling.
//!
//! [`Coordinator`] owns all server state: open documents, the session cache,
//! the debouncer, and the pipeline. The server loop feeds it one message at
//! a time, so no handler ever overlaps another.

use std::path::PathBuf;

use lichen_types::{
    CompletionItem, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, InitializeParams, Location, TextDocumentPositionParams,
};
use tokio::time::Instant;

use crate::client::Client;
use crate::debounce::{ChangeEvent, Debouncer};
use crate::documents::DocumentStore;
use crate::engine::EngineFactory;
use crate::paths;
use crate::pipeline::{DiagnosticPipeline, PipelineOutcome};
use crate::prerequisites::Discover;
use crate::session::SessionCache;
use crate::types::AnalysisConfig;

const SERVER_NAME: &str = "lichen-ls";
/// `TextDocumentSyncKind.Incremental`.
const SYNC_INCREMENTAL: u8 = 2;

pub struct Coordinator<F: EngineFactory, D> {
    client: Client,
    documents: DocumentStore,
    sessions: SessionCache<F, D>,
    debouncer: Debouncer,
    pipeline: DiagnosticPipeline,
    require_clean_session: bool,
    setup_error_sent: bool,
}

impl<F: EngineFactory, D: Discover> Coordinator<F, D> {
    pub fn new(client: Client, sessions: SessionCache<F, D>, config: &AnalysisConfig) -> Self {
        Self {
            client,
            documents: DocumentStore::new(),
            sessions,
            debouncer: Debouncer::new(config.debounce()),
            pipeline: DiagnosticPipeline::new(),
            require_clean_session: config.require_clean_session,
            setup_error_sent: false,
        }
    }

    /// Probe the toolchain and describe the server's capabilities.
    pub async fn initialize(&mut self, params: &InitializeParams) -> serde_json::Value {
        if let Err(e) = self.sessions.ensure_prerequisites().await {
            tracing::warn!("LichenScript toolchain not found: {e}");
        }

        let mut capabilities = serde_json::json!({
            "textDocumentSync": SYNC_INCREMENTAL,
            "completionProvider": {
                "resolveProvider": false,
                "triggerCharacters": ["."],
            },
            "definitionProvider": true,
        });
        if params.capabilities.supports_workspace_folders() {
            capabilities["workspace"] = serde_json::json!({
                "workspaceFolders": { "supported": true }
            });
        }

        serde_json::json!({
            "capabilities": capabilities,
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    /// Report a missing toolchain to the user, once per server lifetime.
    pub async fn initialized(&mut self) {
        tracing::info!("Client initialized");
        if !self.sessions.has_prerequisites() && !self.setup_error_sent {
            self.setup_error_sent = true;
            self.client.show_setup_error().await;
        }
    }

    /// Opening analyzes immediately, without waiting for the idle window.
    pub async fn did_open(&mut self, params: DidOpenTextDocumentParams) {
        let document = self.documents.open(params.text_document);
        tracing::debug!(uri = %document.uri(), "Document opened");
        let event = ChangeEvent {
            uri: document.uri().clone(),
            text: document.text().to_string(),
        };
        self.analyze(event).await;
    }

    pub fn did_change(&mut self, params: DidChangeTextDocumentParams, now: Instant) {
        let document = match self.documents.change(params) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("Ignoring change: {e}");
                return;
            }
        };
        let event = ChangeEvent {
            uri: document.uri().clone(),
            text: document.text().to_string(),
        };
        if let Some(superseded) = self.debouncer.arm(event, now) {
            tracing::trace!(uri = %superseded.uri, "Buffered change superseded");
        }
    }

    pub fn did_close(&mut self, params: &DidCloseTextDocumentParams) {
        let uri = &params.text_document.uri;
        if self.documents.close(uri).is_none() {
            tracing::debug!(%uri, "Close for document that was not open");
        }
    }

    #[must_use]
    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Run the pipeline for the buffered change if its window has elapsed.
    pub async fn fire_expired(&mut self, now: Instant) {
        if let Some(event) = self.debouncer.take_expired(now) {
            self.analyze(event).await;
        }
    }

    /// Run the pipeline for the buffered change now, if there is one.
    pub async fn flush(&mut self) {
        if let Some(event) = self.debouncer.flush() {
            tracing::debug!(uri = %event.uri, "Flushing buffered change before query");
            self.analyze(event).await;
        }
    }

    pub async fn completion(
        &mut self,
        params: &TextDocumentPositionParams,
    ) -> Option<Vec<CompletionItem>> {
        self.flush().await;
        let (path, offset) = self.query_point(params)?;
        let session = self
            .sessions
            .lookup(&paths::containing_directory(&path))?;
        if self.require_clean_session && session.has_error() {
            tracing::debug!(
                path = %path.display(),
                "Withholding completions; last analysis had errors"
            );
            return None;
        }
        match session.locate_completions(&path, offset).await {
            Ok(items) => Some(items),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Completion failed: {e}");
                None
            }
        }
    }

    pub async fn definition(&mut self, params: &TextDocumentPositionParams) -> Option<Location> {
        self.flush().await;
        let (path, offset) = self.query_point(params)?;
        let session = self
            .sessions
            .lookup(&paths::containing_directory(&path))?;
        match session.locate_definition(&path, offset).await {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Definition lookup failed: {e}");
                None
            }
        }
    }

    fn query_point(&self, params: &TextDocumentPositionParams) -> Option<(PathBuf, usize)> {
        let uri = &params.text_document.uri;
        let path = paths::resolve_local_path(uri)?;
        let document = self.documents.get(uri)?;
        Some((path, document.offset_at(params.position)))
    }

    async fn analyze(&mut self, event: ChangeEvent) {
        let outcome = self
            .pipeline
            .run(&mut self.sessions, &event.uri, &event.text)
            .await;
        if let PipelineOutcome::Publish(params) = outcome {
            self.client.publish_diagnostics(&params).await;
        }
    }
}
