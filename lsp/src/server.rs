//! Protocol loop: framing tasks, lifecycle, and dispatch.
//!
//! Reading and writing happen in background tasks connected by channels.
//! The loop itself handles one inbound message at a time and otherwise
//! sleeps until the debounce deadline.

use anyhow::{Context, Result};
use lichen_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    InitializeParams, TextDocumentPositionParams,
};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::client::Client;
use crate::codec::{FrameReader, FrameWriter};
use crate::coordinator::Coordinator;
use crate::engine::EngineFactory;
use crate::prerequisites::Discover;
use crate::protocol::{
    INTERNAL_ERROR, INVALID_REQUEST, Message, ResponseError, SERVER_NOT_INITIALIZED, parse_params,
};
use crate::session::SessionCache;
use crate::types::AnalysisConfig;

const CHANNEL_CAPACITY: usize = 64;

/// Why [`serve`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The client sent `exit`.
    Exit { after_shutdown: bool },
    /// The client closed the connection without `exit`.
    Disconnected,
}

impl ExitReason {
    /// Whether the client followed the shutdown handshake.
    #[must_use]
    pub fn is_clean(self) -> bool {
        matches!(
            self,
            Self::Exit {
                after_shutdown: true
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Running,
    ShuttingDown,
}

struct Server<F: EngineFactory, D> {
    coordinator: Coordinator<F, D>,
    client: Client,
    lifecycle: Lifecycle,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn to_result<T: Serialize>(value: T) -> Result<Value, ResponseError> {
    serde_json::to_value(value).map_err(|e| ResponseError::new(INTERNAL_ERROR, e.to_string()))
}

/// Serve the language server protocol over `input`/`output` until the
/// client exits or disconnects.
pub async fn serve<R, W, F, D>(
    input: R,
    output: W,
    sessions: SessionCache<F, D>,
    config: &AnalysisConfig,
) -> Result<ExitReason>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    F: EngineFactory,
    D: Discover,
{
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);

    let reader_handle = tokio::spawn(async move {
        let mut reader = FrameReader::new(input);
        loop {
            match reader.read_message().await {
                Ok(Some(message)) => {
                    if inbound_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::info!("Client closed the connection");
                    break;
                }
                Err(e) => {
                    tracing::warn!("Client read error: {e:#}");
                    break;
                }
            }
        }
    });

    let writer_handle = tokio::spawn(async move {
        let mut writer = FrameWriter::new(output);
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = writer.write_message(&message).await {
                tracing::warn!("Client write error: {e:#}");
                break;
            }
        }
    });

    let client = Client::new(outbound_tx);
    let mut server = Server {
        coordinator: Coordinator::new(client.clone(), sessions, config),
        client,
        lifecycle: Lifecycle::Uninitialized,
    };

    let reason = loop {
        let deadline = server.coordinator.debounce_deadline();
        tokio::select! {
            message = inbound_rx.recv() => match message {
                Some(message) => {
                    if let Some(reason) = server.handle(message).await {
                        break reason;
                    }
                }
                None => break ExitReason::Disconnected,
            },
            () = wait_until(deadline) => {
                server.coordinator.fire_expired(Instant::now()).await;
            }
        }
    };
    tracing::info!(?reason, "Server loop finished");

    // Dropping the last client handle lets the writer drain and stop.
    drop(server);
    writer_handle.await.context("writer task failed")?;
    reader_handle.abort();

    Ok(reason)
}

impl<F: EngineFactory, D: Discover> Server<F, D> {
    async fn handle(&mut self, message: Message) -> Option<ExitReason> {
        match message {
            Message::Request { id, method, params } => {
                tracing::debug!(%id, %method, "Request");
                let result = self.handle_request(&method, params).await;
                self.client.respond(id, result).await;
                None
            }
            Message::Notification { method, params } => {
                self.handle_notification(&method, params).await
            }
            Message::Response { id, .. } => {
                tracing::debug!(%id, "Ignoring response from client");
                None
            }
        }
    }

    async fn handle_request(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<Value, ResponseError> {
        match (self.lifecycle, method) {
            (Lifecycle::Uninitialized, "initialize") => {
                let params: InitializeParams = parse_params(params)?;
                let result = self.coordinator.initialize(&params).await;
                self.lifecycle = Lifecycle::Running;
                Ok(result)
            }
            (Lifecycle::Uninitialized, _) => Err(ResponseError::new(
                SERVER_NOT_INITIALIZED,
                "Server not initialized",
            )),
            (_, "initialize") => Err(ResponseError::new(
                INVALID_REQUEST,
                "Server already initialized",
            )),
            (Lifecycle::ShuttingDown, _) => Err(ResponseError::new(
                INVALID_REQUEST,
                "Server is shutting down",
            )),
            (Lifecycle::Running, "shutdown") => {
                tracing::info!("Shutdown requested");
                self.lifecycle = Lifecycle::ShuttingDown;
                Ok(Value::Null)
            }
            (Lifecycle::Running, "textDocument/completion") => {
                let params: TextDocumentPositionParams = parse_params(params)?;
                to_result(self.coordinator.completion(&params).await)
            }
            (Lifecycle::Running, "textDocument/definition") => {
                let params: TextDocumentPositionParams = parse_params(params)?;
                to_result(self.coordinator.definition(&params).await)
            }
            (Lifecycle::Running, _) => Err(ResponseError::method_not_found(method)),
        }
    }

    async fn handle_notification(&mut self, method: &str, params: Value) -> Option<ExitReason> {
        if method == "exit" {
            return Some(ExitReason::Exit {
                after_shutdown: self.lifecycle == Lifecycle::ShuttingDown,
            });
        }
        if self.lifecycle != Lifecycle::Running {
            tracing::debug!(%method, lifecycle = ?self.lifecycle, "Dropping notification");
            return None;
        }

        match method {
            "initialized" => self.coordinator.initialized().await,
            "textDocument/didOpen" => match parse_params::<DidOpenTextDocumentParams>(params) {
                Ok(params) => self.coordinator.did_open(params).await,
                Err(e) => tracing::warn!("Bad didOpen params: {}", e.message),
            },
            "textDocument/didChange" => match parse_params::<DidChangeTextDocumentParams>(params) {
                Ok(params) => self.coordinator.did_change(params, Instant::now()),
                Err(e) => tracing::warn!("Bad didChange params: {}", e.message),
            },
            "textDocument/didClose" => match parse_params::<DidCloseTextDocumentParams>(params) {
                Ok(params) => self.coordinator.did_close(&params),
                Err(e) => tracing::warn!("Bad didClose params: {}", e.message),
            },
            _ => tracing::trace!(%method, "Ignoring notification"),
        }
        None
    }
}

#[cfg(all(test, not(windows)))]
mod tests {
    use std::time::Duration;

    use lichen_types::DiagnosticSeverity;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    use super::*;
    use crate::engine::mock::{MockFactory, diag};
    use crate::prerequisites::mock::MockDiscover;
    use crate::protocol::{INVALID_PARAMS, METHOD_NOT_FOUND, RequestId};
    use crate::session::test_support::cache;

    struct Editor {
        reader: FrameReader<ReadHalf<DuplexStream>>,
        writer: FrameWriter<WriteHalf<DuplexStream>>,
        next_id: i64,
        /// Messages read while waiting for something else.
        skipped: Vec<Message>,
    }

    impl Editor {
        async fn request(&mut self, method: &str, params: Value) -> Result<Value, ResponseError> {
            self.next_id += 1;
            let id = RequestId::Number(self.next_id);
            self.writer
                .write_message(&Message::request(id.clone(), method, params))
                .await
                .unwrap();
            loop {
                match self.reader.read_message().await.unwrap().unwrap() {
                    Message::Response { id: got, result } if got == id => return result,
                    other => self.skipped.push(other),
                }
            }
        }

        async fn notify(&mut self, method: &str, params: Value) {
            self.writer
                .write_message(&Message::notification(method, params))
                .await
                .unwrap();
        }

        async fn next_notification(&mut self) -> (String, Value) {
            loop {
                match self.reader.read_message().await.unwrap().unwrap() {
                    Message::Notification { method, params } => return (method, params),
                    other => self.skipped.push(other),
                }
            }
        }
    }

    fn connect() -> (Editor, ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) {
        let (editor_io, server_io) = tokio::io::duplex(64 * 1024);
        let (editor_read, editor_write) = tokio::io::split(editor_io);
        let (server_read, server_write) = tokio::io::split(server_io);
        let editor = Editor {
            reader: FrameReader::new(editor_read),
            writer: FrameWriter::new(editor_write),
            next_id: 0,
            skipped: Vec::new(),
        };
        (editor, server_read, server_write)
    }

    fn open_params(text: &str) -> Value {
        serde_json::json!({
            "textDocument": {
                "uri": "file:///p/a.lsc",
                "languageId": "lichenscript",
                "version": 1,
                "text": text,
            }
        })
    }

    #[tokio::test]
    async fn test_requests_before_initialize_rejected() {
        let factory = MockFactory::default();
        let (mut editor, input, output) = connect();
        let config = AnalysisConfig::default();
        let serving = serve(
            input,
            output,
            cache(&factory, MockDiscover::available()),
            &config,
        );

        let script = async {
            let err = editor
                .request(
                    "textDocument/completion",
                    serde_json::json!({
                        "textDocument": { "uri": "file:///p/a.lsc" },
                        "position": { "line": 0, "character": 0 }
                    }),
                )
                .await
                .unwrap_err();
            editor.notify("exit", Value::Null).await;
            err
        };

        let (reason, err) = tokio::join!(serving, script);
        assert_eq!(err.code, SERVER_NOT_INITIALIZED);
        assert_eq!(
            reason.unwrap(),
            ExitReason::Exit {
                after_shutdown: false
            }
        );
    }

    #[tokio::test]
    async fn test_full_session() {
        let factory = MockFactory::default();
        factory.script.borrow_mut().typecheck =
            Some(Ok(vec![diag(DiagnosticSeverity::Warning, 2, "unused import")]));
        let (mut editor, input, output) = connect();
        let config = AnalysisConfig::default();
        let serving = serve(
            input,
            output,
            cache(&factory, MockDiscover::available()),
            &config,
        );

        let script = async {
            let init = editor
                .request("initialize", serde_json::json!({ "capabilities": {} }))
                .await
                .unwrap();
            assert_eq!(init["capabilities"]["textDocumentSync"], 2);
            editor.notify("initialized", serde_json::json!({})).await;

            editor
                .notify("textDocument/didOpen", open_params("let x = 1"))
                .await;
            let (method, params) = editor.next_notification().await;
            assert_eq!(method, "textDocument/publishDiagnostics");
            assert_eq!(params["uri"], "file:///p/a.lsc");
            assert_eq!(params["diagnostics"][0]["message"], "unused import");
            assert_eq!(params["diagnostics"][0]["range"]["start"]["line"], 1);

            let completions = editor
                .request(
                    "textDocument/completion",
                    serde_json::json!({
                        "textDocument": { "uri": "file:///p/a.lsc" },
                        "position": { "line": 0, "character": 4 }
                    }),
                )
                .await
                .unwrap();
            assert_eq!(completions, serde_json::json!([]));

            let definition = editor
                .request(
                    "textDocument/definition",
                    serde_json::json!({
                        "textDocument": { "uri": "file:///p/a.lsc" },
                        "position": { "line": 0, "character": 4 }
                    }),
                )
                .await
                .unwrap();
            assert!(definition.is_null());

            let unknown = editor
                .request("textDocument/hover", serde_json::json!({}))
                .await
                .unwrap_err();
            assert_eq!(unknown.code, METHOD_NOT_FOUND);

            let bad = editor
                .request("textDocument/completion", serde_json::json!({ "x": 1 }))
                .await
                .unwrap_err();
            assert_eq!(bad.code, INVALID_PARAMS);

            let shutdown = editor.request("shutdown", Value::Null).await.unwrap();
            assert!(shutdown.is_null());
            editor.notify("exit", Value::Null).await;
        };

        let (reason, ()) = tokio::join!(serving, script);
        assert!(reason.unwrap().is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_published_after_idle_window() {
        let factory = MockFactory::default();
        let (mut editor, input, output) = connect();
        let config = AnalysisConfig::default();
        let serving = serve(
            input,
            output,
            cache(&factory, MockDiscover::available()),
            &config,
        );

        let script = async {
            editor
                .request("initialize", serde_json::json!({ "capabilities": {} }))
                .await
                .unwrap();
            editor.notify("textDocument/didOpen", open_params("")).await;
            editor.next_notification().await;

            let sent_at = Instant::now();
            for text in ["l", "le", "let"] {
                editor
                    .notify(
                        "textDocument/didChange",
                        serde_json::json!({
                            "textDocument": { "uri": "file:///p/a.lsc", "version": 2 },
                            "contentChanges": [{ "text": text }]
                        }),
                    )
                    .await;
            }
            let (method, _) = editor.next_notification().await;
            assert_eq!(method, "textDocument/publishDiagnostics");
            assert!(sent_at.elapsed() >= Duration::from_millis(300));

            editor.request("shutdown", Value::Null).await.unwrap();
            editor.notify("exit", Value::Null).await;
        };

        let (reason, ()) = tokio::join!(serving, script);
        assert!(reason.unwrap().is_clean());
        let recorded = factory.script.borrow();
        assert_eq!(recorded.submit_count(), 2);
        assert!(matches!(
            &recorded.calls[2],
            crate::engine::mock::Call::Submit { content, .. } if content == "let"
        ));
    }

    #[tokio::test]
    async fn test_missing_toolchain_notifies_once() {
        let factory = MockFactory::default();
        let (mut editor, input, output) = connect();
        let config = AnalysisConfig::default();
        let serving = serve(
            input,
            output,
            cache(&factory, MockDiscover::missing()),
            &config,
        );

        let script = async {
            editor
                .request("initialize", serde_json::json!({ "capabilities": {} }))
                .await
                .unwrap();
            editor.notify("initialized", serde_json::json!({})).await;
            let (method, params) = editor.next_notification().await;
            assert_eq!(method, "editor/showErrorMessage");
            assert!(params["content"].as_str().unwrap().contains("install LichenScript"));

            editor.notify("textDocument/didOpen", open_params("let x = 1")).await;
            editor.request("shutdown", Value::Null).await.unwrap();
            editor.notify("exit", Value::Null).await;
            while let Ok(Some(message)) = editor.reader.read_message().await {
                editor.skipped.push(message);
            }
            std::mem::take(&mut editor.skipped)
        };

        let (reason, unexpected) = tokio::join!(serving, script);
        assert!(reason.unwrap().is_clean());
        assert!(unexpected.is_empty(), "no diagnostics without a toolchain: {unexpected:?}");
        assert!(factory.script.borrow().calls.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_without_exit() {
        let factory = MockFactory::default();
        let (editor, input, output) = connect();
        drop(editor);
        let config = AnalysisConfig::default();

        let reason = serve(
            input,
            output,
            cache(&factory, MockDiscover::available()),
            &config,
        )
        .await
        .unwrap();

        assert_eq!(reason, ExitReason::Disconnected);
        assert!(!reason.is_clean());
    }
}
