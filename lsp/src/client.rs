//! Outbound messages to the editor.

use lichen_types::{PublishDiagnosticsParams, ShowErrorMessageParams};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::protocol::{Message, RequestId, ResponseError};

pub(crate) const SHOW_ERROR_MESSAGE: &str = "editor/showErrorMessage";
pub(crate) const SETUP_ERROR_CONTENT: &str =
    "Please install LichenScript, it's not installed on your OS.";

/// Handle for sending to the editor. Sends are queued to the writer task.
#[derive(Debug, Clone)]
pub struct Client {
    tx: mpsc::Sender<Message>,
}

impl Client {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }

    async fn send(&self, message: Message) {
        if self.tx.send(message).await.is_err() {
            tracing::warn!("Editor connection closed; dropping outbound message");
        }
    }

    async fn notify(&self, method: &'static str, params: &impl Serialize) {
        match serde_json::to_value(params) {
            Ok(params) => self.send(Message::notification(method, params)).await,
            Err(e) => tracing::warn!("Failed to serialize {method} params: {e}"),
        }
    }

    pub async fn publish_diagnostics(&self, params: &PublishDiagnosticsParams) {
        self.notify("textDocument/publishDiagnostics", params).await;
    }

    /// Tell the user the toolchain is missing.
    pub async fn show_setup_error(&self) {
        let params = ShowErrorMessageParams {
            content: SETUP_ERROR_CONTENT.to_string(),
        };
        self.notify(SHOW_ERROR_MESSAGE, &params).await;
    }

    pub async fn respond(&self, id: RequestId, result: Result<serde_json::Value, ResponseError>) {
        self.send(Message::response(id, result)).await;
    }
}
