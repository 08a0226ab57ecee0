//! Engine instances hosted in child processes.
//!
//! Each session spawns `<engine command> <args…>` and talks framed JSON-RPC
//! over its stdio. The host sends `engine/*` requests; the engine sends
//! `fs/*` requests back, which are answered from the session's
//! [`FileSystem`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use lichen_types::CompletionItem;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::{FrameReader, FrameWriter};
use crate::engine::{
    AnalysisEngine, EngineDiagnostic, EngineError, EngineFactory, EngineLocation, EngineOptions,
};
use crate::fs::FileSystem;
use crate::protocol::{
    INTERNAL_ERROR, INVALID_PARAMS, Message, RequestId, ResponseError, parse_params,
};
use crate::types::LspConfig;

const WRITER_CHANNEL_CAPACITY: usize = 64;

type PendingMap =
    Arc<tokio::sync::Mutex<HashMap<i64, oneshot::Sender<Result<Value, ResponseError>>>>>;

/// Spawns one engine process per session.
#[derive(Debug, Clone)]
pub struct ProcessEngineFactory {
    command: String,
    args: Vec<String>,
}

impl ProcessEngineFactory {
    #[must_use]
    pub fn new(config: &LspConfig) -> Self {
        Self {
            command: config.engine.command(&config.toolchain).to_string(),
            args: config.engine.args.clone(),
        }
    }
}

impl EngineFactory for ProcessEngineFactory {
    type Engine = HostedEngine;

    async fn create(
        &self,
        fs: Arc<dyn FileSystem>,
        options: EngineOptions,
    ) -> Result<HostedEngine, EngineError> {
        let resolved = which::which(&self.command)
            .with_context(|| format!("{} not found in PATH", self.command))?;
        let mut child = Command::new(&resolved)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", self.command))?;

        let stdout = child.stdout.take().context("no stdout from engine")?;
        let stdin = child.stdin.take().context("no stdin from engine")?;

        let mut engine = HostedEngine::attach(stdout, stdin, fs, Some(child));
        engine.initialize(&options).await?;
        tracing::info!(command = %self.command, "Engine process started");
        Ok(engine)
    }
}

#[derive(Deserialize)]
struct PathParams {
    path: PathBuf,
}

#[derive(Deserialize)]
struct WriteFileParams {
    path: PathBuf,
    content: String,
}

#[derive(Serialize)]
struct SourceParams<'a> {
    path: &'a Path,
    content: &'a str,
}

#[derive(Serialize)]
struct DirectoryParams<'a> {
    directory: &'a Path,
}

#[derive(Serialize)]
struct PointParams<'a> {
    path: &'a Path,
    offset: usize,
}

fn io_error(path: &Path, error: &std::io::Error) -> ResponseError {
    let mut response = ResponseError::new(INTERNAL_ERROR, format!("{}: {error}", path.display()));
    response.data = Some(Value::from(format!("{:?}", error.kind())));
    response
}

fn path_value(path: &Path) -> Value {
    Value::from(path.to_string_lossy().into_owned())
}

/// Answer one `fs/*` request from the engine.
fn answer_fs(fs: &dyn FileSystem, method: &str, params: Value) -> Result<Value, ResponseError> {
    match method {
        "fs/isDirectory" => {
            let p: PathParams = parse_params(params)?;
            Ok(Value::Bool(fs.is_directory(&p.path)))
        }
        "fs/isFile" => {
            let p: PathParams = parse_params(params)?;
            Ok(Value::Bool(fs.is_file(&p.path)))
        }
        "fs/fileExists" => {
            let p: PathParams = parse_params(params)?;
            Ok(Value::Bool(fs.file_exists(&p.path)))
        }
        "fs/realPath" => {
            let p: PathParams = parse_params(params)?;
            fs.real_path(&p.path)
                .map(|resolved| path_value(&resolved))
                .map_err(|e| io_error(&p.path, &e))
        }
        "fs/readDir" => {
            let p: PathParams = parse_params(params)?;
            fs.list_directory(&p.path)
                .map(Value::from)
                .map_err(|e| io_error(&p.path, &e))
        }
        "fs/mkdirRecursive" => {
            let p: PathParams = parse_params(params)?;
            fs.create_dir_all(&p.path)
                .map(|()| Value::Null)
                .map_err(|e| io_error(&p.path, &e))
        }
        "fs/readFile" => {
            let p: PathParams = parse_params(params)?;
            fs.read_to_string(&p.path)
                .map(Value::from)
                .map_err(|e| io_error(&p.path, &e))
        }
        "fs/writeFile" => {
            let p: WriteFileParams = parse_params(params)?;
            fs.write_string(&p.path, &p.content)
                .map(|()| Value::Null)
                .map_err(|e| io_error(&p.path, &e))
        }
        _ => Err(ResponseError::method_not_found(method)),
    }
}

/// Interpret an engine error response.
///
/// Responses whose `data` is a list of diagnostics are rejections of the
/// submitted source.
fn engine_error(error: ResponseError) -> EngineError {
    if let Some(data) = error.data
        && let Ok(items) = serde_json::from_value::<Vec<EngineDiagnostic>>(data)
    {
        return EngineError::Rejected(items);
    }
    if error.code == INVALID_PARAMS {
        EngineError::InvalidOptions(error.message)
    } else {
        EngineError::Internal(error.message)
    }
}

/// A running engine instance.
pub struct HostedEngine {
    /// `None` when attached to streams that are not a child process.
    child: Option<Child>,
    writer_tx: mpsc::Sender<Message>,
    next_id: i64,
    pending: PendingMap,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl HostedEngine {
    fn attach<R, W>(
        stdout: R,
        stdin: W,
        fs: Arc<dyn FileSystem>,
        child: Option<Child>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(tokio::sync::Mutex::new(HashMap::new()));

        let (writer_tx, mut writer_rx) = mpsc::channel::<Message>(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            let mut writer = FrameWriter::new(stdin);
            while let Some(message) = writer_rx.recv().await {
                if let Err(e) = writer.write_message(&message).await {
                    tracing::warn!("Engine write error: {e:#}");
                    break;
                }
            }
        });

        let reader_pending = Arc::clone(&pending);
        let reader_writer_tx = writer_tx.clone();
        let reader_handle = tokio::spawn(async move {
            let mut reader = FrameReader::new(stdout);
            loop {
                match reader.read_message().await {
                    Ok(Some(message)) => {
                        Self::dispatch(message, &reader_pending, &reader_writer_tx, fs.as_ref())
                            .await;
                    }
                    Ok(None) => {
                        tracing::info!("Engine closed stdout");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Engine read error: {e:#}");
                        break;
                    }
                }
            }
            // Dropping the senders fails every call still waiting.
            reader_pending.lock().await.clear();
        });

        Self {
            child,
            writer_tx,
            next_id: 1,
            pending,
            reader_handle,
            writer_handle,
        }
    }

    async fn dispatch(
        message: Message,
        pending: &tokio::sync::Mutex<HashMap<i64, oneshot::Sender<Result<Value, ResponseError>>>>,
        writer_tx: &mpsc::Sender<Message>,
        fs: &dyn FileSystem,
    ) {
        match message {
            Message::Response {
                id: RequestId::Number(id),
                result,
            } => {
                let sender = pending.lock().await.remove(&id);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => tracing::debug!(id, "Engine response for unknown request"),
                }
            }
            Message::Response { id, .. } => {
                tracing::debug!(%id, "Engine response with foreign id");
            }
            Message::Request { id, method, params } => {
                tracing::trace!(%method, "Engine request");
                let result = answer_fs(fs, &method, params);
                if let Err(error) = &result
                    && error.code == crate::protocol::METHOD_NOT_FOUND
                {
                    tracing::debug!("Engine sent unsupported request: {method}");
                }
                let _ = writer_tx.send(Message::response(id, result)).await;
            }
            Message::Notification { method, .. } => {
                tracing::trace!("Ignoring engine notification: {method}");
            }
        }
    }

    async fn call<T: DeserializeOwned>(
        &mut self,
        method: &'static str,
        params: impl Serialize,
    ) -> Result<T, EngineError> {
        let params = serde_json::to_value(params)
            .with_context(|| format!("serializing {method} params"))?;

        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self
            .writer_tx
            .send(Message::request(RequestId::Number(id), method, params))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(anyhow!("engine writer closed").into());
        }

        let Ok(result) = rx.await else {
            return Err(anyhow!("engine exited before answering {method}").into());
        };

        match result {
            Ok(value) => Ok(serde_json::from_value(value)
                .with_context(|| format!("decoding {method} result"))?),
            Err(error) => Err(engine_error(error)),
        }
    }

    async fn initialize(&mut self, options: &EngineOptions) -> Result<(), EngineError> {
        let _: Value = self.call("engine/create", options).await?;
        Ok(())
    }
}

impl Drop for HostedEngine {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
        if let Some(child) = &mut self.child
            && let Err(e) = child.start_kill()
        {
            tracing::debug!("Engine process already gone: {e}");
        }
    }
}

impl AnalysisEngine for HostedEngine {
    async fn submit_source(
        &mut self,
        path: &Path,
        content: &str,
    ) -> Result<Vec<EngineDiagnostic>, EngineError> {
        self.call("engine/parseAndCache", SourceParams { path, content })
            .await
    }

    async fn typecheck_directory(
        &mut self,
        directory: &Path,
    ) -> Result<Vec<EngineDiagnostic>, EngineError> {
        self.call("engine/typecheckDir", DirectoryParams { directory })
            .await
    }

    async fn locate_definition(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> Result<Option<EngineLocation>, EngineError> {
        self.call("engine/findDefinition", PointParams { path, offset })
            .await
    }

    async fn locate_completions(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> Result<Vec<CompletionItem>, EngineError> {
        let items: Option<Vec<CompletionItem>> = self
            .call("engine/findCompletion", PointParams { path, offset })
            .await?;
        Ok(items.unwrap_or_default())
    }
}
