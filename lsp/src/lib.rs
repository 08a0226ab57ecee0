//! Language server for LichenScript.
//!
//! Maps open documents to per-directory analysis sessions, debounces edits,
//! runs the two-phase diagnostic pipeline, and answers completion and
//! definition queries.

pub mod codec;
pub mod types;

pub(crate) mod client;
pub(crate) mod coordinator;
pub(crate) mod diagnostics;
pub(crate) mod protocol;

mod debounce;
mod documents;
mod engine;
mod fs;
mod host;
mod paths;
mod pipeline;
mod prerequisites;
mod server;
mod session;

pub use debounce::{ChangeEvent, Debouncer, PendingChange};
pub use documents::{DocumentError, DocumentStore, TextDocument};
pub use engine::{
    AnalysisEngine, EngineDiagnostic, EngineError, EngineFactory, EngineLocation, EngineOptions,
    EngineSpan,
};
pub use fs::{FileSystem, LocalFileSystem};
pub use host::{HostedEngine, ProcessEngineFactory};
pub use paths::{
    PathToUriError, containing_directory, path_to_file_uri, resolve_local_path, search_roots,
};
pub use pipeline::{DiagnosticPipeline, PipelineOutcome};
pub use prerequisites::{Discover, PrerequisiteError, Prerequisites, Toolchain};
pub use protocol::{Message, RequestId, ResponseError};
pub use server::{ExitReason, serve};
pub use session::{AnalysisSession, SessionCache, SessionError};
pub use types::{AnalysisConfig, EngineHostConfig, LspConfig, ToolchainConfig};
