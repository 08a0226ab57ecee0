//! Protocol and diagnostic domain types for the Lichen language server.
//!
//! This crate contains the payload shapes exchanged with editors and with the
//! analysis engine. Pure data: no IO, no async, and minimal dependencies.

mod diagnostic;
mod protocol;

pub use diagnostic::{Diagnostic, DiagnosticSeverity, DiagnosticSet};
pub use protocol::{
    ClientCapabilities, CompletionItem, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, InitializeParams, Location, Position, PublishDiagnosticsParams,
    Range, ShowErrorMessageParams, TextDocumentContentChangeEvent, TextDocumentIdentifier,
    TextDocumentItem, TextDocumentPositionParams, VersionedTextDocumentIdentifier,
    WorkspaceClientCapabilities,
};

pub use url::Url;
