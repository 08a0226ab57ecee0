//! LSP payload shapes used by the server.
//!
//! Only the fields the server reads or writes are modelled; unknown fields
//! sent by clients are ignored on deserialization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::diagnostic::DiagnosticSet;

/// Zero-based line and UTF-16 character offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: Url,
    pub range: Range,
}

/// A completion candidate, passed through from the engine unchanged.
///
/// Fields the server never inspects are kept in `extra` and serialized back
/// as they arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
    pub label: String,
    /// LSP `CompletionItemKind` number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// A plain string or a `MarkupContent` object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompletionItem {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: None,
            detail: None,
            documentation: None,
            insert_text: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeParams {
    pub process_id: Option<i64>,
    pub root_uri: Option<Url>,
    pub capabilities: ClientCapabilities,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientCapabilities {
    pub workspace: Option<WorkspaceClientCapabilities>,
}

impl ClientCapabilities {
    /// Whether the client declared `workspace.workspaceFolders` support.
    #[must_use]
    pub fn supports_workspace_folders(&self) -> bool {
        self.workspace
            .as_ref()
            .and_then(|w| w.workspace_folders)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceClientCapabilities {
    pub workspace_folders: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDocumentIdentifier {
    pub uri: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedTextDocumentIdentifier {
    pub uri: Url,
    pub version: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentItem {
    pub uri: Url,
    #[serde(default)]
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOpenTextDocumentParams {
    pub text_document: TextDocumentItem,
}

/// One edit from `textDocument/didChange`.
///
/// A change without `range` replaces the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDocumentContentChangeEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeTextDocumentParams {
    pub text_document: VersionedTextDocumentIdentifier,
    pub content_changes: Vec<TextDocumentContentChangeEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCloseTextDocumentParams {
    pub text_document: TextDocumentIdentifier,
}

/// Shared by `textDocument/completion` and `textDocument/definition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentPositionParams {
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishDiagnosticsParams {
    pub uri: Url,
    pub diagnostics: DiagnosticSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
}

/// Params of the `editor/showErrorMessage` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowErrorMessageParams {
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_change_incremental_params() {
        let json = serde_json::json!({
            "textDocument": { "uri": "file:///p/a.lsc", "version": 4 },
            "contentChanges": [
                {
                    "range": {
                        "start": { "line": 0, "character": 1 },
                        "end": { "line": 0, "character": 3 }
                    },
                    "rangeLength": 2,
                    "text": "xy"
                },
                { "text": "whole" }
            ]
        });
        let params: DidChangeTextDocumentParams = serde_json::from_value(json).unwrap();
        assert_eq!(params.text_document.version, 4);
        assert_eq!(params.content_changes.len(), 2);
        assert_eq!(
            params.content_changes[0].range,
            Some(Range::new(Position::new(0, 1), Position::new(0, 3)))
        );
        assert!(params.content_changes[1].range.is_none());
    }

    #[test]
    fn test_initialize_params_tolerate_missing_fields() {
        let params: InitializeParams = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(params.root_uri.is_none());
        assert!(!params.capabilities.supports_workspace_folders());
    }

    #[test]
    fn test_initialize_params_workspace_capabilities() {
        let params: InitializeParams = serde_json::from_value(serde_json::json!({
            "processId": 42,
            "rootUri": null,
            "capabilities": { "workspace": { "workspaceFolders": true, "configuration": false } }
        }))
        .unwrap();
        assert_eq!(params.process_id, Some(42));
        assert!(params.capabilities.supports_workspace_folders());
    }

    #[test]
    fn test_completion_item_omits_empty_fields() {
        let item = CompletionItem {
            kind: Some(2),
            ..CompletionItem::new("length")
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json, serde_json::json!({ "label": "length", "kind": 2 }));
    }

    #[test]
    fn test_completion_item_keeps_markup_and_unknown_fields() {
        let json = serde_json::json!({
            "label": "length",
            "kind": 2,
            "sortText": "0",
            "filterText": "len",
            "documentation": { "kind": "markdown", "value": "`len`" },
            "data": { "id": 7 }
        });
        let item: CompletionItem = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(item.label, "length");
        assert_eq!(
            item.documentation,
            Some(serde_json::json!({ "kind": "markdown", "value": "`len`" }))
        );
        assert_eq!(item.extra.get("sortText"), Some(&serde_json::json!("0")));
        assert_eq!(serde_json::to_value(&item).unwrap(), json);
    }

    #[test]
    fn test_completion_item_plain_string_documentation() {
        let item: CompletionItem = serde_json::from_value(serde_json::json!({
            "label": "push",
            "documentation": "Appends an element."
        }))
        .unwrap();
        assert_eq!(item.documentation, Some(serde_json::json!("Appends an element.")));
        assert!(item.extra.is_empty());
    }

    #[test]
    fn test_position_params_ignore_completion_context() {
        let params: TextDocumentPositionParams = serde_json::from_value(serde_json::json!({
            "textDocument": { "uri": "file:///p/a.lsc" },
            "position": { "line": 3, "character": 7 },
            "context": { "triggerKind": 2, "triggerCharacter": "." }
        }))
        .unwrap();
        assert_eq!(params.position, Position::new(3, 7));
    }
}
