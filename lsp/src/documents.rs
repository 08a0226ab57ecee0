//! Open document tracking for incremental sync.

use std::collections::HashMap;

use lichen_types::{
    DidChangeTextDocumentParams, Position, TextDocumentContentChangeEvent, TextDocumentItem,
};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("change for document that is not open: {0}")]
    NotOpen(Url),
}

#[derive(Debug, Clone)]
pub struct TextDocument {
    uri: Url,
    version: i32,
    text: String,
}

/// Byte offset of a UTF-16 column within one line, clamped to the line end.
fn utf16_to_byte_offset(line: &str, utf16_offset: u32) -> usize {
    let mut utf16_count = 0u32;
    for (byte_idx, ch) in line.char_indices() {
        if utf16_count >= utf16_offset {
            return byte_idx;
        }
        utf16_count += ch.len_utf16() as u32;
    }
    line.len()
}

impl TextDocument {
    #[must_use]
    pub fn new(uri: Url, version: i32, text: String) -> Self {
        Self { uri, version, text }
    }

    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Byte offset of `position` in the text.
    ///
    /// Lines past the end clamp to the end of the text; characters past the
    /// end of a line clamp to the end of that line.
    #[must_use]
    pub fn offset_at(&self, position: Position) -> usize {
        let start = if position.line == 0 {
            0
        } else {
            match self
                .text
                .match_indices('\n')
                .nth(position.line as usize - 1)
            {
                Some((idx, _)) => idx + 1,
                None => return self.text.len(),
            }
        };

        let rest = &self.text[start..];
        let line = &rest[..rest.find('\n').unwrap_or(rest.len())];
        let line = line.strip_suffix('\r').unwrap_or(line);
        start + utf16_to_byte_offset(line, position.character)
    }

    /// Apply one content change. A change without a range replaces the text.
    pub fn apply_change(&mut self, change: TextDocumentContentChangeEvent) {
        match change.range {
            Some(range) => {
                let start = self.offset_at(range.start);
                let end = self.offset_at(range.end).max(start);
                self.text.replace_range(start..end, &change.text);
            }
            None => self.text = change.text,
        }
    }
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<Url, TextDocument>,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, item: TextDocumentItem) -> &TextDocument {
        let document = TextDocument::new(item.uri.clone(), item.version, item.text);
        self.documents
            .entry(item.uri)
            .insert_entry(document)
            .into_mut()
    }

    /// Apply `params.content_changes` in order.
    pub fn change(
        &mut self,
        params: DidChangeTextDocumentParams,
    ) -> Result<&TextDocument, DocumentError> {
        let uri = params.text_document.uri;
        let Some(document) = self.documents.get_mut(&uri) else {
            return Err(DocumentError::NotOpen(uri));
        };
        for change in params.content_changes {
            document.apply_change(change);
        }
        document.version = params.text_document.version;
        Ok(document)
    }

    pub fn close(&mut self, uri: &Url) -> Option<TextDocument> {
        self.documents.remove(uri)
    }

    #[must_use]
    pub fn get(&self, uri: &Url) -> Option<&TextDocument> {
        self.documents.get(uri)
    }
}
