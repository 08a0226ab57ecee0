//! Diagnostics as published to the editor.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::protocol::Range;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from LSP numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    ///
    /// Returns `None` for values outside the LSP-defined range.
    /// Callers (boundary code) decide the fallback policy.
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }
}

impl Serialize for DiagnosticSeverity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for DiagnosticSeverity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u64::deserialize(deserializer)?;
        Self::from_lsp(value).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown diagnostic severity {value}"))
        })
    }
}

/// A single diagnostic in protocol coordinates (0-based lines and characters).
///
/// Fields are private; the constructor is the single construction path and
/// accessors are the read path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    range: Range,
    severity: DiagnosticSeverity,
    message: String,
    source: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        severity: DiagnosticSeverity,
        range: Range,
        message: String,
        source: String,
    ) -> Self {
        Self {
            range,
            severity,
            message,
            source,
        }
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Producer of the diagnostic (e.g. "lichenscript").
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Ordered diagnostics for one publication.
///
/// Order is significant: syntax-phase entries come before type-check entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosticSet {
    items: Vec<Diagnostic>,
}

impl DiagnosticSet {
    #[must_use]
    pub fn new(items: Vec<Diagnostic>) -> Self {
        Self { items }
    }

    #[must_use]
    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether any entry has error severity.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.items.iter().any(|d| d.severity().is_error())
    }

    fn count_by_severity(&self, severity: DiagnosticSeverity) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity() == severity)
            .count()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Error)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Warning)
    }

    /// Append `other` after the existing entries.
    pub fn append(&mut self, other: DiagnosticSet) {
        self.items.extend(other.items);
    }
}

impl From<Vec<Diagnostic>> for DiagnosticSet {
    fn from(items: Vec<Diagnostic>) -> Self {
        Self::new(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Position;

    fn make_diag(severity: DiagnosticSeverity, msg: &str) -> Diagnostic {
        Diagnostic::new(
            severity,
            Range::new(Position::new(2, 4), Position::new(2, 9)),
            msg.to_string(),
            "lichenscript".to_string(),
        )
    }

    #[test]
    fn test_from_lsp_known_values() {
        assert_eq!(
            DiagnosticSeverity::from_lsp(1),
            Some(DiagnosticSeverity::Error)
        );
        assert_eq!(
            DiagnosticSeverity::from_lsp(4),
            Some(DiagnosticSeverity::Hint)
        );
        assert_eq!(DiagnosticSeverity::from_lsp(0), None);
        assert_eq!(DiagnosticSeverity::from_lsp(99), None);
    }

    #[test]
    fn test_severity_serializes_as_number() {
        let json = serde_json::to_value(DiagnosticSeverity::Warning).unwrap();
        assert_eq!(json, 2);
        let back: DiagnosticSeverity = serde_json::from_value(serde_json::json!(3)).unwrap();
        assert_eq!(back, DiagnosticSeverity::Information);
        assert!(serde_json::from_value::<DiagnosticSeverity>(serde_json::json!(7)).is_err());
    }

    #[test]
    fn test_diagnostic_wire_shape() {
        let json = serde_json::to_value(make_diag(DiagnosticSeverity::Error, "boom")).unwrap();
        assert_eq!(json["severity"], 1);
        assert_eq!(json["message"], "boom");
        assert_eq!(json["source"], "lichenscript");
        assert_eq!(json["range"]["start"]["line"], 2);
        assert_eq!(json["range"]["end"]["character"], 9);
    }

    #[test]
    fn test_set_has_error() {
        let mut set = DiagnosticSet::new(vec![make_diag(DiagnosticSeverity::Warning, "w")]);
        assert!(!set.has_error());
        set.append(DiagnosticSet::new(vec![make_diag(
            DiagnosticSeverity::Error,
            "e",
        )]));
        assert!(set.has_error());
        assert_eq!(set.error_count(), 1);
        assert_eq!(set.warning_count(), 1);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut set = DiagnosticSet::new(vec![make_diag(DiagnosticSeverity::Warning, "first")]);
        set.append(DiagnosticSet::new(vec![
            make_diag(DiagnosticSeverity::Hint, "second"),
            make_diag(DiagnosticSeverity::Error, "third"),
        ]));
        let messages: Vec<&str> = set.items().iter().map(Diagnostic::message).collect();
        assert_eq!(messages, ["first", "second", "third"]);
    }

    #[test]
    fn test_set_serializes_as_array() {
        let set = DiagnosticSet::new(vec![make_diag(DiagnosticSeverity::Hint, "h")]);
        let json = serde_json::to_value(&set).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["severity"], 4);
    }
}
