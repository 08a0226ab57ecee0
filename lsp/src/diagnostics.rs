//! Engine payload to protocol conversion.
//!
//! Engine lines are 1-based, protocol lines are 0-based. Columns carry over
//! unchanged. Every engine position the server forwards passes through here.

use lichen_types::{
    Diagnostic, DiagnosticSeverity, DiagnosticSet, Location, Position, Range,
};

use crate::engine::{EngineDiagnostic, EngineError, EngineLocation, EngineSpan};
use crate::paths;

const DEFAULT_SOURCE: &str = "lichenscript";

fn position(line: u32, col: u32) -> Position {
    Position::new(line.saturating_sub(1), col)
}

pub(crate) fn to_range(span: EngineSpan) -> Range {
    Range::new(
        position(span.start_line, span.start_col),
        position(span.end_line, span.end_col),
    )
}

/// Convert one engine diagnostic. `fallback` applies when the engine left
/// the severity out.
pub(crate) fn to_diagnostic(diag: EngineDiagnostic, fallback: DiagnosticSeverity) -> Diagnostic {
    Diagnostic::new(
        diag.severity.unwrap_or(fallback),
        to_range(diag.span),
        diag.message,
        diag.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
    )
}

pub(crate) fn to_diagnostic_set(
    items: Vec<EngineDiagnostic>,
    fallback: DiagnosticSeverity,
) -> DiagnosticSet {
    items
        .into_iter()
        .map(|d| to_diagnostic(d, fallback))
        .collect::<Vec<_>>()
        .into()
}

/// Fold both engine reporting styles into one result.
///
/// A rejection carries the diagnostics that explain it; those are errors
/// unless they say otherwise. Other failures stay failures.
pub(crate) fn unify(
    result: Result<Vec<EngineDiagnostic>, EngineError>,
) -> Result<DiagnosticSet, EngineError> {
    match result {
        Ok(items) => Ok(to_diagnostic_set(items, DiagnosticSeverity::Warning)),
        Err(EngineError::Rejected(items)) => {
            Ok(to_diagnostic_set(items, DiagnosticSeverity::Error))
        }
        Err(other) => Err(other),
    }
}

/// `None` when the engine points at a path that cannot be expressed as a URI.
pub(crate) fn to_location(location: EngineLocation) -> Option<Location> {
    match paths::path_to_file_uri(&location.path) {
        Ok(uri) => Some(Location {
            uri,
            range: to_range(location.span),
        }),
        Err(e) => {
            tracing::debug!("Dropping definition location: {e}");
            None
        }
    }
}
