//! Two-phase diagnostic pipeline.
//!
//! Phase 1 parses the changed document. Only when it reports no error does
//! phase 2 type-check the whole directory. Both result sets are published
//! together to the document that triggered the run, syntax entries first.

use lichen_types::PublishDiagnosticsParams;
use url::Url;

use crate::engine::EngineFactory;
use crate::paths;
use crate::prerequisites::Discover;
use crate::session::{SessionCache, SessionError};

/// What a pipeline run produced.
#[derive(Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Diagnostics to publish.
    Publish(PublishDiagnosticsParams),
    /// The URI does not name a local file.
    NotLocal,
    /// No session could be acquired for the document's directory.
    Unavailable,
    /// The engine failed; previously published diagnostics stay in place.
    EngineFailed,
}

#[derive(Debug, Default)]
pub struct DiagnosticPipeline {
    warned_unavailable: bool,
}

impl DiagnosticPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, D>(
        &mut self,
        sessions: &mut SessionCache<F, D>,
        uri: &Url,
        content: &str,
    ) -> PipelineOutcome
    where
        F: EngineFactory,
        D: Discover,
    {
        let Some(path) = paths::resolve_local_path(uri) else {
            tracing::debug!(%uri, "Skipping analysis for non-local document");
            return PipelineOutcome::NotLocal;
        };
        let directory = paths::containing_directory(&path);

        let session = match sessions.get_or_create(&directory).await {
            Ok(session) => session,
            Err(e) => {
                self.warn_unavailable(&e);
                return PipelineOutcome::Unavailable;
            }
        };

        let mut diagnostics = match session.submit_source(&path, content).await {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Syntax analysis failed: {e}");
                return PipelineOutcome::EngineFailed;
            }
        };

        if diagnostics.has_error() {
            session.set_has_error(true);
            tracing::debug!(
                path = %path.display(),
                errors = diagnostics.error_count(),
                "Syntax errors; skipping type check"
            );
        } else {
            let checked = match session.typecheck_directory().await {
                Ok(set) => set,
                Err(e) => {
                    tracing::warn!(
                        directory = %directory.display(),
                        "Type check failed: {e}"
                    );
                    return PipelineOutcome::EngineFailed;
                }
            };
            session.set_has_error(checked.has_error());
            diagnostics.append(checked);
        }

        tracing::debug!(
            %uri,
            count = diagnostics.len(),
            errors = diagnostics.error_count(),
            warnings = diagnostics.warning_count(),
            has_error = session.has_error(),
            "Publishing diagnostics"
        );
        PipelineOutcome::Publish(PublishDiagnosticsParams {
            uri: uri.clone(),
            diagnostics,
            version: None,
        })
    }

    fn warn_unavailable(&mut self, error: &SessionError) {
        if self.warned_unavailable {
            tracing::debug!("Analysis unavailable: {error}");
        } else {
            self.warned_unavailable = true;
            tracing::warn!("Analysis unavailable: {error}");
        }
    }
}
