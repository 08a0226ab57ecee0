//! Per-directory analysis sessions.
//!
//! Every project directory gets one engine instance, created lazily the
//! first time a document in it is analyzed and kept until the server exits.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lichen_types::{CompletionItem, DiagnosticSet, Location};

use crate::diagnostics;
use crate::engine::{AnalysisEngine, EngineError, EngineFactory, EngineOptions};
use crate::fs::FileSystem;
use crate::paths;
use crate::prerequisites::{Discover, PrerequisiteError, Prerequisites};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("toolchain unavailable: {0}")]
    Unavailable(#[from] PrerequisiteError),
    #[error("creating engine for {}: {source}", directory.display())]
    Engine {
        directory: PathBuf,
        #[source]
        source: EngineError,
    },
}

/// An engine instance bound to one directory, plus the outcome of the last
/// analysis pass committed through it.
pub struct AnalysisSession<E> {
    directory: PathBuf,
    engine: E,
    has_error: bool,
    search_paths: Vec<PathBuf>,
}

impl<E: AnalysisEngine> AnalysisSession<E> {
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Module search paths the engine was created with.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Whether the last committed pass reported an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    pub fn set_has_error(&mut self, has_error: bool) {
        self.has_error = has_error;
    }

    /// Syntax phase for one document. Also replaces the engine's cached copy.
    pub async fn submit_source(
        &mut self,
        path: &Path,
        content: &str,
    ) -> Result<DiagnosticSet, EngineError> {
        diagnostics::unify(self.engine.submit_source(path, content).await)
    }

    /// Type-check phase over every document the engine holds for this
    /// directory.
    pub async fn typecheck_directory(&mut self) -> Result<DiagnosticSet, EngineError> {
        diagnostics::unify(self.engine.typecheck_directory(&self.directory).await)
    }

    pub async fn locate_definition(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> Result<Option<Location>, EngineError> {
        let location = self.engine.locate_definition(path, offset).await?;
        Ok(location.and_then(diagnostics::to_location))
    }

    pub async fn locate_completions(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> Result<Vec<CompletionItem>, EngineError> {
        self.engine.locate_completions(path, offset).await
    }
}

struct SessionBuilder<F, D> {
    factory: F,
    discover: D,
    fs: Arc<dyn FileSystem>,
    search_dir_name: String,
    prerequisites: Option<Prerequisites>,
}

impl<F: EngineFactory, D: Discover> SessionBuilder<F, D> {
    async fn prerequisites(&mut self) -> Result<&Prerequisites, PrerequisiteError> {
        let found = match self.prerequisites.take() {
            Some(found) => found,
            None => self.discover.discover().await?,
        };
        Ok(self.prerequisites.insert(found))
    }

    async fn construct(
        &mut self,
        directory: &Path,
    ) -> Result<AnalysisSession<F::Engine>, SessionError> {
        let found = self.prerequisites().await?.clone();

        let mut search_paths = vec![found.std_dir.clone()];
        search_paths.extend(paths::search_roots(directory, &self.search_dir_name));

        let options = EngineOptions {
            find_paths: search_paths.clone(),
            runtime_dir: found.runtime_dir,
            preclude_dir: found.std_dir,
        };
        let engine = self
            .factory
            .create(Arc::clone(&self.fs), options)
            .await
            .map_err(|source| SessionError::Engine {
                directory: directory.to_path_buf(),
                source,
            })?;

        Ok(AnalysisSession {
            directory: directory.to_path_buf(),
            engine,
            has_error: false,
            search_paths,
        })
    }
}

/// Directory → session map. Sessions are never evicted.
///
/// Construction borrows the cache mutably, so a second construction for the
/// same directory cannot start while one is in flight; the first session
/// registered for a directory is the one every later caller gets.
pub struct SessionCache<F: EngineFactory, D> {
    builder: SessionBuilder<F, D>,
    sessions: HashMap<PathBuf, AnalysisSession<F::Engine>>,
}

impl<F: EngineFactory, D: Discover> SessionCache<F, D> {
    pub fn new(factory: F, discover: D, fs: Arc<dyn FileSystem>, search_dir_name: &str) -> Self {
        Self {
            builder: SessionBuilder {
                factory,
                discover,
                fs,
                search_dir_name: search_dir_name.to_string(),
                prerequisites: None,
            },
            sessions: HashMap::new(),
        }
    }

    /// Discover toolchain prerequisites if not already known.
    ///
    /// Failures are not remembered; the next call probes again.
    pub async fn ensure_prerequisites(&mut self) -> Result<&Prerequisites, PrerequisiteError> {
        self.builder.prerequisites().await
    }

    #[must_use]
    pub fn has_prerequisites(&self) -> bool {
        self.builder.prerequisites.is_some()
    }

    /// The session for `directory`, creating and registering it on first use.
    ///
    /// A failed construction caches nothing.
    pub async fn get_or_create(
        &mut self,
        directory: &Path,
    ) -> Result<&mut AnalysisSession<F::Engine>, SessionError> {
        match self.sessions.entry(directory.to_path_buf()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let session = self.builder.construct(entry.key()).await?;
                tracing::info!(directory = %directory.display(), "Analysis session created");
                Ok(entry.insert(session))
            }
        }
    }

    /// Existing session for `directory`; never creates one.
    pub fn lookup(&mut self, directory: &Path) -> Option<&mut AnalysisSession<F::Engine>> {
        self.sessions.get_mut(directory)
    }

    #[must_use]
    pub fn contains(&self, directory: &Path) -> bool {
        self.sessions.contains_key(directory)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
