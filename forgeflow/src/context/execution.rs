//! The mutable context of a pipeline invocation.

use super::RunIdentity;
use crate::cancellation::{CancellationToken, CleanupRegistry};
use crate::core::BuildEvent;
use crate::events::{get_event_sink, EventSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a run keeps its stage workspaces.
///
/// An owned root is a temp directory reclaimed when the last handle
/// drops, so even an aborted invoking process leaves nothing behind. An
/// external root is caller-managed.
#[derive(Debug, Clone)]
pub enum ScratchRoot {
    /// A run-scoped temporary directory, removed on drop.
    Owned(Arc<tempfile::TempDir>),
    /// A caller-managed directory; never removed by the engine.
    External(PathBuf),
}

impl ScratchRoot {
    /// Returns the root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Owned(dir) => dir.path(),
            Self::External(path) => path,
        }
    }
}

/// The context shared by every stage of one pipeline invocation.
///
/// Holds the run identity, the scratch root, the event sink, and the
/// cancellation/teardown machinery. Contexts are created per invocation
/// and never shared across runs.
pub struct BuildContext {
    identity: RunIdentity,
    scratch: ScratchRoot,
    event_sink: Arc<dyn EventSink>,
    cancellation: CancellationToken,
    cleanup: CleanupRegistry,
}

impl BuildContext {
    /// Creates a context with a fresh run-scoped temp directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the temp directory cannot be created.
    pub fn new(identity: RunIdentity) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("forgeflow-{}-", identity.short()))
            .tempdir()?;

        Ok(Self {
            identity,
            scratch: ScratchRoot::Owned(Arc::new(dir)),
            event_sink: get_event_sink(),
            cancellation: CancellationToken::new(),
            cleanup: CleanupRegistry::new(),
        })
    }

    /// Creates a context over a caller-managed scratch directory.
    #[must_use]
    pub fn with_scratch_root(identity: RunIdentity, root: impl Into<PathBuf>) -> Self {
        Self {
            identity,
            scratch: ScratchRoot::External(root.into()),
            event_sink: get_event_sink(),
            cancellation: CancellationToken::new(),
            cleanup: CleanupRegistry::new(),
        }
    }

    /// Replaces the event sink for this run.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the scratch root.
    #[must_use]
    pub fn scratch(&self) -> &ScratchRoot {
        &self.scratch
    }

    /// Returns the directory a named stage builds its filesystem in.
    #[must_use]
    pub fn stage_root(&self, stage: &str) -> PathBuf {
        self.scratch.path().join("stages").join(stage)
    }

    /// Returns the directory the layer cache restores/stores under when
    /// no shared cache root is configured.
    #[must_use]
    pub fn cache_root(&self) -> PathBuf {
        self.scratch.path().join("cache")
    }

    /// Emits an event without blocking.
    pub fn emit(&self, event: BuildEvent) {
        self.event_sink.try_emit(event);
    }

    /// Requests cancellation of the run.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancellation.cancel(reason);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<String> {
        self.cancellation.reason()
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns the teardown registry.
    #[must_use]
    pub fn cleanup(&self) -> &CleanupRegistry {
        &self.cleanup
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("run_id", &self.identity.run_id)
            .field("scratch", &self.scratch.path())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    #[test]
    fn test_context_creates_scratch() {
        let ctx = BuildContext::new(RunIdentity::new()).unwrap();
        assert!(ctx.scratch().path().exists());
        assert!(ctx
            .stage_root("builder")
            .starts_with(ctx.scratch().path()));
    }

    #[test]
    fn test_external_scratch_root() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = BuildContext::with_scratch_root(RunIdentity::new(), dir.path());
        assert_eq!(ctx.scratch().path(), dir.path());
    }

    #[test]
    fn test_emit_reaches_sink() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = BuildContext::with_scratch_root(RunIdentity::new(), "/tmp/unused")
            .with_event_sink(sink.clone());

        ctx.emit(BuildEvent::pipeline_started("engine"));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_cancellation_flows_through() {
        let ctx = BuildContext::with_scratch_root(RunIdentity::new(), "/tmp/unused");
        assert!(!ctx.is_cancelled());

        ctx.cancel("operator abort");
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.cancel_reason(), Some("operator abort".to_string()));
    }
}
