//! The orchestrator: one `MemoryEngine` per deployment, wrapping a
//! [`Context`] and exposing the operation table from `spec.md` §6 as
//! inherent `async fn`s.

pub(crate) mod compensation;
mod expiry;
mod project;
mod resolve;
mod retrieval;
mod save;

pub use compensation::CompensationTask;
pub use expiry::SweepReport;
pub use project::{EntityRelationships, ProjectState, QualityReport, Timeline, ValidationReport};
pub use retrieval::{ScoredMemory, SearchFilter, SearchResult};
pub use save::{SaveRequest, SaveResult};

use std::sync::Arc;

use tracing::instrument;

use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::Result;
use crate::ports::{Cache, Clock, Embedder, Extractor, GraphStore, LockManager, PortCapabilities, PubSub, VectorStore};

pub struct MemoryEngine {
    pub(crate) ctx: Context,
}

impl MemoryEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn Extractor>,
        vector_store: Arc<dyn VectorStore>,
        graph_store: Arc<dyn GraphStore>,
        cache: Arc<dyn Cache>,
        pubsub: Arc<dyn PubSub>,
        lock_manager: Arc<dyn LockManager>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let ctx = Context::new(
            embedder,
            extractor,
            vector_store,
            graph_store,
            cache,
            pubsub,
            lock_manager,
            clock,
            Arc::new(config),
        );
        Self { ctx }
    }

    /// `GraphStatus` (`spec.md` §6): capability flags probed from every
    /// wired port.
    #[instrument(skip(self))]
    pub fn graph_status(&self) -> PortCapabilities {
        self.ctx.capabilities()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub async fn run_expiry_sweep(&self, scope: &crate::scope::Scope) -> Result<expiry::SweepReport> {
        expiry::sweep(&self.ctx, scope).await
    }
}
