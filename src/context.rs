//! Request-scoped handle bundle (`spec.md` §9 redesign flag: replaces a
//! global-singleton wiring style with an explicit, constructible context
//! any caller can pass around and any test can swap out piece by piece).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::EngineConfig;
use crate::engine::compensation::CompensationWorker;
use crate::error::{ErrorKind, MemoryError, Result};
use crate::fingerprint::{DefaultNormalizer, Normalizer};
use crate::ports::{Cache, Clock, Embedder, Extractor, GraphStore, LockManager, PortCapabilities, PubSub, VectorStore};
use crate::scope::ScopeHash;

/// Everything the orchestrator needs to run one request: the wired ports,
/// configuration, and a deadline the dual-write coordinator budgets against.
#[derive(Clone)]
pub struct Context {
    pub embedder: Arc<dyn Embedder>,
    pub extractor: Arc<dyn Extractor>,
    pub vector_store: Arc<dyn VectorStore>,
    pub graph_store: Arc<dyn GraphStore>,
    pub cache: Arc<dyn Cache>,
    pub pubsub: Arc<dyn PubSub>,
    pub lock_manager: Arc<dyn LockManager>,
    pub clock: Arc<dyn Clock>,
    pub normalizer: Arc<dyn Normalizer>,
    pub config: Arc<EngineConfig>,
    /// Per-scope expiry-sweep high-water marks, owned by this context (not a
    /// process-global static) so independent engines/tests never interfere
    /// with each other's sweep cadence (`spec.md` §4.4).
    pub(crate) expiry_marks: Arc<DashMap<ScopeHash, DateTime<Utc>>>,
    /// Bounded-concurrency background worker that reconciles failed graph
    /// writes (`spec.md` §4.7). Owned here so every `save`/`resolve` call
    /// routes through the same queue instead of spawning ad hoc tasks.
    pub(crate) compensation: Arc<CompensationWorker>,
}

impl Context {
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
        config: Arc<EngineConfig>,
    ) -> Self {
        let compensation = Arc::new(CompensationWorker::spawn(
            graph_store.clone(),
            vector_store.clone(),
            pubsub.clone(),
            config.compensation,
        ));
        Self {
            embedder,
            extractor,
            vector_store,
            graph_store,
            cache,
            pubsub,
            lock_manager,
            clock,
            normalizer: Arc::new(DefaultNormalizer),
            config,
            expiry_marks: Arc::new(DashMap::new()),
            compensation,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Reset the per-request deadline; call at the start of each operation
    /// so a long-lived `Context` doesn't accumulate a stale budget.
    pub fn fresh_deadline(&self) -> Instant {
        Instant::now() + Duration::from_millis(self.config.lock.write_budget_ms)
    }

    /// Lock TTL for a write: the remaining write budget plus the configured
    /// safety margin (`spec.md` §4.3 step 3).
    pub fn write_lock_ttl(&self) -> Duration {
        Duration::from_millis(self.config.lock.write_budget_ms + self.config.lock.safety_margin_ms)
    }

    /// Runs `fut` under `min(remaining_deadline, per-port-budget)` (`spec.md`
    /// §5). Returns a [`ErrorKind::Timeout`] error if the budget is already
    /// exhausted or expires before `fut` resolves.
    pub async fn budgeted<T>(&self, deadline: Instant, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let budget = remaining.min(Duration::from_millis(self.config.timeouts.per_port_budget_ms));
        if budget.is_zero() {
            return Err(MemoryError::new(ErrorKind::Timeout, "request deadline exceeded before port call"));
        }
        match tokio::time::timeout(budget, fut).await {
            Ok(inner) => inner,
            Err(_) => Err(MemoryError::new(ErrorKind::Timeout, "port call exceeded budget")),
        }
    }

    pub fn capabilities(&self) -> PortCapabilities {
        PortCapabilities {
            vector_store: self.vector_store.capabilities(),
            graph_store: self.graph_store.capabilities(),
            cache: self.cache.capabilities(),
            pubsub: self.pubsub.capabilities(),
            lock: self.lock_manager.capabilities(),
        }
    }
}
