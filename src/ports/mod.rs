//! The eight port traits the orchestrator depends on (`spec.md` §4.1).
//!
//! Each port is `Send + Sync` and asynchronous, following the `LlmClient`/
//! `Tool` shape from the teacher workspace: a narrow trait plus a
//! capability probe so the orchestrator can check what an adapter supports
//! at wiring time instead of duck-typing on error strings at call time
//! (`spec.md` §9's redesign flag).

pub mod cache;
pub mod clock;
pub mod embedder;
pub mod extractor;
pub mod graph_store;
pub mod lock;
pub mod pubsub;
pub mod vector_store;

pub use cache::Cache;
pub use clock::Clock;
pub use embedder::Embedder;
pub use extractor::Extractor;
pub use graph_store::GraphStore;
pub use lock::LockManager;
pub use pubsub::PubSub;
pub use vector_store::VectorStore;

/// What an adapter actually supports, probed once at construction time and
/// consulted by the orchestrator before it relies on optional behavior
/// (e.g. whether a `VectorStore` can do metadata filtering).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_metadata_filter: bool,
    pub supports_batch: bool,
    pub supports_transactions: bool,
}

/// Aggregated capability snapshot for every port currently wired into a
/// [`crate::context::Context`], surfaced by the `GraphStatus` operation
/// (`spec.md` §6).
#[derive(Debug, Clone, Default)]
pub struct PortCapabilities {
    pub vector_store: Capabilities,
    pub graph_store: Capabilities,
    pub cache: Capabilities,
    pub pubsub: Capabilities,
    pub lock: Capabilities,
}
