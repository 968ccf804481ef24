use async_trait::async_trait;

use crate::error::Result;
use crate::ports::Capabilities;
use crate::schema::{MemoryId, MemoryRecord};
use crate::scope::Scope;

#[derive(Debug, Clone)]
pub struct VectorUpsert {
    pub id: MemoryId,
    pub scope: Scope,
    pub embedding: Vec<f32>,
    /// `spec.md` §6: "vector store holds `(id -> {vector, payload =
    /// full-record-minus-graph})`" — the vector store is this engine's
    /// record-of-truth store, not just an ANN index.
    pub record: MemoryRecord,
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: MemoryId,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub similarity: f32,
}

/// Holds embeddings plus the full record payload, scoped per tenant
/// (`spec.md` §4.1, §4.6, §6).
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, entry: VectorUpsert) -> Result<()>;
    /// Overwrite the stored record without touching its embedding — used by
    /// status transitions (deprecate, conflict-flag, expire) that never
    /// change `content` (`spec.md` §3's immutable-content rule).
    async fn put_record(&self, scope: &Scope, record: MemoryRecord) -> Result<()>;
    async fn get(&self, scope: &Scope, id: &MemoryId) -> Result<Option<MemoryRecord>>;
    async fn list(&self, scope: &Scope) -> Result<Vec<MemoryRecord>>;
    async fn delete(&self, scope: &Scope, id: &MemoryId) -> Result<()>;
    async fn search(
        &self,
        scope: &Scope,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>>;
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}
