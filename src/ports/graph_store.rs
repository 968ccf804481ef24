use async_trait::async_trait;

use crate::error::Result;
use crate::ports::Capabilities;
use crate::schema::{MemoryId, Relation};
use crate::scope::Scope;

#[derive(Debug, Clone)]
pub struct GraphNodeMatch {
    pub id: MemoryId,
    /// Hop-weighted score, normalized to `[0.0, 1.0]` (`spec.md` §4.6).
    pub score: f32,
}

/// Holds the entity/relation graph extracted from saved memories
/// (`spec.md` §4.1, §4.6, §4.8).
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_node(&self, scope: &Scope, id: &MemoryId, entities: &[String]) -> Result<()>;
    async fn upsert_relations(&self, scope: &Scope, id: &MemoryId, relations: &[Relation]) -> Result<()>;
    async fn delete_node(&self, scope: &Scope, id: &MemoryId) -> Result<()>;
    /// Multi-hop traversal anchored on `entity`, walking up to `max_hops`
    /// edges and returning every record id implicated along the way
    /// (`spec.md` §4.1, §4.6 step 2).
    async fn neighborhood(&self, scope: &Scope, entity: &str, max_hops: u32) -> Result<Vec<MemoryId>>;
    /// Direct textual match against entity names, independent of traversal
    /// depth — the second graph-path source `spec.md` §4.6 step 2 asks for
    /// alongside `neighborhood`.
    async fn search(&self, scope: &Scope, query_terms: &[String], top_k: usize) -> Result<Vec<GraphNodeMatch>>;
    /// Direct relations touching `entity`, used by `GetEntityRelationships`.
    async fn relations_for_entity(&self, scope: &Scope, entity: &str) -> Result<Vec<Relation>>;
    /// Node and edge counts for `GraphStatus`.
    async fn stats(&self, scope: &Scope) -> Result<GraphStats>;
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
}
