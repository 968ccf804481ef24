use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::ports::vector_store::{VectorMatch, VectorUpsert};
use crate::ports::{Capabilities, VectorStore};
use crate::schema::{MemoryId, MemoryRecord};
use crate::scope::{Scope, ScopeHash};

struct Entry {
    embedding: Vec<f32>,
    record: MemoryRecord,
}

/// Brute-force cosine-similarity vector store, keyed by scope hash so
/// cross-tenant queries never see each other's vectors. Doubles as the
/// engine's record-of-truth store per `spec.md` §6's persisted-state layout.
#[derive(Default)]
pub struct InMemoryVectorStore {
    by_scope: DashMap<ScopeHash, Vec<(MemoryId, Entry)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, entry: VectorUpsert) -> Result<()> {
        let scope_hash = entry.scope.hash();
        let mut bucket = self.by_scope.entry(scope_hash).or_default();
        bucket.retain(|(id, _)| *id != entry.id);
        bucket.push((
            entry.id,
            Entry {
                embedding: entry.embedding,
                record: entry.record,
            },
        ));
        Ok(())
    }

    async fn put_record(&self, scope: &Scope, record: MemoryRecord) -> Result<()> {
        let mut bucket = self.by_scope.entry(scope.hash()).or_default();
        if let Some((_, existing)) = bucket.iter_mut().find(|(id, _)| *id == record.id) {
            existing.record = record;
        } else {
            bucket.push((record.id.clone(), Entry { embedding: Vec::new(), record }));
        }
        Ok(())
    }

    async fn get(&self, scope: &Scope, id: &MemoryId) -> Result<Option<MemoryRecord>> {
        Ok(self
            .by_scope
            .get(&scope.hash())
            .and_then(|bucket| bucket.iter().find(|(existing, _)| existing == id).map(|(_, e)| e.record.clone())))
    }

    async fn list(&self, scope: &Scope) -> Result<Vec<MemoryRecord>> {
        Ok(self
            .by_scope
            .get(&scope.hash())
            .map(|bucket| bucket.iter().map(|(_, e)| e.record.clone()).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, scope: &Scope, id: &MemoryId) -> Result<()> {
        if let Some(mut bucket) = self.by_scope.get_mut(&scope.hash()) {
            bucket.retain(|(existing, _)| existing != id);
        }
        Ok(())
    }

    async fn search(&self, scope: &Scope, query: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let Some(bucket) = self.by_scope.get(&scope.hash()) else {
            return Ok(Vec::new());
        };
        let mut matches: Vec<VectorMatch> = bucket
            .iter()
            .filter(|(_, entry)| !entry.embedding.is_empty())
            .map(|(id, entry)| VectorMatch {
                id: id.clone(),
                similarity: cosine(query, &entry.embedding),
            })
            .collect();
        matches.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_batch: false,
            supports_metadata_filter: false,
            supports_transactions: false,
        }
    }
}
