//! Optional `qdrant` feature adapter, wired the same way the teacher gates
//! its own `qdrant` feature behind `dep:qdrant-client` — a real backing
//! store for deployments that outgrow [`super::InMemoryVectorStore`].

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, Condition, Filter, GetPointsBuilder, PointId, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
};
use qdrant_client::Qdrant;

use crate::error::{MemoryError, Result};
use crate::ports::vector_store::{VectorMatch, VectorUpsert};
use crate::ports::{Capabilities, VectorStore};
use crate::schema::{MemoryId, MemoryRecord};
use crate::scope::Scope;

const SCOPE_PAYLOAD_KEY: &str = "scope_hash";
const RECORD_PAYLOAD_KEY: &str = "record_json";

pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorStore {
    pub fn new(client: Qdrant, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    fn to_error(context: &str, err: impl std::fmt::Display) -> MemoryError {
        MemoryError::new(
            crate::error::ErrorKind::VectorStoreUnavailable,
            format!("{context}: {err}"),
        )
    }

    fn record_from_payload(payload: &std::collections::HashMap<String, QdrantValue>) -> Option<MemoryRecord> {
        let raw = payload.get(RECORD_PAYLOAD_KEY)?.as_str()?;
        serde_json::from_str(raw).ok()
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(&self, entry: VectorUpsert) -> Result<()> {
        let record_json =
            serde_json::to_string(&entry.record).map_err(|e| Self::to_error("serialize record", e))?;
        let mut payload: std::collections::HashMap<String, QdrantValue> = Default::default();
        payload.insert(SCOPE_PAYLOAD_KEY.to_string(), entry.scope.hash().to_string().into());
        payload.insert(RECORD_PAYLOAD_KEY.to_string(), record_json.into());

        let point = PointStruct::new(entry.id.as_str().to_string(), entry.embedding, payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection.clone(), vec![point]))
            .await
            .map_err(|e| Self::to_error("qdrant upsert", e))?;
        Ok(())
    }

    async fn put_record(&self, scope: &Scope, record: MemoryRecord) -> Result<()> {
        // No embedding change: re-upsert the existing vector's payload by
        // fetching it first (qdrant has no payload-only point update that
        // preserves the vector across this client's builder API).
        let existing = self.get(scope, &record.id).await?;
        let embedding = if existing.is_some() {
            self.client
                .get_points(GetPointsBuilder::new(self.collection.clone(), vec![record.id.as_str().to_string().into()]).with_vectors(true))
                .await
                .map_err(|e| Self::to_error("qdrant get for put_record", e))?
                .result
                .into_iter()
                .next()
                .and_then(|p| p.vectors)
                .and_then(|v| v.vectors_options)
                .and_then(|opt| match opt {
                    qdrant_client::qdrant::vectors_output::VectorsOptions::Vector(v) => Some(v.data),
                    _ => None,
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        self.upsert(VectorUpsert {
            id: record.id.clone(),
            scope: scope.clone(),
            embedding,
            record,
        })
        .await
    }

    async fn get(&self, _scope: &Scope, id: &MemoryId) -> Result<Option<MemoryRecord>> {
        let response = self
            .client
            .get_points(GetPointsBuilder::new(self.collection.clone(), vec![id.as_str().to_string().into()]))
            .await
            .map_err(|e| Self::to_error("qdrant get", e))?;
        Ok(response.result.into_iter().next().and_then(|p| Self::record_from_payload(&p.payload)))
    }

    async fn list(&self, scope: &Scope) -> Result<Vec<MemoryRecord>> {
        let filter = Filter::must([Condition::matches(SCOPE_PAYLOAD_KEY, scope.hash().to_string())]);
        let response = self
            .client
            .scroll(ScrollPointsBuilder::new(self.collection.clone()).filter(filter).limit(10_000))
            .await
            .map_err(|e| Self::to_error("qdrant scroll", e))?;
        Ok(response
            .result
            .into_iter()
            .filter_map(|p| Self::record_from_payload(&p.payload))
            .collect())
    }

    async fn delete(&self, _scope: &Scope, id: &MemoryId) -> Result<()> {
        let point_id = PointId {
            point_id_options: Some(PointIdOptions::Uuid(id.as_str().to_string())),
        };
        self.client
            .delete_points(self.collection.clone(), None, &vec![point_id].into(), None)
            .await
            .map_err(|e| Self::to_error("qdrant delete", e))?;
        Ok(())
    }

    async fn search(&self, scope: &Scope, query: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let filter = Filter::must([Condition::matches(SCOPE_PAYLOAD_KEY, scope.hash().to_string())]);
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(self.collection.clone(), query.to_vec(), top_k as u64)
                    .filter(filter),
            )
            .await
            .map_err(|e| Self::to_error("qdrant search", e))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|scored| {
                let id = match scored.id?.point_id_options? {
                    PointIdOptions::Uuid(s) => s,
                    PointIdOptions::Num(n) => n.to_string(),
                };
                Some(VectorMatch {
                    id: MemoryId::from_hex(&id),
                    similarity: scored.score,
                })
            })
            .collect())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_metadata_filter: true,
            supports_batch: true,
            supports_transactions: false,
        }
    }
}
