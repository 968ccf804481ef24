//! `ResolveConflict` (`spec.md` §4.5): consolidates conflicting records into
//! one successor and deprecates the originals.

use tracing::{info, instrument};

use crate::context::Context;
use crate::error::{MemoryError, Result};
use crate::fingerprint;
use crate::ports::pubsub::MemoryEvent;
use crate::ports::vector_store::VectorUpsert;
use crate::schema::{supersession_chain_is_acyclic, Category, MemoryId, MemoryRecord, Status};
use crate::scope::Scope;

impl super::MemoryEngine {
    #[instrument(skip(self, correct_content, reason))]
    pub async fn resolve_conflict(
        &self,
        scope: &Scope,
        conflicting_ids: &[MemoryId],
        correct_content: String,
        reason: String,
    ) -> Result<MemoryRecord> {
        let ctx = &self.ctx;
        if conflicting_ids.is_empty() {
            return Err(MemoryError::invalid_input("ResolveConflict requires at least one conflicting id"));
        }
        let scope_hash = scope.hash();

        let holder = uuid::Uuid::new_v4().to_string();
        let lock_key = fingerprint::resolve_lock_key(&scope_hash, conflicting_ids);
        let guard = ctx.lock_manager.acquire(&lock_key, &holder, ctx.write_lock_ttl()).await?;

        let outcome = resolve_locked(ctx, scope, conflicting_ids, correct_content, reason).await;

        let _ = ctx.lock_manager.release(guard).await;
        outcome
    }
}

async fn resolve_locked(
    ctx: &Context,
    scope: &Scope,
    conflicting_ids: &[MemoryId],
    correct_content: String,
    reason: String,
) -> Result<MemoryRecord> {
    // 2. Validate every id exists and is not already deprecated.
    let mut originals = Vec::with_capacity(conflicting_ids.len());
    for id in conflicting_ids {
        let Some(record) = ctx.vector_store.get(scope, id).await? else {
            return Err(MemoryError::not_found(format!("{id} does not exist in scope")).with_id(id.clone()));
        };
        if record.status == Status::Deprecated {
            return Err(MemoryError::conflict_unresolved(format!("{id} is already deprecated")).with_id(id.clone()));
        }
        originals.push(record);
    }

    let now = ctx.clock.now();
    let category = originals.first().map(|r| r.category).unwrap_or(Category::Generic);
    let new_id = fingerprint::fingerprint(scope, &correct_content, ctx.normalizer.as_ref());

    for original in &originals {
        if !supersession_chain_is_acyclic(&original.id, &new_id, |_| None) {
            return Err(MemoryError::invalid_input("resolution would introduce a supersession cycle"));
        }
    }

    // 3. Write the consolidated successor.
    let embedding = ctx.embedder.embed(&correct_content).await?;
    let extraction = ctx.extractor.extract(&correct_content).await.unwrap_or_default();

    let mut extra_metadata = std::collections::BTreeMap::new();
    extra_metadata.insert("resolution_reason".to_string(), reason);
    extra_metadata.insert(
        "original_ids".to_string(),
        conflicting_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(","),
    );

    let new_record = MemoryRecord {
        id: new_id.clone(),
        scope: scope.clone(),
        content: correct_content,
        embedding_ref: Some(format!("vec:{new_id}")),
        entities: extraction.entities.clone(),
        relations: extraction.relations.clone(),
        category,
        confidence: 10,
        source: "conflict_resolution".to_string(),
        tags: std::collections::BTreeSet::new(),
        created_at: now,
        updated_at: now,
        expires_at: None,
        version: 1,
        status: Status::Active,
        superseded_by: None,
        conflict_with: std::collections::BTreeSet::new(),
        extra_metadata,
        degraded: false,
        milestone: None,
    };

    ctx.vector_store
        .upsert(VectorUpsert { id: new_id.clone(), scope: scope.clone(), embedding, record: new_record.clone() })
        .await?;
    let _ = ctx.graph_store.upsert_node(scope, &new_id, &extraction.entities).await;
    let _ = ctx.graph_store.upsert_relations(scope, &new_id, &extraction.relations).await;

    // 4. Deprecate each original.
    for mut original in originals {
        original.status = Status::Deprecated;
        original.superseded_by = Some(new_id.clone());
        original.version += 1;
        original.updated_at = now;
        ctx.vector_store.put_record(scope, original.clone()).await?;
        let _ = ctx
            .pubsub
            .publish(
                "memory.deprecated",
                MemoryEvent::StatusChanged { scope: scope.clone(), id: original.id.clone(), new_status: "deprecated".to_string() },
            )
            .await;
    }

    // 5. Emit memory.created for the new record.
    let _ = ctx.pubsub.publish("memory.created", MemoryEvent::Saved { scope: scope.clone(), id: new_id.clone() }).await;

    // 6. Invalidate scope cache.
    let prefix = fingerprint::scope_cache_prefix(&scope.hash());
    let _ = ctx.cache.invalidate_prefix(&prefix).await;
    let _ = ctx.pubsub.publish("cache.invalidated", MemoryEvent::CacheInvalidated { scope: scope.clone(), prefix }).await;

    info!(new_id = %new_id, "conflict resolved");
    Ok(new_record)
}
