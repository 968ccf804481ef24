//! The dual-write coordinator (`spec.md` §4.3): `Save` / `SaveVerified` /
//! `SaveMilestone`.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::context::Context;
use crate::conflict;
use crate::error::{MemoryError, Result};
use crate::fingerprint;
use crate::ports::pubsub::MemoryEvent;
use crate::ports::vector_store::VectorUpsert;
use crate::schema::{
    category_default, Category, MemoryId, MemoryRecord, MilestoneMetadata, MilestoneType, Status,
};
use crate::scope::Scope;

use super::compensation::CompensationTask;

#[derive(Debug, Clone, Default)]
pub struct SaveRequest {
    pub content: String,
    pub category: Category,
    pub confidence: Option<u8>,
    pub source: Option<String>,
    pub tags: BTreeSet<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub extra_metadata: BTreeMap<String, String>,
    pub milestone: Option<MilestoneMetadata>,
}

#[derive(Debug, Clone)]
pub struct SaveResult {
    pub id: MemoryId,
    pub created: bool,
    pub status: Status,
    pub conflicts: Vec<MemoryId>,
    pub degraded: bool,
}

impl super::MemoryEngine {
    #[instrument(skip(self, req), fields(category = ?req.category))]
    pub async fn save(&self, scope: &Scope, req: SaveRequest) -> Result<SaveResult> {
        save_internal(&self.ctx, scope, req).await
    }

    #[instrument(skip(self, req), fields(category = ?req.category))]
    pub async fn save_verified(&self, scope: &Scope, req: SaveRequest) -> Result<SaveResult> {
        let confidence = req.confidence.unwrap_or(0);
        if req.source.as_deref().unwrap_or("").trim().is_empty() {
            return Err(MemoryError::invalid_input("SaveVerified requires a non-empty source"));
        }
        if confidence < 7 {
            return Err(MemoryError::invalid_input("SaveVerified requires confidence >= 7"));
        }
        save_internal(&self.ctx, scope, req).await
    }

    #[instrument(skip(self, content, tags))]
    pub async fn save_milestone(
        &self,
        scope: &Scope,
        milestone_type: MilestoneType,
        content: String,
        impact_level: u8,
        tags: BTreeSet<String>,
    ) -> Result<MemoryRecord> {
        if !(1..=10).contains(&impact_level) {
            return Err(MemoryError::invalid_input("impact_level must be in 1..10"));
        }
        let req = SaveRequest {
            content,
            category: Category::Milestone,
            confidence: None,
            source: Some("milestone".to_string()),
            tags,
            expires_at: None,
            extra_metadata: BTreeMap::new(),
            milestone: Some(MilestoneMetadata { milestone_type, impact_level }),
        };
        let result = save_internal(&self.ctx, scope, req).await?;
        self.ctx
            .vector_store
            .get(scope, &result.id)
            .await?
            .ok_or_else(|| MemoryError::internal("milestone vanished immediately after save"))
    }
}

async fn save_internal(ctx: &Context, scope: &Scope, req: SaveRequest) -> Result<SaveResult> {
    // 1. Validate.
    if !scope.is_complete() {
        return Err(MemoryError::invalid_input("scope must have non-empty tenant and user"));
    }
    let confidence = ctx.config.resolve_confidence(req.category, req.confidence);
    if !MemoryRecord::confidence_in_range(confidence) {
        return Err(MemoryError::invalid_input(format!("confidence {confidence} out of range 1..10")));
    }
    if req.category == Category::Milestone && req.milestone.is_none() {
        return Err(MemoryError::invalid_input("category=milestone requires milestone metadata"));
    }

    // 2. Fingerprint.
    let id = fingerprint::fingerprint(scope, &req.content, ctx.normalizer.as_ref());
    let scope_hash = scope.hash();

    // 3. Acquire the per-(scope, id) write lock.
    let holder = uuid::Uuid::new_v4().to_string();
    let lock_key = fingerprint::write_lock_key(&scope_hash, &id);
    let guard = ctx
        .lock_manager
        .acquire(&lock_key, &holder, ctx.write_lock_ttl())
        .await
        .map_err(|e| e.with_id(id.clone()).with_scope(scope_hash.clone()))?;

    let result = save_locked(ctx, scope, &scope_hash, id.clone(), confidence, req).await;

    if let Err(release_err) = ctx.lock_manager.release(guard).await {
        warn!(error = %release_err, "failed to release write lock after save");
    }

    result
}

async fn save_locked(
    ctx: &Context,
    scope: &Scope,
    scope_hash: &crate::scope::ScopeHash,
    id: MemoryId,
    confidence: u8,
    req: SaveRequest,
) -> Result<SaveResult> {
    // 4. Idempotency check.
    if let Some(existing) = ctx.vector_store.get(scope, &id).await? {
        debug!(%id, "save is idempotent, record already exists");
        return Ok(SaveResult {
            id,
            created: false,
            status: existing.status,
            conflicts: existing.conflict_with.into_iter().collect(),
            degraded: existing.degraded,
        });
    }

    // 5. Parallel fanout to the embedder and extractor, each budgeted
    // against the request deadline (`spec.md` §5).
    let deadline = ctx.fresh_deadline();
    let (embedding, extraction) = tokio::join!(
        ctx.budgeted(deadline, ctx.embedder.embed(&req.content)),
        ctx.budgeted(deadline, ctx.extractor.extract(&req.content)),
    );
    let embedding = embedding.map_err(|e| e.with_id(id.clone()).with_scope(scope_hash.clone()))?;
    let extraction = match extraction {
        Ok(extraction) => extraction,
        Err(e) => {
            warn!(%id, error = %e, "extractor failed, proceeding with empty graph payload");
            crate::ports::extractor::Extraction::default()
        }
    };

    // 6. Conflict detection.
    let conflict_candidates = ctx
        .vector_store
        .search(scope, &embedding, 20)
        .await
        .map_err(|e| e.with_id(id.clone()).with_scope(scope_hash.clone()))?;

    let mut conflicts = Vec::new();
    let tau_conflict = ctx.config.conflict.tau_conflict;
    let now = ctx.clock.now();
    let candidate_record = build_record(&id, scope, &req, confidence, &extraction, now, Vec::new());

    for candidate in conflict_candidates {
        if candidate.similarity < tau_conflict {
            continue;
        }
        let Some(peer) = ctx.vector_store.get(scope, &candidate.id).await? else {
            continue;
        };
        if peer.category != req.category || peer.status != Status::Active {
            continue;
        }
        if conflict::detect(&candidate_record, &peer, &ctx.config.conflict, ctx.normalizer.as_ref()).is_some() {
            conflicts.push(peer.id.clone());
        }
    }

    let status = if conflicts.is_empty() { Status::Active } else { Status::Conflicted };
    let mut record = candidate_record;
    record.status = status;
    record.conflict_with = conflicts.iter().cloned().collect();

    // 7. Dual write: vector leg is mandatory, graph leg degrades.
    ctx.vector_store
        .upsert(VectorUpsert {
            id: id.clone(),
            scope: scope.clone(),
            embedding,
            record: record.clone(),
        })
        .await
        .map_err(|e| e.with_id(id.clone()).with_scope(scope_hash.clone()))?;

    let mut degraded = false;
    let graph_result = write_graph_leg(ctx, scope, &id, &extraction).await;
    if let Err(graph_err) = graph_result {
        warn!(%id, error = %graph_err, "graph leg failed, enqueuing compensation");
        degraded = true;
        record.degraded = true;
        ctx.vector_store.put_record(scope, record.clone()).await?;
        let _ = ctx
            .pubsub
            .publish(
                "memory.compensation_enqueued",
                MemoryEvent::StatusChanged { scope: scope.clone(), id: id.clone(), new_status: "degraded".to_string() },
            )
            .await;
        ctx.compensation.enqueue(CompensationTask::new(scope.clone(), id.clone(), extraction.clone()));
    }

    // Second pass: flag the conflicting peers too.
    for peer_id in &conflicts {
        if let Some(mut peer) = ctx.vector_store.get(scope, peer_id).await? {
            if matches!(peer.status, Status::Deprecated | Status::Expired) {
                continue;
            }
            peer.status = Status::Conflicted;
            peer.conflict_with.insert(id.clone());
            peer.updated_at = now;
            ctx.vector_store.put_record(scope, peer).await?;
        }
    }

    // 8. Emit event.
    if record.status == Status::Conflicted {
        let _ = ctx
            .pubsub
            .publish(
                "memory.conflicted",
                MemoryEvent::Conflicted {
                    scope: scope.clone(),
                    id: id.clone(),
                    category: req.category.slug().to_string(),
                    conflict_with: conflicts.clone(),
                },
            )
            .await;
    } else {
        let _ = ctx.pubsub.publish("memory.created", MemoryEvent::Saved { scope: scope.clone(), id: id.clone() }).await;
    }

    // 9. Invalidate the scope's cached search/context results.
    let prefix = fingerprint::scope_cache_prefix(scope_hash);
    let _ = ctx.cache.invalidate_prefix(&prefix).await;
    let _ = ctx.pubsub.publish("cache.invalidated", MemoryEvent::CacheInvalidated { scope: scope.clone(), prefix }).await;

    info!(%id, status = ?record.status, degraded, "save complete");

    Ok(SaveResult {
        id,
        created: true,
        status: record.status,
        conflicts,
        degraded,
    })
}

async fn write_graph_leg(
    ctx: &Context,
    scope: &Scope,
    id: &MemoryId,
    extraction: &crate::ports::extractor::Extraction,
) -> Result<()> {
    ctx.graph_store.upsert_node(scope, id, &extraction.entities).await?;
    ctx.graph_store.upsert_relations(scope, id, &extraction.relations).await?;
    Ok(())
}

fn build_record(
    id: &MemoryId,
    scope: &Scope,
    req: &SaveRequest,
    confidence: u8,
    extraction: &crate::ports::extractor::Extraction,
    now: DateTime<Utc>,
    conflict_with: Vec<MemoryId>,
) -> MemoryRecord {
    let expires_at = req.expires_at.or_else(|| {
        category_default(req.category)
            .ttl_days
            .map(|days| now + chrono::Duration::days(days as i64))
    });
    MemoryRecord {
        id: id.clone(),
        scope: scope.clone(),
        content: req.content.clone(),
        // The in-memory vector store uses the record id as its own opaque
        // handle; a real backend would return a distinct one here.
        embedding_ref: Some(format!("vec:{id}")),
        entities: extraction.entities.clone(),
        relations: extraction.relations.clone(),
        category: req.category,
        confidence,
        source: req.source.clone().unwrap_or_else(|| "unspecified".to_string()),
        tags: req.tags.clone(),
        created_at: now,
        updated_at: now,
        expires_at,
        version: 1,
        status: Status::Active,
        superseded_by: None,
        conflict_with: conflict_with.into_iter().collect(),
        extra_metadata: req.extra_metadata.clone(),
        degraded: false,
        milestone: req.milestone.clone(),
    }
}
