//! Expiry sweeper (`spec.md` §4.4): flips `active -> expired` once
//! `expires_at <= now`, idempotently, without ever deleting a record.

use tracing::{info, instrument};

use crate::context::Context;
use crate::error::Result;
use crate::ports::pubsub::MemoryEvent;
use crate::schema::Status;
use crate::scope::Scope;

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub expired_count: usize,
}

/// Scans every active record in `scope` and expires the ones past due.
/// Advances a scope-local high-water mark so repeated sweeps within the
/// same tick are cheap no-ops (`spec.md` §4.4's idempotence requirement).
#[instrument(skip(ctx))]
pub async fn sweep(ctx: &Context, scope: &Scope) -> Result<SweepReport> {
    let now = ctx.clock.now();
    let scope_hash = scope.hash();
    if let Some(mark) = ctx.expiry_marks.get(&scope_hash) {
        if *mark >= now {
            return Ok(SweepReport::default());
        }
    }

    let records = ctx.vector_store.list(scope).await?;
    let mut expired_count = 0;
    for mut record in records {
        if record.status != Status::Active {
            continue;
        }
        let Some(expires_at) = record.expires_at else {
            continue;
        };
        if expires_at > now {
            continue;
        }
        record.status = Status::Expired;
        record.updated_at = now;
        ctx.vector_store.put_record(scope, record.clone()).await?;
        let _ = ctx
            .pubsub
            .publish("memory.expired", MemoryEvent::Expired { scope: scope.clone(), id: record.id.clone() })
            .await;
        expired_count += 1;
    }

    ctx.expiry_marks.insert(scope_hash, now);
    if expired_count > 0 {
        info!(expired_count, "expiry sweep complete");
    }
    Ok(SweepReport { expired_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::context::Context;
    use crate::inmemory::{
        FixedClock, HashingEmbedder, InMemoryCache, InMemoryGraphStore, InMemoryLockManager, InMemoryPubSub,
        InMemoryVectorStore, NaiveExtractor,
    };
    use crate::ports::vector_store::VectorUpsert;
    use crate::schema::{Category, MemoryId, MemoryRecord};
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;

    fn sample_record(id: &str, scope: &Scope, expires_at: chrono::DateTime<chrono::Utc>) -> MemoryRecord {
        MemoryRecord {
            id: MemoryId::from_hex(id),
            scope: scope.clone(),
            content: "x".to_string(),
            embedding_ref: None,
            entities: vec![],
            relations: vec![],
            category: Category::Generic,
            confidence: 5,
            source: "test".to_string(),
            tags: BTreeSet::new(),
            created_at: expires_at,
            updated_at: expires_at,
            expires_at: Some(expires_at),
            version: 1,
            status: Status::Active,
            superseded_by: None,
            conflict_with: BTreeSet::new(),
            extra_metadata: BTreeMap::new(),
            degraded: false,
            milestone: None,
        }
    }

    fn test_context(now: chrono::DateTime<chrono::Utc>) -> (Context, Arc<InMemoryVectorStore>) {
        let vector_store = Arc::new(InMemoryVectorStore::new());
        let ctx = Context::new(
            Arc::new(HashingEmbedder::default()),
            Arc::new(NaiveExtractor),
            vector_store.clone(),
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(InMemoryCache::default()),
            Arc::new(InMemoryPubSub::new()),
            Arc::new(InMemoryLockManager::new()),
            Arc::new(FixedClock::new(now)),
            Arc::new(EngineConfig::default()),
        );
        (ctx, vector_store)
    }

    #[tokio::test]
    async fn expires_past_due_active_records_only() {
        let now = chrono::Utc::now();
        let (ctx, vector_store) = test_context(now);
        let scope = Scope::new("t1", "u1");
        let past_due = sample_record("11111111111111111111111111111111", &scope, now - chrono::Duration::seconds(1));
        let not_due = sample_record("22222222222222222222222222222222", &scope, now + chrono::Duration::days(1));

        vector_store
            .upsert(VectorUpsert { id: past_due.id.clone(), scope: scope.clone(), embedding: vec![], record: past_due })
            .await
            .unwrap();
        vector_store
            .upsert(VectorUpsert { id: not_due.id.clone(), scope: scope.clone(), embedding: vec![], record: not_due.clone() })
            .await
            .unwrap();

        let report = sweep(&ctx, &scope).await.unwrap();
        assert_eq!(report.expired_count, 1);

        let records = vector_store.list(&scope).await.unwrap();
        let expired = records.iter().find(|r| r.id == MemoryId::from_hex("11111111111111111111111111111111")).unwrap();
        assert_eq!(expired.status, Status::Expired);
        let untouched = records.iter().find(|r| r.id == not_due.id).unwrap();
        assert_eq!(untouched.status, Status::Active);
    }
}
