use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ports::Capabilities;
use crate::schema::MemoryId;
use crate::scope::Scope;

/// Change-notification events published by the dual-write coordinator and
/// the expiry sweeper (`spec.md` §4.3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MemoryEvent {
    Saved { scope: Scope, id: MemoryId },
    StatusChanged { scope: Scope, id: MemoryId, new_status: String },
    /// `spec.md` §4.3 step 8: the conflict event carries the new record's
    /// own id and category alongside the ids it conflicts with.
    Conflicted { scope: Scope, id: MemoryId, category: String, conflict_with: Vec<MemoryId> },
    Expired { scope: Scope, id: MemoryId },
    /// Published whenever a scope's cached search/context results are
    /// invalidated, so subscribers don't have to infer it from `Saved`.
    CacheInvalidated { scope: Scope, prefix: String },
}

#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, topic: &str, event: MemoryEvent) -> Result<()>;
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}
