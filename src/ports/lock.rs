use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::ports::Capabilities;

/// Held lease returned by [`LockManager::acquire`]; releasing consumes it so
/// a caller cannot accidentally hold a handle past its release.
pub struct LockGuard {
    pub key: String,
    pub holder: String,
}

/// Distributed (or, for the reference adapter, process-local) write
/// coordination. Re-entrant per `holder` within the same TTL window
/// (`spec.md` §4.3 step 3, §5).
#[async_trait]
pub trait LockManager: Send + Sync {
    async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<LockGuard>;
    async fn release(&self, guard: LockGuard) -> Result<()>;
    async fn is_locked(&self, key: &str) -> Result<bool>;
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}
