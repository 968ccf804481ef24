use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{MemoryError, Result};
use crate::ports::lock::LockGuard;
use crate::ports::{Capabilities, LockManager};

struct Lease {
    holder: String,
    expires_at: Instant,
}

/// Process-local write coordination, re-entrant per holder within the
/// lease's TTL window (`spec.md` §4.3 step 3, §5).
#[derive(Default)]
pub struct InMemoryLockManager {
    leases: DashMap<String, Lease>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<LockGuard> {
        let now = Instant::now();
        let mut entry = self.leases.entry(key.to_string()).or_insert_with(|| Lease {
            holder: holder.to_string(),
            expires_at: now + ttl,
        });

        if entry.expires_at <= now {
            entry.holder = holder.to_string();
            entry.expires_at = now + ttl;
        } else if entry.holder != holder {
            return Err(MemoryError::contended(format!("lock {key} held by another writer")));
        } else {
            entry.expires_at = now + ttl;
        }

        Ok(LockGuard {
            key: key.to_string(),
            holder: holder.to_string(),
        })
    }

    async fn release(&self, guard: LockGuard) -> Result<()> {
        if let Some(lease) = self.leases.get(&guard.key) {
            if lease.holder == guard.holder {
                drop(lease);
                self.leases.remove(&guard.key);
            }
        }
        Ok(())
    }

    async fn is_locked(&self, key: &str) -> Result<bool> {
        Ok(self
            .leases
            .get(key)
            .map(|lease| lease.expires_at > Instant::now())
            .unwrap_or(false))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}
