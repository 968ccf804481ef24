use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::ports::Capabilities;

/// Result cache for `Search`/`GetContext` (`spec.md` §4.6). Keys are the
/// strings produced by [`crate::fingerprint::search_cache_key`] and friends.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    /// Drops every entry whose key starts with `prefix`; called on write to
    /// invalidate a scope's cached search results (`spec.md` §4.6).
    async fn invalidate_prefix(&self, prefix: &str) -> Result<()>;
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}
