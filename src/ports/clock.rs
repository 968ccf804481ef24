use chrono::{DateTime, Utc};

/// Injectable time source so expiry and freshness-scoring logic can be
/// tested deterministically (`spec.md` §9, replacing a `Utc::now()`
/// singleton with an explicit port).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
