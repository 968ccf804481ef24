//! Memoria — a dual-write vector/graph memory orchestration engine for AI
//! agents (`spec.md` §1). See `DESIGN.md` for the grounding ledger.

pub mod conflict;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod inmemory;
pub mod ports;
pub mod schema;
pub mod scope;

pub use config::EngineConfig;
pub use context::Context;
pub use engine::{MemoryEngine, ScoredMemory, SearchResult};
pub use error::{ErrorKind, MemoryError, Result};
pub use schema::{Category, MemoryId, MemoryRecord, MilestoneType, Status};
pub use scope::Scope;
