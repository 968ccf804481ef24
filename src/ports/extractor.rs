use async_trait::async_trait;

use crate::error::Result;
use crate::ports::Capabilities;
use crate::schema::Relation;

/// Pulls entities and relations out of free text for the graph leg of a
/// dual write (`spec.md` §4.1).
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub entities: Vec<String>,
    pub relations: Vec<Relation>,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Extraction>;
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}
