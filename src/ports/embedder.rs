use async_trait::async_trait;

use crate::error::Result;
use crate::ports::Capabilities;

/// Turns text into a dense vector (`spec.md` §4.1 component table).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
    fn dimensions(&self) -> usize;
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_batch: true,
            ..Default::default()
        }
    }
}
