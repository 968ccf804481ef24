use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::ports::{Capabilities, Embedder};

/// Deterministic stand-in embedder: hashes overlapping word shingles into a
/// fixed-width bag-of-hashes vector. Good enough to exercise cosine-similarity
/// ranking in tests without a real model dependency.
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0f32; self.dims];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = Sha256::new();
            hasher.update(token.as_bytes());
            let digest = hasher.finalize();
            let bucket = (u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize) % self.dims;
            let sign = if digest[4] % 2 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_batch: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_embeds_identically() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("the service uses postgres").await.unwrap();
        let b = embedder.embed("the service uses postgres").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn embedding_is_unit_normalized() {
        let embedder = HashingEmbedder::default();
        let v = embedder.embed("some words here").await.unwrap();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
