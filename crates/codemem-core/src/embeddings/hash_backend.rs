//! Deterministic, hash-based [`EmbeddingBackend`] used by component and
//! integration tests so they run without a model download or network
//! access (§10.4).

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::Result;

use super::{l2_normalize, EmbeddingBackend};

/// Produces a deterministic pseudo-embedding from the SHA-256 of the input
/// text, repeated/truncated to `dim` floats and L2-normalized. Equal text
/// always yields an equal vector; no two distinct texts are guaranteed
/// dissimilar, but that's fine for exercising the store/service contracts.
pub struct HashEmbeddingBackend {
    model_id: String,
    dim: usize,
}

impl HashEmbeddingBackend {
    /// A backend that reports `model_id` and produces `dim`-length vectors.
    pub fn new(model_id: impl Into<String>, dim: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dim: dim.max(1),
        }
    }
}

#[async_trait]
impl EmbeddingBackend for HashEmbeddingBackend {
    async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();

        let mut vector = Vec::with_capacity(self.dim);
        for i in 0..self.dim {
            let byte = digest[i % digest.len()];
            // Spread into [-1, 1] so the vector isn't degenerate.
            vector.push((byte as f32 / 255.0) * 2.0 - 1.0);
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embedding_dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_yields_same_vector() {
        let backend = HashEmbeddingBackend::new("fake", 16);
        let a = backend.generate("hello world").await.unwrap();
        let b = backend.generate("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[tokio::test]
    async fn different_text_yields_different_vector() {
        let backend = HashEmbeddingBackend::new("fake", 16);
        let a = backend.generate("hello").await.unwrap();
        let b = backend.generate("goodbye").await.unwrap();
        assert_ne!(a, b);
    }
}
