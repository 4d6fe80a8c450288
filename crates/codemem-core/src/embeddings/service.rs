//! The embedding backend seam and the caching service wrapping it (§4.2).

use async_trait::async_trait;

use crate::{Error, Result};

use super::{cache::EmbeddingCache, l2_normalize};

/// A pluggable source of text embeddings. Implementations must return
/// fixed-dimension, L2-normalized vectors.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate one embedding. Implementations must reject empty/whitespace
    /// input with [`Error::Embedding`].
    async fn generate(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for many texts, preserving order.
    async fn batch_generate(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.generate(text).await?);
        }
        Ok(out)
    }

    /// Stable identifier of the model this backend serves, e.g.
    /// "nomic-embed-text-v1.5".
    fn model_id(&self) -> &str;

    /// Output vector length.
    fn embedding_dim(&self) -> usize;
}

/// Wraps an [`EmbeddingBackend`] with a content-addressed cache and batching
/// that preserves input order (§4.2).
pub struct EmbeddingService {
    backend: Box<dyn EmbeddingBackend>,
    cache: Option<EmbeddingCache>,
}

impl EmbeddingService {
    /// Build a service over `backend`. Pass `cache_capacity = 0` to disable
    /// caching entirely.
    pub fn new(backend: Box<dyn EmbeddingBackend>, cache_capacity: usize) -> Self {
        Self {
            backend,
            cache: (cache_capacity > 0).then(|| EmbeddingCache::new(cache_capacity)),
        }
    }

    /// The underlying model identifier.
    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    /// Constant dimension of every vector this service returns.
    pub fn embedding_dim(&self) -> usize {
        self.backend.embedding_dim()
    }

    /// Generate (or fetch from cache) the embedding for `text`.
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::Embedding("text must not be empty".into()));
        }
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(self.model_id(), text) {
                return Ok(hit);
            }
        }
        let mut vector = self.backend.generate(text).await?;
        l2_normalize(&mut vector);
        if let Some(cache) = &self.cache {
            cache.put(self.model_id(), text, vector.clone());
        }
        Ok(vector)
    }

    /// Generate embeddings for `texts`, splitting into cached hits and
    /// uncached misses, generating only the misses, and reassembling in the
    /// original order. An empty element anywhere aborts the whole batch.
    pub async fn batch_generate(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::Embedding(
                "batch_generate received an empty text element".into(),
            ));
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut miss_indices = Vec::new();
        let mut miss_texts = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.get(self.model_id(), text) {
                    results[i] = Some(hit);
                    continue;
                }
            }
            miss_indices.push(i);
            miss_texts.push(text.clone());
        }

        if !miss_texts.is_empty() {
            // One contiguous buffer for the batch, sliced per-text at the
            // boundary (§4.2 pooling supplement).
            let dim = self.embedding_dim();
            let mut buffer = vec![0.0f32; miss_texts.len() * dim];
            let generated = self.backend.batch_generate(&miss_texts).await?;
            for (slot, mut vector) in buffer.chunks_mut(dim).zip(generated) {
                l2_normalize(&mut vector);
                slot.copy_from_slice(&vector[..dim.min(vector.len())]);
            }
            for (j, &i) in miss_indices.iter().enumerate() {
                let vector = buffer[j * dim..(j + 1) * dim].to_vec();
                if let Some(cache) = &self.cache {
                    cache.put(self.model_id(), &miss_texts[j], vector.clone());
                }
                results[i] = Some(vector);
            }
        }

        Ok(results.into_iter().map(|r| r.expect("every index filled")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbeddingBackend;

    #[tokio::test]
    async fn generate_rejects_empty_text() {
        let service = EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 8)), 16);
        assert!(service.generate("   ").await.is_err());
    }

    #[tokio::test]
    async fn batch_generate_preserves_order() {
        let service = EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 8)), 16);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let batch = service.batch_generate(&texts).await.unwrap();
        for (text, vector) in texts.iter().zip(batch.iter()) {
            let single = service.generate(text).await.unwrap();
            assert_eq!(&single, vector);
        }
    }

    #[tokio::test]
    async fn batch_generate_rejects_any_empty_element() {
        let service = EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 8)), 16);
        let texts = vec!["fine".to_string(), "".to_string()];
        assert!(service.batch_generate(&texts).await.is_err());
    }

    #[tokio::test]
    async fn cache_hit_avoids_recompute_but_matches_result() {
        let service = EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 8)), 16);
        let a = service.generate("same text").await.unwrap();
        let b = service.generate("same text").await.unwrap();
        assert_eq!(a, b);
    }
}
