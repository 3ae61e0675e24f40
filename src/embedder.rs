use sha2::{Digest, Sha256};

use crate::config::Number;
use crate::error::{RagError, Result};
use crate::vector_index::Vector;
use crate::vector_ops::normalize_vector;

/// Text to fixed-length vector.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;

    /// One vector per input text, in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>>;

    fn embed(&self, text: &str) -> Result<Vector> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| RagError::Embedding("embedder returned no vector".to_string()))
    }
}

/// Deterministic feature-hashing bag-of-words embedder.
///
/// Each lowercased token lands in one of `dim` buckets with a sign picked from
/// its SHA-256 digest; the sum is L2-normalized. Empty text maps to the zero
/// vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vector {
        let mut vector = vec![0.0; self.dim];
        for token in text.split_whitespace() {
            let token = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if token.is_empty() {
                continue;
            }
            let digest = Sha256::digest(token.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let hash = u64::from_le_bytes(head);
            let bucket = (hash % self.dim as u64) as usize;
            let sign: Number = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize_vector(&mut vector);
        vector
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
