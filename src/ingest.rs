use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::chunker::{clean, Chunker};
use crate::embedder::Embedder;
use crate::error::{RagError, Result};
use crate::storage::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub source_id: String,
    pub chunk_count: usize,
    pub ids: Vec<usize>,
    /// Entries stored at the location once this document is in.
    pub total_count: usize,
}

/// Chunks, cleans and embeds a document, then appends it to the store at
/// `db_path` in one locked transaction.
pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
}

impl IngestionPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, chunker: Chunker) -> Self {
        Self { embedder, chunker }
    }

    pub fn ingest(
        &self,
        raw_text: &str,
        source_id: &str,
        db_path: impl AsRef<Path>,
    ) -> Result<IngestReport> {
        let cleaned: Vec<String> = self
            .chunker
            .chunk(raw_text)
            .iter()
            .map(|c| clean(c))
            .collect();
        if cleaned.is_empty() {
            debug!(source_id, "no chunks to ingest");
            return Ok(IngestReport {
                source_id: source_id.to_string(),
                chunk_count: 0,
                ids: Vec::new(),
                total_count: Store::stored_count(db_path)?,
            });
        }

        debug!(source_id, chunks = cleaned.len(), "embedding chunks");
        let vectors = self.embedder.embed_batch(&cleaned)?;
        if vectors.len() != cleaned.len() {
            return Err(RagError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                cleaned.len()
            )));
        }

        let chunk_count = cleaned.len();
        let commit = Store::append_batch(db_path, source_id, cleaned, vectors)?;
        Ok(IngestReport {
            source_id: source_id.to_string(),
            chunk_count,
            ids: commit.ids,
            total_count: commit.total_count,
        })
    }
}
