use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Number;
use crate::embedder::Embedder;
use crate::error::{RagError, Result};
use crate::generator::{GenerateError, Generator};
use crate::storage::Store;

/// Response used when the generator fails; the retrieved chunks are still
/// returned.
pub const FALLBACK_RESPONSE: &str = "I'm sorry, I couldn't process your request at this time.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: usize,
    pub source_id: String,
    pub distance: Number,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub query: String,
    pub response: String,
    pub retrieved: Vec<String>,
    pub hits: Vec<RetrievedChunk>,
}

pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "You are an AI assistant. Use the following context to answer the question:\n\n{context}\n\nQuestion: {query}\nAnswer:"
    )
}

pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl QueryPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>, top_k: usize) -> Self {
        Self {
            embedder,
            generator,
            top_k,
        }
    }

    pub fn answer(&self, query_text: &str, db_path: impl AsRef<Path>) -> Result<Answer> {
        self.answer_with_k(query_text, db_path, self.top_k)
    }

    pub fn answer_with_k(
        &self,
        query_text: &str,
        db_path: impl AsRef<Path>,
        k: usize,
    ) -> Result<Answer> {
        let hits = self.retrieve(query_text, db_path, k)?;
        let retrieved: Vec<String> = hits.iter().map(|h| h.text.clone()).collect();
        let prompt = build_prompt(&retrieved.join("\n"), query_text);

        let response = match self.generator.generate(&prompt) {
            Ok(response) => response,
            Err(GenerateError::Failed(reason)) => {
                warn!(%reason, "generator failed, answering with fallback");
                FALLBACK_RESPONSE.to_string()
            }
            Err(e @ GenerateError::TimedOut(_)) => {
                return Err(RagError::Timeout(e.to_string()));
            }
        };

        Ok(Answer {
            query: query_text.to_string(),
            response,
            retrieved,
            hits,
        })
    }

    /// Nearest chunks to `query_text`, closest first.
    pub fn retrieve(
        &self,
        query_text: &str,
        db_path: impl AsRef<Path>,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let store = Store::open(db_path)?;
        let query_vector = self.embedder.embed(query_text)?;
        let hits = store.search(&query_vector, k)?;
        debug!(hits = hits.len(), k, "retrieved chunks");
        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                id: hit.id,
                source_id: hit.record.source_id.clone(),
                distance: hit.distance,
                text: hit.record.text.clone(),
            })
            .collect())
    }
}
