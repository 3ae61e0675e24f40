pub mod artifact;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod error;
pub mod generator;
pub mod ingest;
pub mod logging;
pub mod metadata;
pub mod query;
pub mod storage;
pub mod vector_index;
pub mod vector_ops;

pub use chunker::{chunk, clean, Chunker};
pub use embedder::{Embedder, HashEmbedder};
pub use error::{RagError, Result};
pub use generator::{CommandGenerator, GenerateError, Generator, MissingGenerator};
pub use ingest::{IngestReport, IngestionPipeline};
pub use metadata::{MetadataRecord, MetadataStore};
pub use query::{Answer, QueryPipeline, RetrievedChunk, FALLBACK_RESPONSE};
pub use storage::{BatchCommit, Store};
pub use vector_index::{Vector, VectorIndex};
