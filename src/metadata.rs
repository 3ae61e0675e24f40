use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::artifact::{self, StagedFile};
use crate::error::{RagError, Result};

const FORMAT_VERSION: u32 = 1;

/// Provenance for the vector with id `chunk_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub source_id: String,
    pub chunk_id: usize,
    pub text: String,
}

#[derive(Serialize, Deserialize)]
struct MetadataFile {
    version: u32,
    records: Vec<MetadataRecord>,
}

/// Ordered records parallel to the vector index: `records[i].chunk_id == i`.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    records: Vec<MetadataRecord>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let payload = artifact::read_checksummed(path)?;
        let file: MetadataFile = bincode::deserialize(&payload)
            .map_err(|e| RagError::corrupt(path, format!("undecodable metadata: {e}")))?;
        if file.version != FORMAT_VERSION {
            return Err(RagError::corrupt(
                path,
                format!("unsupported format version {}", file.version),
            ));
        }
        if let Some((pos, record)) = file
            .records
            .iter()
            .enumerate()
            .find(|(pos, record)| record.chunk_id != *pos)
        {
            return Err(RagError::corrupt(
                path,
                format!("record at position {pos} carries chunk id {}", record.chunk_id),
            ));
        }
        Ok(Self {
            records: file.records,
        })
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, id: usize) -> Result<&MetadataRecord> {
        self.records.get(id).ok_or(RagError::IdOutOfRange {
            id,
            count: self.records.len(),
        })
    }

    pub fn records(&self) -> &[MetadataRecord] {
        &self.records
    }

    /// Number of stored chunks per source document.
    pub fn sources(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.source_id.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub(crate) fn append(&mut self, records: Vec<MetadataRecord>) {
        debug_assert!(records
            .iter()
            .enumerate()
            .all(|(j, r)| r.chunk_id == self.records.len() + j));
        self.records.extend(records);
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        self.stage(path)?.commit()
    }

    pub(crate) fn stage(&self, path: &Path) -> Result<StagedFile> {
        #[derive(Serialize)]
        struct MetadataFileRef<'a> {
            version: u32,
            records: &'a [MetadataRecord],
        }
        let payload = bincode::serialize(&MetadataFileRef {
            version: FORMAT_VERSION,
            records: &self.records,
        })?;
        artifact::stage_checksummed(path, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(source: &str, id: usize, text: &str) -> MetadataRecord {
        MetadataRecord {
            source_id: source.to_string(),
            chunk_id: id,
            text: text.to_string(),
        }
    }

    #[test]
    fn get_rejects_ids_past_the_end() {
        let mut store = MetadataStore::new();
        store.append(vec![record("a", 0, "zero")]);
        assert_eq!(store.get(0).unwrap().text, "zero");
        assert!(matches!(
            store.get(1),
            Err(RagError::IdOutOfRange { id: 1, count: 1 })
        ));
    }

    #[test]
    fn persist_and_load_keep_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.meta");
        let mut store = MetadataStore::new();
        store.append(vec![record("a", 0, "x"), record("b", 1, "")]);
        store.append(vec![record("a", 2, "y")]);
        store.persist(&path).unwrap();

        let loaded = MetadataStore::load(&path).unwrap();
        assert_eq!(loaded.records(), store.records());
        let sources = loaded.sources();
        assert_eq!(sources.get("a"), Some(&2));
        assert_eq!(sources.get("b"), Some(&1));
    }

    #[test]
    fn misaligned_records_are_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.meta");
        let payload = bincode::serialize(&MetadataFile {
            version: FORMAT_VERSION,
            records: vec![record("a", 0, "x"), record("a", 5, "y")],
        })
        .unwrap();
        artifact::stage_checksummed(&path, &payload)
            .unwrap()
            .commit()
            .unwrap();
        assert!(matches!(
            MetadataStore::load(&path),
            Err(RagError::CorruptIndex { .. })
        ));
    }
}
