use rayon::prelude::*;
use std::cmp::Ordering;
use std::mem::size_of;
use std::path::Path;
use tracing::debug;

use crate::artifact::{self, StagedFile};
use crate::config::Number;
use crate::error::{RagError, Result};
use crate::vector_ops::squared_l2_simd;

pub type Vector = Vec<Number>;

const MAGIC: &[u8; 4] = b"RGVX";
const FORMAT_VERSION: u32 = 1;
// magic + version + dimension + count
const HEADER_SIZE: usize = 4 + 4 + 4 + 8;

/// Append-only flat index of vectors addressed by dense ids.
///
/// Vectors are stored contiguously, so entry `id` occupies
/// `data[id * dim..(id + 1) * dim]`. Search is exact.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dimension: Option<usize>,
    data: Vec<Number>,
    count: usize,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the index stored at `path`, or returns an empty index if nothing
    /// is stored there yet.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no vector artifact, starting empty index");
            return Ok(Self::new());
        }
        let payload = artifact::read_checksummed(path)?;
        Self::decode(path, &payload)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn vector(&self, id: usize) -> Option<&[Number]> {
        let dim = self.dimension?;
        if id >= self.count {
            return None;
        }
        Some(&self.data[id * dim..(id + 1) * dim])
    }

    /// Appends `vectors` and returns their ids in input order.
    ///
    /// Every vector is checked before anything is written, so a
    /// `DimensionMismatch` leaves the index untouched.
    pub(crate) fn append(&mut self, vectors: Vec<Vector>) -> Result<Vec<usize>> {
        let Some(first) = vectors.first() else {
            return Ok(Vec::new());
        };
        let dim = self.dimension.unwrap_or(first.len());
        if dim == 0 {
            return Err(RagError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(RagError::DimensionMismatch {
                expected: dim,
                actual: bad.len(),
            });
        }

        self.dimension = Some(dim);
        let start = self.count;
        self.data.reserve(vectors.len() * dim);
        for vector in &vectors {
            self.data.extend_from_slice(vector);
        }
        self.count += vectors.len();
        Ok((start..self.count).collect())
    }

    /// Exact k-nearest-neighbour search under squared Euclidean distance.
    ///
    /// Results are ascending by distance with ties broken by the lower id.
    /// `k` is clamped to the number of stored vectors.
    pub fn search(&self, query: &[Number], k: usize) -> Result<Vec<(usize, Number)>> {
        let dim = match self.dimension {
            Some(dim) if self.count > 0 => dim,
            _ => return Err(RagError::EmptyIndex),
        };
        if query.len() != dim {
            return Err(RagError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }
        let k = k.min(self.count);
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(usize, Number)> = self
            .data
            .par_chunks_exact(dim)
            .enumerate()
            .map(|(id, vector)| (id, squared_l2_simd(query, vector)))
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, compare_hits);
            hits.truncate(k);
        }
        hits.sort_unstable_by(compare_hits);
        Ok(hits)
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        self.stage(path)?.commit()
    }

    pub(crate) fn stage(&self, path: &Path) -> Result<StagedFile> {
        artifact::stage_checksummed(path, &self.encode())
    }

    fn encode(&self) -> Vec<u8> {
        let dim = self.dimension.unwrap_or(0);
        let mut out = Vec::with_capacity(HEADER_SIZE + self.data.len() * size_of::<Number>());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(dim as u32).to_le_bytes());
        out.extend_from_slice(&(self.count as u64).to_le_bytes());
        out.extend(self.data.iter().flat_map(|&num| num.to_le_bytes()));
        out
    }

    fn decode(path: &Path, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(RagError::corrupt(path, "vector header truncated"));
        }
        if &bytes[0..4] != MAGIC {
            return Err(RagError::corrupt(path, "not a vector artifact"));
        }
        let version = read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(RagError::corrupt(
                path,
                format!("unsupported format version {version}"),
            ));
        }
        let dim = read_u32(&bytes[8..12]) as usize;
        let count = read_u64(&bytes[12..20]) as usize;

        if dim == 0 && count > 0 {
            return Err(RagError::corrupt(path, "entries stored without a dimension"));
        }
        let expected = count
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(size_of::<Number>()))
            .ok_or_else(|| RagError::corrupt(path, "vector count overflows"))?;
        let body = &bytes[HEADER_SIZE..];
        if body.len() != expected {
            return Err(RagError::corrupt(
                path,
                format!(
                    "expected {expected} bytes for {count} vectors of dimension {dim}, found {}",
                    body.len()
                ),
            ));
        }

        let data = body
            .chunks_exact(size_of::<Number>())
            .map(|b| {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(b);
                Number::from_le_bytes(buf)
            })
            .collect();

        Ok(Self {
            dimension: (dim > 0).then_some(dim),
            data,
            count,
        })
    }
}

fn compare_hits(a: &(usize, Number), b: &(usize, Number)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn index_with(vectors: Vec<Vector>) -> VectorIndex {
        let mut index = VectorIndex::new();
        index.append(vectors).unwrap();
        index
    }

    #[test]
    fn append_assigns_consecutive_ids() {
        let mut index = VectorIndex::new();
        assert_eq!(index.append(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap(), vec![0, 1]);
        assert_eq!(index.append(vec![vec![1.0, 1.0]]).unwrap(), vec![2]);
        assert_eq!(index.count(), 3);
        assert_eq!(index.dimension(), Some(2));
        assert_eq!(index.vector(2), Some(&[1.0, 1.0][..]));
    }

    #[test]
    fn dimension_mismatch_leaves_count_unchanged() {
        let mut index = index_with(vec![vec![1.0, 2.0, 3.0]]);
        let err = index
            .append(vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0]])
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch { expected: 3, actual: 2 }
        ));
        assert_eq!(index.count(), 1);
    }

    #[test]
    fn first_batch_must_agree_with_itself() {
        let mut index = VectorIndex::new();
        assert!(index.append(vec![vec![1.0], vec![1.0, 2.0]]).is_err());
        assert_eq!(index.count(), 0);
        assert_eq!(index.dimension(), None);
    }

    #[test]
    fn exact_match_comes_first_at_zero_distance() {
        let index = index_with(vec![
            vec![0.0, 0.0],
            vec![5.0, 5.0],
            vec![1.0, 1.0],
        ]);
        let hits = index.search(&[5.0, 5.0], 2).unwrap();
        assert_eq!(hits[0], (1, 0.0));
        assert_eq!(hits[1].0, 2);
        assert_eq!(hits[1].1, 32.0);
    }

    #[test]
    fn ties_break_toward_lower_id() {
        let index = index_with(vec![
            vec![1.0, 0.0],
            vec![-1.0, 0.0],
            vec![0.0, 1.0],
            vec![3.0, 3.0],
        ]);
        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let ids: Vec<usize> = hits.iter().map(|h| h.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn k_is_clamped_to_count() {
        let index = index_with(vec![vec![1.0], vec![2.0]]);
        assert_eq!(index.search(&[0.0], 10).unwrap().len(), 2);
        assert!(index.search(&[0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn empty_index_search_fails() {
        let index = VectorIndex::new();
        assert!(matches!(index.search(&[1.0], 3), Err(RagError::EmptyIndex)));
    }

    #[test]
    fn query_dimension_is_checked() {
        let index = index_with(vec![vec![1.0, 2.0]]);
        assert!(matches!(
            index.search(&[1.0], 1),
            Err(RagError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn persisted_index_reloads_equivalently() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.vectors");
        let index = index_with((0..20).map(|i| vec![i as Number; 9]).collect());
        index.persist(&path).unwrap();

        let reloaded = VectorIndex::open_or_create(&path).unwrap();
        assert_eq!(reloaded.count(), 20);
        assert_eq!(reloaded.dimension(), Some(9));
        assert_eq!(
            reloaded.search(&[7.0; 9], 3).unwrap(),
            index.search(&[7.0; 9], 3).unwrap()
        );
    }

    #[test]
    fn missing_file_opens_empty() {
        let tmp = TempDir::new().unwrap();
        let index = VectorIndex::open_or_create(&tmp.path().join("nothing")).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
    }

    #[test]
    fn foreign_payload_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.vectors");
        artifact::stage_checksummed(&path, b"XXXXsomething else entirely")
            .unwrap()
            .commit()
            .unwrap();
        assert!(matches!(
            VectorIndex::open_or_create(&path),
            Err(RagError::CorruptIndex { .. })
        ));
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.vectors");
        index_with(vec![vec![1.0, 2.0]]).persist(&path).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();
        assert!(matches!(
            VectorIndex::open_or_create(&path),
            Err(RagError::CorruptIndex { .. })
        ));
    }
}
