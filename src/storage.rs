//! The vector/metadata pair that lives at one `db_path`.
//!
//! `Store::append_batch` is the only way to grow the pair. It runs the whole
//! load, append, and persist sequence under an exclusive lock on
//! `<db_path>/.lock`, and readers take the same lock shared while loading.
//! Both artifacts are staged and fsynced before either rename, and the renames
//! happen while the exclusive lock is held, so a reader sees one complete
//! snapshot or the other.

use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::artifact::{self, StagedFile};
use crate::config::Number;
use crate::error::{RagError, Result};
use crate::metadata::{MetadataRecord, MetadataStore};
use crate::vector_index::{Vector, VectorIndex};

pub const VECTOR_FILE: &str = "index.vectors";
pub const METADATA_FILE: &str = "index.meta";
pub const LOCK_FILE: &str = ".lock";
const BACKUP_SUFFIX: &str = ".bak";

/// Outcome of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCommit {
    pub ids: Vec<usize>,
    /// Entries stored at the location after the commit.
    pub total_count: usize,
}

/// A nearest-neighbour hit resolved to its metadata record.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit<'a> {
    pub id: usize,
    pub distance: Number,
    pub record: &'a MetadataRecord,
}

/// Advisory file lock held for as long as the guard lives.
struct StoreLock {
    file: File,
}

impl StoreLock {
    fn exclusive(root: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(root.join(LOCK_FILE))?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }

    /// Shared lock for readers. Returns `None` when the lock file is missing
    /// and cannot be created, as in a read-only location where no writer can
    /// run either.
    fn shared(root: &Path) -> Result<Option<Self>> {
        let path = root.join(LOCK_FILE);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                match OpenOptions::new().write(true).create(true).open(&path) {
                    Ok(file) => file,
                    Err(e) if is_read_only(&e) => {
                        debug!(path = %root.display(), "read-only location, loading without lock");
                        return Ok(None);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        };
        FileExt::lock_shared(&file)?;
        Ok(Some(Self { file }))
    }
}

fn is_read_only(err: &std::io::Error) -> bool {
    // EROFS has no stable ErrorKind on older toolchains.
    err.kind() == ErrorKind::PermissionDenied || err.raw_os_error() == Some(30)
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// A loaded, read-only snapshot of the pair at one storage location.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    index: VectorIndex,
    metadata: MetadataStore,
}

impl Store {
    /// Loads an existing pair. Fails with `IndexNotFound` if neither artifact
    /// exists.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let root = db_path.as_ref();
        if !root.is_dir() {
            return Err(RagError::IndexNotFound(root.to_path_buf()));
        }
        let _lock = StoreLock::shared(root)?;
        let (index, metadata) =
            load_pair(root)?.ok_or_else(|| RagError::IndexNotFound(root.to_path_buf()))?;
        debug!(path = %root.display(), count = index.count(), "opened store");
        Ok(Self {
            root: root.to_path_buf(),
            index,
            metadata,
        })
    }

    /// Appends one batch of chunk texts and their vectors, then persists both
    /// artifacts. Returns the ids assigned to the batch and the new total.
    ///
    /// Nothing reaches disk unless every vector fits the index dimension, and
    /// a failed commit restores the previous pair.
    pub fn append_batch(
        db_path: impl AsRef<Path>,
        source_id: &str,
        texts: Vec<String>,
        vectors: Vec<Vector>,
    ) -> Result<BatchCommit> {
        let root = db_path.as_ref();
        if texts.len() != vectors.len() {
            return Err(RagError::BatchMismatch {
                texts: texts.len(),
                vectors: vectors.len(),
            });
        }
        if texts.is_empty() {
            return Ok(BatchCommit {
                ids: Vec::new(),
                total_count: Self::stored_count(root)?,
            });
        }

        fs::create_dir_all(root)?;
        let _lock = StoreLock::exclusive(root)?;
        let (mut index, mut metadata) =
            load_pair(root)?.unwrap_or_else(|| (VectorIndex::new(), MetadataStore::new()));

        let ids = index.append(vectors)?;
        let records = ids
            .iter()
            .zip(texts)
            .map(|(&chunk_id, text)| MetadataRecord {
                source_id: source_id.to_string(),
                chunk_id,
                text,
            })
            .collect();
        metadata.append(records);

        let staged_vectors = index.stage(&root.join(VECTOR_FILE))?;
        let staged_metadata = metadata.stage(&root.join(METADATA_FILE))?;
        commit_pair(staged_vectors, staged_metadata)?;
        artifact::sync_dir(root)?;

        info!(
            path = %root.display(),
            source_id,
            appended = ids.len(),
            total = index.count(),
            "committed batch"
        );
        Ok(BatchCommit {
            ids,
            total_count: index.count(),
        })
    }

    /// Number of entries stored at `db_path`, or 0 when nothing is stored.
    pub fn stored_count(db_path: impl AsRef<Path>) -> Result<usize> {
        let root = db_path.as_ref();
        if !root.is_dir() {
            return Ok(0);
        }
        let _lock = StoreLock::shared(root)?;
        Ok(load_pair(root)?.map_or(0, |(index, _)| index.count()))
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn count(&self) -> usize {
        self.index.count()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.index.dimension()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn get(&self, id: usize) -> Result<&MetadataRecord> {
        self.metadata.get(id)
    }

    pub fn sources(&self) -> BTreeMap<&str, usize> {
        self.metadata.sources()
    }

    pub fn search(&self, query: &[Number], k: usize) -> Result<Vec<Hit<'_>>> {
        self.index
            .search(query, k)?
            .into_iter()
            .map(|(id, distance)| {
                Ok(Hit {
                    id,
                    distance,
                    record: self.metadata.get(id)?,
                })
            })
            .collect()
    }
}

/// Renames both staged artifacts into place. If the metadata rename fails
/// after the vectors were replaced, the previous vector artifact is put back
/// so the pair on disk stays aligned.
fn commit_pair(vectors: StagedFile, metadata: StagedFile) -> Result<()> {
    let vector_path = vectors.target().to_path_buf();
    let mut backup_name = vector_path.as_os_str().to_owned();
    backup_name.push(BACKUP_SUFFIX);
    let backup = PathBuf::from(backup_name);

    let had_previous = vector_path.exists();
    if had_previous {
        let _ = fs::remove_file(&backup);
        fs::hard_link(&vector_path, &backup)
            .or_else(|_| fs::copy(&vector_path, &backup).map(|_| ()))?;
    }

    vectors.commit()?;
    if let Err(err) = metadata.commit() {
        let restored = if had_previous {
            fs::rename(&backup, &vector_path)
        } else {
            fs::remove_file(&vector_path)
        };
        if let Err(restore_err) = restored {
            warn!(path = %vector_path.display(), %restore_err, "failed to roll back vector artifact");
        }
        return Err(err);
    }

    if had_previous {
        let _ = fs::remove_file(&backup);
    }
    Ok(())
}

/// Loads both artifacts, or `None` when neither exists.
fn load_pair(root: &Path) -> Result<Option<(VectorIndex, MetadataStore)>> {
    let vector_path = root.join(VECTOR_FILE);
    let metadata_path = root.join(METADATA_FILE);

    match (vector_path.exists(), metadata_path.exists()) {
        (false, false) => Ok(None),
        (true, false) => Err(RagError::corrupt(root, "vector artifact without metadata")),
        (false, true) => Err(RagError::corrupt(root, "metadata artifact without vectors")),
        (true, true) => {
            let index = VectorIndex::open_or_create(&vector_path)?;
            let metadata = MetadataStore::load(&metadata_path)?;
            if index.count() != metadata.count() {
                return Err(RagError::corrupt(
                    root,
                    format!(
                        "{} vectors but {} metadata records",
                        index.count(),
                        metadata.count()
                    ),
                ));
            }
            Ok(Some((index, metadata)))
        }
    }
}
