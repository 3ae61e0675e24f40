//! Checksummed on-disk artifacts.
//!
//! Every artifact is `payload || sha256(payload)`. Writes go to a sibling
//! temporary file that is fsynced before it can be renamed over the target, so
//! a reader never observes a partially written artifact.

use memmap2::Mmap;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};

const DIGEST_LEN: usize = 32;

/// A fully written, fsynced temporary file waiting to be renamed into place.
///
/// Dropping it without calling [`StagedFile::commit`] removes the temporary.
pub struct StagedFile {
    tmp_path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.tmp_path, &self.target)?;
        self.committed = true;
        Ok(())
    }

    pub(crate) fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

pub fn stage_checksummed(target: &Path, payload: &[u8]) -> Result<StagedFile> {
    let mut tmp_name = target.as_os_str().to_owned();
    tmp_name.push(format!(".tmp.{}", std::process::id()));
    let tmp_path = PathBuf::from(tmp_name);

    let staged = StagedFile {
        tmp_path,
        target: target.to_path_buf(),
        committed: false,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&staged.tmp_path)?;
    file.write_all(payload)?;
    file.write_all(&Sha256::digest(payload))?;
    file.sync_all()?;

    Ok(staged)
}

/// Reads an artifact through a memory map and returns the verified payload.
pub fn read_checksummed(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len() as usize;
    if len < DIGEST_LEN {
        return Err(RagError::corrupt(
            path,
            format!("file is {len} bytes, shorter than its checksum"),
        ));
    }

    let mmap = unsafe { Mmap::map(&file)? };
    let (payload, digest) = mmap.split_at(len - DIGEST_LEN);
    if Sha256::digest(payload).as_slice() != digest {
        return Err(RagError::corrupt(path, "checksum mismatch"));
    }
    Ok(payload.to_vec())
}

/// Makes completed renames in `dir` durable.
pub fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}
