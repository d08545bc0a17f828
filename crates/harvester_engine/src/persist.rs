use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("refusing to replace existing file {0}")]
    AlreadyExists(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // Basic writability probe: try creating a temp file.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// What to do when the target name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingFile {
    #[default]
    Refuse,
    Replace,
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
///
/// The temp file lives in the target directory so the rename never crosses a
/// file system, and it is removed if the write is abandoned before the rename.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
    existing: ExistingFile,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            existing: ExistingFile::default(),
        }
    }

    pub fn with_existing(mut self, existing: ExistingFile) -> Self {
        self.existing = existing;
        self
    }

    pub fn write(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        match self.existing {
            ExistingFile::Refuse => {
                tmp.persist_noclobber(&target).map_err(|e| {
                    if e.error.kind() == io::ErrorKind::AlreadyExists {
                        PersistError::AlreadyExists(target.clone())
                    } else {
                        PersistError::Io(e.error)
                    }
                })?;
            }
            ExistingFile::Replace => {
                tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
            }
        }
        Ok(target)
    }

    /// [`write`](Self::write) on the blocking pool, so the fsync and rename of a
    /// large file do not stall other tasks sharing the runtime thread.
    pub async fn write_async(
        &self,
        filename: String,
        content: Bytes,
    ) -> Result<PathBuf, PersistError> {
        let writer = self.clone();
        tokio::task::spawn_blocking(move || writer.write(&filename, &content))
            .await
            .map_err(|err| PersistError::Io(io::Error::other(err)))?
    }
}
