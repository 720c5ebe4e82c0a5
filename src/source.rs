//! Byte sources the analysis reads from.
//!
//! A source can be opened any number of times; every `open` starts a fresh
//! sequential read from offset 0. The sampler opens it once for the prefix and
//! the chunk reader opens it again for the full pass.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::AnalysisError;

pub trait CsvSource: Send + Sync {
    /// Total size in bytes, as known when the source was created.
    fn len(&self) -> u64;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn open(&self) -> std::io::Result<Box<dyn Read + Send>>;
    /// Path or label used in reports and errors.
    fn path(&self) -> &Path;
}

pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self, AnalysisError> {
        let metadata =
            std::fs::metadata(path).map_err(|err| AnalysisError::file_access(path, err))?;
        if !metadata.is_file() {
            return Err(AnalysisError::file_access(path, "not a regular file"));
        }
        // Fail at start rather than on the first read.
        File::open(path).map_err(|err| AnalysisError::file_access(path, err))?;
        Ok(Self {
            path: path.to_path_buf(),
            len: metadata.len(),
        })
    }
}

impl CsvSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// In-memory source, mostly useful for tests and embedding callers.
pub struct MemorySource {
    label: PathBuf,
    data: std::sync::Arc<[u8]>,
}

impl MemorySource {
    pub fn new(label: impl Into<PathBuf>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            label: label.into(),
            data: data.into().into(),
        }
    }
}

impl CsvSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(std::io::Cursor::new(self.data.clone())))
    }

    fn path(&self) -> &Path {
        &self.label
    }
}
