//! On-disk format for inverse caches.
//!
//! One JSON file per cache key holding every pseudo-inverse in batch order,
//! row-major. Files are written to a temporary sibling and renamed into place
//! once fully flushed, so a reader never sees a partial cache under the final
//! name.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::key::CacheKey;
use crate::error::{Result, SamplerError};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoredMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    key: CacheKey,
    entries: Vec<StoredMatrix>,
}

/// Directory holding cache files, one per [`CacheKey`].
#[derive(Clone, Debug)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CacheStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn exists(&self, key: &CacheKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Write `entries` under `key`, replacing any previous file atomically.
    pub fn save(&self, key: &CacheKey, entries: &[DMatrix<f64>]) -> Result<PathBuf> {
        let path = self.path_for(key);
        let io_err = |source| SamplerError::CacheIo {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        let file = CacheFile {
            version: FORMAT_VERSION,
            key: key.clone(),
            entries: entries
                .iter()
                .map(|m| StoredMatrix {
                    rows: m.nrows(),
                    cols: m.ncols(),
                    // Column-major storage of the transpose is row-major.
                    data: m.transpose().as_slice().to_vec(),
                })
                .collect(),
        };

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, &file)?;
            writer.flush().map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(path)
    }

    /// Read the entries stored under `key`.
    ///
    /// `Ok(None)` when no file exists. A file that cannot be parsed, has
    /// another format version, holds a different key or malformed matrices is
    /// a [`SamplerError::CacheMismatch`].
    pub fn load(&self, key: &CacheKey) -> Result<Option<Vec<DMatrix<f64>>>> {
        let path = self.path_for(key);
        let handle = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SamplerError::CacheIo { path, source }),
        };
        let mismatch = |what: String| SamplerError::CacheMismatch(format!("{}: {what}", path.display()));

        let file: CacheFile = serde_json::from_reader(BufReader::new(handle))
            .map_err(|e| mismatch(format!("unreadable cache file ({e})")))?;
        if file.version != FORMAT_VERSION {
            return Err(mismatch(format!(
                "format version {} (expected {FORMAT_VERSION})",
                file.version
            )));
        }
        if file.key != *key {
            return Err(mismatch("built for a different loss, parameters or data".into()));
        }

        file.entries
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                if m.rows != m.cols || m.rows * m.cols != m.data.len() {
                    return Err(mismatch(format!(
                        "entry {i} is {}x{} with {} values",
                        m.rows,
                        m.cols,
                        m.data.len()
                    )));
                }
                Ok(DMatrix::from_row_slice(m.rows, m.cols, &m.data))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}
