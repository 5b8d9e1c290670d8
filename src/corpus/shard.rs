//! Shard files: bounded, ordered, append-once containers of records.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::corpus::record::{RecordError, RecordFields, read_record, write_record};

pub const SHARD_EXTENSION: &str = "rec";

#[derive(Debug, Error)]
pub enum ShardError {
    /// Shards are immutable once written; creating over an existing file is
    /// refused at the filesystem level.
    #[error("shard already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("io error for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The whole shard is unusable; there is no partial-record recovery.
    #[error("malformed shard {path}: {source}")]
    Malformed { path: PathBuf, source: RecordError },
}

/// `{prefix}_{index}.rec`
pub fn shard_file_name(prefix: &str, index: usize) -> String {
    format!("{prefix}_{index}.{SHARD_EXTENSION}")
}

/// Sequential single-writer over one shard file.
#[derive(Debug)]
pub struct ShardWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    records: usize,
}

impl ShardWriter {
    /// Create the shard; fails if the path already exists.
    pub fn create(path: &Path) -> Result<Self, ShardError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::AlreadyExists {
                    ShardError::AlreadyExists(path.to_path_buf())
                } else {
                    ShardError::Io {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            records: 0,
        })
    }

    pub fn append(&mut self, record: &RecordFields) -> Result<(), ShardError> {
        write_record(&mut self.writer, record).map_err(|source| ShardError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.records += 1;
        Ok(())
    }

    /// Flush and close, returning the record count.
    pub fn finish(mut self) -> Result<usize, ShardError> {
        self.writer.flush().map_err(|source| ShardError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.records)
    }
}

/// Streaming reader over one shard file.
pub struct ShardReader {
    path: PathBuf,
    reader: BufReader<File>,
}

impl ShardReader {
    pub fn open(path: &Path) -> Result<Self, ShardError> {
        let file = File::open(path).map_err(|source| ShardError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
        })
    }
}

impl Iterator for ShardReader {
    type Item = Result<RecordFields, ShardError>;

    fn next(&mut self) -> Option<Self::Item> {
        match read_record(&mut self.reader) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(source) => Some(Err(ShardError::Malformed {
                path: self.path.clone(),
                source,
            })),
        }
    }
}

/// Read a whole shard eagerly.
pub fn read_shard(path: &Path) -> Result<Vec<RecordFields>, ShardError> {
    ShardReader::open(path)?.collect()
}
