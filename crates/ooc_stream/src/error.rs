//! Error taxonomy.
//!
//! - [`IngestError`]: fatal to partitioning; the whole pass aborts.
//! - [`FileCacheError`]: an output stream failed to open, write or flush.
//! - [`BlockReadError`]: a load job failed; carried inside the result as data
//!   so the slot still settles (loaded with zero points).
//!
//! Exceeding slot or subslot capacity is a programming error and is asserted,
//! not returned.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::BlockId;

/// Failure while reading the raw point stream or writing block files.
#[derive(Debug, Error)]
pub enum IngestError {
  #[error("i/o error during ingestion: {0}")]
  Io(#[from] io::Error),

  #[error("not a PLY stream (missing `ply` magic line)")]
  NotPly,

  #[error("PLY header has no `end_header` line")]
  MissingEndHeader,

  #[error("PLY header has no `format` line")]
  MissingFormat,

  #[error("unsupported PLY encoding `{0}`, expected binary_little_endian")]
  UnsupportedFormat(String),

  #[error("PLY header declares no `vertex` element")]
  MissingVertexElement,

  #[error("unsupported vertex layout: {0}")]
  UnsupportedVertexLayout(String),

  #[error("PLY declares zero vertices")]
  EmptyCloud,

  #[error("short read: header declares {expected} points but only {available} are present")]
  ShortRead { expected: u64, available: u64 },

  #[error(transparent)]
  Store(#[from] FileCacheError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),
}

/// Failure of a cached output stream.
#[derive(Debug, Error)]
pub enum FileCacheError {
  #[error("failed to open block {id} at {path}: {source}")]
  Open {
    id: BlockId,
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write block {id}: {source}")]
  Write {
    id: BlockId,
    #[source]
    source: io::Error,
  },

  #[error("failed to flush block {id}: {source}")]
  Flush {
    id: BlockId,
    #[source]
    source: io::Error,
  },
}

/// Failure while loading one block file inside a worker.
#[derive(Debug, Error)]
pub enum BlockReadError {
  #[error("could not open block file {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("block file {path} is too short to hold a header")]
  Header { path: PathBuf },

  #[error("block file {path} stores {stored} points, {requested} requested")]
  HeaderMismatch {
    path: PathBuf,
    requested: u32,
    stored: u32,
  },

  #[error("incomplete read from {path}: expected {expected} bytes, got {got}")]
  ShortRead {
    path: PathBuf,
    expected: usize,
    got: usize,
  },
}

/// Failure reading or writing the block manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("manifest i/o error: {0}")]
  Io(#[from] io::Error),

  #[error("manifest is not valid JSON: {0}")]
  Json(#[from] serde_json::Error),
}

/// Failure starting a streaming session.
#[derive(Debug, Error)]
pub enum SessionError {
  #[error(transparent)]
  Manifest(#[from] ManifestError),

  /// Opening the block directory or spawning workers failed.
  #[error("failed to start streaming session: {0}")]
  Io(#[from] io::Error),
}
