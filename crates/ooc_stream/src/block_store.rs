//! On-disk block files.
//!
//! One file per non-empty grid cell, named `block_{id:04}.bin`. See
//! [`crate::constants`] for the byte layout.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::constants::{BLOCK_HEADER_BYTES, BLOCK_RECORD_BYTES};
use crate::error::BlockReadError;
use crate::types::{Block, BlockId, Point};

/// Directory holding the block files of one dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockStore {
  dir: PathBuf,
}

impl BlockStore {
  /// Use `dir` as the block directory, creating it if needed.
  pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
    let dir = dir.into();
    fs::create_dir_all(&dir)?;
    Ok(Self { dir })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// File backing block `id`.
  pub fn path_for(&self, id: BlockId) -> PathBuf {
    self.dir.join(format!("block_{id:04}.bin"))
  }

  /// Delete every `.bin` file in the directory. Returns how many were removed.
  ///
  /// Run before a fresh partition so stale blocks from an earlier dataset
  /// cannot be appended to.
  pub fn remove_block_files(&self) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(&self.dir)? {
      let path = entry?.path();
      if path.is_file() && path.extension().is_some_and(|ext| ext == "bin") {
        fs::remove_file(&path)?;
        removed += 1;
      }
    }
    Ok(removed)
  }

  /// Overwrite the leading count header of block `id`.
  pub fn patch_count(&self, id: BlockId, count: u32) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(self.path_for(id))?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&count.to_le_bytes())?;
    file.flush()
  }

  /// Write a complete block file (header + records) in one go.
  pub fn write_block(&self, id: BlockId, points: &[Point]) -> io::Result<()> {
    let mut bytes = Vec::with_capacity(BLOCK_HEADER_BYTES + points.len() * BLOCK_RECORD_BYTES);
    bytes.extend_from_slice(&(points.len() as u32).to_le_bytes());
    encode_points(points, &mut bytes);
    fs::write(self.path_for(id), bytes)
  }

  /// Read the first `count` points of block `id` into `out`.
  pub fn read_block(&self, id: BlockId, count: u32, out: &mut Vec<Point>) -> Result<(), BlockReadError> {
    read_block_file(&self.path_for(id), count, out)
  }
}

/// Read the first `count` points of the block file at `path` into `out`.
///
/// `out` is cleared first and left empty on any error, so a failed load never
/// exposes partial contents.
pub fn read_block_file(path: &Path, count: u32, out: &mut Vec<Point>) -> Result<(), BlockReadError> {
  out.clear();

  let mut file = File::open(path).map_err(|source| BlockReadError::Open {
    path: path.to_path_buf(),
    source,
  })?;

  let mut header = [0u8; BLOCK_HEADER_BYTES];
  file
    .read_exact(&mut header)
    .map_err(|_| BlockReadError::Header {
      path: path.to_path_buf(),
    })?;
  let stored = u32::from_le_bytes(header);
  if stored < count {
    return Err(BlockReadError::HeaderMismatch {
      path: path.to_path_buf(),
      requested: count,
      stored,
    });
  }

  let expected = count as usize * BLOCK_RECORD_BYTES;
  let mut bytes = Vec::with_capacity(expected);
  let got = file
    .take(expected as u64)
    .read_to_end(&mut bytes)
    .map_err(|source| BlockReadError::Open {
      path: path.to_path_buf(),
      source,
    })?;
  if got != expected {
    return Err(BlockReadError::ShortRead {
      path: path.to_path_buf(),
      expected,
      got,
    });
  }

  decode_points(&bytes, out);
  Ok(())
}

/// Append packed records for `points` to `out`.
pub fn encode_points(points: &[Point], out: &mut Vec<u8>) {
  out.reserve(points.len() * BLOCK_RECORD_BYTES);
  for p in points {
    for c in p.position {
      out.extend_from_slice(&c.to_le_bytes());
    }
    out.extend_from_slice(&p.rgb());
  }
}

/// Decode packed records from `bytes`, appending to `out`.
pub fn decode_points(bytes: &[u8], out: &mut Vec<Point>) {
  out.reserve(bytes.len() / BLOCK_RECORD_BYTES);
  out.extend(bytes.chunks_exact(BLOCK_RECORD_BYTES).map(|rec| {
    let f = |i: usize| f32::from_le_bytes([rec[i], rec[i + 1], rec[i + 2], rec[i + 3]]);
    Point {
      position: [f(0), f(4), f(8)],
      color: [
        rec[12] as f32 / 255.0,
        rec[13] as f32 / 255.0,
        rec[14] as f32 / 255.0,
      ],
    }
  }));
}

/// Read every non-empty block fully, in parallel.
///
/// In-core mode: the whole cloud must fit in memory.
pub fn load_all(store: &BlockStore, blocks: &[Block]) -> Result<Vec<(BlockId, Vec<Point>)>, BlockReadError> {
  blocks
    .par_iter()
    .filter(|b| !b.is_empty())
    .map(|b| {
      let mut points = Vec::new();
      store.read_block(b.id, b.count, &mut points)?;
      Ok((b.id, points))
    })
    .collect()
}

#[cfg(test)]
#[path = "block_store_test.rs"]
mod block_store_test;
