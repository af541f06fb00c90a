//! Bounded pool of open block-file output streams.
//!
//! Partitioning writes to up to G³ files; only `capacity` of them are open at
//! once. Requesting a stream that is not open evicts (flushes and closes) the
//! least recently used one when the pool is full.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

use crate::block_store::BlockStore;
use crate::constants::BLOCK_HEADER_BYTES;
use crate::error::FileCacheError;
use crate::lru::LruList;
use crate::types::BlockId;

pub struct FileStreamCache {
  store: BlockStore,
  capacity: usize,
  streams: LruList<BufWriter<File>>,
}

impl FileStreamCache {
  pub fn new(store: BlockStore, capacity: usize) -> Self {
    assert!(capacity > 0, "FileStreamCache capacity must be non-zero");
    Self {
      store,
      capacity,
      streams: LruList::with_capacity(capacity),
    }
  }

  /// Stream for block `id`, opened in append mode if not already open.
  ///
  /// A new file starts with a zero count header.
  pub fn get(&mut self, id: BlockId) -> Result<&mut BufWriter<File>, FileCacheError> {
    if !self.streams.contains(id) && self.streams.len() >= self.capacity {
      self.evict_one()?;
    }
    let store = &self.store;
    self.streams.get_or_try_insert_with(id, || open_stream(store, id))
  }

  /// Append raw bytes to block `id`.
  pub fn write(&mut self, id: BlockId, bytes: &[u8]) -> Result<(), FileCacheError> {
    self
      .get(id)?
      .write_all(bytes)
      .map_err(|source| FileCacheError::Write { id, source })
  }

  /// Mark `id` most recently used without I/O. False if not open.
  pub fn touch(&mut self, id: BlockId) -> bool {
    self.streams.touch(id)
  }

  /// Flush and close every stream.
  ///
  /// Every stream is attempted even after a failure; the first error is
  /// returned. The pool is empty afterwards.
  pub fn close_all(&mut self) -> Result<(), FileCacheError> {
    let mut first_err = None;
    while let Some((id, stream)) = self.streams.pop_lru() {
      if let Err(e) = close_stream(id, stream) {
        tracing::error!(block = id, error = %e, "failed to close block stream");
        first_err.get_or_insert(e);
      }
    }
    match first_err {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }

  /// Open stream count.
  pub fn len(&self) -> usize {
    self.streams.len()
  }

  pub fn is_empty(&self) -> bool {
    self.streams.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn is_open(&self, id: BlockId) -> bool {
    self.streams.contains(id)
  }

  /// Open ids from least to most recently used.
  pub fn open_ids(&self) -> Vec<BlockId> {
    self.streams.iter_lru_to_mru().map(|(id, _)| id).collect()
  }

  fn evict_one(&mut self) -> Result<(), FileCacheError> {
    if let Some((id, stream)) = self.streams.pop_lru() {
      tracing::trace!(block = id, "evicting block stream");
      close_stream(id, stream)?;
    }
    Ok(())
  }
}

impl Drop for FileStreamCache {
  fn drop(&mut self) {
    let _ = self.close_all();
  }
}

fn open_stream(store: &BlockStore, id: BlockId) -> Result<BufWriter<File>, FileCacheError> {
  let path = store.path_for(id);
  let result = OpenOptions::new()
    .create(true)
    .append(true)
    .open(&path)
    .and_then(|file| {
      let mut writer = BufWriter::new(file);
      if writer.get_ref().metadata()?.len() == 0 {
        writer.write_all(&[0u8; BLOCK_HEADER_BYTES])?;
      }
      Ok(writer)
    });

  result.map_err(|source| {
    tracing::error!(block = id, path = %path.display(), error = %source, "failed to open block stream");
    FileCacheError::Open { id, path, source }
  })
}

fn close_stream(id: BlockId, mut stream: BufWriter<File>) -> Result<(), FileCacheError> {
  stream
    .flush()
    .map_err(|source| FileCacheError::Flush { id, source })
}

#[cfg(test)]
#[path = "file_cache_test.rs"]
mod file_cache_test;
