use std::fs;

use super::*;

fn cache(capacity: usize) -> (tempfile::TempDir, FileStreamCache) {
  let dir = tempfile::tempdir().unwrap();
  let store = BlockStore::new(dir.path()).unwrap();
  (dir, FileStreamCache::new(store, capacity))
}

const A: BlockId = 1;
const B: BlockId = 2;
const C: BlockId = 3;
const D: BlockId = 4;

#[test]
fn test_lru_eviction_order() {
  let (_dir, mut cache) = cache(2);

  cache.get(A).unwrap();
  cache.get(B).unwrap();
  cache.get(C).unwrap();
  // A was least recently used when C arrived
  assert_eq!(cache.open_ids(), vec![B, C]);

  assert!(cache.touch(B));
  cache.get(D).unwrap();
  // touch(B) made C the LRU, not insertion order
  assert_eq!(cache.open_ids(), vec![B, D]);
  assert!(!cache.is_open(C));
}

#[test]
fn test_get_existing_marks_mru() {
  let (_dir, mut cache) = cache(2);
  cache.get(A).unwrap();
  cache.get(B).unwrap();
  cache.get(A).unwrap();
  cache.get(C).unwrap();
  assert_eq!(cache.open_ids(), vec![A, C]);
}

#[test]
fn test_never_exceeds_capacity() {
  let (_dir, mut cache) = cache(3);
  for id in 0..50 {
    cache.write(id % 11, &[id as u8]).unwrap();
    assert!(cache.len() <= cache.capacity());
  }
  cache.close_all().unwrap();
  assert_eq!(cache.len(), 0);
  assert!(cache.is_empty());
}

#[test]
fn test_new_file_gets_placeholder_header() {
  let (dir, mut cache) = cache(1);
  cache.write(A, b"xyz").unwrap();
  cache.close_all().unwrap();

  let bytes = fs::read(dir.path().join("block_0001.bin")).unwrap();
  assert_eq!(bytes, vec![0, 0, 0, 0, b'x', b'y', b'z']);
}

/// Reopening after eviction appends instead of truncating or re-writing the
/// header.
#[test]
fn test_reopen_appends() {
  let (dir, mut cache) = cache(1);
  cache.write(A, b"ab").unwrap();
  cache.write(B, b"q").unwrap(); // evicts A
  cache.write(A, b"cd").unwrap(); // reopens A
  cache.close_all().unwrap();

  let bytes = fs::read(dir.path().join("block_0001.bin")).unwrap();
  assert_eq!(bytes, vec![0, 0, 0, 0, b'a', b'b', b'c', b'd']);
}

#[test]
fn test_open_failure_is_reported() {
  let dir = tempfile::tempdir().unwrap();
  let store = BlockStore::new(dir.path().join("blocks")).unwrap();
  fs::remove_dir(store.dir()).unwrap();

  let mut cache = FileStreamCache::new(store, 2);
  match cache.get(A) {
    Err(FileCacheError::Open { id, .. }) => assert_eq!(id, A),
    other => panic!("expected Open error, got {:?}", other.map(|_| ())),
  }
  assert_eq!(cache.len(), 0);
}
