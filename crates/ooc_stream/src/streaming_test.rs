use glam::DVec3;
use tempfile::TempDir;

use super::*;
use crate::partition::{BlockPartitioner, PartitionConfig};
use crate::test_utils::{random_cloud, VecSource};
use crate::types::{BlockId, SourcePoint};

fn partitioned(n: usize) -> (TempDir, BlockStore, Vec<Block>) {
  let dir = tempfile::tempdir().unwrap();
  let store = BlockStore::new(dir.path()).unwrap();
  let config = PartitionConfig {
    grid: 3,
    ..Default::default()
  };
  let output = BlockPartitioner::new(store.clone(), config)
    .partition(&mut VecSource::new(random_cloud(n, 7)))
    .unwrap();
  (dir, store, output.blocks)
}

fn small_config() -> StreamConfig {
  StreamConfig {
    residency: ResidencyConfig {
      num_slots: 4,
      num_subslots: 2,
      ..Default::default()
    },
    num_workers: 2,
    derive_points_per_slot: true,
  }
}

fn non_empty_ids(blocks: &[Block]) -> Vec<BlockId> {
  blocks.iter().filter(|b| !b.is_empty()).map(|b| b.id).collect()
}

/// Visible by position in `ids`; distances increase along the slice.
fn candidates(ids: &[BlockId]) -> Vec<BlockCandidate> {
  ids
    .iter()
    .enumerate()
    .map(|(i, &id)| BlockCandidate::visible(id, i as f32))
    .collect()
}

#[test]
fn test_first_frame_loads_real_blocks() {
  let (_dir, store, blocks) = partitioned(2000);
  let ids = non_empty_ids(&blocks);
  assert!(ids.len() >= 6);

  let mut session = StreamingSession::start(small_config(), store.clone(), blocks.clone()).unwrap();
  let cap = session.cache().config().points_per_slot;
  assert_eq!(cap, ResidencyConfig::derive_points_per_slot(&blocks));

  let mut c = candidates(&ids[..6]);
  let report = session.frame(&mut c);

  assert_eq!(report.limit, 4);
  assert_eq!(report.misses, 4);
  assert_eq!(report.backfill_jobs, 2);
  assert_eq!(report.results_drained, report.jobs_issued);
  assert_eq!(report.failed_loads, 0);

  let views: Vec<_> = session.drawable().collect();
  assert_eq!(views.len(), 4);
  for (slot, view) in views.iter().enumerate() {
    assert_eq!(view.slot, slot);
    assert_eq!(view.block_id, ids[slot]);
    assert!(view.changed);

    let block = &blocks[view.block_id as usize];
    assert_eq!(view.count, block.count.min(cap));

    let mut expected = Vec::new();
    store.read_block(view.block_id, view.count, &mut expected).unwrap();
    assert_eq!(view.points, expected.as_slice());
  }
  assert_eq!(session.cache().subslots().len(), 2);
}

#[test]
fn test_steady_state_issues_no_jobs() {
  let (_dir, store, blocks) = partitioned(2000);
  let ids = non_empty_ids(&blocks);
  let mut session = StreamingSession::start(small_config(), store, blocks).unwrap();

  session.frame(&mut candidates(&ids[..4]));
  let report = session.frame(&mut candidates(&ids[..4]));

  assert_eq!(report.jobs_issued, 0);
  assert_eq!(report.slot_hits, 4);
  assert!(session.drawable().all(|v| !v.changed));
}

#[test]
fn test_frame_ranks_candidates() {
  let (_dir, store, blocks) = partitioned(2000);
  let ids = non_empty_ids(&blocks);
  let mut session = StreamingSession::start(small_config(), store, blocks).unwrap();

  // Farthest first on input; the nearest block must still claim slot 0
  let mut c: Vec<_> = (0..4)
    .map(|i| BlockCandidate::visible(ids[i], 10.0 - i as f32))
    .collect();
  c.push(BlockCandidate::hidden(ids[4], -1.0));
  session.frame(&mut c);

  let order: Vec<_> = session.drawable().map(|v| v.block_id).collect();
  assert_eq!(order, vec![ids[3], ids[2], ids[1], ids[0]]);
  // Backfill picked up the hidden block
  assert!(session.cache().subslots().contains(ids[4]));
}

#[test]
fn test_moving_view_promotes_warm_blocks() {
  let (_dir, store, blocks) = partitioned(2000);
  let ids = non_empty_ids(&blocks);
  let mut session = StreamingSession::start(small_config(), store, blocks).unwrap();

  // Slots take ids[0..4], backfill warms ids[4..6]
  session.frame(&mut candidates(&ids[..6]));
  let report = session.frame(&mut candidates(&ids[2..6]));

  assert_eq!(report.slot_hits, 2);
  assert_eq!(report.subslot_hits, 2);
  assert_eq!(report.jobs_issued, 0);
  session.cache().check_invariants();
}

#[cfg(feature = "metrics")]
#[test]
fn test_metrics_track_frames() {
  let (_dir, store, blocks) = partitioned(1000);
  let ids = non_empty_ids(&blocks);
  let mut session = StreamingSession::start(small_config(), store, blocks).unwrap();

  session.frame(&mut candidates(&ids[..4]));
  session.frame(&mut candidates(&ids[..4]));

  let m = session.metrics();
  assert_eq!(m.frames, 2);
  assert_eq!(m.misses, 4);
  assert_eq!(m.slot_hits, 4);
  assert_eq!(m.frame_timings.len(), 2);
  assert_eq!(m.hit_rate(), 0.5);
}

#[test]
fn test_from_manifest() {
  let (dir, _store, blocks) = partitioned(500);
  let ids = non_empty_ids(&blocks);

  let mut session = StreamingSession::from_manifest(small_config(), dir.path()).unwrap();
  assert_eq!(session.blocks(), blocks.as_slice());

  let report = session.frame(&mut candidates(&ids[..2]));
  assert_eq!(report.misses, 2);
  assert_eq!(report.failed_loads, 0);
}

#[test]
fn test_from_manifest_missing() {
  let dir = tempfile::tempdir().unwrap();
  let result = StreamingSession::from_manifest(small_config(), dir.path());
  assert!(matches!(result, Err(SessionError::Manifest(_))));
}

#[test]
fn test_missing_block_file_settles_empty() {
  let (_dir, store, blocks) = partitioned(1000);
  let ids = non_empty_ids(&blocks);
  std::fs::remove_file(store.path_for(ids[0])).unwrap();

  let mut session = StreamingSession::start(small_config(), store, blocks).unwrap();
  let report = session.frame(&mut candidates(&ids[..2]));

  assert_eq!(report.failed_loads, 1);
  let first = session.drawable().next().unwrap();
  assert_eq!(first.block_id, ids[0]);
  assert_eq!(first.count, 0);
}

#[test]
fn test_quit_is_idempotent() {
  let (_dir, store, blocks) = partitioned(500);
  let ids = non_empty_ids(&blocks);
  let mut session = StreamingSession::start(small_config(), store, blocks).unwrap();

  session.frame(&mut candidates(&ids[..2]));
  session.quit();
  session.quit();
  assert!(!session.is_running());

  let report = session.frame(&mut candidates(&ids[..2]));
  assert_eq!(report, FrameReport::default());
}

#[test]
fn test_resize_between_frames() {
  let (_dir, store, blocks) = partitioned(2000);
  let ids = non_empty_ids(&blocks);
  let mut session = StreamingSession::start(small_config(), store, blocks).unwrap();

  session.frame(&mut candidates(&ids[..6]));
  session.resize(2, 1);

  let report = session.frame(&mut candidates(&ids[..6]));
  assert_eq!(report.limit, 2);
  assert_eq!(session.drawable().count(), 2);
  assert!(session.cache().subslots().len() <= 1);
  session.cache().check_invariants();
}

#[test]
fn test_empty_cells_stream_without_failed_loads() {
  // Two opposite corners of a 2³ grid: only blocks 0 and 7 get files
  let corner = |v: f64| SourcePoint {
    position: DVec3::splat(v),
    rgb: [1, 2, 3],
  };
  let cloud = vec![corner(0.0), corner(0.1), corner(0.9), corner(1.0)];
  let dir = tempfile::tempdir().unwrap();
  let store = BlockStore::new(dir.path()).unwrap();
  let config = PartitionConfig {
    grid: 2,
    ..Default::default()
  };
  let blocks = BlockPartitioner::new(store.clone(), config)
    .partition(&mut VecSource::new(cloud))
    .unwrap()
    .blocks;
  assert_eq!(non_empty_ids(&blocks), vec![0, 7]);
  assert!(!store.path_for(1).exists());

  let mut session = StreamingSession::start(small_config(), store, blocks).unwrap();
  let report = session.frame(&mut candidates(&[0, 1, 7]));

  assert_eq!(report.failed_loads, 0);
  assert_eq!(report.empty_blocks, 1);
  assert_eq!(report.jobs_issued, 2);
  let counts: Vec<(BlockId, u32)> = session.drawable().map(|v| (v.block_id, v.count)).collect();
  assert_eq!(counts, vec![(0, 2), (1, 0), (7, 2)]);
  assert_eq!(session.metrics().failed_loads, 0);
}
