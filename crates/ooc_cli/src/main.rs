//! Out-of-core point cloud driver.
//!
//! - `synth`: write a random binary PLY cloud
//! - `partition`: split a PLY cloud into grid block files plus a manifest
//! - `replay`: stream a partitioned cloud along a headless orbit and report
//!   residency statistics
//!
//! Logging honors `RUST_LOG` (default `info`).

mod config;
mod orbit;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glam::DVec3;
use indicatif::{ProgressBar, ProgressStyle};
use rand::prelude::*;
use tracing_subscriber::EnvFilter;

use ooc_stream::ply::write_ply_file;
use ooc_stream::{
  BlockManifest, BlockPartitioner, BlockStore, PartitionPhase, PlyReader, SourcePoint,
  StreamingSession, MAX_GRID,
};

use config::Config;
use orbit::Orbit;

#[derive(Parser, Debug)]
#[command(name = "ooc")]
#[command(about = "Partition and stream point clouds larger than memory")]
struct Args {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Write a random cloud as binary little-endian PLY.
  Synth {
    /// Output PLY path.
    #[arg(short, long)]
    out: PathBuf,

    /// Number of points.
    #[arg(short, long, default_value_t = 1_000_000)]
    points: u64,

    /// Half-width of the cube the points fill.
    #[arg(long, default_value_t = 50.0)]
    extent: f64,

    #[arg(long, default_value_t = 0)]
    seed: u64,
  },

  /// Split a PLY cloud into G³ block files.
  Partition {
    /// Input PLY path.
    #[arg(short, long)]
    input: PathBuf,

    /// Block directory (created if missing).
    #[arg(short, long)]
    out: PathBuf,

    /// Cells per axis; overrides the config file.
    #[arg(short, long)]
    grid: Option<u32>,

    /// Optional TOML configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
  },

  /// Stream a partitioned cloud along a headless orbit.
  Replay {
    /// Block directory written by `partition`.
    #[arg(short, long)]
    blocks: PathBuf,

    /// Frames to run; overrides the config file.
    #[arg(short, long)]
    frames: Option<u32>,

    /// Primary slots; overrides the config file.
    #[arg(long)]
    slots: Option<usize>,

    /// Worker threads; overrides the config file.
    #[arg(long)]
    workers: Option<usize>,

    /// Optional TOML configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  match Args::parse().command {
    Command::Synth {
      out,
      points,
      extent,
      seed,
    } => synth(&out, points, extent, seed),
    Command::Partition {
      input,
      out,
      grid,
      config,
    } => partition(&input, &out, grid, config.as_deref()),
    Command::Replay {
      blocks,
      frames,
      slots,
      workers,
      config,
    } => replay(&blocks, frames, slots, workers, config.as_deref()),
  }
}

// =============================================================================
// synth
// =============================================================================

fn synth(out: &Path, points: u64, extent: f64, seed: u64) -> Result<()> {
  if points == 0 {
    anyhow::bail!("--points must be non-zero");
  }
  let mut rng = StdRng::seed_from_u64(seed);

  // Denser toward the center so block sizes vary like a real scan
  let cloud: Vec<SourcePoint> = (0..points)
    .map(|_| {
      let dir = DVec3::new(
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
      );
      let r: f64 = rng.random::<f64>().sqrt();
      let position = dir * r * extent;
      let shade = (255.0 * (1.0 - r)) as u8;
      SourcePoint {
        position,
        rgb: [shade, rng.random(), 255 - shade],
      }
    })
    .collect();

  write_ply_file(out, &cloud).with_context(|| format!("Failed to write {}", out.display()))?;
  println!("Wrote {points} points to {}", out.display());
  Ok(())
}

// =============================================================================
// partition
// =============================================================================

fn partition(input: &Path, out: &Path, grid: Option<u32>, config: Option<&Path>) -> Result<()> {
  let config = Config::load_or_default(config)?;
  let mut partition_config = config.partition_config();
  if let Some(grid) = grid {
    anyhow::ensure!(
      grid > 0 && grid <= MAX_GRID,
      "--grid must be within 1..={MAX_GRID}"
    );
    partition_config.grid = grid;
  }

  let mut reader =
    PlyReader::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
  let store = BlockStore::new(out)
    .with_context(|| format!("Failed to create block dir: {}", out.display()))?;

  let pb = ProgressBar::new(0);
  pb.set_style(
    ProgressStyle::default_bar()
      .template("[{bar:40.cyan/blue}] {pos}/{len} points ({percent}%) {msg}")
      .context("Invalid progress template")?
      .progress_chars("=> "),
  );

  let mut current = None;
  let output = BlockPartitioner::new(store, partition_config)
    .partition_with_progress(&mut reader, |p| {
      if current != Some(p.phase) {
        current = Some(p.phase);
        pb.set_length(p.points_total);
        pb.set_message(match p.phase {
          PartitionPhase::Bounds => "computing bounds",
          PartitionPhase::Assign => "writing blocks",
          PartitionPhase::Finalize => "finalizing",
        });
      }
      pb.set_position(p.points_done);
    })
    .with_context(|| format!("Failed to partition {}", input.display()))?;
  pb.finish_and_clear();

  let largest = output.blocks.iter().map(|b| b.count).max().unwrap_or(0);
  println!(
    "Partitioned {} points into {} non-empty of {} blocks (largest {}) in {}",
    output.total_points,
    output.non_empty_blocks,
    output.blocks.len(),
    largest,
    out.display()
  );
  Ok(())
}

// =============================================================================
// replay
// =============================================================================

fn replay(
  dir: &Path,
  frames: Option<u32>,
  slots: Option<usize>,
  workers: Option<usize>,
  config: Option<&Path>,
) -> Result<()> {
  let config = Config::load_or_default(config)?;
  let mut stream_config = config.stream_config();
  if let Some(slots) = slots {
    stream_config.residency.num_slots = slots;
  }
  if let Some(workers) = workers {
    anyhow::ensure!(workers > 0, "--workers must be at least 1");
    stream_config.num_workers = workers;
  }
  let frames = frames.unwrap_or(config.replay.frames);

  let manifest = BlockManifest::load(dir)
    .with_context(|| format!("Failed to load manifest from {}", dir.display()))?;
  let orbit = Orbit::around(
    &manifest,
    config.replay.frames,
    config.replay.orbit_scale,
    config.replay.view_scale,
  );
  let store = BlockStore::new(dir)?;
  let mut session = StreamingSession::start(stream_config, store, manifest.blocks)
    .context("Failed to start streaming session")?;

  tracing::info!(frames, view_radius = orbit.view_radius(), "replaying orbit");

  let mut candidates = Vec::new();
  let mut uploaded_points = 0u64;
  let mut peak_visible = 0usize;
  for frame in 0..frames {
    orbit.candidates(frame, session.blocks(), &mut candidates);
    let report = session.frame(&mut candidates);
    peak_visible = peak_visible.max(report.visible);

    // Stand-in for the renderer: count what would be uploaded and drawn
    let mut drawn = 0u64;
    for view in session.drawable() {
      if view.changed {
        uploaded_points += view.count as u64;
      }
      drawn += view.count as u64;
    }
    tracing::debug!(
      frame,
      visible = report.visible,
      jobs = report.jobs_issued,
      drawn,
      "frame"
    );
  }

  session.quit();
  print_summary(&session, uploaded_points, peak_visible);
  Ok(())
}

fn print_summary(session: &StreamingSession, uploaded_points: u64, peak_visible: usize) {
  let m = session.metrics();
  let (frame_min, frame_max) = m.frame_timings.min_max().unwrap_or((0, 0));

  println!("Frames:            {}", m.frames);
  println!("Peak visible:      {peak_visible}");
  println!("Hit rate:          {:.1}%", m.hit_rate() * 100.0);
  println!(
    "Hits:              {} slot, {} subslot",
    m.slot_hits, m.subslot_hits
  );
  println!(
    "Jobs:              {} ({} misses, {} backfill)",
    m.jobs_issued, m.misses, m.backfill_jobs
  );
  println!("Empty blocks:      {}", m.empty_blocks);
  println!("Failed loads:      {}", m.failed_loads);
  println!("Duplicates:        {}", m.duplicates_skipped);
  println!("Uploaded points:   {uploaded_points}");
  println!(
    "Frame time (us):   avg {:.0}, min {frame_min}, max {frame_max} (last {} frames)",
    m.frame_timings.average(),
    m.frame_timings.len()
  );
  println!("Drain time (us):   avg {:.0}", m.drain_timings.average());
  println!("Block load (us):   avg {:.0}", m.load_timings.average());
}
