//! ooc_stream - Out-of-core point cloud streaming
//!
//! This crate streams a point cloud far larger than memory from disk into a
//! bounded set of renderer-visible buffers, keeping all disk reads off the
//! render thread.
//!
//! # Features
//!
//! - **Block Partitioning**: two-pass ingestion of a binary PLY stream into
//!   G³ uniform grid cells, each written to its own block file
//! - **File Stream Cache**: LRU-bounded pool of open output streams so
//!   partitioning stays under OS file-descriptor limits
//! - **Residency Cache**: fixed primary slots (renderer buffers) backed by a
//!   warm LRU subslot tier, reconciled once per frame
//! - **Async Loading**: blocking job/result queues and a fixed worker pool
//!   that perform every block read
//!
//! # Example
//!
//! ```ignore
//! use ooc_stream::{BlockPartitioner, BlockStore, PartitionConfig, PlyReader};
//! use ooc_stream::{StreamConfig, StreamingSession};
//!
//! let store = BlockStore::new("blocks")?;
//! let mut source = PlyReader::open("cloud.ply")?;
//! let output = BlockPartitioner::new(store.clone(), PartitionConfig::default())
//!     .partition(&mut source)?;
//!
//! let mut session = StreamingSession::start(StreamConfig::default(), store, output.blocks)?;
//! loop {
//!     let mut candidates = culler.candidates(&camera);
//!     let report = session.frame(&mut candidates);
//!     for view in session.drawable() {
//!         if view.changed {
//!             renderer.upload(view.handle, view.points);
//!         }
//!         renderer.draw(view.handle, view.count);
//!     }
//! }
//! ```

pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use constants::{
  BLOCK_HEADER_BYTES, BLOCK_RECORD_BYTES, DEFAULT_GRID, MAX_GRID, SOURCE_RECORD_BYTES,
};
pub use error::{BlockReadError, FileCacheError, IngestError, ManifestError, SessionError};
pub use types::{delinearize, linearize, Aabb, Block, BlockId, Point, SourcePoint};

// Ingestion input
pub mod ply;
pub use ply::{PlyReader, PointSource};

// On-disk block layout and manifest
pub mod block_store;
pub mod manifest;
pub use block_store::BlockStore;
pub use manifest::BlockManifest;

// Index-based LRU list shared by both caches
pub mod lru;
pub use lru::LruList;

// Partitioning
pub mod file_cache;
pub mod partition;
pub use file_cache::FileStreamCache;
pub use partition::{
  BlockPartitioner, PartitionConfig, PartitionOutput, PartitionPhase, PartitionProgress,
};

// Async loading
pub mod job;
pub mod queue;
pub mod worker;
pub use job::{Destination, Job, LoadResult};
pub use queue::WorkQueue;
pub use worker::WorkerPool;

// Residency
pub mod ranking;
pub mod residency;
pub mod slots;
pub use ranking::{rank_candidates, visible_count, BlockCandidate};
pub use residency::{
  BlockLoader, FrameReport, QueueLoader, ResidencyCache, ResidencyConfig, SlotView,
};
pub use slots::{BufferHandle, Slot, SlotStatus, SubslotCache, SubslotEntry};

// Session wiring
pub mod streaming;
pub use streaming::{StreamConfig, StreamingSession};

// Engine-agnostic statistics
pub mod metrics;
pub use metrics::StreamingMetrics;

// Test utilities
#[cfg(test)]
pub mod test_utils;
