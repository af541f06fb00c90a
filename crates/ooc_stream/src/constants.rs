//! Layout constants for block files and ingestion.
//!
//! # Block File Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         BLOCK FILE LAYOUT                            │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  Byte:   0    4                 19                34        ...      │
//! │          │    │                 │                 │                  │
//! │          ├────┼─────────────────┼─────────────────┼──────            │
//! │          │cnt │    record 0     │    record 1     │  ...             │
//! │          ├────┼─────────────────┼─────────────────┼──────            │
//! │          u32    x y z (f32 LE)    x y z (f32 LE)                     │
//! │          LE     r g b (u8)        r g b (u8)                         │
//! │                                                                      │
//! │  [0..4)  point count, written as 0 at open, patched after the        │
//! │          partitioning pass knows the final count                     │
//! │  [4..)   `count` packed records, 15 bytes each, no padding           │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Ingestion Record
//!
//! ```text
//! offset: 0        8        16       24  25  26
//!         │ x f64  │ y f64  │ z f64  │ r │ g │ b │   = 27 bytes
//! ```

/// Default grid resolution per axis (G). G³ = 1000 blocks.
pub const DEFAULT_GRID: u32 = 10;

/// Largest grid resolution per axis. G³ block ids must fit a u32 and the
/// partitioner allocates per-block state for every cell.
pub const MAX_GRID: u32 = 1024;

/// Bytes in the leading point-count header of a block file.
pub const BLOCK_HEADER_BYTES: usize = 4;

/// Bytes per packed on-disk block record (3×f32 position + 3×u8 color).
pub const BLOCK_RECORD_BYTES: usize = 15;

/// Bytes per ingestion source record (3×f64 position + 3×u8 color).
pub const SOURCE_RECORD_BYTES: usize = 27;

/// Points read per ingestion batch.
pub const DEFAULT_BATCH_POINTS: usize = 1 << 16;

/// Points buffered per block before a flush through the stream cache.
pub const DEFAULT_FLUSH_POINTS: usize = 4096;

/// Concurrently open output streams during partitioning.
pub const DEFAULT_FILE_CACHE_CAPACITY: usize = 128;

/// Smallest permitted cell edge; guards zero-extent axes.
pub const MIN_CELL_SIZE: f32 = 1e-6;

/// Primary (renderer-visible) slots.
pub const DEFAULT_NUM_SLOTS: usize = 200;

/// Warm host-memory subslots.
pub const DEFAULT_NUM_SUBSLOTS: usize = 16;

/// Per-slot point capacity when not derived from the block table.
pub const DEFAULT_POINTS_PER_SLOT: u32 = 200_000;

/// Block-loading worker threads.
pub const DEFAULT_NUM_WORKERS: usize = 5;

/// File name of the block manifest written next to the block files.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";
