//! Binary PLY ingestion.
//!
//! Only the layout produced by common scanners is accepted:
//!
//! ```text
//! ply
//! format binary_little_endian 1.0
//! element vertex N
//! property double x
//! property double y
//! property double z
//! property uchar red
//! property uchar green
//! property uchar blue
//! end_header
//! <N × 27-byte records>
//! ```
//!
//! `comment` / `obj_info` lines are skipped, and elements declared after
//! `vertex` are ignored (their data follows the vertex records).

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use glam::DVec3;
use smallvec::SmallVec;

use crate::constants::SOURCE_RECORD_BYTES;
use crate::error::IngestError;
use crate::types::SourcePoint;

/// Vertex properties every accepted file must declare, in order.
const EXPECTED_PROPERTIES: [(&str, &str); 6] = [
  ("double", "x"),
  ("double", "y"),
  ("double", "z"),
  ("uchar", "red"),
  ("uchar", "green"),
  ("uchar", "blue"),
];

/// A finite point stream that can be read twice.
///
/// The partitioner makes one pass for the bounding box and a second for cell
/// assignment, so every source must support `rewind`.
pub trait PointSource {
  /// Point count announced by the source header.
  fn declared_count(&self) -> u64;

  /// Seek back to the first record.
  fn rewind(&mut self) -> Result<(), IngestError>;

  /// Replace `out` with up to `max` records. Returns the number read; zero
  /// means the stream is exhausted.
  fn read_batch(&mut self, out: &mut Vec<SourcePoint>, max: usize) -> Result<usize, IngestError>;
}

/// Streaming reader for binary little-endian PLY point clouds.
pub struct PlyReader<R> {
  reader: R,
  vertex_count: u64,
  data_offset: u64,
  records_read: u64,
  scratch: Vec<u8>,
}

impl PlyReader<BufReader<File>> {
  /// Open a PLY file and parse its header.
  pub fn open(path: impl AsRef<Path>) -> Result<Self, IngestError> {
    let file = File::open(path)?;
    Self::new(BufReader::new(file))
  }
}

impl<R: BufRead + Seek> PlyReader<R> {
  /// Parse the header from `reader`; on success the reader sits on the first
  /// vertex record.
  pub fn new(mut reader: R) -> Result<Self, IngestError> {
    let vertex_count = parse_header(&mut reader)?;
    let data_offset = reader.stream_position()?;

    Ok(Self {
      reader,
      vertex_count,
      data_offset,
      records_read: 0,
      scratch: Vec::new(),
    })
  }

  /// Byte offset of the first vertex record.
  pub fn data_offset(&self) -> u64 {
    self.data_offset
  }

  /// Records consumed since the last rewind.
  pub fn records_read(&self) -> u64 {
    self.records_read
  }
}

impl<R: BufRead + Seek> PointSource for PlyReader<R> {
  fn declared_count(&self) -> u64 {
    self.vertex_count
  }

  fn rewind(&mut self) -> Result<(), IngestError> {
    self.reader.seek(SeekFrom::Start(self.data_offset))?;
    self.records_read = 0;
    Ok(())
  }

  fn read_batch(&mut self, out: &mut Vec<SourcePoint>, max: usize) -> Result<usize, IngestError> {
    out.clear();
    let remaining = self.vertex_count - self.records_read;
    let n = (max as u64).min(remaining) as usize;
    if n == 0 {
      return Ok(0);
    }

    self.scratch.resize(n * SOURCE_RECORD_BYTES, 0);
    let filled = read_full(&mut self.reader, &mut self.scratch)?;
    if filled < self.scratch.len() {
      return Err(IngestError::ShortRead {
        expected: self.vertex_count,
        available: self.records_read + (filled / SOURCE_RECORD_BYTES) as u64,
      });
    }

    out.reserve(n);
    out.extend(self.scratch.chunks_exact(SOURCE_RECORD_BYTES).map(decode_record));
    self.records_read += n as u64;
    Ok(n)
  }
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<u64, IngestError> {
  let mut line = String::new();

  if reader.read_line(&mut line)? == 0 || line.trim() != "ply" {
    return Err(IngestError::NotPly);
  }

  let mut vertex_count: Option<u64> = None;
  let mut has_format = false;
  let mut in_vertex = false;
  let mut vertex_properties: SmallVec<[(String, String); 6]> = SmallVec::new();

  loop {
    line.clear();
    if reader.read_line(&mut line)? == 0 {
      return Err(IngestError::MissingEndHeader);
    }

    let parts: SmallVec<[&str; 4]> = line.split_whitespace().collect();
    match parts.as_slice() {
      [] => continue,
      ["comment", ..] | ["obj_info", ..] => continue,
      ["format", encoding, ..] => {
        if *encoding != "binary_little_endian" {
          return Err(IngestError::UnsupportedFormat(encoding.to_string()));
        }
        has_format = true;
      }
      ["element", "vertex", count] => {
        let count = count
          .parse::<u64>()
          .map_err(|_| IngestError::UnsupportedVertexLayout(format!("bad vertex count `{count}`")))?;
        vertex_count = Some(count);
        in_vertex = true;
      }
      ["element", ..] => {
        if vertex_count.is_none() {
          return Err(IngestError::UnsupportedVertexLayout(
            "vertex must be the first element".to_string(),
          ));
        }
        in_vertex = false;
      }
      ["property", ty, name] if in_vertex => {
        vertex_properties.push((normalize_type(ty).to_string(), name.to_string()));
      }
      ["property", ..] => {
        if in_vertex {
          return Err(IngestError::UnsupportedVertexLayout(line.trim().to_string()));
        }
      }
      ["end_header"] => break,
      _ => {}
    }
  }

  if !has_format {
    return Err(IngestError::MissingFormat);
  }
  let count = vertex_count.ok_or(IngestError::MissingVertexElement)?;

  let layout_matches = vertex_properties.len() == EXPECTED_PROPERTIES.len()
    && vertex_properties
      .iter()
      .zip(EXPECTED_PROPERTIES.iter())
      .all(|((ty, name), (ety, ename))| ty == ety && name == ename);
  if !layout_matches {
    let found: Vec<String> = vertex_properties
      .iter()
      .map(|(ty, name)| format!("{ty} {name}"))
      .collect();
    return Err(IngestError::UnsupportedVertexLayout(found.join(", ")));
  }

  if count == 0 {
    return Err(IngestError::EmptyCloud);
  }

  Ok(count)
}

/// Map PLY type aliases onto their canonical names.
fn normalize_type(ty: &str) -> &str {
  match ty {
    "float64" => "double",
    "uint8" => "uchar",
    other => other,
  }
}

#[inline]
fn decode_record(rec: &[u8]) -> SourcePoint {
  let f = |i: usize| {
    let mut b = [0u8; 8];
    b.copy_from_slice(&rec[i * 8..i * 8 + 8]);
    f64::from_le_bytes(b)
  };
  SourcePoint {
    position: DVec3::new(f(0), f(1), f(2)),
    rgb: [rec[24], rec[25], rec[26]],
  }
}

/// Fill `buf` as far as the stream allows; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
  let mut filled = 0;
  while filled < buf.len() {
    match reader.read(&mut buf[filled..]) {
      Ok(0) => break,
      Ok(n) => filled += n,
      Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
      Err(e) => return Err(e),
    }
  }
  Ok(filled)
}

// =============================================================================
// Writing
// =============================================================================

/// Write `points` as a conforming binary PLY stream.
pub fn write_ply<W: Write>(writer: &mut W, points: &[SourcePoint]) -> io::Result<()> {
  write!(
    writer,
    "ply\nformat binary_little_endian 1.0\nelement vertex {}\n",
    points.len()
  )?;
  for (ty, name) in EXPECTED_PROPERTIES {
    writeln!(writer, "property {ty} {name}")?;
  }
  writer.write_all(b"end_header\n")?;

  let mut rec = [0u8; SOURCE_RECORD_BYTES];
  for p in points {
    rec[0..8].copy_from_slice(&p.position.x.to_le_bytes());
    rec[8..16].copy_from_slice(&p.position.y.to_le_bytes());
    rec[16..24].copy_from_slice(&p.position.z.to_le_bytes());
    rec[24..27].copy_from_slice(&p.rgb);
    writer.write_all(&rec)?;
  }
  Ok(())
}

/// Write `points` to a new PLY file at `path`.
pub fn write_ply_file(path: impl AsRef<Path>, points: &[SourcePoint]) -> io::Result<()> {
  let mut writer = BufWriter::new(File::create(path)?);
  write_ply(&mut writer, points)?;
  writer.flush()
}

#[cfg(test)]
#[path = "ply_test.rs"]
mod ply_test;
