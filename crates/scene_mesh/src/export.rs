//! Byte-level export of a published mesh, for tooling.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ Export blob (all little-endian)                                      │
//! │                                                                      │
//! │ header (48 bytes)                                                    │
//! │   magic "SCMX" │ version u32 │ cycle u64 │ generation u64            │
//! │   vertex_count u32 │ triangle_count u32                              │
//! │   small columns u32 │ small texels u32                               │
//! │   large columns u32 │ large texels u32                               │
//! │ vertices     20 bytes each: position 3×f32, normal u32, color u32    │
//! │ indices      12 bytes each: 3×u32                                    │
//! │ allocations  12 bytes each: store u8, columns u8, texels u8, pad u8, │
//! │                             column offset u32, texel offset u32      │
//! │ small store  columns (start u8, height u8), then texels (RGBA8)      │
//! │ large store  columns, then texels                                    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ExportError;
use crate::snapshot::PublishedMesh;
use crate::texel::{TexelAllocation, TexelStore, TexelStoreKind};
use crate::types::Vertex;

pub const EXPORT_MAGIC: [u8; 4] = *b"SCMX";
pub const EXPORT_VERSION: u32 = 1;

const VERTEX_BYTES: usize = 20;
const TRIANGLE_BYTES: usize = 12;
const ALLOCATION_BYTES: usize = 12;
const COLUMN_BYTES: usize = 2;
const TEXEL_BYTES: usize = 4;

/// Fixed-size blob header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportHeader {
  pub cycle: u64,
  pub generation: u64,
  pub vertex_count: u32,
  pub triangle_count: u32,
  pub small_columns: u32,
  pub small_texels: u32,
  pub large_columns: u32,
  pub large_texels: u32,
}

impl ExportHeader {
  pub const SIZE: usize = 48;

  /// Total blob length this header describes.
  pub fn blob_len(&self) -> usize {
    Self::SIZE
      + self.vertex_count as usize * VERTEX_BYTES
      + self.triangle_count as usize * (TRIANGLE_BYTES + ALLOCATION_BYTES)
      + (self.small_columns + self.large_columns) as usize * COLUMN_BYTES
      + (self.small_texels + self.large_texels) as usize * TEXEL_BYTES
  }

  /// Byte offset of the vertex section.
  pub fn vertices_offset(&self) -> usize {
    Self::SIZE
  }

  pub fn indices_offset(&self) -> usize {
    self.vertices_offset() + self.vertex_count as usize * VERTEX_BYTES
  }

  pub fn allocations_offset(&self) -> usize {
    self.indices_offset() + self.triangle_count as usize * TRIANGLE_BYTES
  }

  /// Parse and check a header without looking at the body.
  pub fn read(bytes: &[u8]) -> Result<Self, ExportError> {
    if bytes.len() < Self::SIZE {
      return Err(ExportError::Truncated {
        len: bytes.len(),
        expected: Self::SIZE,
      });
    }
    let mut reader = Reader { bytes, at: 0 };
    let magic = reader.array::<4>();
    if magic != EXPORT_MAGIC {
      return Err(ExportError::BadMagic { found: magic });
    }
    let version = reader.u32();
    if version != EXPORT_VERSION {
      return Err(ExportError::UnsupportedVersion(version));
    }
    Ok(Self {
      cycle: reader.u64(),
      generation: reader.u64(),
      vertex_count: reader.u32(),
      triangle_count: reader.u32(),
      small_columns: reader.u32(),
      small_texels: reader.u32(),
      large_columns: reader.u32(),
      large_texels: reader.u32(),
    })
  }

  fn write(&self, out: &mut Vec<u8>) {
    out.extend_from_slice(&EXPORT_MAGIC);
    out.extend_from_slice(&EXPORT_VERSION.to_le_bytes());
    out.extend_from_slice(&self.cycle.to_le_bytes());
    out.extend_from_slice(&self.generation.to_le_bytes());
    for value in [
      self.vertex_count,
      self.triangle_count,
      self.small_columns,
      self.small_texels,
      self.large_columns,
      self.large_texels,
    ] {
      out.extend_from_slice(&value.to_le_bytes());
    }
  }
}

/// Header of `bytes`, checked against the blob's length.
pub fn read_export(bytes: &[u8]) -> Result<ExportHeader, ExportError> {
  let header = ExportHeader::read(bytes)?;
  let expected = header.blob_len();
  if bytes.len() < expected {
    return Err(ExportError::Truncated {
      len: bytes.len(),
      expected,
    });
  }
  Ok(header)
}

/// Serialize `mesh` and the colors painted onto it so far.
pub fn export_snapshot(mesh: &PublishedMesh) -> Vec<u8> {
  let snapshot = mesh.snapshot();
  let colors = mesh.read_colors();
  let header = ExportHeader {
    cycle: snapshot.cycle(),
    generation: snapshot.generation(),
    vertex_count: snapshot.vertex_count() as u32,
    triangle_count: snapshot.triangle_count() as u32,
    small_columns: colors.small.columns.len() as u32,
    small_texels: colors.small.texels.len() as u32,
    large_columns: colors.large.columns.len() as u32,
    large_texels: colors.large.texels.len() as u32,
  };

  let mut out = Vec::with_capacity(header.blob_len());
  header.write(&mut out);
  for vertex in snapshot.vertices() {
    write_vertex(&mut out, vertex);
  }
  for triangle in snapshot.indices() {
    for index in triangle {
      out.extend_from_slice(&index.to_le_bytes());
    }
  }
  for allocation in snapshot.allocations() {
    write_allocation(&mut out, allocation);
  }
  write_store(&mut out, &colors.small);
  write_store(&mut out, &colors.large);
  debug_assert_eq!(out.len(), header.blob_len());
  out
}

fn write_vertex(out: &mut Vec<u8>, vertex: &Vertex) {
  for component in vertex.position {
    out.extend_from_slice(&component.to_le_bytes());
  }
  out.extend_from_slice(&vertex.normal.to_le_bytes());
  out.extend_from_slice(&vertex.color.to_le_bytes());
}

fn write_allocation(out: &mut Vec<u8>, allocation: &TexelAllocation) {
  let store = match allocation.store {
    TexelStoreKind::Small => 0u8,
    TexelStoreKind::Large => 1u8,
  };
  out.extend_from_slice(&[store, allocation.column_count, allocation.texel_count, 0]);
  out.extend_from_slice(&allocation.column_offset.to_le_bytes());
  out.extend_from_slice(&allocation.texel_offset.to_le_bytes());
}

fn write_store(out: &mut Vec<u8>, store: &TexelStore) {
  for column in store.columns.iter() {
    out.extend_from_slice(&[column.start, column.height]);
  }
  for texel in store.texels.iter() {
    out.extend_from_slice(texel);
  }
}

/// Cursor over a buffer already checked to be long enough.
struct Reader<'a> {
  bytes: &'a [u8],
  at: usize,
}

impl Reader<'_> {
  fn array<const N: usize>(&mut self) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&self.bytes[self.at..self.at + N]);
    self.at += N;
    out
  }

  fn u32(&mut self) -> u32 {
    u32::from_le_bytes(self.array())
  }

  fn u64(&mut self) -> u64 {
    u64::from_le_bytes(self.array())
  }
}
