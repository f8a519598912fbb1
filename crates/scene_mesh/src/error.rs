//! Error types for the reconstruction core.
//!
//! None of these reach the render loop. The reconstructor turns them into a
//! skipped cycle or a skipped color update and keeps rendering whatever
//! snapshot is current.

use thiserror::Error;

/// Failures raised while ingesting or reconstructing a mesh.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconstructionError {
  /// A triangle references a vertex past the end of the vertex buffer.
  #[error("triangle {triangle} references vertex {index}, but only {vertex_count} vertices were supplied")]
  IndexOutOfRange {
    triangle: usize,
    index: u32,
    vertex_count: usize,
  },

  /// The observation is too small to reconstruct anything from.
  #[error("observation too small to reconstruct: {vertices} vertices, {triangles} triangles")]
  TooFewTriangles { vertices: usize, triangles: usize },

  /// A vertex position is NaN or infinite.
  #[error("vertex {index} has a non-finite position")]
  NonFiniteVertex { index: usize },

  /// A vertex lies farther from the origin than the sector grids reach.
  #[error("vertex {index} lies outside the {limit} m world bound")]
  VertexOutOfBounds { index: usize, limit: f32 },

  /// A buffer would need more elements than a 32-bit index can address.
  #[error("requested capacity {requested} exceeds the addressable limit")]
  CapacityOverflow { requested: usize },

  /// No camera frame arrived within the bounded wait.
  #[error("camera frame did not arrive within {waited_ms} ms")]
  FrameTimeout { waited_ms: u64 },

  /// The camera frame producer was dropped.
  #[error("camera frame source disconnected")]
  FrameSourceClosed,

  /// A background reconstruction cycle panicked or was abandoned.
  #[error("reconstruction worker stopped before delivering cycle {cycle}")]
  WorkerLost { cycle: u64 },
}

/// Failures raised while decoding an exported snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
  #[error("export is {len} bytes, shorter than the {expected}-byte header")]
  Truncated { len: usize, expected: usize },

  #[error("bad magic {found:?}")]
  BadMagic { found: [u8; 4] },

  #[error("unsupported export version {0}")]
  UnsupportedVersion(u32),
}

pub type Result<T, E = ReconstructionError> = std::result::Result<T, E>;
