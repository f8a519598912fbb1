//! Core value types shared by every reconstruction stage.

use glam::Vec3;

use crate::constants::MAX_WORLD_EXTENT;
use crate::error::{ReconstructionError, Result};

/// Normal and color packing for the 16-byte vertex layout.
pub mod packing {
  use glam::Vec3;

  const SNORM10_MAX: f32 = 511.0;

  /// Pack a unit normal into three 10-bit signed-normalized fields.
  ///
  /// Layout: x in bits 0-9, y in bits 10-19, z in bits 20-29.
  #[inline]
  pub fn pack_normal(normal: Vec3) -> u32 {
    let n = normal.normalize_or_zero();
    let encode = |v: f32| -> u32 {
      let q = (v.clamp(-1.0, 1.0) * SNORM10_MAX).round() as i32;
      (q as u32) & 0x3FF
    };
    encode(n.x) | (encode(n.y) << 10) | (encode(n.z) << 20)
  }

  /// Unpack a normal produced by [`pack_normal`].
  #[inline]
  pub fn unpack_normal(packed: u32) -> Vec3 {
    let decode = |bits: u32| -> f32 {
      // Sign-extend the 10-bit field.
      let v = ((bits << 22) as i32) >> 22;
      (v as f32 / SNORM10_MAX).max(-1.0)
    };
    Vec3::new(
      decode(packed & 0x3FF),
      decode((packed >> 10) & 0x3FF),
      decode((packed >> 20) & 0x3FF),
    )
  }

  /// Pack RGBA8 into a `u32` (R in the low byte).
  #[inline]
  pub fn pack_color(rgba: [u8; 4]) -> u32 {
    u32::from_le_bytes(rgba)
  }

  /// Unpack a color produced by [`pack_color`].
  #[inline]
  pub fn unpack_color(packed: u32) -> [u8; 4] {
    packed.to_le_bytes()
  }

  /// Manhattan distance between the RGB channels of two colors (0..=765).
  #[inline]
  pub fn color_distance(a: [u8; 4], b: [u8; 4]) -> u32 {
    (0..3).map(|i| a[i].abs_diff(b[i]) as u32).sum()
  }
}

/// Reconstructed vertex.
///
/// Memory layout (20 bytes):
/// - position: [f32; 3] (12 bytes)
/// - normal: u32, 10:10:10 snorm (4 bytes)
/// - color: u32, RGBA8 (4 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vertex {
  pub position: [f32; 3],
  pub normal: u32,
  pub color: u32,
}

impl Vertex {
  pub fn new(position: Vec3, normal: Vec3, color: [u8; 4]) -> Self {
    Self {
      position: position.to_array(),
      normal: packing::pack_normal(normal),
      color: packing::pack_color(color),
    }
  }

  #[inline]
  pub fn position(&self) -> Vec3 {
    Vec3::from_array(self.position)
  }

  #[inline]
  pub fn normal(&self) -> Vec3 {
    packing::unpack_normal(self.normal)
  }

  #[inline]
  pub fn color(&self) -> [u8; 4] {
    packing::unpack_color(self.color)
  }
}

/// Axis-aligned extent of a sector or octree node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectorBounds {
  pub min: Vec3,
  pub max: Vec3,
}

impl SectorBounds {
  pub fn new(min: Vec3, max: Vec3) -> Self {
    Self { min, max }
  }

  /// Cube of the given edge length whose minimum corner is `min`.
  pub fn cube(min: Vec3, edge: f32) -> Self {
    Self {
      min,
      max: min + Vec3::splat(edge),
    }
  }

  /// Inverted bounds; any encapsulated point makes them valid.
  pub fn empty() -> Self {
    Self {
      min: Vec3::splat(f32::MAX),
      max: Vec3::splat(f32::MIN),
    }
  }

  pub fn encapsulate(&mut self, point: Vec3) {
    self.min = self.min.min(point);
    self.max = self.max.max(point);
  }

  pub fn is_valid(&self) -> bool {
    self.min.cmple(self.max).all()
  }

  pub fn center(&self) -> Vec3 {
    (self.min + self.max) * 0.5
  }

  pub fn contains(&self, point: Vec3) -> bool {
    point.cmpge(self.min).all() && point.cmple(self.max).all()
  }

  /// The eight corners, ordered by the same octant bits as octree children
  /// (bit 0 = +X, bit 1 = +Y, bit 2 = +Z).
  pub fn corners(&self) -> [Vec3; 8] {
    std::array::from_fn(|octant| {
      Vec3::new(
        if octant & 1 != 0 { self.max.x } else { self.min.x },
        if octant & 2 != 0 { self.max.y } else { self.min.y },
        if octant & 4 != 0 { self.max.z } else { self.min.z },
      )
    })
  }
}

impl Default for SectorBounds {
  fn default() -> Self {
    Self::empty()
  }
}

/// Sector ids of one vertex at each granularity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexSectors {
  pub small: u32,
  pub micro: u32,
  pub nano: u32,
}

/// Orientation of a matched triangle relative to its predecessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Winding {
  Same,
  Reversed,
}

/// Association of a new triangle with a triangle of the previous cycle.
///
/// `rotation` and `winding` together map corners: old corner `k` sits at new
/// corner `(rotation + k) % 3` for [`Winding::Same`] and at
/// `(rotation + 3 - k) % 3` for [`Winding::Reversed`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TriangleMatch {
  #[default]
  Unmatched,
  Matched {
    old: u32,
    winding: Winding,
    rotation: u8,
  },
}

impl TriangleMatch {
  #[inline]
  pub fn old_triangle(&self) -> Option<u32> {
    match *self {
      TriangleMatch::Matched { old, .. } => Some(old),
      TriangleMatch::Unmatched => None,
    }
  }

  #[inline]
  pub fn is_matched(&self) -> bool {
    matches!(self, TriangleMatch::Matched { .. })
  }

  /// New corner index holding the old triangle's corner `old_corner`.
  pub fn new_corner(&self, old_corner: usize) -> usize {
    match *self {
      TriangleMatch::Matched {
        winding: Winding::Same,
        rotation,
        ..
      } => (rotation as usize + old_corner) % 3,
      TriangleMatch::Matched {
        winding: Winding::Reversed,
        rotation,
        ..
      } => (rotation as usize + 3 - old_corner) % 3,
      TriangleMatch::Unmatched => old_corner,
    }
  }
}

/// Raw reduced mesh handed over by the upstream mesh-reduction collaborator.
#[derive(Clone, Debug, Default)]
pub struct RawMesh {
  pub vertices: Vec<Vertex>,
  pub indices: Vec<[u32; 3]>,
  /// Upstream update counter; a new value means the mesh changed.
  pub generation: u64,
}

impl RawMesh {
  pub fn new(vertices: Vec<Vertex>, indices: Vec<[u32; 3]>) -> Self {
    Self {
      vertices,
      indices,
      generation: 0,
    }
  }

  pub fn with_generation(mut self, generation: u64) -> Self {
    self.generation = generation;
    self
  }

  pub fn vertex_count(&self) -> usize {
    self.vertices.len()
  }

  pub fn triangle_count(&self) -> usize {
    self.indices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vertices.is_empty()
  }

  /// Reject observations the pipeline cannot reconstruct, using the
  /// default world bound.
  pub fn validate(&self) -> Result<()> {
    self.validate_within(MAX_WORLD_EXTENT)
  }

  /// Reject observations the pipeline cannot reconstruct, including any
  /// vertex with a coordinate magnitude above `limit`.
  pub fn validate_within(&self, limit: f32) -> Result<()> {
    if self.vertices.is_empty() || self.indices.is_empty() {
      return Err(ReconstructionError::TooFewTriangles {
        vertices: self.vertices.len(),
        triangles: self.indices.len(),
      });
    }
    if self.vertices.len() > u32::MAX as usize || self.indices.len() > u32::MAX as usize {
      return Err(ReconstructionError::CapacityOverflow {
        requested: self.vertices.len().max(self.indices.len()),
      });
    }
    if let Some(index) = self
      .vertices
      .iter()
      .position(|v| !v.position().is_finite())
    {
      return Err(ReconstructionError::NonFiniteVertex { index });
    }
    if let Some(index) = out_of_bounds(&self.vertices, limit) {
      return Err(ReconstructionError::VertexOutOfBounds { index, limit });
    }
    let vertex_count = self.vertices.len();
    for (triangle, tri) in self.indices.iter().enumerate() {
      if let Some(&index) = tri.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(ReconstructionError::IndexOutOfRange {
          triangle,
          index,
          vertex_count,
        });
      }
    }
    Ok(())
  }
}

/// First vertex with a coordinate magnitude above `limit`.
pub fn out_of_bounds(vertices: &[Vertex], limit: f32) -> Option<usize> {
  vertices
    .iter()
    .position(|v| !v.position().is_finite() || v.position().abs().max_element() > limit)
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
