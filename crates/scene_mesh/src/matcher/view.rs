//! Borrowed view over one cycle's compacted mesh.
//!
//! The matcher reads the new mesh straight out of the Duplicate Remover and
//! the old mesh out of the published snapshot; both expose the same view.

use std::ops::Range;

use glam::Vec3;

use crate::sector::SectorTable;
use crate::types::{Vertex, VertexSectors};

#[derive(Clone, Copy)]
pub struct MeshView<'a> {
  pub vertices: &'a [Vertex],
  pub indices: &'a [[u32; 3]],
  pub vertex_sectors: &'a [VertexSectors],
  pub vertex_triangle_offsets: &'a [u32],
  pub small: &'a SectorTable,
  pub micro: &'a SectorTable,
  pub nano: &'a SectorTable,
}

impl MeshView<'_> {
  #[inline]
  pub fn triangle_count(&self) -> usize {
    self.indices.len()
  }

  /// Triangles whose lowest vertex index is `vertex`.
  #[inline]
  pub fn owned_triangles(&self, vertex: u32) -> Range<usize> {
    self.vertex_triangle_offsets[vertex as usize] as usize
      ..self.vertex_triangle_offsets[vertex as usize + 1] as usize
  }

  /// Triangles owned by any vertex of `vertices` (a sector's vertex range).
  #[inline]
  pub fn triangles_of_vertices(&self, vertices: Range<usize>) -> Range<usize> {
    self.vertex_triangle_offsets[vertices.start] as usize..self.vertex_triangle_offsets[vertices.end] as usize
  }

  #[inline]
  pub fn owner(&self, triangle: usize) -> u32 {
    let [a, b, c] = self.indices[triangle];
    a.min(b).min(c)
  }

  /// Small sector owning `triangle`.
  #[inline]
  pub fn owner_small_sector(&self, triangle: usize) -> u32 {
    self.vertex_sectors[self.owner(triangle) as usize].small
  }

  #[inline]
  pub fn corners(&self, triangle: usize) -> [Vec3; 3] {
    self.indices[triangle].map(|v| self.vertices[v as usize].position())
  }

  #[inline]
  pub fn centroid(&self, triangle: usize) -> Vec3 {
    let [a, b, c] = self.corners(triangle);
    (a + b + c) / 3.0
  }

  /// Mean of the three vertex colors.
  pub fn triangle_color(&self, triangle: usize) -> [u8; 4] {
    average_color(self.indices[triangle].iter().map(|&v| self.vertices[v as usize].color()))
  }
}

/// Per-channel rounded mean; black for an empty input.
pub fn average_color(colors: impl IntoIterator<Item = [u8; 4]>) -> [u8; 4] {
  let mut sum = [0u32; 4];
  let mut count = 0u32;
  for c in colors {
    for k in 0..4 {
      sum[k] += c[k] as u32;
    }
    count += 1;
  }
  if count == 0 {
    return [0; 4];
  }
  sum.map(|s| ((s + count / 2) / count) as u8)
}
