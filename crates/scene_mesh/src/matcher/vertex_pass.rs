//! First pass: vertex proximity, then exact corner correspondence.

use rayon::prelude::*;

use super::view::MeshView;
use crate::compute::CommandBuffer;
use crate::types::{TriangleMatch, Winding};

/// No counterpart.
pub const NO_VERTEX: u32 = u32::MAX;

/// Nearest old vertex within `tolerance` for every new vertex whose small
/// sector is `active`.
pub fn match_vertices(
  cmd: &mut CommandBuffer<'_>,
  new: &MeshView<'_>,
  old: &MeshView<'_>,
  active: &[bool],
  tolerance: f32,
) -> Vec<u32> {
  let tolerance_sq = tolerance * tolerance;
  cmd.dispatch("match_vertices", new.vertices.len(), || {
    new
      .vertices
      .par_iter()
      .zip(new.vertex_sectors.par_iter())
      .map(|(vertex, sectors)| {
        if !active[sectors.small as usize] {
          return NO_VERTEX;
        }
        let p = vertex.position();
        let key = new.nano.get(sectors.nano).key;
        let mut best = (tolerance_sq, NO_VERTEX);
        for s in old.nano.neighbors(key) {
          for j in old.nano.get(s).vertex_range() {
            let d = old.vertices[j].position().distance_squared(p);
            if d <= best.0 && (d < best.0 || (j as u32) < best.1) {
              best = (d, j as u32);
            }
          }
        }
        best.1
      })
      .collect()
  })
}

/// Old triangle with exactly the matched corners, for every new triangle
/// owned by an active sector.
pub fn match_triangles(
  cmd: &mut CommandBuffer<'_>,
  new: &MeshView<'_>,
  old: &MeshView<'_>,
  active: &[bool],
  vertex_matches: &[u32],
) -> Vec<TriangleMatch> {
  cmd.dispatch("match_triangles", new.triangle_count(), || {
    (0..new.triangle_count())
      .into_par_iter()
      .map(|t| {
        if !active[new.owner_small_sector(t) as usize] {
          return TriangleMatch::Unmatched;
        }
        let corners = new.indices[t].map(|v| vertex_matches[v as usize]);
        if corners.contains(&NO_VERTEX)
          || corners[0] == corners[1]
          || corners[1] == corners[2]
          || corners[0] == corners[2]
        {
          return TriangleMatch::Unmatched;
        }
        let owner = corners[0].min(corners[1]).min(corners[2]);
        old
          .owned_triangles(owner)
          .find_map(|candidate| {
            correspondence(corners, old.indices[candidate]).map(|(winding, rotation)| TriangleMatch::Matched {
              old: candidate as u32,
              winding,
              rotation,
            })
          })
          .unwrap_or_default()
      })
      .collect()
  })
}

/// Winding and rotation taking `old_triangle` onto `corners`, where
/// `corners[i]` is the old vertex matched to new corner `i`.
pub fn correspondence(corners: [u32; 3], old_triangle: [u32; 3]) -> Option<(Winding, u8)> {
  for rotation in 0..3usize {
    if (0..3).all(|k| corners[(rotation + k) % 3] == old_triangle[k]) {
      return Some((Winding::Same, rotation as u8));
    }
    if (0..3).all(|k| corners[(rotation + 3 - k) % 3] == old_triangle[k]) {
      return Some((Winding::Reversed, rotation as u8));
    }
  }
  None
}
