use glam::Vec3;

use super::*;
use crate::compute::ComputeQueue;
use crate::config::SorterConfig;
use crate::sorter::SectorSorter;
use crate::types::Vertex;

fn vertex(p: Vec3, color: [u8; 4]) -> Vertex {
  Vertex::new(p, Vec3::Y, color)
}

fn dedup(vertices: &[Vertex], indices: &[[u32; 3]]) -> (DedupMesh, DedupStats) {
  let mut queue = ComputeQueue::new();
  let sorted = SectorSorter::new(SorterConfig::default())
    .sort(&mut queue, vertices)
    .expect("sort");
  DuplicateRemover::new(DedupConfig::default()).run(&mut queue, &sorted, indices)
}

/// Every grid cell emits its own four corners, so interior corners appear up
/// to four times.
fn quad_soup(cells: usize, spacing: f32, origin: Vec3) -> (Vec<Vertex>, Vec<[u32; 3]>) {
  let mut vertices = Vec::new();
  let mut indices = Vec::new();
  for x in 0..cells {
    for z in 0..cells {
      let base = vertices.len() as u32;
      for (dx, dz) in [(0, 0), (1, 0), (1, 1), (0, 1)] {
        let p = origin + Vec3::new((x + dx) as f32 * spacing, 0.0, (z + dz) as f32 * spacing);
        vertices.push(vertex(p, [200, 100, 50, 255]));
      }
      indices.push([base, base + 1, base + 2]);
      indices.push([base, base + 2, base + 3]);
    }
  }
  (vertices, indices)
}

// =========================================================================
// Batch 1: Collapsing duplicates
// =========================================================================

#[test]
fn test_coincident_vertices_collapse_and_degenerate_triangles_drop() {
  let a = Vec3::new(0.1, 0.1, 0.1);
  let vertices = vec![
    vertex(a, [0, 0, 0, 255]),
    vertex(a + Vec3::splat(0.0001), [100, 100, 100, 255]),
    vertex(Vec3::new(0.3, 0.1, 0.1), [0, 0, 0, 255]),
    vertex(Vec3::new(0.1, 0.3, 0.1), [0, 0, 0, 255]),
    vertex(Vec3::new(0.1, 0.1, 0.3), [0, 0, 0, 255]),
  ];
  let indices = vec![[0, 2, 3], [1, 3, 4], [0, 1, 2]];
  let (mesh, stats) = dedup(&vertices, &indices);

  assert_eq!(mesh.vertex_count(), 4);
  assert_eq!(mesh.remap[0], mesh.remap[1]);
  assert_eq!(mesh.triangle_count(), 2);
  assert_eq!(stats.merged_vertices, 1);
  assert_eq!(stats.dropped_triangles, 1);
  assert!(!mesh.source_triangles.contains(&2));

  let merged = mesh.vertices[mesh.remap[0] as usize];
  assert_eq!(merged.position(), a, "representative keeps its own position");
  assert_eq!(merged.color(), [50, 50, 50, 255], "colors are averaged");
}

#[test]
fn test_exactly_coincident_vertices_collapse() {
  let a = Vec3::new(0.1, 0.1, 0.1);
  let vertices = vec![
    vertex(a, [0, 0, 0, 255]),
    vertex(Vec3::new(0.3, 0.1, 0.1), [0, 0, 0, 255]),
    vertex(Vec3::new(0.1, 0.3, 0.1), [0, 0, 0, 255]),
    vertex(a, [100, 100, 100, 255]),
    vertex(Vec3::new(0.1, 0.1, 0.3), [0, 0, 0, 255]),
  ];
  let indices = vec![[0, 1, 2], [3, 2, 4], [0, 3, 1]];
  let (mesh, stats) = dedup(&vertices, &indices);

  assert_eq!(stats.merged_vertices, 1);
  assert_eq!(stats.dropped_triangles, 1);
  assert_eq!(mesh.vertex_count(), 4);
  assert_eq!(mesh.remap[0], mesh.remap[3]);
  assert_eq!(mesh.triangle_count(), 2);
  assert!(!mesh.source_triangles.contains(&2));
  assert_eq!(mesh.vertices[mesh.remap[0] as usize].color(), [50, 50, 50, 255]);
}

#[test]
fn test_vertices_beyond_tolerance_stay_apart() {
  let vertices = vec![
    vertex(Vec3::new(0.1, 0.1, 0.1), [0; 4]),
    vertex(Vec3::new(0.11, 0.1, 0.1), [0; 4]),
    vertex(Vec3::new(0.1, 0.2, 0.1), [0; 4]),
  ];
  let (mesh, stats) = dedup(&vertices, &[[0, 1, 2]]);
  assert_eq!(mesh.vertex_count(), 3);
  assert_eq!(stats, DedupStats::default());
}

#[test]
fn test_duplicates_merge_across_nano_sector_faces() {
  let boundary = 1.0 / 32.0;
  let vertices = vec![
    vertex(Vec3::new(boundary - 0.0002, 0.5, 0.5), [0; 4]),
    vertex(Vec3::new(boundary + 0.0002, 0.5, 0.5), [0; 4]),
    vertex(Vec3::new(0.5, 0.9, 0.5), [0; 4]),
    vertex(Vec3::new(0.5, 0.5, 0.9), [0; 4]),
  ];
  let (mesh, _) = dedup(&vertices, &[[0, 2, 3], [1, 2, 3]]);
  assert_eq!(mesh.vertex_count(), 3);
  assert_eq!(mesh.indices[0], mesh.indices[1]);
}

#[test]
fn test_quad_soup_welds_to_grid() {
  let (vertices, indices) = quad_soup(6, 0.1, Vec3::new(-0.3, 0.0, -0.3));
  let (mesh, stats) = dedup(&vertices, &indices);
  assert_eq!(mesh.vertex_count(), 7 * 7);
  assert_eq!(mesh.triangle_count(), indices.len());
  assert_eq!(stats.merged_vertices, vertices.len() - 49);
}

// =========================================================================
// Batch 2: Output invariants
// =========================================================================

#[test]
fn test_remap_is_total_and_many_to_one() {
  let (vertices, indices) = quad_soup(4, 0.2, Vec3::ZERO);
  let (mesh, _) = dedup(&vertices, &indices);
  assert_eq!(mesh.remap.len(), vertices.len());
  assert!(mesh.remap.iter().all(|&r| (r as usize) < mesh.vertex_count()));
  for (raw, &r) in mesh.remap.iter().enumerate() {
    let distance = mesh.vertices[r as usize].position().distance(vertices[raw].position());
    assert!(distance <= DedupConfig::default().tolerance * 4.0);
  }
}

#[test]
fn test_triangles_are_grouped_by_owner_vertex() {
  let (vertices, indices) = quad_soup(5, 0.3, Vec3::new(-0.7, 0.2, -0.7));
  let (mesh, _) = dedup(&vertices, &indices);

  assert_eq!(mesh.vertex_triangle_offsets.len(), mesh.vertex_count() + 1);
  for v in 0..mesh.vertex_count() as u32 {
    for t in mesh.owned_triangles(v) {
      let tri = mesh.indices[t];
      assert_eq!(tri.iter().min(), Some(&v));
    }
  }
  for sector in mesh.small.sectors() {
    for t in sector.triangle_range() {
      let owner = *mesh.indices[t].iter().min().expect("three corners");
      assert!(sector.vertex_range().contains(&(owner as usize)));
    }
  }
}

/// The raw triangle's corner order survives remapping.
#[test]
fn test_winding_is_preserved() {
  let (vertices, indices) = quad_soup(2, 0.5, Vec3::ZERO);
  let (mesh, _) = dedup(&vertices, &indices);
  for (t, tri) in mesh.indices.iter().enumerate() {
    let raw = indices[mesh.source_triangles[t] as usize];
    assert_eq!(*tri, raw.map(|r| mesh.remap[r as usize]));
  }
}

#[test]
fn test_sectors_and_octree_follow_compaction() {
  let (vertices, indices) = quad_soup(8, 0.05, Vec3::new(1.7, 0.0, 1.7));
  let (mesh, _) = dedup(&vertices, &indices);
  assert!(mesh.octree.is_consistent());
  assert_eq!(mesh.octree.root().count as usize, mesh.vertex_count());
  assert!(mesh.nano.sectors().iter().all(|s| s.vertex_count > 0));
  let total: u32 = mesh.small.sectors().iter().map(|s| s.triangle_count).sum();
  assert_eq!(total as usize, mesh.triangle_count());
  for (i, ids) in mesh.vertex_sectors.iter().enumerate() {
    assert!(mesh.nano.get(ids.nano).vertex_range().contains(&i));
  }
}

// =========================================================================
// Batch 3: Idempotence
// =========================================================================

#[test]
fn test_dedup_is_idempotent() {
  let (vertices, indices) = quad_soup(7, 0.04, Vec3::new(-0.1, 0.3, -0.2));
  let (first, _) = dedup(&vertices, &indices);
  let (second, stats) = dedup(&first.vertices, &first.indices);

  assert_eq!(stats, DedupStats::default());
  assert_eq!(second.vertex_count(), first.vertex_count());
  assert_eq!(second.triangle_count(), first.triangle_count());
  let mut a: Vec<_> = first.vertices.iter().map(|v| v.position).collect();
  let mut b: Vec<_> = second.vertices.iter().map(|v| v.position).collect();
  let key = |p: &[f32; 3]| (p[0].to_bits(), p[1].to_bits(), p[2].to_bits());
  a.sort_by_key(key);
  b.sort_by_key(key);
  assert_eq!(a, b);
}
