use glam::Vec3;

use super::*;
use crate::types::Vertex;

fn vertex(x: f32, y: f32, z: f32) -> Vertex {
  Vertex::new(Vec3::new(x, y, z), Vec3::Y, [128, 128, 128, 255])
}

/// Deterministic scatter of points in a cube of half-extent `half`.
fn scattered(count: usize, half: f32) -> Vec<Vertex> {
  let mut state = 0x2545_f491_u32;
  let mut next = move || {
    state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    (state >> 8) as f32 / (1u32 << 24) as f32
  };
  (0..count)
    .map(|_| vertex((next() * 2.0 - 1.0) * half, (next() * 2.0 - 1.0) * half, (next() * 2.0 - 1.0) * half))
    .collect()
}

fn sort(vertices: &[Vertex]) -> (SortedMesh, ComputeQueue) {
  let mut queue = ComputeQueue::new();
  let mut sorter = SectorSorter::new(SorterConfig::default());
  let sorted = sorter.sort(&mut queue, vertices).expect("sort");
  (sorted, queue)
}

// =========================================================================
// Batch 1: Empty and trivial input
// =========================================================================

#[test]
fn test_empty_input_is_single_root_without_dispatches() {
  let (sorted, queue) = sort(&[]);
  assert_eq!(sorted.octree.len(), 1);
  assert_eq!(sorted.octree.root().count, 0);
  assert!(sorted.small.is_empty());
  assert!(sorted.nano.is_empty());
  assert_eq!(queue.stats().dispatches, 0);
  assert_eq!(queue.stats().command_buffers, 0);
}

#[test]
fn test_single_vertex_produces_one_sector_per_level() {
  let (sorted, _) = sort(&[vertex(0.3, 0.3, 0.3)]);
  assert_eq!(sorted.small.len(), 1);
  assert_eq!(sorted.micro.len(), 1);
  assert_eq!(sorted.nano.len(), 1);
  assert_eq!(sorted.small.get(0).key, SectorKey::new(0, 0, 0));
  assert_eq!(sorted.micro.get(0).key, SectorKey::new(1, 1, 1));
  assert_eq!(sorted.octree.root().count, 1);
}

#[test]
fn test_root_half_size_is_power_of_two_multiple() {
  assert_eq!(root_half_size(0.0, 2.0), 2.0);
  assert_eq!(root_half_size(1.99, 2.0), 2.0);
  assert_eq!(root_half_size(2.0, 2.0), 4.0);
  assert_eq!(root_half_size(13.0, 2.0), 16.0);
}

// =========================================================================
// Batch 2: Octree invariants
// =========================================================================

#[test]
fn test_octree_counts_sum_at_every_depth() {
  let vertices = scattered(5000, 9.0);
  let (sorted, _) = sort(&vertices);
  let tree = &sorted.octree;

  assert!(tree.is_consistent());
  assert_eq!(tree.root().count as usize, vertices.len());
  for depth in 0..=tree.max_depth() {
    assert_eq!(tree.count_at_depth(depth), vertices.len() as u64);
  }
}

#[test]
fn test_leaves_are_small_sectors() {
  let vertices = scattered(2000, 7.0);
  let (sorted, _) = sort(&vertices);
  let leaves: Vec<_> = sorted.octree.leaves().map(|(_, n)| n.clone()).collect();
  assert_eq!(leaves.len(), sorted.small.len());
  for (leaf, sector) in leaves.iter().zip(sorted.small.sectors()) {
    assert_eq!(leaf.edge(), SMALL_EDGE);
    assert_eq!(leaf.offset, sector.vertex_offset);
    assert_eq!(leaf.count, sector.vertex_count);
    assert!(leaf.count > 0, "empty buckets must not become nodes");
  }
}

const SMALL_EDGE: f32 = crate::constants::SMALL_SECTOR_SIZE;

// =========================================================================
// Batch 3: Sector assignment
// =========================================================================

#[test]
fn test_every_vertex_lies_in_its_sectors() {
  let vertices = scattered(3000, 5.0);
  let (sorted, _) = sort(&vertices);

  for (i, v) in sorted.vertices.iter().enumerate() {
    let ids = sorted.vertex_sectors[i];
    let p = v.position();
    assert!(sorted.small.get(ids.small).bounds.contains(p));
    assert!(sorted.micro.get(ids.micro).bounds.contains(p));
    assert!(sorted.nano.get(ids.nano).bounds.contains(p));
    assert!(sorted.nano.get(ids.nano).vertex_range().contains(&i));
  }
}

#[test]
fn test_sector_keys_nest() {
  let vertices = scattered(1500, 4.0);
  let (sorted, _) = sort(&vertices);
  for nano in sorted.nano.sectors() {
    let micro = sorted.micro.get(nano.parent);
    assert_eq!(nano.key.parent(), micro.key);
    assert_eq!(micro.key.parent(), sorted.small.get(micro.parent).key);
  }
  assert!(sorted.nano.sectors().iter().all(|s| s.vertex_count > 0));
}

#[test]
fn test_permutation_is_total() {
  let vertices = scattered(777, 3.0);
  let (sorted, _) = sort(&vertices);
  for (position, &raw) in sorted.source.iter().enumerate() {
    assert_eq!(sorted.rank[raw as usize] as usize, position);
    assert_eq!(sorted.vertices[position], vertices[raw as usize]);
  }
}

/// Vertices sharing a nano sector keep their input order.
#[test]
fn test_sort_is_stable_within_a_cell() {
  let vertices = vec![vertex(0.01, 0.01, 0.01), vertex(5.0, 5.0, 5.0), vertex(0.011, 0.01, 0.01)];
  let (sorted, _) = sort(&vertices);
  let a = sorted.rank[0];
  let c = sorted.rank[2];
  assert_eq!(c, a + 1);
}

#[test]
fn test_negative_octants_sort_before_positive() {
  let vertices = vec![vertex(1.0, 1.0, 1.0), vertex(-1.0, -1.0, -1.0)];
  let (sorted, _) = sort(&vertices);
  assert_eq!(sorted.source, vec![1, 0]);
  assert_eq!(sorted.small.get(0).key, SectorKey::new(-1, -1, -1));
}

// =========================================================================
// Batch 4: Dispatch protocol and growth
// =========================================================================

#[test]
fn test_each_pass_hands_off_to_cpu_twice() {
  let (_, queue) = sort(&[vertex(0.5, 0.5, 0.5), vertex(-0.5, 0.5, 0.5)]);
  // extent + world + micro + nano; root half == small edge so no stage 2.
  assert_eq!(queue.stats().command_buffers, 1 + 3 * 2);
  assert_eq!(queue.stats().cpu_handoffs, queue.stats().command_buffers);
}

#[test]
fn test_buffers_grow_to_next_power_of_two() {
  let mut queue = ComputeQueue::new();
  let mut sorter = SectorSorter::new(SorterConfig::default().with_initial_vertex_capacity(16));
  let vertices = scattered(100, 2.0);
  sorter.sort(&mut queue, &vertices).expect("sort");
  assert_eq!(sorter.capacity(), 128);
  assert!(queue.stats().buffer_growths >= 2);

  let before = sorter.capacity();
  sorter.sort(&mut queue, &vertices[..10]).expect("sort");
  assert_eq!(sorter.capacity(), before, "capacity never shrinks");
}

// =========================================================================
// Batch 5: World bound
// =========================================================================

#[test]
fn test_far_vertex_is_rejected_before_bucketing() {
  let mut queue = ComputeQueue::new();
  let mut sorter = SectorSorter::new(SorterConfig::default());
  let vertices = [vertex(0.0, 0.0, 0.0), vertex(1.0e9, 0.0, 0.0), vertex(0.0, 1.0, 0.0)];
  let err = sorter.sort(&mut queue, &vertices).expect_err("far vertex");
  assert!(matches!(err, ReconstructionError::VertexOutOfBounds { index: 1, .. }));
  assert_eq!(queue.stats().command_buffers, 1, "only the extent pass ran");
}

#[test]
fn test_near_max_float_vertex_is_rejected() {
  let mut queue = ComputeQueue::new();
  let mut sorter = SectorSorter::new(SorterConfig::default());
  let vertices = [vertex(0.0, 0.0, 0.0), vertex(1.0, 0.0, 0.0), vertex(0.0, -3.0e38, 0.0)];
  let err = sorter.sort(&mut queue, &vertices).expect_err("huge vertex");
  assert!(matches!(err, ReconstructionError::VertexOutOfBounds { index: 2, .. }));
}

#[test]
fn test_vertices_at_the_world_bound_still_sort() {
  let limit = crate::constants::MAX_WORLD_EXTENT;
  let (sorted, _) = sort(&[vertex(limit, 0.0, 0.0), vertex(-limit, 0.0, 0.0), vertex(0.0, 0.0, limit)]);
  assert!(sorted.octree.is_consistent());
  assert_eq!(sorted.small.len(), 3);
  assert_eq!(sorted.nano.len(), 3);
  assert!(sorted.octree.max_depth() <= crate::constants::MAX_OCTREE_DEPTH);
}

#[test]
fn test_root_half_size_stops_at_depth_limit() {
  let half = root_half_size(f32::MAX, 2.0);
  assert!(half.is_finite());
  assert_eq!(half, 2.0 * 2f32.powi(crate::constants::MAX_OCTREE_DEPTH as i32 - 1));
}
