//! Test utilities shared by the stage tests.
//!
//! Meshes are built through the real sorter and duplicate remover so every
//! stage is tested on the layout it sees in a reconstruction cycle.

use glam::{Mat4, Vec3};

use crate::compute::ComputeQueue;
use crate::config::{DedupConfig, MatcherConfig, ReconstructionConfig, SorterConfig, TexelConfig};
use crate::dedup::DedupMesh;
use crate::dedup::DuplicateRemover;
use crate::frames::CameraFrame;
use crate::matcher::{MatchOutcome, MeshMatcher};
use crate::occlusion::{ColorImage, SegmentationMask};
use crate::snapshot::{CycleStats, FrameMeshSnapshot, PublishedMesh, SnapshotBuffers};
use crate::sorter::SectorSorter;
use crate::synthetic;
use crate::texel::{PreviousTexels, Texel, TexelOutcome, TexelRasterizer, TexelStores};
use crate::types::{RawMesh, TriangleMatch, Vertex};

// =========================================================================
// Mesh Fixtures
// =========================================================================

/// Sort and deduplicate `vertices`/`indices` with default settings.
pub fn build(vertices: &[Vertex], indices: &[[u32; 3]]) -> DedupMesh {
  let mut queue = ComputeQueue::new();
  let sorted = SectorSorter::new(SorterConfig::default())
    .sort(&mut queue, vertices)
    .expect("sort");
  DuplicateRemover::new(DedupConfig::default())
    .run(&mut queue, &sorted, indices)
    .0
}

pub fn build_raw(raw: &RawMesh) -> DedupMesh {
  build(&raw.vertices, &raw.indices)
}

/// Floor patch split into parts, for tests that edit indices.
pub fn floor(cells: usize, spacing: f32, origin: Vec3) -> (Vec<Vertex>, Vec<[u32; 3]>) {
  let raw = synthetic::floor_patch(cells, spacing, origin);
  (raw.vertices, raw.indices)
}

pub fn translate(vertices: &[Vertex], offset: Vec3) -> Vec<Vertex> {
  vertices
    .iter()
    .map(|v| {
      let mut moved = *v;
      moved.position = (v.position() + offset).to_array();
      moved
    })
    .collect()
}

// =========================================================================
// Stage Runners
// =========================================================================

pub fn match_meshes(new: &DedupMesh, old: Option<&DedupMesh>) -> MatchOutcome {
  let mut queue = ComputeQueue::new();
  let old_view = old.map(DedupMesh::view);
  MeshMatcher::new(MatcherConfig::default()).run(&mut queue, &new.view(), old_view.as_ref())
}

/// One texel cycle: rasterize `mesh` into fresh stores.
pub struct TexelCycle {
  pub outcome: TexelOutcome,
  pub stores: TexelStores,
}

impl TexelCycle {
  pub fn previous(&self) -> PreviousTexels<'_> {
    PreviousTexels {
      allocations: &self.outcome.allocations,
      stores: &self.stores,
    }
  }

  /// Give every texel a value unique to its triangle and position.
  pub fn paint(&mut self) {
    for (t, allocation) in self.outcome.allocations.iter().enumerate() {
      for (k, texel) in self.stores.texels_mut(allocation).iter_mut().enumerate() {
        *texel = [t as u8, (t >> 8) as u8, k as u8, 255];
      }
    }
  }
}

pub fn rasterize(
  config: TexelConfig,
  mesh: &DedupMesh,
  matches: &[TriangleMatch],
  previous: Option<&TexelCycle>,
) -> (TexelCycle, ComputeQueue) {
  let mut queue = ComputeQueue::new();
  let mut stores = TexelStores::new(&config);
  let outcome = TexelRasterizer::new(config)
    .run(&mut queue, &mesh.view(), matches, previous.map(TexelCycle::previous), &mut stores)
    .expect("rasterize");
  (TexelCycle { outcome, stores }, queue)
}

// =========================================================================
// Published Snapshots
// =========================================================================

pub fn snapshot_texel_config() -> TexelConfig {
  TexelConfig::default().with_texel_size(0.02).with_initial_capacities(256, 1024, 4096)
}

/// Run one full first cycle over `raw` and publish it.
pub fn publish(raw: &RawMesh) -> PublishedMesh {
  let mesh = build_raw(raw);
  let matches = match_meshes(&mesh, None);
  let (cycle, _) = rasterize(snapshot_texel_config(), &mesh, &matches.matches, None);
  let stats = CycleStats {
    matching: matches.stats,
    texels: cycle.outcome.stats,
    ..Default::default()
  };
  let mut queue = ComputeQueue::new();
  let buffers = SnapshotBuffers::new(mesh.vertex_count(), mesh.triangle_count());
  let snapshot = FrameMeshSnapshot::publish(&mut queue, 1, raw.generation, mesh, cycle.outcome, stats, buffers)
    .expect("publish");
  PublishedMesh::new(snapshot, cycle.stores)
}

/// Two renderable floor patches in small sectors five apart along X.
pub fn two_patches() -> RawMesh {
  synthetic::merge([
    synthetic::floor_patch(4, 0.1, Vec3::new(0.1, 0.5, 0.1)),
    synthetic::floor_patch(4, 0.1, Vec3::new(10.1, 0.5, 0.1)),
  ])
}

// =========================================================================
// Sessions and Frames
// =========================================================================

/// Session configuration with small buffers and coarse texels.
pub fn test_config() -> ReconstructionConfig {
  ReconstructionConfig::default()
    .with_sorter(SorterConfig::default().with_initial_vertex_capacity(256))
    .with_texel(snapshot_texel_config())
}

/// Mono frame with a uniform color image and nothing segmented out.
pub fn camera_frame(index: u64, view_projection: Mat4, color: Texel) -> CameraFrame {
  CameraFrame::new(
    index,
    Mat4::IDENTITY,
    view_projection,
    ColorImage::solid(64, 48, color),
    SegmentationMask::clear(64, 48),
  )
}
