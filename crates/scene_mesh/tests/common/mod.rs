//! Fixtures shared by the scenario and property tests.

#![allow(dead_code)]

use std::sync::Arc;

use glam::{Mat4, Vec3};
use scene_mesh::config::{ReconstructionConfig, SorterConfig, TexelConfig};
use scene_mesh::pipeline::{CycleInput, CycleOutput, ReconstructionCycle};
use scene_mesh::snapshot::{PublishedMesh, SnapshotBuffers};
use scene_mesh::synthetic::{self, look_at};
use scene_mesh::texel::TexelStores;
use scene_mesh::RawMesh;

pub const ASPECT: f32 = 4.0 / 3.0;

pub fn config() -> ReconstructionConfig {
  ReconstructionConfig::default()
    .with_sorter(SorterConfig::default().with_initial_vertex_capacity(256))
    .with_texel(
      TexelConfig::default()
        .with_texel_size(0.02)
        .with_initial_capacities(256, 1024, 4096),
    )
}

/// Run one cycle of `stages` over `raw`.
pub fn run_cycle(
  stages: &mut ReconstructionCycle,
  cycle: u64,
  raw: &RawMesh,
  previous: Option<PublishedMesh>,
) -> scene_mesh::Result<CycleOutput> {
  stages.run(CycleInput {
    cycle,
    mesh: Arc::new(raw.clone()),
    previous,
    buffers: SnapshotBuffers::new(16, 16),
    stores: TexelStores::new(&config().texel),
  })
}

/// Two floor patches in small sectors five apart along X.
pub fn two_patches() -> RawMesh {
  synthetic::merge([
    synthetic::floor_patch(4, 0.1, Vec3::new(0.1, 0.5, 0.1)),
    synthetic::floor_patch(4, 0.1, Vec3::new(10.1, 0.5, 0.1)),
  ])
}

/// Camera looking down at the patch near the origin.
pub fn near_view() -> Mat4 {
  look_at(Vec3::new(0.3, 1.2, 0.9), Vec3::new(0.3, 0.5, 0.3), 1.0, ASPECT)
}
