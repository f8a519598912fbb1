//! scene_mesh - Engine independent scene-mesh reconstruction
//!
//! This crate turns the raw triangle mesh an AR session reports into a
//! stable, culled and colored scene mesh. Every reconstruction cycle sorts
//! the vertices into an octree of sectors, removes duplicate vertices,
//! matches the new triangles against the previous cycle's and carries their
//! per-triangle color grids forward. Each frame then culls the published
//! mesh against the eye frusta and refreshes colors from the camera image
//! where triangles are visible.
//!
//! # Features
//!
//! - **Sector sorting**: octree leaf, micro and nano sector ordering with
//!   hierarchical prefix scans
//! - **Mesh matching**: vertex, color and micro-sector passes with
//!   injective triangle correspondences
//! - **Texel grids**: per-triangle columns in small and large stores, copied
//!   forward when a triangle matches
//! - **Culling and occlusion**: render and occlusion sets with indirect draw
//!   arguments, an ID buffer and a throttled color refresh
//!
//! # Example
//!
//! ```ignore
//! use scene_mesh::{synthetic, ReconstructionConfig, SceneReconstructor};
//!
//! let mut reconstructor = SceneReconstructor::new(ReconstructionConfig::default());
//! reconstructor.submit_mesh(synthetic::room(2.0, 2.5, 0.25).with_generation(1));
//!
//! loop {
//!   reconstructor.begin_frame();
//!   let stats = reconstructor.render_frame(&next_camera_frame());
//!   println!("{} triangles drawn", stats.render.triangles);
//! }
//! ```

pub mod constants;
pub mod error;
pub mod types;

pub use constants::{MESH_MATCHING_TOLERANCE, MICRO_SECTOR_SIZE, NANO_SECTOR_SIZE, SMALL_SECTOR_SIZE, UNSAMPLED_TEXEL};
pub use error::{ExportError, ReconstructionError, Result};
pub use types::{RawMesh, SectorBounds, TriangleMatch, Vertex, Winding};

pub mod config;
pub use config::{
  CullerConfig, DedupConfig, FrameConfig, MatcherConfig, OcclusionConfig, ReconstructionConfig, SorterConfig,
  TexelConfig, TriggerConfig,
};

// Simulated compute queue, prefix scans and power-of-two buffers
pub mod compute;
pub use compute::{ComputeQueue, DispatchStats, GrowableBuffer};

// Octree and sector addressing
pub mod octree;
pub mod sector;
pub use octree::{Octree, OctreePath};
pub use sector::{SectorKey, SectorLevel, SectorTable};

// Reconstruction stages
pub mod dedup;
pub mod matcher;
pub mod sorter;
pub mod texel;
pub use dedup::{DedupMesh, DuplicateRemover};
pub use matcher::{MatchOutcome, MatchStats, MeshMatcher, MeshView};
pub use sorter::{SectorSorter, SortedMesh};
pub use texel::{TexelAllocation, TexelRasterizer, TexelStores};

// Published meshes and the per-frame work on them
pub mod culler;
pub mod occlusion;
pub mod snapshot;
pub use culler::{CullStats, CulledGeometry, Culler, DrawIndirectArgs};
pub use occlusion::{ColorSamplingThrottle, OcclusionTester, ThermalState};
pub use snapshot::{FrameMeshSnapshot, PublishedMesh, SnapshotArena};

// Cycle scheduling and camera frames
pub mod frames;
pub mod pipeline;
pub mod trigger;
pub use frames::{frame_channel, CameraFrame, FrameReceiver, FrameSender};
pub use pipeline::{CycleSummary, ReconstructionCycle, RenderStats, SceneReconstructor};
pub use trigger::ReconstructionTrigger;

// Cross-platform threading abstraction
pub mod threading;
pub use threading::{TaskExecutor, TaskId};

pub mod export;
pub mod metrics;
pub mod synthetic;
pub use export::{export_snapshot, read_export, ExportHeader};

#[cfg(test)]
mod test_utils;
