//! Reconstruction Pipeline
//!
//! Background reconstruction cycles and the per-frame render loop around
//! them.
//!
//! ```text
//! ┌────────┐   ┌───────┐   ┌─────────┐   ┌────────┐   ┌─────────┐
//! │ Sorter ├──►│ Dedup ├──►│ Matcher ├──►│ Texels ├──►│ Publish │   background
//! └────────┘   └───────┘   └─────────┘   └────────┘   └────┬────┘
//!                                                          │ swap at frame start
//!                                          ┌────────┐   ┌──▼─────────┐
//!                                          │ Culler ├──►│ Occlusion  │   every frame
//!                                          └────────┘   └────────────┘
//! ```
//!
//! # Pipeline Stages
//!
//! 1. **Sorter**: orders vertices by octree leaf, micro and nano sector
//! 2. **Dedup**: merges coincident vertices and drops collapsed triangles
//! 3. **Matcher**: associates new triangles with the previous cycle's
//! 4. **Texels**: sizes, places and copies forward per-triangle grids
//! 5. **Publish**: copies everything into a recycled snapshot
//!
//! # Per Frame
//!
//! - `Culler`: render set for the eye frusta, occlusion set for the camera
//! - `OcclusionTester`: visible triangles and their fresh colors, throttled

pub mod cycle;
pub mod reconstructor;

pub use cycle::{CycleInput, CycleOutput, CycleSummary, ReconstructionCycle};
pub use reconstructor::{FrameStart, ReconstructorStats, RenderStats, SceneReconstructor};
