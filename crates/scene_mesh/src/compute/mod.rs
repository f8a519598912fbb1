//! Compute dispatch layer.
//!
//! Models the GPU side of the reconstruction pipeline on rayon:
//!
//! - [`ComputeQueue`] / [`CommandBuffer`]: labelled dispatches with an
//!   explicit blocking commit, the point where the CPU may read results.
//! - [`HierarchicalScan`]: the count → CPU reduce → offset protocol every
//!   stage uses to turn per-thread counts into compacted offsets.
//! - [`GrowableBuffer`]: power-of-two buffers replaced wholesale on growth.

pub mod arena;
pub mod queue;
pub mod scan;

pub use arena::GrowableBuffer;
pub use queue::{CommandBuffer, ComputeQueue, DispatchStats};
pub use scan::{compact_indices, exclusive_scan, scatter_indices, HierarchicalScan, PartialSums, ScanOutput, ScanValue};
