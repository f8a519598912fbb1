//! One reconstruction cycle, start to publication.
//!
//! ```text
//! ┌────────┐     ┌───────┐     ┌─────────┐     ┌────────┐     ┌─────────┐
//! │ Sorter ├────►│ Dedup ├────►│ Matcher ├────►│ Texels ├────►│ Publish │
//! └────────┘     └───────┘     └─────────┘     └────────┘     └─────────┘
//!     │              │              │               │              │
//! SortedMesh     DedupMesh    TriangleMatch   TexelOutcome  PublishedMesh
//!                                 ▲               ▲
//!                                 └── previous ───┘
//! ```
//!
//! The stages are owned by a [`ReconstructionCycle`] that travels to the
//! background worker with its input and comes back with the result, so a
//! cycle never shares mutable state with the render loop.

use std::sync::Arc;

use web_time::Instant;

use crate::compute::{ComputeQueue, DispatchStats};
use crate::config::ReconstructionConfig;
use crate::dedup::DuplicateRemover;
use crate::error::{ReconstructionError, Result};
use crate::matcher::MeshMatcher;
use crate::metrics::StageTimings;
use crate::snapshot::{CycleStats, FrameMeshSnapshot, PublishedMesh, SnapshotBuffers};
use crate::sorter::SectorSorter;
use crate::texel::{TexelRasterizer, TexelStores};
use crate::types::RawMesh;

/// Everything one cycle consumes.
pub struct CycleInput {
  pub cycle: u64,
  pub mesh: Arc<RawMesh>,
  /// Mesh the render loop currently shows; matching and texel copy-forward
  /// run against it.
  pub previous: Option<PublishedMesh>,
  pub buffers: SnapshotBuffers,
  pub stores: TexelStores,
}

/// A published cycle and what it cost.
#[derive(Debug)]
pub struct CycleOutput {
  pub published: PublishedMesh,
  pub timings: StageTimings,
  pub dispatch: DispatchStats,
}

/// Summary kept after a cycle is swapped in.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CycleSummary {
  pub cycle: u64,
  pub generation: u64,
  pub stats: CycleStats,
  pub timings: StageTimings,
  pub dispatch: DispatchStats,
}

impl CycleOutput {
  pub fn summary(&self) -> CycleSummary {
    let snapshot = self.published.snapshot();
    CycleSummary {
      cycle: snapshot.cycle(),
      generation: snapshot.generation(),
      stats: *snapshot.stats(),
      timings: self.timings,
      dispatch: self.dispatch,
    }
  }
}

/// The four reconstruction stages and their work queue.
pub struct ReconstructionCycle {
  sorter: SectorSorter,
  remover: DuplicateRemover,
  matcher: MeshMatcher,
  rasterizer: TexelRasterizer,
  queue: ComputeQueue,
}

impl ReconstructionCycle {
  pub fn new(config: &ReconstructionConfig) -> Self {
    Self {
      sorter: SectorSorter::new(config.sorter),
      remover: DuplicateRemover::new(config.dedup),
      matcher: MeshMatcher::new(config.matcher),
      rasterizer: TexelRasterizer::new(config.texel),
      queue: ComputeQueue::new(),
    }
  }

  /// Dispatch totals over every cycle this instance ran.
  pub fn dispatch_stats(&self) -> DispatchStats {
    self.queue.stats()
  }

  /// Run every stage over `input.mesh` and publish the result.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "reconstruction_cycle", fields(cycle = input.cycle)))]
  pub fn run(&mut self, input: CycleInput) -> Result<CycleOutput> {
    let CycleInput {
      cycle,
      mesh: raw,
      previous,
      buffers,
      mut stores,
    } = input;
    raw.validate_within(self.sorter.config().world_bound())?;
    let before = self.queue.stats();
    let mut timings = StageTimings::default();

    let start = Instant::now();
    let sorted = self.sorter.sort(&mut self.queue, &raw.vertices)?;
    timings.sort_us = start.elapsed().as_micros() as u64;

    let start = Instant::now();
    let (mesh, dedup) = self.remover.run(&mut self.queue, &sorted, &raw.indices);
    drop(sorted);
    timings.dedup_us = start.elapsed().as_micros() as u64;
    if mesh.triangle_count() == 0 {
      return Err(ReconstructionError::TooFewTriangles {
        vertices: mesh.vertex_count(),
        triangles: 0,
      });
    }

    let start = Instant::now();
    let old_view = previous.as_ref().map(|p| p.snapshot().view());
    let matches = self.matcher.run(&mut self.queue, &mesh.view(), old_view.as_ref());
    timings.match_us = start.elapsed().as_micros() as u64;

    let start = Instant::now();
    let texels = match &previous {
      Some(previous) => previous.with_previous_texels(|texels| {
        self
          .rasterizer
          .run(&mut self.queue, &mesh.view(), &matches.matches, Some(texels), &mut stores)
      }),
      None => self
        .rasterizer
        .run(&mut self.queue, &mesh.view(), &matches.matches, None, &mut stores),
    }?;
    timings.texel_us = start.elapsed().as_micros() as u64;

    // The worker's handle on the previous mesh must be gone before the
    // render loop tries to recycle it.
    drop(previous);

    let start = Instant::now();
    let stats = CycleStats {
      dedup,
      matching: matches.stats,
      texels: texels.stats,
    };
    let snapshot = FrameMeshSnapshot::publish(&mut self.queue, cycle, raw.generation, mesh, texels, stats, buffers)?;
    let published = PublishedMesh::new(snapshot, stores);
    timings.publish_us = start.elapsed().as_micros() as u64;

    #[cfg(feature = "tracing")]
    tracing::info!(
      cycle,
      generation = raw.generation,
      triangles = published.snapshot().triangle_count(),
      match_rate = stats.matching.match_rate(),
      total_us = timings.total_us(),
      "reconstruction cycle complete"
    );

    Ok(CycleOutput {
      published,
      timings,
      dispatch: self.queue.stats().since(&before),
    })
  }
}

#[cfg(test)]
#[path = "cycle_test.rs"]
mod cycle_test;
