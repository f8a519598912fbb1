//! Scene reconstructor - the render loop's single entry point.
//!
//! ```text
//!  render frame N                 background worker
//!  ──────────────                 ─────────────────
//!  begin_frame ── poll ◄───────── cycle k done
//!      │ swap current, recycle old
//!      │ trigger due? ──────────► run cycle k+1 (stages + previous mesh)
//!  render_frame
//!      │ cull render set / occlusion set
//!      │ occlusion test + color refresh (throttled)
//! ```
//!
//! `currently_matching_meshes` is set while a cycle is in flight. While it
//! is set no second cycle starts and the current mesh is never replaced;
//! a finished cycle is swapped in at the start of the next frame.
//! Failures never reach the caller: a failed cycle is counted and skipped,
//! a missing camera frame skips the color refresh.

use std::sync::Arc;
use std::time::Duration;

use glam::Mat4;
use smallvec::SmallVec;

use crate::compute::{ComputeQueue, DispatchStats};
use crate::config::ReconstructionConfig;
use crate::culler::{CullStats, CullTarget, CulledGeometry, Culler};
use crate::error::{ReconstructionError, Result};
use crate::frames::{CameraFrame, FrameReceiver};
use crate::metrics::ReconstructionMetrics;
use crate::occlusion::{ColorSamplingThrottle, ColorUpdate, OcclusionStats, OcclusionTester, ThermalState};
use crate::snapshot::{PublishedMesh, SnapshotArena};
use crate::threading::{TaskCompletion, TaskExecutor, TaskId};
use crate::trigger::ReconstructionTrigger;
use crate::types::RawMesh;

use super::cycle::{CycleInput, CycleOutput, CycleSummary, ReconstructionCycle};

/// What the worker hands back: the stages, and the cycle's result.
struct CycleReport {
  stages: ReconstructionCycle,
  result: Result<CycleOutput>,
}

#[derive(Clone, Copy, Debug)]
struct InFlight {
  task: TaskId,
  cycle: u64,
}

/// Session counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReconstructorStats {
  pub cycles_started: u64,
  pub cycles_swapped: u64,
  pub skipped_cycles: u64,
  pub lost_workers: u64,
  pub frames: u64,
  pub missing_frames: u64,
  pub color_updates: u64,
  pub skipped_color_updates: u64,
  pub last_cycle: Option<CycleSummary>,
}

/// What `begin_frame` did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStart {
  /// A finished cycle replaced the current mesh.
  pub swapped: bool,
  /// A new cycle was started.
  pub started: Option<u64>,
}

/// What `render_frame` produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
  pub render: CullStats,
  pub occlusion: CullStats,
  pub visibility: OcclusionStats,
  /// `None` when this frame did not refresh color.
  pub color: Option<ColorUpdate>,
}

pub struct SceneReconstructor {
  config: ReconstructionConfig,
  executor: TaskExecutor<CycleReport>,
  /// Stages, present whenever no cycle is in flight.
  stages: Option<ReconstructionCycle>,
  in_flight: Option<InFlight>,
  currently_matching_meshes: bool,
  pending_mesh: Option<Arc<RawMesh>>,
  current: Option<PublishedMesh>,
  arena: SnapshotArena,
  trigger: ReconstructionTrigger,
  next_cycle: u64,

  culler: Culler,
  render_set: CulledGeometry,
  occlusion_set: CulledGeometry,
  occlusion: OcclusionTester,
  throttle: ColorSamplingThrottle,
  last_eye_views: SmallVec<[Mat4; 2]>,
  queue: ComputeQueue,

  stats: ReconstructorStats,
  metrics: ReconstructionMetrics,
}

impl SceneReconstructor {
  pub fn new(config: ReconstructionConfig) -> Self {
    let vertices = config.sorter.initial_vertex_capacity;
    let triangles = config.texel.initial_triangle_capacity;
    Self {
      executor: TaskExecutor::new(),
      stages: Some(ReconstructionCycle::new(&config)),
      in_flight: None,
      currently_matching_meshes: false,
      pending_mesh: None,
      current: None,
      arena: SnapshotArena::new(vertices, config.texel),
      trigger: ReconstructionTrigger::new(config.trigger),
      next_cycle: 1,
      culler: Culler::new(config.culler),
      render_set: CulledGeometry::new(CullTarget::Render, vertices, triangles),
      occlusion_set: CulledGeometry::new(CullTarget::Occlusion, vertices, triangles),
      occlusion: OcclusionTester::new(config.occlusion),
      throttle: ColorSamplingThrottle::default(),
      last_eye_views: SmallVec::new(),
      queue: ComputeQueue::new(),
      stats: ReconstructorStats::default(),
      metrics: ReconstructionMetrics::new(),
      config,
    }
  }

  pub fn config(&self) -> &ReconstructionConfig {
    &self.config
  }

  /// Hand over the newest reduced mesh. It replaces any mesh that has not
  /// been picked up by a cycle yet.
  pub fn submit_mesh(&mut self, mesh: RawMesh) {
    self.pending_mesh = Some(Arc::new(mesh));
  }

  /// Whether a cycle is in flight.
  pub fn is_matching(&self) -> bool {
    self.currently_matching_meshes
  }

  /// The mesh the render loop shows.
  pub fn current(&self) -> Option<&PublishedMesh> {
    self.current.as_ref()
  }

  pub fn stats(&self) -> &ReconstructorStats {
    &self.stats
  }

  pub fn metrics(&self) -> &ReconstructionMetrics {
    &self.metrics
  }

  pub fn render_set(&self) -> &CulledGeometry {
    &self.render_set
  }

  pub fn occlusion_set(&self) -> &CulledGeometry {
    &self.occlusion_set
  }

  /// Dispatch totals of the per-frame work.
  pub fn frame_dispatch_stats(&self) -> DispatchStats {
    self.queue.stats()
  }

  pub fn arena(&self) -> &SnapshotArena {
    &self.arena
  }

  pub fn set_thermal_state(&mut self, state: ThermalState) {
    self.throttle.set_state(state);
  }

  pub fn thermal_state(&self) -> ThermalState {
    self.throttle.state()
  }

  /// Start-of-frame bookkeeping: swap in a finished cycle, then start the
  /// next one if the trigger allows.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "begin_frame"))]
  pub fn begin_frame(&mut self) -> FrameStart {
    let swapped = match self.executor.poll() {
      Some(done) => self.complete(done),
      None => false,
    };

    self.trigger.advance_frame();
    let due = self
      .pending_mesh
      .as_ref()
      .is_some_and(|mesh| self.trigger.is_due(self.currently_matching_meshes, mesh.generation));
    let started = if due { self.start_cycle() } else { None };
    FrameStart { swapped, started }
  }

  /// Cull and shade one frame against the current mesh.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "render_frame", fields(frame = frame.index)))]
  pub fn render_frame(&mut self, frame: &CameraFrame) -> RenderStats {
    self.stats.frames += 1;
    self.last_eye_views = frame.eye_view_projections.clone();
    let Some(current) = self.current.clone() else {
      return RenderStats::default();
    };

    let mut stats = RenderStats::default();
    match self.cull_frame(&current, frame) {
      Ok((render, occlusion)) => {
        stats.render = render;
        stats.occlusion = occlusion;
      }
      Err(_err) => {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %_err, "culling failed; frame renders nothing new");
        self.record_skipped_color_update();
        return stats;
      }
    }

    if !self.throttle.should_sample() {
      self.record_skipped_color_update();
      self.metrics.record_frame(stats.render.triangles, None);
      return stats;
    }

    let (visible, visibility) = self.occlusion.classify(&mut self.queue, &self.occlusion_set, frame);
    stats.visibility = visibility;
    let sampled = {
      let colors = current.read_colors();
      self
        .occlusion
        .sample_colors(&mut self.queue, current.snapshot(), &visible, frame, &colors)
    };
    // The worker reads these stores while it copies texels forward.
    let Some(mut colors) = current.try_write_colors() else {
      #[cfg(feature = "tracing")]
      tracing::debug!("texel stores busy, color refresh deferred");
      self.throttle.force_next();
      self.record_skipped_color_update();
      self.metrics.record_frame(stats.render.triangles, None);
      return stats;
    };
    let update = sampled.write_into(&mut colors);
    drop(colors);
    stats.color = Some(update);
    self.stats.color_updates += 1;
    self.metrics.record_frame(stats.render.triangles, Some(update.triangles));
    stats
  }

  /// Render a frame for which no camera frame arrived: geometry is culled
  /// against the last eye views, color is left alone.
  pub fn render_missing_frame(&mut self) -> RenderStats {
    self.stats.frames += 1;
    self.stats.missing_frames += 1;
    self.record_skipped_color_update();
    let Some(current) = self.current.clone() else {
      return RenderStats::default();
    };
    let views = self.last_eye_views.clone();
    let mut stats = RenderStats::default();
    match self.culler.cull(&mut self.queue, current.snapshot(), &views, &mut self.render_set) {
      Ok(render) => stats.render = render,
      Err(_err) => {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %_err, "culling failed; frame renders nothing new");
      }
    }
    self.metrics.record_frame(stats.render.triangles, None);
    stats
  }

  /// Wait for the next camera frame within the configured bound and render
  /// it, or render without one.
  pub fn render_next(&mut self, frames: &FrameReceiver) -> RenderStats {
    match frames.next_frame() {
      Ok(frame) => self.render_frame(&frame),
      Err(_err) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(error = %_err, "no camera frame; skipping color update");
        self.render_missing_frame()
      }
    }
  }

  /// Reconstruct `mesh` now and swap it in, bypassing the frame trigger.
  /// Returns whether the result was swapped in.
  pub fn reconstruct_blocking(&mut self, mesh: RawMesh, timeout: Duration) -> bool {
    self.finish_in_flight(timeout);
    if self.currently_matching_meshes {
      return false;
    }
    self.submit_mesh(mesh);
    if self.start_cycle().is_none() {
      return false;
    }
    self.finish_in_flight(timeout)
  }

  /// Block up to `timeout` for the cycle in flight and swap it in.
  pub fn finish_in_flight(&mut self, timeout: Duration) -> bool {
    if !self.currently_matching_meshes {
      return false;
    }
    match self.executor.wait(timeout) {
      Some(done) => self.complete(done),
      None => false,
    }
  }

  fn cull_frame(&mut self, current: &PublishedMesh, frame: &CameraFrame) -> Result<(CullStats, CullStats)> {
    let snapshot = current.snapshot();
    let render = self
      .culler
      .cull(&mut self.queue, snapshot, frame.eye_views(), &mut self.render_set)?;
    let occlusion = self.culler.cull(
      &mut self.queue,
      snapshot,
      std::slice::from_ref(&frame.view_projection),
      &mut self.occlusion_set,
    )?;
    Ok((render, occlusion))
  }

  fn record_skipped_color_update(&mut self) {
    self.stats.skipped_color_updates += 1;
  }

  /// Send the pending mesh to the worker.
  fn start_cycle(&mut self) -> Option<u64> {
    let mesh = self.pending_mesh.clone()?;
    let mut stages = self.stages.take()?;
    let cycle = self.next_cycle;
    self.next_cycle += 1;
    self.trigger.record_start(mesh.generation);
    self.currently_matching_meshes = true;
    self.stats.cycles_started += 1;

    let input = CycleInput {
      cycle,
      mesh,
      previous: self.current.clone(),
      buffers: self.arena.acquire_buffers(),
      stores: self.arena.acquire_stores(),
    };
    let task = self.executor.spawn(move || {
      let result = stages.run(input);
      CycleReport { stages, result }
    });
    self.in_flight = Some(InFlight { task, cycle });

    #[cfg(feature = "tracing")]
    tracing::debug!(cycle, "reconstruction cycle started");
    Some(cycle)
  }

  /// Take a finished cycle back. Returns whether the current mesh changed.
  fn complete(&mut self, done: TaskCompletion<CycleReport>) -> bool {
    let cycle = match self.in_flight.take() {
      Some(in_flight) if in_flight.task == done.id => in_flight.cycle,
      other => {
        self.in_flight = other;
        return false;
      }
    };
    self.currently_matching_meshes = false;

    let Some(report) = done.output else {
      self.stages = Some(ReconstructionCycle::new(&self.config));
      self.trigger.forget_generation();
      self.stats.lost_workers += 1;
      self.skip_cycle(ReconstructionError::WorkerLost { cycle });
      return false;
    };
    self.stages = Some(report.stages);

    match report.result {
      Ok(output) => {
        self.swap(output);
        true
      }
      Err(err) => {
        self.skip_cycle(err);
        false
      }
    }
  }

  fn swap(&mut self, output: CycleOutput) {
    let summary = output.summary();
    if let Some(retired) = self.current.replace(output.published) {
      self.arena.release(retired);
    }
    self.throttle.force_next();
    self.stats.cycles_swapped += 1;
    self.stats.last_cycle = Some(summary);
    self.metrics.record_cycle(&summary.timings, &summary.stats);
  }

  fn skip_cycle(&mut self, err: ReconstructionError) {
    self.stats.skipped_cycles += 1;
    self.metrics.record_skipped_cycle();
    #[cfg(feature = "tracing")]
    tracing::warn!(error = %err, "no reconstruction this cycle");
    #[cfg(not(feature = "tracing"))]
    let _ = err;
  }
}

impl Default for SceneReconstructor {
  fn default() -> Self {
    Self::new(ReconstructionConfig::default())
  }
}

#[cfg(test)]
#[path = "reconstructor_test.rs"]
mod reconstructor_test;
