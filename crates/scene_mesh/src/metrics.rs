//! Engine-agnostic metrics collection for reconstruction statistics.
//!
//! Feature-gated and runtime-toggled to ensure zero overhead when disabled.
//!
//! # Usage
//!
//! ```ignore
//! use scene_mesh::metrics::{ReconstructionMetrics, COLLECT_METRICS};
//!
//! // Compile with --features metrics
//! // Runtime toggle:
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! // After each cycle and frame:
//! metrics.record_cycle(&timings, &stats);
//! metrics.record_frame(culled_triangles, color_updates);
//! ```

use std::collections::VecDeque;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;
use std::sync::atomic::AtomicBool;

use crate::snapshot::CycleStats;

/// Runtime toggle for metrics collection.
/// Set to false to disable metrics gathering at runtime.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Check if metrics collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
  #[cfg(feature = "metrics")]
  {
    COLLECT_METRICS.load(Ordering::Relaxed)
  }
  #[cfg(not(feature = "metrics"))]
  {
    false
  }
}

/// Rolling window for storing recent values (e.g., timing history).
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
  buffer: VecDeque<T>,
  capacity: usize,
}

impl<T> RollingWindow<T> {
  /// Create a new rolling window with the given capacity.
  pub fn new(capacity: usize) -> Self {
    Self {
      buffer: VecDeque::with_capacity(capacity),
      capacity: capacity.max(1),
    }
  }

  /// Push a new value, evicting the oldest if at capacity.
  pub fn push(&mut self, value: T) {
    if self.buffer.len() >= self.capacity {
      self.buffer.pop_front();
    }
    self.buffer.push_back(value);
  }

  pub fn len(&self) -> usize {
    self.buffer.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buffer.is_empty()
  }

  pub fn clear(&mut self) {
    self.buffer.clear();
  }

  /// Iterate over values (oldest to newest).
  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.buffer.iter()
  }

  /// Get the most recent value.
  pub fn last(&self) -> Option<&T> {
    self.buffer.back()
  }
}

impl<T: Copy + Default + std::ops::Add<Output = T>> RollingWindow<T> {
  /// Compute the sum of all values.
  pub fn sum(&self) -> T {
    self.buffer.iter().copied().fold(T::default(), |acc, x| acc + x)
  }
}

impl RollingWindow<u64> {
  /// Compute the average of all values.
  pub fn average(&self) -> f64 {
    if self.buffer.is_empty() {
      0.0
    } else {
      self.sum() as f64 / self.buffer.len() as f64
    }
  }

  /// Get min and max values.
  pub fn min_max(&self) -> Option<(u64, u64)> {
    let min = *self.buffer.iter().min()?;
    let max = *self.buffer.iter().max()?;
    Some((min, max))
  }
}

impl RollingWindow<f32> {
  pub fn average(&self) -> f32 {
    if self.buffer.is_empty() {
      0.0
    } else {
      self.sum() / self.buffer.len() as f32
    }
  }
}

impl<T> Default for RollingWindow<T> {
  fn default() -> Self {
    Self::new(128) // ~2 seconds of frames at 60fps
  }
}

/// Wall-clock time spent in each stage of one cycle, in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageTimings {
  pub sort_us: u64,
  pub dedup_us: u64,
  pub match_us: u64,
  pub texel_us: u64,
  pub publish_us: u64,
}

impl StageTimings {
  pub fn total_us(&self) -> u64 {
    self.sort_us + self.dedup_us + self.match_us + self.texel_us + self.publish_us
  }
}

/// Session statistics updated each cycle and each render frame.
#[derive(Debug, Clone, Default)]
pub struct ReconstructionMetrics {
  // Timing
  /// Rolling window of whole-cycle times in microseconds.
  pub cycle_timings: RollingWindow<u64>,
  pub last_stages: StageTimings,

  // Coherence
  /// Rolling window of per-cycle match rates.
  pub match_rates: RollingWindow<f32>,
  /// Triangles rasterized fresh in the last cycle.
  pub last_fresh_triangles: usize,
  pub total_fresh_triangles: u64,

  // Per frame
  /// Rolling window of triangles that survived culling.
  pub culled_triangles: RollingWindow<u64>,
  pub total_color_updates: u64,
  pub skipped_color_updates: u64,

  pub cycles: u64,
  pub skipped_cycles: u64,
}

impl ReconstructionMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record_cycle(&mut self, timings: &StageTimings, stats: &CycleStats) {
    if !is_enabled() {
      return;
    }
    self.cycle_timings.push(timings.total_us());
    self.last_stages = *timings;
    self.match_rates.push(stats.matching.match_rate());
    self.last_fresh_triangles = stats.texels.fresh_triangles;
    self.total_fresh_triangles += stats.texels.fresh_triangles as u64;
    self.cycles += 1;
  }

  pub fn record_skipped_cycle(&mut self) {
    if is_enabled() {
      self.skipped_cycles += 1;
    }
  }

  /// Record one render frame's culling result and painted triangles.
  pub fn record_frame(&mut self, visible_triangles: usize, color_updates: Option<usize>) {
    if !is_enabled() {
      return;
    }
    self.culled_triangles.push(visible_triangles as u64);
    match color_updates {
      Some(updated) => self.total_color_updates += updated as u64,
      None => self.skipped_color_updates += 1,
    }
  }

  pub fn avg_cycle_timing_us(&self) -> f64 {
    self.cycle_timings.average()
  }

  pub fn avg_match_rate(&self) -> f32 {
    self.match_rates.average()
  }
}
