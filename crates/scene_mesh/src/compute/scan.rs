//! Hierarchical count-then-scan.
//!
//! Computes exclusive prefix sums the way the reconstruction kernels need
//! them: parallel pooling into widening blocks, a small CPU prefix over the
//! coarsest blocks, then parallel expansion back down to per-element
//! offsets.
//!
//! ```text
//! values        3 1 0 2 | 4 0 1 1 | ...          (one entry per thread)
//!                  │ count 16 / 256 / 4096 (GPU side, parallel)
//!                  ▼
//! coarsest      6 | 6 | 9 | ...                  (read back, tiny)
//!                  │ exclusive prefix (CPU)
//!                  ▼
//! coarse offs   0 | 6 | 12 | ...
//!                  │ offsets 4096 / 256 / 16 (GPU side, parallel)
//!                  ▼
//! offsets       0 3 4 4 | 6 10 10 11 | ...
//! ```
//!
//! The lane type is generic, so a single pass can carry several counters at
//! once (texel and column counts for both stores, render and occlusion
//! marks, ...).

use std::ops::Add;
use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;
use smallvec::SmallVec;

use super::queue::{CommandBuffer, ComputeQueue};
use crate::constants::{SCAN_BLOCK_SIZES, TEXEL_SCAN_BLOCK_SIZES};

/// Anything that can be pooled by addition.
pub trait ScanValue: Copy + Default + Send + Sync + Add<Output = Self> {}

impl<T: Copy + Default + Send + Sync + Add<Output = T>> ScanValue for T {}

/// Per-level block sums produced by the count kernels.
#[derive(Clone, Debug)]
pub struct PartialSums<T> {
  levels: Vec<Vec<T>>,
}

impl<T> PartialSums<T> {
  /// Block sums at the widest block size; the only level the CPU reads.
  pub fn coarsest(&self) -> &[T] {
    self.levels.last().map(Vec::as_slice).unwrap_or(&[])
  }

  /// Block sums at level `i` (0 = narrowest blocks).
  pub fn level(&self, i: usize) -> &[T] {
    &self.levels[i]
  }

  pub fn depth(&self) -> usize {
    self.levels.len()
  }
}

/// Result of a full count/reduce/offset round.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanOutput<T> {
  /// Exclusive prefix per input element.
  pub offsets: Vec<T>,
  /// Sum over all input elements.
  pub total: T,
}

/// Block-size ladder for a count-then-scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HierarchicalScan {
  block_sizes: SmallVec<[usize; 5]>,
}

impl HierarchicalScan {
  /// `block_sizes` are absolute element counts, strictly increasing powers of
  /// two, each a multiple of the previous one.
  pub fn new(block_sizes: &[usize]) -> Self {
    debug_assert!(!block_sizes.is_empty());
    debug_assert!(block_sizes.iter().all(|b| b.is_power_of_two() && *b > 1));
    debug_assert!(block_sizes.windows(2).all(|w| w[1] > w[0]));
    Self {
      block_sizes: block_sizes.iter().copied().collect(),
    }
  }

  /// 16 → 256 → 4096, used for vertex, triangle and sector counts.
  pub fn standard() -> Self {
    Self::new(&SCAN_BLOCK_SIZES)
  }

  /// 16 → 64 → 256 → 1024 → 4096, used for texel counts.
  pub fn texel() -> Self {
    Self::new(&TEXEL_SCAN_BLOCK_SIZES)
  }

  pub fn block_sizes(&self) -> &[usize] {
    &self.block_sizes
  }

  /// Count kernels: pool `values` into every block width.
  pub fn count<T: ScanValue>(&self, cmd: &mut CommandBuffer<'_>, values: &[T]) -> PartialSums<T> {
    let mut levels: Vec<Vec<T>> = Vec::with_capacity(self.block_sizes.len());
    let mut previous_width = 1;
    for (i, &width) in self.block_sizes.iter().enumerate() {
      let ratio = width / previous_width;
      let source: &[T] = if i == 0 { values } else { &levels[i - 1] };
      let pooled = cmd.dispatch("count", source.len().div_ceil(ratio), || {
        source
          .par_chunks(ratio)
          .map(|chunk| chunk.iter().fold(T::default(), |acc, &v| acc + v))
          .collect::<Vec<T>>()
      });
      levels.push(pooled);
      previous_width = width;
    }
    PartialSums { levels }
  }

  /// Offset kernels: expand exclusive offsets of the coarsest blocks down to
  /// one offset per element of `values`.
  pub fn offsets<T: ScanValue>(
    &self,
    cmd: &mut CommandBuffer<'_>,
    values: &[T],
    partials: &PartialSums<T>,
    coarse_offsets: &[T],
  ) -> Vec<T> {
    let depth = partials.depth();
    let mut parent_offsets = coarse_offsets.to_vec();
    for i in (0..depth.saturating_sub(1)).rev() {
      let ratio = self.block_sizes[i + 1] / self.block_sizes[i];
      let counts = partials.level(i);
      parent_offsets = cmd.dispatch("offsets", counts.len(), || {
        expand_offsets(counts, ratio, &parent_offsets)
      });
    }
    cmd.dispatch("offsets", values.len(), || {
      expand_offsets(values, self.block_sizes[0], &parent_offsets)
    })
  }

  /// Full round: count kernels, wait, CPU prefix, offset kernels, wait.
  ///
  /// Empty input issues no work at all.
  pub fn scan<T: ScanValue>(
    &self,
    queue: &mut ComputeQueue,
    label: &'static str,
    values: &[T],
  ) -> ScanOutput<T> {
    if values.is_empty() {
      return ScanOutput {
        offsets: Vec::new(),
        total: T::default(),
      };
    }

    let mut cmd = queue.command_buffer(label);
    let partials = self.count(&mut cmd, values);
    cmd.commit_and_wait();

    let (coarse_offsets, total) = exclusive_scan(partials.coarsest());

    let mut cmd = queue.command_buffer(label);
    let offsets = self.offsets(&mut cmd, values, &partials, &coarse_offsets);
    cmd.commit_and_wait();

    ScanOutput { offsets, total }
  }
}

impl Default for HierarchicalScan {
  fn default() -> Self {
    Self::standard()
  }
}

/// CPU-side exclusive prefix sum. Returns the offsets and the total.
pub fn exclusive_scan<T: ScanValue>(values: &[T]) -> (Vec<T>, T) {
  let mut running = T::default();
  let offsets = values
    .iter()
    .map(|&v| {
      let offset = running;
      running = running + v;
      offset
    })
    .collect();
  (offsets, running)
}

fn expand_offsets<T: ScanValue>(counts: &[T], ratio: usize, parent_offsets: &[T]) -> Vec<T> {
  counts
    .par_chunks(ratio)
    .zip(parent_offsets.par_iter())
    .flat_map_iter(|(chunk, &base)| {
      let mut running = base;
      chunk.iter().map(move |&count| {
        let offset = running;
        running = running + count;
        offset
      })
    })
    .collect()
}

/// Invert a permutation given as destinations: `out[dest[i]] = i`.
///
/// Slots no element lands in hold `u32::MAX`.
pub fn scatter_indices(dest: &[u32], len: usize) -> Vec<u32> {
  let out: Vec<AtomicU32> = (0..len).map(|_| AtomicU32::new(u32::MAX)).collect();
  dest.par_iter().enumerate().for_each(|(i, &d)| {
    out[d as usize].store(i as u32, Ordering::Relaxed);
  });
  out.into_iter().map(AtomicU32::into_inner).collect()
}

/// Source element of every compacted slot: marked element `i` lands in
/// slot `offsets[i]`.
pub fn compact_indices(marks: &[u32], offsets: &[u32], total: usize) -> Vec<u32> {
  let out: Vec<AtomicU32> = (0..total).map(|_| AtomicU32::new(u32::MAX)).collect();
  marks
    .par_iter()
    .zip(offsets.par_iter())
    .enumerate()
    .filter(|(_, (mark, _))| **mark != 0)
    .for_each(|(i, (_, &offset))| out[offset as usize].store(i as u32, Ordering::Relaxed));
  out.into_iter().map(AtomicU32::into_inner).collect()
}

#[cfg(test)]
#[path = "scan_test.rs"]
mod scan_test;
