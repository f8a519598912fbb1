//! One segmented bucketing pass.
//!
//! Every sorter stage has the same shape: the vertices are already grouped
//! into contiguous segments (one per current node or sector), and each
//! segment is split into a fixed number of buckets. Buckets stay in bucket
//! order inside their segment, and segments stay in order, so the result is
//! again contiguous and canonical.

use rayon::prelude::*;

use crate::compute::{exclusive_scan, scatter_indices, ComputeQueue, GrowableBuffer, HierarchicalScan};
use crate::error::Result;

/// Contiguous range of the current vertex order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
  pub offset: u32,
  pub count: u32,
}

impl Segment {
  #[inline]
  pub fn range(&self) -> std::ops::Range<usize> {
    self.offset as usize..(self.offset + self.count) as usize
  }
}

/// Split every segment of `order` into `buckets` buckets.
///
/// `bucket_of(segment, vertex)` returns the bucket of one vertex, where
/// `vertex` is the raw index held in `order`. On return `order` is permuted
/// so each segment lists its buckets back to back, preserving the relative
/// order of vertices within a bucket. Returns the per-segment histograms,
/// flattened as `segment * buckets + bucket`.
pub fn bucket_pass<F>(
  queue: &mut ComputeQueue,
  scan: &HierarchicalScan,
  label: &'static str,
  order: &mut GrowableBuffer<u32>,
  scratch: &mut GrowableBuffer<u32>,
  segments: &[Segment],
  buckets: usize,
  bucket_of: F,
) -> Result<Vec<u32>>
where
  F: Fn(usize, u32) -> u16 + Sync,
{
  let n = order.len();
  let bucket_of = &bucket_of;

  let mut cmd = queue.command_buffer(label);
  let current: &[u32] = order.as_slice();
  let marks: Vec<u16> = cmd.dispatch("mark", n, || {
    segments
      .par_iter()
      .enumerate()
      .flat_map_iter(|(s, segment)| current[segment.range()].iter().map(move |&v| bucket_of(s, v)))
      .collect()
  });
  let histograms: Vec<u32> = cmd.dispatch("histogram", segments.len() * buckets, || {
    let mut histograms = vec![0u32; segments.len() * buckets];
    histograms
      .par_chunks_mut(buckets)
      .zip(segments.par_iter())
      .for_each(|(histogram, segment)| {
        for &m in &marks[segment.range()] {
          histogram[m as usize] += 1;
        }
      });
    histograms
  });
  let partials = scan.count(&mut cmd, &histograms);
  cmd.commit_and_wait();

  let (coarse_offsets, total) = exclusive_scan(partials.coarsest());
  debug_assert_eq!(total as usize, n);
  if scratch.resize(total as usize)? {
    queue.record_growth(scratch.label(), scratch.capacity());
  }

  let mut cmd = queue.command_buffer(label);
  let offsets = scan.offsets(&mut cmd, &histograms, &partials, &coarse_offsets);
  let dest: Vec<u32> = cmd.dispatch("fill", n, || {
    segments
      .par_iter()
      .zip(offsets.par_chunks(buckets))
      .flat_map_iter(|(segment, base)| {
        let mut cursor = base.to_vec();
        marks[segment.range()].iter().map(move |&m| {
          let slot = cursor[m as usize];
          cursor[m as usize] += 1;
          slot
        })
      })
      .collect()
  });
  let current: &[u32] = order.as_slice();
  let target = scratch.as_mut_slice();
  cmd.dispatch("scatter", n, || {
    let sources = scatter_indices(&dest, n);
    target
      .par_iter_mut()
      .zip(sources.par_iter())
      .for_each(|(slot, &from)| *slot = current[from as usize]);
  });
  cmd.commit_and_wait();

  std::mem::swap(order, scratch);
  Ok(histograms)
}

/// Non-empty buckets of one pass as child segments, with the parent segment
/// index and bucket id of each.
pub fn child_segments(segments: &[Segment], histograms: &[u32], buckets: usize) -> Vec<(usize, u16, Segment)> {
  let mut children = Vec::new();
  for (s, segment) in segments.iter().enumerate() {
    let mut offset = segment.offset;
    for (bucket, &count) in histograms[s * buckets..(s + 1) * buckets].iter().enumerate() {
      if count > 0 {
        children.push((s, bucket as u16, Segment { offset, count }));
      }
      offset += count;
    }
  }
  children
}
