//! Texel Rasterizer - per-triangle texel grids and their stores.
//!
//! Every triangle owns a small triangular grid of texels, laid out in
//! columns along its first edge:
//!
//! ```text
//!   C                     n = 4 columns
//!   │╲                    column heights 4, 3, 2, 1
//!   │ ╲                   texel count n(n+1)/2 = 10
//!   ├──╲
//!   │▪ ▪╲
//!   │▪ ▪ ╲   row_step ↑
//!   A────────B   column_step →
//! ```
//!
//! Column counts grow with the triangle's longest edge and are capped so
//! the texel count fits a `u8`. Grids of up to `small_column_limit` columns
//! live in the small store, the rest in the large one. A matched triangle
//! keeps its predecessor's grid size and copies its column and texel
//! entries byte for byte; everything else starts unsampled and waits for
//! the Occlusion Tester to paint it.

use std::ops::Add;

use glam::Vec3;
use rayon::prelude::*;

use crate::compute::{exclusive_scan, ComputeQueue, GrowableBuffer, HierarchicalScan};
use crate::config::TexelConfig;
use crate::constants::{MAX_TRIANGLE_COLUMNS, UNSAMPLED_TEXEL};
use crate::error::Result;
use crate::matcher::MeshView;
use crate::types::TriangleMatch;

/// RGBA8 texel.
pub type Texel = [u8; 4];

/// Which store a triangle's texels live in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TexelStoreKind {
  #[default]
  Small,
  Large,
}

/// One column of a triangle's grid, relative to the triangle's first texel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TexelColumn {
  pub start: u8,
  pub height: u8,
}

/// Where a triangle's grid lives and how big it is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TexelAllocation {
  pub store: TexelStoreKind,
  pub column_count: u8,
  pub texel_count: u8,
  pub column_offset: u32,
  pub texel_offset: u32,
}

impl TexelAllocation {
  #[inline]
  pub fn columns(&self) -> std::ops::Range<usize> {
    self.column_offset as usize..self.column_offset as usize + self.column_count as usize
  }

  #[inline]
  pub fn texels(&self) -> std::ops::Range<usize> {
    self.texel_offset as usize..self.texel_offset as usize + self.texel_count as usize
  }
}

/// World-space placement of a triangle's grid.
///
/// Texel `(column, row)` is centered at
/// `origin + (column + 1/3) * column_step + (row + 1/3) * row_step`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RasterCoefficients {
  pub origin: Vec3,
  pub column_step: Vec3,
  pub row_step: Vec3,
}

impl RasterCoefficients {
  /// Grid over `corners` (already in grid order) with `columns` columns.
  pub fn new(corners: [Vec3; 3], columns: u8) -> Self {
    let n = columns.max(1) as f32;
    Self {
      origin: corners[0],
      column_step: (corners[1] - corners[0]) / n,
      row_step: (corners[2] - corners[0]) / n,
    }
  }

  #[inline]
  pub fn texel_center(&self, column: u8, row: u8) -> Vec3 {
    const THIRD: f32 = 1.0 / 3.0;
    self.origin + (column as f32 + THIRD) * self.column_step + (row as f32 + THIRD) * self.row_step
  }
}

/// Columns and texels of one store.
#[derive(Clone, Debug)]
pub struct TexelStore {
  pub columns: GrowableBuffer<TexelColumn>,
  pub texels: GrowableBuffer<Texel>,
}

impl TexelStore {
  pub fn new(kind: TexelStoreKind, columns: usize, texels: usize) -> Self {
    let (column_label, texel_label) = match kind {
      TexelStoreKind::Small => ("texel.small.columns", "texel.small.texels"),
      TexelStoreKind::Large => ("texel.large.columns", "texel.large.texels"),
    };
    Self {
      columns: GrowableBuffer::with_capacity(column_label, columns),
      texels: GrowableBuffer::with_capacity(texel_label, texels),
    }
  }

  pub fn clear(&mut self) {
    self.columns.clear();
    self.texels.clear();
  }
}

/// The small and large stores of one cycle.
#[derive(Clone, Debug)]
pub struct TexelStores {
  pub small: TexelStore,
  pub large: TexelStore,
}

impl TexelStores {
  pub fn new(config: &TexelConfig) -> Self {
    Self {
      small: TexelStore::new(TexelStoreKind::Small, config.initial_column_capacity, config.initial_texel_capacity),
      large: TexelStore::new(
        TexelStoreKind::Large,
        config.initial_column_capacity / 4,
        config.initial_texel_capacity / 4,
      ),
    }
  }

  pub fn store(&self, kind: TexelStoreKind) -> &TexelStore {
    match kind {
      TexelStoreKind::Small => &self.small,
      TexelStoreKind::Large => &self.large,
    }
  }

  pub fn store_mut(&mut self, kind: TexelStoreKind) -> &mut TexelStore {
    match kind {
      TexelStoreKind::Small => &mut self.small,
      TexelStoreKind::Large => &mut self.large,
    }
  }

  /// Texels of one triangle.
  pub fn texels(&self, allocation: &TexelAllocation) -> &[Texel] {
    &self.store(allocation.store).texels[allocation.texels()]
  }

  pub fn texels_mut(&mut self, allocation: &TexelAllocation) -> &mut [Texel] {
    let range = allocation.texels();
    &mut self.store_mut(allocation.store).texels.as_mut_slice()[range]
  }

  pub fn columns(&self, allocation: &TexelAllocation) -> &[TexelColumn] {
    &self.store(allocation.store).columns[allocation.columns()]
  }

  pub fn clear(&mut self) {
    self.small.clear();
    self.large.clear();
  }
}

/// Per-triangle counts for both stores, scanned together.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TexelTally {
  pub small_columns: u32,
  pub small_texels: u32,
  pub large_columns: u32,
  pub large_texels: u32,
}

impl Add for TexelTally {
  type Output = Self;

  fn add(self, rhs: Self) -> Self {
    Self {
      small_columns: self.small_columns + rhs.small_columns,
      small_texels: self.small_texels + rhs.small_texels,
      large_columns: self.large_columns + rhs.large_columns,
      large_texels: self.large_texels + rhs.large_texels,
    }
  }
}

impl TexelTally {
  fn of(store: TexelStoreKind, columns: u8) -> Self {
    let (c, t) = (columns as u32, texel_count(columns) as u32);
    match store {
      TexelStoreKind::Small => Self {
        small_columns: c,
        small_texels: t,
        ..Default::default()
      },
      TexelStoreKind::Large => Self {
        large_columns: c,
        large_texels: t,
        ..Default::default()
      },
    }
  }
}

/// Texels in a grid of `columns` columns.
#[inline]
pub fn texel_count(columns: u8) -> u8 {
  let n = columns as u16;
  (n * (n + 1) / 2) as u8
}

/// Column count for a triangle whose longest edge is `longest_edge`.
#[inline]
pub fn column_count(longest_edge: f32, texel_size: f32) -> u8 {
  let columns = (longest_edge / texel_size).ceil();
  if columns.is_finite() {
    columns.clamp(1.0, MAX_TRIANGLE_COLUMNS as f32) as u8
  } else {
    1
  }
}

/// Previous cycle's allocations and stores.
#[derive(Clone, Copy)]
pub struct PreviousTexels<'a> {
  pub allocations: &'a [TexelAllocation],
  pub stores: &'a TexelStores,
}

/// Counts reported after a rasterizer pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TexelStats {
  pub copied_triangles: usize,
  pub fresh_triangles: usize,
  pub small_texels: usize,
  pub large_texels: usize,
}

/// Allocations and coefficients for every new triangle.
#[derive(Clone, Debug, Default)]
pub struct TexelOutcome {
  pub allocations: Vec<TexelAllocation>,
  pub coefficients: Vec<RasterCoefficients>,
  pub stats: TexelStats,
}

pub struct TexelRasterizer {
  config: TexelConfig,
  scan: HierarchicalScan,
}

impl TexelRasterizer {
  pub fn new(config: TexelConfig) -> Self {
    Self {
      config,
      scan: HierarchicalScan::texel(),
    }
  }

  pub fn config(&self) -> &TexelConfig {
    &self.config
  }

  /// Size, place and fill every triangle's grid into `stores` (cleared
  /// first).
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "texel_rasterize"))]
  pub fn run(
    &self,
    queue: &mut ComputeQueue,
    mesh: &MeshView<'_>,
    matches: &[TriangleMatch],
    previous: Option<PreviousTexels<'_>>,
    stores: &mut TexelStores,
  ) -> Result<TexelOutcome> {
    stores.clear();
    let triangles = mesh.triangle_count();
    if triangles == 0 {
      return Ok(TexelOutcome::default());
    }

    // Footprints: inherited for matched triangles, measured otherwise.
    let inherited = |t: usize| inherited_allocation(previous, &matches[t]);
    let texel_size = self.config.texel_size;
    let small_limit = self.config.small_column_limit;

    let mut cmd = queue.command_buffer("texel.footprint");
    let footprints: Vec<(TexelStoreKind, u8)> = cmd.dispatch("footprint", triangles, || {
      (0..triangles)
        .into_par_iter()
        .map(|t| match inherited(t) {
          Some(old) => (old.store, old.column_count),
          None => {
            let [a, b, c] = mesh.corners(t);
            let longest = a.distance(b).max(b.distance(c)).max(c.distance(a));
            let columns = column_count(longest, texel_size);
            let store = if columns <= small_limit {
              TexelStoreKind::Small
            } else {
              TexelStoreKind::Large
            };
            (store, columns)
          }
        })
        .collect()
    });
    let tallies: Vec<TexelTally> = cmd.dispatch("tally", triangles, || {
      footprints.par_iter().map(|&(store, columns)| TexelTally::of(store, columns)).collect()
    });
    let partials = self.scan.count(&mut cmd, &tallies);
    cmd.commit_and_wait();

    let (coarse_offsets, total) = exclusive_scan(partials.coarsest());
    for (kind, columns, texels) in [
      (TexelStoreKind::Small, total.small_columns, total.small_texels),
      (TexelStoreKind::Large, total.large_columns, total.large_texels),
    ] {
      let store = stores.store_mut(kind);
      if store.columns.resize(columns as usize)? {
        queue.record_growth(store.columns.label(), store.columns.capacity());
      }
      if store.texels.resize(texels as usize)? {
        queue.record_growth(store.texels.label(), store.texels.capacity());
      }
    }

    let mut cmd = queue.command_buffer("texel.fill");
    let offsets = self.scan.offsets(&mut cmd, &tallies, &partials, &coarse_offsets);
    let allocations: Vec<TexelAllocation> = cmd.dispatch("allocate", triangles, || {
      footprints
        .par_iter()
        .zip(offsets.par_iter())
        .map(|(&(store, columns), offset)| {
          let (column_offset, texel_offset) = match store {
            TexelStoreKind::Small => (offset.small_columns, offset.small_texels),
            TexelStoreKind::Large => (offset.large_columns, offset.large_texels),
          };
          TexelAllocation {
            store,
            column_count: columns,
            texel_count: texel_count(columns),
            column_offset,
            texel_offset,
          }
        })
        .collect()
    });

    let coefficients: Vec<RasterCoefficients> = cmd.dispatch("coefficients", triangles, || {
      (0..triangles)
        .into_par_iter()
        .map(|t| {
          let corners = mesh.corners(t);
          let ordered = [0, 1, 2].map(|k| corners[matches[t].new_corner(k)]);
          RasterCoefficients::new(ordered, allocations[t].column_count)
        })
        .collect()
    });

    let copied = cmd.dispatch("fill", triangles, || {
      let small = fill_store(stores, TexelStoreKind::Small, &allocations, matches, previous);
      small + fill_store(stores, TexelStoreKind::Large, &allocations, matches, previous)
    });
    cmd.commit_and_wait();

    let stats = TexelStats {
      copied_triangles: copied,
      fresh_triangles: triangles - copied,
      small_texels: total.small_texels as usize,
      large_texels: total.large_texels as usize,
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(
      copied = stats.copied_triangles,
      fresh = stats.fresh_triangles,
      small_texels = stats.small_texels,
      large_texels = stats.large_texels,
      "texel rasterization complete"
    );

    Ok(TexelOutcome {
      allocations,
      coefficients,
      stats,
    })
  }
}

fn inherited_allocation(previous: Option<PreviousTexels<'_>>, m: &TriangleMatch) -> Option<TexelAllocation> {
  let previous = previous?;
  previous.allocations.get(m.old_triangle()? as usize).copied()
}

/// Write every grid living in `kind`. Returns the number of copied grids.
fn fill_store(
  stores: &mut TexelStores,
  kind: TexelStoreKind,
  allocations: &[TexelAllocation],
  matches: &[TriangleMatch],
  previous: Option<PreviousTexels<'_>>,
) -> usize {
  let store = stores.store_mut(kind);
  let mut columns = store.columns.as_mut_slice();
  let mut texels = store.texels.as_mut_slice();

  // Allocations of one store are contiguous and in triangle order, so the
  // store splits into one disjoint slice pair per triangle.
  let mut jobs = Vec::new();
  for (t, allocation) in allocations.iter().enumerate().filter(|(_, a)| a.store == kind) {
    let (c, rest_c) = std::mem::take(&mut columns).split_at_mut(allocation.column_count as usize);
    let (x, rest_x) = std::mem::take(&mut texels).split_at_mut(allocation.texel_count as usize);
    columns = rest_c;
    texels = rest_x;
    jobs.push((t, c, x));
  }

  jobs
    .into_par_iter()
    .map(|(t, columns, texels)| match (previous, inherited_allocation(previous, &matches[t])) {
      (Some(previous), Some(old)) => {
        let old_store = previous.stores.store(old.store);
        columns.copy_from_slice(&old_store.columns[old.columns()]);
        texels.copy_from_slice(&old_store.texels[old.texels()]);
        1
      }
      _ => {
        write_fresh_columns(columns);
        texels.fill(UNSAMPLED_TEXEL);
        0
      }
    })
    .sum()
}

/// Column layout of a fresh grid: heights n, n-1, ..., 1.
fn write_fresh_columns(columns: &mut [TexelColumn]) {
  let n = columns.len();
  let mut start = 0u8;
  for (c, column) in columns.iter_mut().enumerate() {
    let height = (n - c) as u8;
    *column = TexelColumn { start, height };
    start += height;
  }
}

#[cfg(test)]
#[path = "texel_test.rs"]
mod texel_test;
