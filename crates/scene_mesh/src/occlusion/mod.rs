//! Occlusion Tester - which visible triangles the camera actually sees,
//! and fresh color for them.
//!
//! Per sampled frame:
//!
//! 1. The occlusion set from the Culler is rasterized into a small ID
//!    buffer through the camera's view-projection.
//! 2. Every covered pixel not hidden by the segmentation mask marks its
//!    triangle; the marks are compacted with the hierarchical scan.
//! 3. Each texel center of a marked triangle is projected into the color
//!    image and sampled, unless the mask covers it there.
//!
//! Colors are gathered in parallel under a read lock on the published
//! stores ([`OcclusionTester::sample_colors`]) and written back in one
//! pass ([`SampledColors::write_into`]), so the write lock is held only for
//! the copy.

mod id_buffer;
mod image;
mod throttle;

pub use id_buffer::{IdBuffer, NO_TRIANGLE};
pub use image::{project, ColorImage, SegmentationMask};
pub use throttle::{ColorSamplingThrottle, ThermalState};

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use crate::compute::{compact_indices, exclusive_scan, ComputeQueue, HierarchicalScan};
use crate::config::OcclusionConfig;
use crate::culler::CulledGeometry;
use crate::frames::CameraFrame;
use crate::snapshot::FrameMeshSnapshot;
use crate::texel::{Texel, TexelAllocation, TexelStores};

/// Counts reported by one occlusion test.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OcclusionStats {
  pub tested_triangles: usize,
  pub covered_pixels: usize,
  pub masked_pixels: usize,
  pub visible_triangles: usize,
}

/// Counts reported by one color refresh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColorUpdate {
  pub triangles: usize,
  pub texels: usize,
}

/// Freshly sampled texels of one triangle, in allocation order.
struct SampledGrid {
  allocation: TexelAllocation,
  texels: Vec<Option<Texel>>,
}

/// Colors sampled from one frame, not yet written to any store.
#[derive(Default)]
pub struct SampledColors {
  grids: Vec<SampledGrid>,
}

impl SampledColors {
  pub fn is_empty(&self) -> bool {
    self.grids.is_empty()
  }

  /// Copy every sampled texel into `stores`.
  pub fn write_into(&self, stores: &mut TexelStores) -> ColorUpdate {
    let mut update = ColorUpdate::default();
    for grid in &self.grids {
      let mut wrote = false;
      let target = stores.texels_mut(&grid.allocation);
      for (slot, sample) in target.iter_mut().zip(&grid.texels) {
        if let Some(color) = sample {
          *slot = *color;
          update.texels += 1;
          wrote = true;
        }
      }
      update.triangles += wrote as usize;
    }
    update
  }
}

pub struct OcclusionTester {
  config: OcclusionConfig,
  ids: IdBuffer,
  scan: HierarchicalScan,
}

impl OcclusionTester {
  pub fn new(config: OcclusionConfig) -> Self {
    Self {
      ids: IdBuffer::new(config.width, config.height),
      config,
      scan: HierarchicalScan::standard(),
    }
  }

  pub fn config(&self) -> &OcclusionConfig {
    &self.config
  }

  /// ID buffer of the last test.
  pub fn id_buffer(&self) -> &IdBuffer {
    &self.ids
  }

  /// Snapshot triangle IDs of `geometry` that are unoccluded and not
  /// masked out in `frame`, in ascending compacted order.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "occlusion_test"))]
  pub fn classify(
    &mut self,
    queue: &mut ComputeQueue,
    geometry: &CulledGeometry,
    frame: &CameraFrame,
  ) -> (Vec<u32>, OcclusionStats) {
    let triangles = geometry.triangle_count();
    if triangles == 0 {
      return (Vec::new(), OcclusionStats::default());
    }

    let mut cmd = queue.command_buffer("occlusion.raster");
    self.ids.rasterize(
      &mut cmd,
      &geometry.vertices,
      &geometry.indices,
      &frame.view_projection,
      self.config.band_height,
    );
    let ids = &self.ids;
    let (marks, masked): (Vec<u32>, usize) = cmd.dispatch("visible_marks", ids.ids().len(), || {
      let marks: Vec<AtomicU32> = (0..triangles).map(|_| AtomicU32::new(0)).collect();
      let masked = ids
        .ids()
        .par_iter()
        .enumerate()
        .filter(|&(_, &id)| id != NO_TRIANGLE)
        .filter(|&(i, &id)| {
          let allowed = frame.segmentation.allows(ids.pixel_uv(i));
          if allowed {
            marks[id as usize].store(1, Ordering::Relaxed);
          }
          !allowed
        })
        .count();
      (marks.into_iter().map(AtomicU32::into_inner).collect(), masked)
    });
    let partials = self.scan.count(&mut cmd, &marks);
    cmd.commit_and_wait();

    let (coarse, total) = exclusive_scan(partials.coarsest());

    let mut cmd = queue.command_buffer("occlusion.compact");
    let offsets = self.scan.offsets(&mut cmd, &marks, &partials, &coarse);
    let visible: Vec<u32> = cmd.dispatch("compact_visible", total as usize, || {
      compact_indices(&marks, &offsets, total as usize)
        .into_par_iter()
        .map(|t| geometry.triangle_ids[t as usize])
        .collect()
    });
    cmd.commit_and_wait();

    let stats = OcclusionStats {
      tested_triangles: triangles,
      covered_pixels: self.ids.covered_pixels(),
      masked_pixels: masked,
      visible_triangles: visible.len(),
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(
      tested = stats.tested_triangles,
      visible = stats.visible_triangles,
      masked_pixels = stats.masked_pixels,
      "occlusion test complete"
    );

    (visible, stats)
  }

  /// Sample `frame`'s color image at every texel center of `visible` and
  /// write the results into `stores`. Texels whose center is off image or
  /// masked keep their current color.
  pub fn update_colors(
    &self,
    queue: &mut ComputeQueue,
    snapshot: &FrameMeshSnapshot,
    visible: &[u32],
    frame: &CameraFrame,
    stores: &mut TexelStores,
  ) -> ColorUpdate {
    self.sample_colors(queue, snapshot, visible, frame, stores).write_into(stores)
  }

  /// Sample `frame`'s color image at every texel center of `visible`
  /// without touching the stores.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "color_sample"))]
  pub fn sample_colors(
    &self,
    queue: &mut ComputeQueue,
    snapshot: &FrameMeshSnapshot,
    visible: &[u32],
    frame: &CameraFrame,
    stores: &TexelStores,
  ) -> SampledColors {
    if visible.is_empty() {
      return SampledColors::default();
    }

    let allocations = snapshot.allocations();
    let coefficients = snapshot.coefficients();
    let mut cmd = queue.command_buffer("occlusion.colors");
    let grids: Vec<SampledGrid> = cmd.dispatch("sample_texels", visible.len(), || {
      visible
        .par_iter()
        .filter_map(|&t| {
          let allocation = *allocations.get(t as usize)?;
          let grid = coefficients.get(t as usize)?;
          let mut texels = vec![None; allocation.texel_count as usize];
          for (c, column) in stores.columns(&allocation).iter().enumerate() {
            for r in 0..column.height {
              let center = grid.texel_center(c as u8, r);
              let Some((uv, _)) = project(&frame.view_projection, center) else {
                continue;
              };
              if !frame.segmentation.allows(uv) {
                continue;
              }
              if let Some(slot) = texels.get_mut((column.start + r) as usize) {
                *slot = frame.color.sample(uv);
              }
            }
          }
          Some(SampledGrid { allocation, texels })
        })
        .collect()
    });
    cmd.commit_and_wait();
    SampledColors { grids }
  }
}
