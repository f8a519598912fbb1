//! Culler - per-frame visibility and compaction of the published mesh.
//!
//! Runs every render frame against the current snapshot:
//!
//! 1. Small sectors are tested against every view-projection by projecting
//!    their (margin-padded) corners into clip space. A sector is culled when
//!    all eight corners fall outside the same clip plane of every view.
//! 2. Triangles owned by a visible sector are marked, and so is every vertex
//!    they reference.
//! 3. Both mark arrays go through the hierarchical scan and are compacted
//!    into a [`CulledGeometry`], indices rewritten to the compacted vertices.
//!
//! The same pass produces the render set (one or two eye frusta) and the
//! occlusion set (the camera's frustum). Culling keys on the triangle's
//! owner sector, so a kept triangle always keeps its three vertices and the
//! compacted index buffer never points at a dropped vertex.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Mat4, Vec3};
use rayon::prelude::*;

use crate::compute::{compact_indices, exclusive_scan, ComputeQueue, GrowableBuffer, HierarchicalScan};
use crate::config::CullerConfig;
use crate::error::Result;
use crate::snapshot::FrameMeshSnapshot;
use crate::types::{SectorBounds, Vertex};

/// Indirect draw arguments; one instance per triangle.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawIndirectArgs {
  pub vertex_count: u32,
  pub instance_count: u32,
  pub first_vertex: u32,
  pub first_instance: u32,
}

impl DrawIndirectArgs {
  pub fn triangles(count: u32) -> Self {
    Self {
      vertex_count: 3,
      instance_count: count,
      first_vertex: 0,
      first_instance: 0,
    }
  }
}

/// Which buffer set a cull fills.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullTarget {
  Render,
  Occlusion,
}

/// Compacted, draw-ready subset of a snapshot.
#[derive(Clone, Debug)]
pub struct CulledGeometry {
  pub vertices: GrowableBuffer<Vertex>,
  pub indices: GrowableBuffer<[u32; 3]>,
  /// Snapshot triangle of each compacted triangle.
  pub triangle_ids: GrowableBuffer<u32>,
  pub draw_args: DrawIndirectArgs,
}

impl CulledGeometry {
  pub fn new(target: CullTarget, vertex_capacity: usize, triangle_capacity: usize) -> Self {
    let (vertices, indices, ids) = match target {
      CullTarget::Render => ("cull.render.vertices", "cull.render.indices", "cull.render.triangle_ids"),
      CullTarget::Occlusion => (
        "cull.occlusion.vertices",
        "cull.occlusion.indices",
        "cull.occlusion.triangle_ids",
      ),
    };
    Self {
      vertices: GrowableBuffer::with_capacity(vertices, vertex_capacity),
      indices: GrowableBuffer::with_capacity(indices, triangle_capacity),
      triangle_ids: GrowableBuffer::with_capacity(ids, triangle_capacity),
      draw_args: DrawIndirectArgs::default(),
    }
  }

  pub fn vertex_count(&self) -> usize {
    self.vertices.len()
  }

  pub fn triangle_count(&self) -> usize {
    self.indices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.indices.is_empty()
  }

  pub fn clear(&mut self) {
    self.vertices.clear();
    self.indices.clear();
    self.triangle_ids.clear();
    self.draw_args = DrawIndirectArgs::triangles(0);
  }

  /// Corners of compacted triangle `t`.
  #[inline]
  pub fn corners(&self, t: usize) -> [Vec3; 3] {
    self.indices[t].map(|v| self.vertices[v as usize].position())
  }
}

/// Counts reported after a cull.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullStats {
  pub visible_sectors: usize,
  pub culled_sectors: usize,
  pub vertices: usize,
  pub triangles: usize,
}

pub struct Culler {
  config: CullerConfig,
  scan: HierarchicalScan,
}

impl Culler {
  pub fn new(config: CullerConfig) -> Self {
    Self {
      config,
      scan: HierarchicalScan::standard(),
    }
  }

  pub fn config(&self) -> &CullerConfig {
    &self.config
  }

  /// Compact the part of `snapshot` visible from any of `view_projections`
  /// into `out`.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "cull"))]
  pub fn cull(
    &self,
    queue: &mut ComputeQueue,
    snapshot: &FrameMeshSnapshot,
    view_projections: &[Mat4],
    out: &mut CulledGeometry,
  ) -> Result<CullStats> {
    out.clear();
    let mesh = snapshot.view();
    if view_projections.is_empty()
      || mesh.triangle_count() == 0
      || (self.config.require_renderable && !snapshot.is_renderable())
    {
      return Ok(CullStats::default());
    }

    let margin = Vec3::splat(self.config.sector_margin);
    let mut cmd = queue.command_buffer("cull.marks");
    let sector_visible: Vec<bool> = cmd.dispatch("sector_visibility", mesh.small.len(), || {
      mesh
        .small
        .sectors()
        .par_iter()
        .map(|s| {
          let padded = SectorBounds::new(s.bounds.min - margin, s.bounds.max + margin);
          view_projections.iter().any(|vp| bounds_visible(&padded, vp))
        })
        .collect()
    });
    let triangle_marks: Vec<u32> = cmd.dispatch("triangle_marks", mesh.triangle_count(), || {
      (0..mesh.triangle_count())
        .into_par_iter()
        .map(|t| sector_visible[mesh.owner_small_sector(t) as usize] as u32)
        .collect()
    });
    let vertex_marks: Vec<u32> = cmd.dispatch("vertex_marks", mesh.triangle_count(), || {
      let marks: Vec<AtomicU32> = (0..mesh.vertices.len()).map(|_| AtomicU32::new(0)).collect();
      triangle_marks
        .par_iter()
        .zip(mesh.indices.par_iter())
        .filter(|(mark, _)| **mark != 0)
        .for_each(|(_, tri)| {
          for &v in tri {
            marks[v as usize].store(1, Ordering::Relaxed);
          }
        });
      marks.into_iter().map(AtomicU32::into_inner).collect()
    });
    let vertex_partials = self.scan.count(&mut cmd, &vertex_marks);
    let triangle_partials = self.scan.count(&mut cmd, &triangle_marks);
    cmd.commit_and_wait();

    let (vertex_coarse, vertex_total) = exclusive_scan(vertex_partials.coarsest());
    let (triangle_coarse, triangle_total) = exclusive_scan(triangle_partials.coarsest());
    if out.vertices.resize(vertex_total as usize)? {
      queue.record_growth(out.vertices.label(), out.vertices.capacity());
    }
    if out.indices.resize(triangle_total as usize)? {
      queue.record_growth(out.indices.label(), out.indices.capacity());
    }
    if out.triangle_ids.resize(triangle_total as usize)? {
      queue.record_growth(out.triangle_ids.label(), out.triangle_ids.capacity());
    }

    let mut cmd = queue.command_buffer("cull.compact");
    let vertex_offsets = self.scan.offsets(&mut cmd, &vertex_marks, &vertex_partials, &vertex_coarse);
    let triangle_offsets = self.scan.offsets(&mut cmd, &triangle_marks, &triangle_partials, &triangle_coarse);
    cmd.dispatch("compact_vertices", vertex_total as usize, || {
      let sources = compact_indices(&vertex_marks, &vertex_offsets, vertex_total as usize);
      out
        .vertices
        .as_mut_slice()
        .par_iter_mut()
        .zip(sources.par_iter())
        .for_each(|(slot, &v)| *slot = mesh.vertices[v as usize]);
    });
    cmd.dispatch("compact_triangles", triangle_total as usize, || {
      let sources = compact_indices(&triangle_marks, &triangle_offsets, triangle_total as usize);
      out
        .indices
        .as_mut_slice()
        .par_iter_mut()
        .zip(out.triangle_ids.as_mut_slice().par_iter_mut())
        .zip(sources.par_iter())
        .for_each(|((slot, id), &t)| {
          *slot = mesh.indices[t as usize].map(|v| vertex_offsets[v as usize]);
          *id = t;
        });
    });
    cmd.commit_and_wait();

    out.draw_args = DrawIndirectArgs::triangles(triangle_total);
    let visible_sectors = sector_visible.iter().filter(|&&v| v).count();
    Ok(CullStats {
      visible_sectors,
      culled_sectors: sector_visible.len() - visible_sectors,
      vertices: vertex_total as usize,
      triangles: triangle_total as usize,
    })
  }
}

/// False when every corner lies outside one clip plane.
pub fn bounds_visible(bounds: &SectorBounds, view_projection: &Mat4) -> bool {
  let clip = bounds.corners().map(|c| *view_projection * c.extend(1.0));
  let all = |outside: fn(&glam::Vec4) -> bool| clip.iter().all(outside);
  !(all(|c| c.x < -c.w)
    || all(|c| c.x > c.w)
    || all(|c| c.y < -c.w)
    || all(|c| c.y > c.w)
    || all(|c| c.z < 0.0)
    || all(|c| c.z > c.w))
}

#[cfg(test)]
#[path = "culler_test.rs"]
mod culler_test;
