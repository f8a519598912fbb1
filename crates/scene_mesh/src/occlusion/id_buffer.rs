//! Low-resolution triangle ID buffer with a depth test.
//!
//! Pixels are owned by horizontal bands of `band_height` rows. Every band
//! walks the triangles overlapping it in index order, so the result does
//! not depend on how bands are scheduled. Equal depths resolve to the
//! lower triangle index.

use glam::{Mat4, Vec2, Vec3};
use rayon::prelude::*;

use crate::compute::CommandBuffer;
use crate::occlusion::image::project;
use crate::types::Vertex;

/// Pixel not covered by any triangle.
pub const NO_TRIANGLE: u32 = u32::MAX;

/// Screen-space triangle: pixel-space corners and NDC depth.
#[derive(Clone, Copy, Debug)]
struct ScreenTriangle {
  corners: [Vec3; 3],
  area: f32,
  min: [u32; 2],
  max: [u32; 2],
}

#[derive(Clone, Debug)]
pub struct IdBuffer {
  width: u32,
  height: u32,
  ids: Vec<u32>,
  depth: Vec<f32>,
}

impl IdBuffer {
  pub fn new(width: u32, height: u32) -> Self {
    let len = width as usize * height as usize;
    Self {
      width,
      height,
      ids: vec![NO_TRIANGLE; len],
      depth: vec![f32::INFINITY; len],
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  /// Row-major triangle IDs, row 0 at the top.
  pub fn ids(&self) -> &[u32] {
    &self.ids
  }

  pub fn id_at(&self, x: u32, y: u32) -> u32 {
    self.ids[y as usize * self.width as usize + x as usize]
  }

  /// Normalized image coordinate of the center of pixel `index`.
  #[inline]
  pub fn pixel_uv(&self, index: usize) -> Vec2 {
    let x = (index % self.width as usize) as f32 + 0.5;
    let y = (index / self.width as usize) as f32 + 0.5;
    Vec2::new(x / self.width as f32, y / self.height as f32)
  }

  pub fn covered_pixels(&self) -> usize {
    self.ids.iter().filter(|&&id| id != NO_TRIANGLE).count()
  }

  /// Rasterize `indices` over `vertices` as seen through `view_projection`.
  /// Triangle IDs are positions in `indices`.
  pub fn rasterize(
    &mut self,
    cmd: &mut CommandBuffer<'_>,
    vertices: &[Vertex],
    indices: &[[u32; 3]],
    view_projection: &Mat4,
    band_height: u32,
  ) {
    let (width, height) = (self.width, self.height);
    let size = Vec2::new(width as f32, height as f32);
    let pixels = self.ids.len();

    cmd.dispatch("clear", pixels, || {
      self.ids.par_iter_mut().for_each(|id| *id = NO_TRIANGLE);
      self.depth.par_iter_mut().for_each(|d| *d = f32::INFINITY);
    });

    let screen: Vec<Option<Vec3>> = cmd.dispatch("project_vertices", vertices.len(), || {
      vertices
        .par_iter()
        .map(|v| project(view_projection, v.position()).map(|(uv, z)| (uv * size).extend(z)))
        .collect()
    });

    let triangles: Vec<Option<ScreenTriangle>> = cmd.dispatch("setup_triangles", indices.len(), || {
      indices
        .par_iter()
        .map(|tri| {
          let corners = [screen[tri[0] as usize]?, screen[tri[1] as usize]?, screen[tri[2] as usize]?];
          setup(corners, width, height)
        })
        .collect()
    });

    let band_height = band_height.clamp(1, height.max(1));
    let band_len = band_height as usize * width as usize;
    cmd.dispatch("rasterize_bands", pixels, || {
      self
        .ids
        .par_chunks_mut(band_len)
        .zip(self.depth.par_chunks_mut(band_len))
        .enumerate()
        .for_each(|(band, (ids, depth))| {
          let y0 = band as u32 * band_height;
          let y1 = y0 + (ids.len() / width as usize) as u32;
          for (t, tri) in triangles.iter().enumerate() {
            let Some(tri) = tri else { continue };
            if tri.max[1] < y0 || tri.min[1] >= y1 {
              continue;
            }
            for y in tri.min[1].max(y0)..=tri.max[1].min(y1 - 1) {
              for x in tri.min[0]..=tri.max[0] {
                let Some(z) = tri.depth_at(Vec2::new(x as f32 + 0.5, y as f32 + 0.5)) else {
                  continue;
                };
                let i = (y - y0) as usize * width as usize + x as usize;
                if z < depth[i] {
                  depth[i] = z;
                  ids[i] = t as u32;
                }
              }
            }
          }
        });
    });
  }
}

/// Bounding box and signed area, or `None` when the triangle is degenerate
/// or entirely off screen.
fn setup(corners: [Vec3; 3], width: u32, height: u32) -> Option<ScreenTriangle> {
  let area = edge(corners[0].truncate(), corners[1].truncate(), corners[2].truncate());
  if area.abs() <= f32::EPSILON {
    return None;
  }
  let lo = corners[0].min(corners[1]).min(corners[2]);
  let hi = corners[0].max(corners[1]).max(corners[2]);
  if hi.x < 0.0 || hi.y < 0.0 || lo.x >= width as f32 || lo.y >= height as f32 {
    return None;
  }
  let clamp = |v: f32, limit: u32| (v.max(0.0) as u32).min(limit - 1);
  Some(ScreenTriangle {
    corners,
    area,
    min: [clamp(lo.x, width), clamp(lo.y, height)],
    max: [clamp(hi.x, width), clamp(hi.y, height)],
  })
}

#[inline]
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
  (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

impl ScreenTriangle {
  /// Interpolated depth at `p`, or `None` outside. Both windings are
  /// accepted; the scene mesh has no consistent facing.
  #[inline]
  fn depth_at(&self, p: Vec2) -> Option<f32> {
    let [a, b, c] = self.corners.map(|v| v.truncate());
    let w0 = edge(b, c, p) / self.area;
    let w1 = edge(c, a, p) / self.area;
    let w2 = edge(a, b, p) / self.area;
    if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
      return None;
    }
    Some(w0 * self.corners[0].z + w1 * self.corners[1].z + w2 * self.corners[2].z)
  }
}
