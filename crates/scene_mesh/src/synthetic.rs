//! Synthetic scenes for tests, benchmarks and the replay tool.
//!
//! Stands in for the upstream mesh-reduction output and the camera: planar
//! patches assembled into a room, deterministic jitter, and look-at view
//! projections with the camera's near/far planes.

use glam::{Mat4, Vec3};

use crate::constants::{CAMERA_Z_FAR, CAMERA_Z_NEAR};
use crate::types::{RawMesh, Vertex};

/// Small deterministic generator (64-bit LCG, PCG constants).
#[derive(Clone, Debug)]
pub struct Lcg(u64);

impl Lcg {
  pub fn new(seed: u64) -> Self {
    Self(seed ^ 0x9E37_79B9_7F4A_7C15)
  }

  pub fn next_u32(&mut self) -> u32 {
    self.0 = self
      .0
      .wrapping_mul(6_364_136_223_846_793_005)
      .wrapping_add(1_442_695_040_888_963_407);
    (self.0 >> 33) as u32
  }

  /// Uniform in `[0, 1)`.
  pub fn next_f32(&mut self) -> f32 {
    (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
  }

  /// Uniform in `[-1, 1)` per axis.
  pub fn next_vec3(&mut self) -> Vec3 {
    Vec3::new(self.next_f32(), self.next_f32(), self.next_f32()) * 2.0 - Vec3::ONE
  }
}

/// Grid of `cells_u × cells_v` quads spanning `u` and `v` from `origin`.
///
/// Vertices are shared within the patch. Colors follow a checker-like
/// shading so neighboring cells differ.
pub fn plane_patch(origin: Vec3, u: Vec3, v: Vec3, cells_u: usize, cells_v: usize, tint: [u8; 3]) -> RawMesh {
  let normal = u.cross(v).normalize_or_zero();
  let du = u / cells_u.max(1) as f32;
  let dv = v / cells_v.max(1) as f32;
  let row = cells_u + 1;

  let mut vertices = Vec::with_capacity(row * (cells_v + 1));
  for j in 0..=cells_v {
    for i in 0..=cells_u {
      let shade = ((i * 37 + j * 11) % 64) as u8;
      let color = [
        tint[0].saturating_add(shade),
        tint[1].saturating_add(shade / 2),
        tint[2].saturating_sub(shade),
        255,
      ];
      vertices.push(Vertex::new(origin + du * i as f32 + dv * j as f32, normal, color));
    }
  }

  let mut indices = Vec::with_capacity(cells_u * cells_v * 2);
  for j in 0..cells_v {
    for i in 0..cells_u {
      let a = (j * row + i) as u32;
      let b = a + 1;
      let c = a + row as u32;
      let d = c + 1;
      indices.push([a, b, d]);
      indices.push([a, d, c]);
    }
  }
  RawMesh::new(vertices, indices)
}

/// Horizontal floor patch with its minimum corner at `origin`.
pub fn floor_patch(cells: usize, spacing: f32, origin: Vec3) -> RawMesh {
  let extent = cells as f32 * spacing;
  plane_patch(origin, Vec3::Z * extent, Vec3::X * extent, cells, cells, [120, 110, 90])
}

/// Floor and four walls of a box room centered on the origin, walls facing
/// inward. Patches meet at the room's edges with duplicated vertices.
pub fn room(half_extent: f32, height: f32, spacing: f32) -> RawMesh {
  let cells = ((2.0 * half_extent / spacing).round() as usize).max(1);
  let rows = ((height / spacing).round() as usize).max(1);
  let h = half_extent;
  let up = Vec3::Y * height;
  let span = 2.0 * h;

  merge([
    plane_patch(Vec3::new(-h, 0.0, -h), Vec3::Z * span, Vec3::X * span, cells, cells, [120, 110, 90]),
    plane_patch(Vec3::new(-h, 0.0, -h), Vec3::X * span, up, cells, rows, [60, 90, 160]),
    plane_patch(Vec3::new(h, 0.0, -h), Vec3::Z * span, up, cells, rows, [150, 60, 60]),
    plane_patch(Vec3::new(h, 0.0, h), -Vec3::X * span, up, cells, rows, [60, 150, 70]),
    plane_patch(Vec3::new(-h, 0.0, h), -Vec3::Z * span, up, cells, rows, [160, 150, 40]),
  ])
}

/// Concatenate meshes, offsetting indices.
pub fn merge(meshes: impl IntoIterator<Item = RawMesh>) -> RawMesh {
  let mut out = RawMesh::default();
  for mesh in meshes {
    let base = out.vertices.len() as u32;
    out.vertices.extend(mesh.vertices);
    out.indices.extend(mesh.indices.into_iter().map(|t| t.map(|i| i + base)));
  }
  out
}

/// Every triangle with its own three vertices, the way raw reconstruction
/// output arrives before welding.
pub fn triangle_soup(mesh: &RawMesh) -> RawMesh {
  let mut vertices = Vec::with_capacity(mesh.indices.len() * 3);
  let mut indices = Vec::with_capacity(mesh.indices.len());
  for tri in &mesh.indices {
    let base = vertices.len() as u32;
    vertices.extend(tri.iter().map(|&i| mesh.vertices[i as usize]));
    indices.push([base, base + 1, base + 2]);
  }
  RawMesh {
    vertices,
    indices,
    generation: mesh.generation,
  }
}

/// Rigidly moved copy.
pub fn translated(mesh: &RawMesh, offset: Vec3) -> RawMesh {
  let mut out = mesh.clone();
  for v in &mut out.vertices {
    v.position = (v.position() + offset).to_array();
  }
  out
}

/// Copy with every vertex moved by up to `amplitude` per axis.
pub fn perturbed(mesh: &RawMesh, amplitude: f32, seed: u64) -> RawMesh {
  let mut rng = Lcg::new(seed);
  let mut out = mesh.clone();
  for v in &mut out.vertices {
    v.position = (v.position() + rng.next_vec3() * amplitude).to_array();
  }
  out
}

/// Right-handed view projection looking from `eye` at `target`.
pub fn look_at(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32) -> Mat4 {
  Mat4::perspective_rh(fov_y, aspect, CAMERA_Z_NEAR, CAMERA_Z_FAR) * Mat4::look_at_rh(eye, target, Vec3::Y)
}

/// Stereo pair offset along the camera's right axis by half the
/// interpupillary distance each.
pub fn stereo_look_at(eye: Vec3, target: Vec3, ipd: f32, fov_y: f32, aspect: f32) -> [Mat4; 2] {
  let forward = (target - eye).normalize_or_zero();
  let right = forward.cross(Vec3::Y).normalize_or_zero() * (ipd * 0.5);
  [
    look_at(eye - right, target - right, fov_y, aspect),
    look_at(eye + right, target + right, fov_y, aspect),
  ]
}
