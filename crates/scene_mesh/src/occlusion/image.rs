//! Camera images consumed by the Occlusion Tester.
//!
//! Both images are addressed in normalized image coordinates: `u` to the
//! right, `v` downward, `(0, 0)` at the top-left corner.

use glam::{Mat4, Vec2, Vec3};

use crate::texel::Texel;

/// Live RGBA8 camera image.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorImage {
  pub width: u32,
  pub height: u32,
  pub pixels: Vec<Texel>,
}

impl ColorImage {
  /// Rows of `width` pixels, top first. A short pixel buffer is allowed;
  /// the missing pixels sample as off image.
  pub fn new(width: u32, height: u32, pixels: Vec<Texel>) -> Self {
    Self { width, height, pixels }
  }

  pub fn solid(width: u32, height: u32, color: Texel) -> Self {
    Self::new(width, height, vec![color; width as usize * height as usize])
  }

  /// Nearest pixel at `uv`, or `None` outside the image.
  pub fn sample(&self, uv: Vec2) -> Option<Texel> {
    pixel_index(self.width, self.height, uv).and_then(|i| self.pixels.get(i).copied())
  }
}

/// Per-pixel foreground segmentation. Nonzero marks pixels covered by
/// something in front of the scene (hands, people) that must not be
/// painted onto the mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentationMask {
  pub width: u32,
  pub height: u32,
  pub data: Vec<u8>,
}

impl SegmentationMask {
  /// Rows of `width` entries, top first. Entries missing from a short
  /// buffer count as segmented out.
  pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
    Self { width, height, data }
  }

  /// Nothing segmented out.
  pub fn clear(width: u32, height: u32) -> Self {
    Self::new(width, height, vec![0; width as usize * height as usize])
  }

  /// Whether the scene is visible to the camera at `uv`. Outside the mask
  /// nothing is.
  pub fn allows(&self, uv: Vec2) -> bool {
    pixel_index(self.width, self.height, uv)
      .and_then(|i| self.data.get(i))
      .is_some_and(|&value| value == 0)
  }
}

fn pixel_index(width: u32, height: u32, uv: Vec2) -> Option<usize> {
  if !(uv.x >= 0.0 && uv.x < 1.0 && uv.y >= 0.0 && uv.y < 1.0) {
    return None;
  }
  let x = ((uv.x * width as f32) as u32).min(width.saturating_sub(1));
  let y = ((uv.y * height as f32) as u32).min(height.saturating_sub(1));
  Some(y as usize * width as usize + x as usize)
}

/// Project a world point into normalized image coordinates and NDC depth.
/// Points behind the camera yield `None`.
#[inline]
pub fn project(view_projection: &Mat4, point: Vec3) -> Option<(Vec2, f32)> {
  let clip = *view_projection * point.extend(1.0);
  if clip.w <= f32::EPSILON {
    return None;
  }
  let ndc = clip.truncate() / clip.w;
  Some((Vec2::new((ndc.x + 1.0) * 0.5, (1.0 - ndc.y) * 0.5), ndc.z))
}
