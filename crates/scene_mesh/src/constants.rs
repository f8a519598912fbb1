//! Sector geometry, scan widths, and buffer sizing constants.
//!
//! # Sector Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECTOR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  world octant   power-of-two edge, split by the sign of x / y / z       │
//! │       │                                                                 │
//! │       │ halve until the edge reaches SMALL_SECTOR_SIZE                  │
//! │       ▼                                                                 │
//! │  small sector   2 m      (octree leaf, matching scope)                  │
//! │       │ 8 × 8 × 8                                                       │
//! │       ▼                                                                 │
//! │  micro sector   0.25 m   (third-pass color comparison)                  │
//! │       │ 8 × 8 × 8                                                       │
//! │       ▼                                                                 │
//! │  nano sector    1/32 m   (dedup + vertex matching neighborhood)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All three sector grids are aligned to the world origin, so a sector's key
//! is simply `floor(position / edge)` at its granularity.

/// Edge length of a small sector in meters.
pub const SMALL_SECTOR_SIZE: f32 = 2.0;

/// Cells per axis when a sector is split into the next finer granularity.
pub const SECTOR_SUBDIVISIONS: usize = 8;

/// Cells produced by one sector split (8³).
pub const CELLS_PER_SECTOR: usize =
  SECTOR_SUBDIVISIONS * SECTOR_SUBDIVISIONS * SECTOR_SUBDIVISIONS;

/// Edge length of a micro sector in meters.
pub const MICRO_SECTOR_SIZE: f32 = SMALL_SECTOR_SIZE / SECTOR_SUBDIVISIONS as f32;

/// Edge length of a nano sector in meters.
pub const NANO_SECTOR_SIZE: f32 = MICRO_SECTOR_SIZE / SECTOR_SUBDIVISIONS as f32;

/// Largest coordinate magnitude a vertex may have. Nano sector keys of
/// positions inside this bound use at most an eighth of the `i32` range.
pub const MAX_WORLD_EXTENT: f32 = i32::MAX as f32 * NANO_SECTOR_SIZE / SECTOR_SUBDIVISIONS as f32;

/// Octree depth limit; a world-bounded root reaches small sectors well
/// before it.
pub const MAX_OCTREE_DEPTH: usize = 32;

/// Distance under which an old and a new vertex are the same surface point.
pub const MESH_MATCHING_TOLERANCE: f32 = 2.4 / 256.0;

/// Distance under which two vertices of one cycle are merged.
pub const DUPLICATE_TOLERANCE: f32 = 1.0 / 1024.0;

/// Block widths for the count-then-scan used by sorting, dedup and culling.
pub const SCAN_BLOCK_SIZES: [usize; 3] = [16, 256, 4096];

/// Deeper block widths for texel counts, which grow much faster than
/// triangle counts.
pub const TEXEL_SCAN_BLOCK_SIZES: [usize; 5] = [16, 64, 256, 1024, 4096];

/// Largest column count whose triangular texel grid still fits in a `u8`
/// texel count (21 * 22 / 2 = 231).
pub const MAX_TRIANGLE_COLUMNS: u8 = 21;

/// Default edge length of one texel in meters.
pub const DEFAULT_TEXEL_SIZE: f32 = 1.0 / 128.0;

/// Triangles with at most this many columns live in the small texel store.
pub const DEFAULT_SMALL_COLUMN_LIMIT: u8 = 8;

/// Initial per-snapshot triangle capacity.
pub const INITIAL_TRIANGLE_CAPACITY: usize = 65_536;

/// Initial per-snapshot vertex capacity.
pub const INITIAL_VERTEX_CAPACITY: usize = 65_536;

/// Initial column capacity of each texel store.
pub const INITIAL_COLUMN_CAPACITY: usize = 262_144;

/// Initial texel capacity of each texel store.
pub const INITIAL_TEXEL_CAPACITY: usize = 1_048_576;

/// Occlusion ID buffer resolution (camera-space, reduced).
pub const OCCLUSION_BUFFER_WIDTH: u32 = 256;
/// Occlusion ID buffer resolution (camera-space, reduced).
pub const OCCLUSION_BUFFER_HEIGHT: u32 = 192;

/// Camera near plane used for the occlusion frustum.
pub const CAMERA_Z_NEAR: f32 = 0.026;
/// Camera far plane used for the occlusion frustum.
pub const CAMERA_Z_FAR: f32 = 1000.0;

/// Texel value written for texels no camera frame has sampled yet.
pub const UNSAMPLED_TEXEL: [u8; 4] = [0, 0, 0, 0];

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sector_sizes_nest() {
    assert_eq!(MICRO_SECTOR_SIZE * 8.0, SMALL_SECTOR_SIZE);
    assert_eq!(NANO_SECTOR_SIZE * 8.0, MICRO_SECTOR_SIZE);
    assert_eq!(CELLS_PER_SECTOR, 512);
  }

  #[test]
  fn test_tolerances_fit_in_nano_sector() {
    // Neighbor searches only look one nano sector away.
    assert!(MESH_MATCHING_TOLERANCE < NANO_SECTOR_SIZE);
    assert!(DUPLICATE_TOLERANCE < NANO_SECTOR_SIZE);
  }

  #[test]
  fn test_world_bound_keeps_sector_keys_in_range() {
    let micro = (MAX_WORLD_EXTENT / MICRO_SECTOR_SIZE).ceil() as i64;
    let nano = (MAX_WORLD_EXTENT / NANO_SECTOR_SIZE).ceil() as i64;
    assert!(micro * SECTOR_SUBDIVISIONS as i64 + 7 < i32::MAX as i64);
    assert!(nano * 4 < i32::MAX as i64);
    let mut half = SMALL_SECTOR_SIZE;
    let mut depth = 1;
    while half <= MAX_WORLD_EXTENT {
      half *= 2.0;
      depth += 1;
    }
    assert!(depth < MAX_OCTREE_DEPTH);
  }

  #[test]
  fn test_max_columns_fit_u8_texel_count() {
    let n = MAX_TRIANGLE_COLUMNS as u32;
    assert!(n * (n + 1) / 2 <= u8::MAX as u32);
    let n = n + 1;
    assert!(n * (n + 1) / 2 > u8::MAX as u32);
  }

  #[test]
  fn test_scan_blocks_are_powers_of_two() {
    for size in SCAN_BLOCK_SIZES.iter().chain(TEXEL_SCAN_BLOCK_SIZES.iter()) {
      assert!(size.is_power_of_two());
    }
  }
}
