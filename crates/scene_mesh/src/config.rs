//! Stage configuration for a reconstruction session.
//!
//! Every tunable lives here with the value the pipeline ships with. The mesh
//! matcher's thresholds in particular were tuned by eye on real rooms, so
//! they are plain parameters rather than derived quantities.

use std::time::Duration;

use crate::constants::{
  DEFAULT_SMALL_COLUMN_LIMIT, DEFAULT_TEXEL_SIZE, DUPLICATE_TOLERANCE, INITIAL_COLUMN_CAPACITY,
  INITIAL_TEXEL_CAPACITY, INITIAL_TRIANGLE_CAPACITY, INITIAL_VERTEX_CAPACITY,
  MAX_TRIANGLE_COLUMNS, MAX_WORLD_EXTENT, MESH_MATCHING_TOLERANCE, NANO_SECTOR_SIZE,
  OCCLUSION_BUFFER_HEIGHT, OCCLUSION_BUFFER_WIDTH, SECTOR_SUBDIVISIONS, SMALL_SECTOR_SIZE,
};

/// Sector Sorter configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SorterConfig {
  /// Edge length of an octree leaf (small sector).
  pub small_sector_size: f32,
  /// Initial vertex capacity of the sort buffers.
  pub initial_vertex_capacity: usize,
  /// Observations with a coordinate beyond this magnitude are rejected.
  pub max_extent: f32,
}

impl Default for SorterConfig {
  fn default() -> Self {
    Self {
      small_sector_size: SMALL_SECTOR_SIZE,
      initial_vertex_capacity: INITIAL_VERTEX_CAPACITY,
      max_extent: MAX_WORLD_EXTENT,
    }
  }
}

impl SorterConfig {
  pub fn with_initial_vertex_capacity(mut self, capacity: usize) -> Self {
    self.initial_vertex_capacity = capacity;
    self
  }

  pub fn with_max_extent(mut self, extent: f32) -> Self {
    self.max_extent = extent;
    self
  }

  /// Effective coordinate bound: the configured extent, capped so nano
  /// sector keys use at most an eighth of the `i32` range.
  pub fn world_bound(&self) -> f32 {
    let key_limit = i32::MAX as f32 * self.nano_sector_size() / SECTOR_SUBDIVISIONS as f32;
    self.max_extent.min(key_limit)
  }

  #[inline]
  pub fn micro_sector_size(&self) -> f32 {
    self.small_sector_size / 8.0
  }

  #[inline]
  pub fn nano_sector_size(&self) -> f32 {
    self.small_sector_size / 64.0
  }
}

/// Duplicate Remover configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DedupConfig {
  /// Vertices closer than this are merged. Clamped below the nano sector
  /// edge, since candidates are only searched one nano sector away.
  pub tolerance: f32,
}

impl Default for DedupConfig {
  fn default() -> Self {
    Self {
      tolerance: DUPLICATE_TOLERANCE,
    }
  }
}

impl DedupConfig {
  pub fn with_tolerance(mut self, tolerance: f32) -> Self {
    self.tolerance = tolerance.clamp(0.0, NANO_SECTOR_SIZE * 0.5);
    self
  }
}

/// Mesh Matcher configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatcherConfig {
  /// First pass: maximum distance between an old and a new vertex.
  pub vertex_tolerance: f32,
  /// A sector counts as cleanly matched once this fraction of its
  /// triangles matched in the first pass.
  pub clean_match_ratio: f32,
  /// Second pass: maximum RGB Manhattan distance between a new triangle and
  /// an old triangle or an old nano sector's average.
  pub color_threshold: u32,
  /// Second and third pass: maximum centroid distance. Clamped to the nano
  /// sector edge, the reach of the centroid neighborhood search.
  pub position_tolerance: f32,
  /// Second pass: the best candidate must beat the runner-up by this much
  /// normalized score, otherwise the sector is flagged ambiguous.
  pub ambiguity_margin: f32,
  /// Third pass: maximum RGB distance between old and new micro sector
  /// averages (and between individual triangles).
  pub micro_color_threshold: u32,
  /// Allow the color-assisted passes to run at all.
  pub color_passes: bool,
}

impl Default for MatcherConfig {
  fn default() -> Self {
    Self {
      vertex_tolerance: MESH_MATCHING_TOLERANCE,
      clean_match_ratio: 0.95,
      color_threshold: 48,
      position_tolerance: NANO_SECTOR_SIZE,
      ambiguity_margin: 0.25,
      micro_color_threshold: 24,
      color_passes: true,
    }
  }
}

impl MatcherConfig {
  pub fn with_vertex_tolerance(mut self, tolerance: f32) -> Self {
    self.vertex_tolerance = tolerance.clamp(0.0, NANO_SECTOR_SIZE);
    self
  }

  pub fn with_clean_match_ratio(mut self, ratio: f32) -> Self {
    self.clean_match_ratio = ratio.clamp(0.0, 1.0);
    self
  }

  pub fn with_color_threshold(mut self, threshold: u32) -> Self {
    self.color_threshold = threshold;
    self
  }

  pub fn with_position_tolerance(mut self, tolerance: f32) -> Self {
    self.position_tolerance = tolerance.clamp(0.0, NANO_SECTOR_SIZE);
    self
  }

  pub fn with_ambiguity_margin(mut self, margin: f32) -> Self {
    self.ambiguity_margin = margin.max(0.0);
    self
  }

  pub fn with_micro_color_threshold(mut self, threshold: u32) -> Self {
    self.micro_color_threshold = threshold;
    self
  }

  pub fn with_color_passes(mut self, enabled: bool) -> Self {
    self.color_passes = enabled;
    self
  }
}

/// Texel Rasterizer configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TexelConfig {
  /// World-space edge length of one texel.
  pub texel_size: f32,
  /// Triangles with at most this many columns go to the small store.
  pub small_column_limit: u8,
  pub initial_triangle_capacity: usize,
  pub initial_column_capacity: usize,
  pub initial_texel_capacity: usize,
}

impl Default for TexelConfig {
  fn default() -> Self {
    Self {
      texel_size: DEFAULT_TEXEL_SIZE,
      small_column_limit: DEFAULT_SMALL_COLUMN_LIMIT,
      initial_triangle_capacity: INITIAL_TRIANGLE_CAPACITY,
      initial_column_capacity: INITIAL_COLUMN_CAPACITY,
      initial_texel_capacity: INITIAL_TEXEL_CAPACITY,
    }
  }
}

impl TexelConfig {
  pub fn with_texel_size(mut self, size: f32) -> Self {
    self.texel_size = size.max(f32::EPSILON);
    self
  }

  pub fn with_small_column_limit(mut self, limit: u8) -> Self {
    self.small_column_limit = limit.clamp(1, MAX_TRIANGLE_COLUMNS);
    self
  }

  /// Shrink initial capacities (tests, tooling).
  pub fn with_initial_capacities(mut self, triangles: usize, columns: usize, texels: usize) -> Self {
    self.initial_triangle_capacity = triangles;
    self.initial_column_capacity = columns;
    self.initial_texel_capacity = texels;
    self
  }
}

/// Culler configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CullerConfig {
  /// Small sector bounds are grown by this much before the frustum test, so
  /// triangles straddling a sector face are not clipped early.
  pub sector_margin: f32,
  /// Skip meshes with fewer triangles than vertices. Such meshes are
  /// mid-rebuild upstream and render as scattered fragments.
  pub require_renderable: bool,
}

impl Default for CullerConfig {
  fn default() -> Self {
    Self {
      sector_margin: MESH_MATCHING_TOLERANCE,
      require_renderable: true,
    }
  }
}

impl CullerConfig {
  pub fn with_sector_margin(mut self, margin: f32) -> Self {
    self.sector_margin = margin.max(0.0);
    self
  }

  pub fn with_require_renderable(mut self, require: bool) -> Self {
    self.require_renderable = require;
    self
  }
}

/// Occlusion Tester configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OcclusionConfig {
  /// ID buffer width in pixels.
  pub width: u32,
  /// ID buffer height in pixels.
  pub height: u32,
  /// Rows rasterized per parallel band.
  pub band_height: u32,
}

impl Default for OcclusionConfig {
  fn default() -> Self {
    Self {
      width: OCCLUSION_BUFFER_WIDTH,
      height: OCCLUSION_BUFFER_HEIGHT,
      band_height: 16,
    }
  }
}

impl OcclusionConfig {
  pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
    self.width = width.max(1);
    self.height = height.max(1);
    self
  }
}

/// When a new reconstruction cycle may start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerConfig {
  /// Render frames that must pass between two cycle starts.
  pub min_frames_between_cycles: u32,
}

impl Default for TriggerConfig {
  fn default() -> Self {
    Self {
      min_frames_between_cycles: 30,
    }
  }
}

impl TriggerConfig {
  pub fn with_min_frames_between_cycles(mut self, frames: u32) -> Self {
    self.min_frames_between_cycles = frames;
    self
  }
}

/// Camera frame buffering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameConfig {
  /// Frames in flight between producer and consumer (2 or 3).
  pub buffering: usize,
  /// Bounded wait for a late frame.
  pub max_wait: Duration,
}

impl Default for FrameConfig {
  fn default() -> Self {
    Self {
      buffering: 3,
      max_wait: Duration::from_millis(8),
    }
  }
}

impl FrameConfig {
  pub fn with_buffering(mut self, frames: usize) -> Self {
    self.buffering = frames.clamp(2, 3);
    self
  }

  pub fn with_max_wait(mut self, wait: Duration) -> Self {
    self.max_wait = wait;
    self
  }
}

/// Configuration for a whole reconstruction session.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReconstructionConfig {
  pub sorter: SorterConfig,
  pub dedup: DedupConfig,
  pub matcher: MatcherConfig,
  pub texel: TexelConfig,
  pub culler: CullerConfig,
  pub occlusion: OcclusionConfig,
  pub trigger: TriggerConfig,
  pub frames: FrameConfig,
}

impl ReconstructionConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_sorter(mut self, sorter: SorterConfig) -> Self {
    self.sorter = sorter;
    self
  }

  pub fn with_dedup(mut self, dedup: DedupConfig) -> Self {
    self.dedup = dedup;
    self
  }

  pub fn with_matcher(mut self, matcher: MatcherConfig) -> Self {
    self.matcher = matcher;
    self
  }

  pub fn with_texel(mut self, texel: TexelConfig) -> Self {
    self.texel = texel;
    self
  }

  pub fn with_culler(mut self, culler: CullerConfig) -> Self {
    self.culler = culler;
    self
  }

  pub fn with_occlusion(mut self, occlusion: OcclusionConfig) -> Self {
    self.occlusion = occlusion;
    self
  }

  pub fn with_trigger(mut self, trigger: TriggerConfig) -> Self {
    self.trigger = trigger;
    self
  }

  pub fn with_frames(mut self, frames: FrameConfig) -> Self {
    self.frames = frames;
    self
  }
}
