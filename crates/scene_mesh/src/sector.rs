//! Sector keys and per-cycle sector tables.
//!
//! Sectors exist at three granularities. A sector's [`SectorKey`] is its
//! integer cell coordinate on an origin-aligned grid, which makes it the
//! quantized-center hash used to pair sectors across cycles: two cycles
//! agree on a sector exactly when they agree on its key. Array positions in
//! a [`SectorTable`] are only meaningful inside one cycle.

use std::collections::HashMap;

use glam::{IVec3, Vec3};

use crate::constants::{SECTOR_SUBDIVISIONS, SMALL_SECTOR_SIZE};
use crate::types::SectorBounds;

/// Sector granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectorLevel {
  Small,
  Micro,
  Nano,
}

impl SectorLevel {
  /// Edge length at this level for a given small sector edge.
  #[inline]
  pub fn edge(self, small_sector_size: f32) -> f32 {
    let subdivisions = SECTOR_SUBDIVISIONS as f32;
    match self {
      SectorLevel::Small => small_sector_size,
      SectorLevel::Micro => small_sector_size / subdivisions,
      SectorLevel::Nano => small_sector_size / (subdivisions * subdivisions),
    }
  }
}

/// Integer cell coordinate of a sector on its level's grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectorKey {
  pub x: i32,
  pub y: i32,
  pub z: i32,
}

impl SectorKey {
  pub const fn new(x: i32, y: i32, z: i32) -> Self {
    Self { x, y, z }
  }

  /// Cell containing `position` on a grid of the given edge.
  #[inline]
  pub fn from_position(position: Vec3, edge: f32) -> Self {
    let cell = (position / edge).floor();
    Self::new(cell.x as i32, cell.y as i32, cell.z as i32)
  }

  #[inline]
  pub fn as_ivec3(self) -> IVec3 {
    IVec3::new(self.x, self.y, self.z)
  }

  /// Child cell `cell` (0..512, x fastest) one level finer.
  #[inline]
  pub fn child(self, cell: u32) -> Self {
    let n = SECTOR_SUBDIVISIONS as u32;
    let s = SECTOR_SUBDIVISIONS as i32;
    Self::new(
      self.x * s + (cell % n) as i32,
      self.y * s + ((cell / n) % n) as i32,
      self.z * s + (cell / (n * n)) as i32,
    )
  }

  /// Containing cell one level coarser.
  #[inline]
  pub fn parent(self) -> Self {
    let s = SECTOR_SUBDIVISIONS as i32;
    Self::new(self.x.div_euclid(s), self.y.div_euclid(s), self.z.div_euclid(s))
  }

  /// Index of this cell within its parent (inverse of [`SectorKey::child`]).
  #[inline]
  pub fn cell_in_parent(self) -> u32 {
    let s = SECTOR_SUBDIVISIONS as i32;
    let n = SECTOR_SUBDIVISIONS as u32;
    self.x.rem_euclid(s) as u32 + self.y.rem_euclid(s) as u32 * n + self.z.rem_euclid(s) as u32 * n * n
  }

  /// This cell and its 26 neighbors.
  pub fn neighborhood(self) -> impl Iterator<Item = SectorKey> {
    (-1..=1).flat_map(move |dz| {
      (-1..=1).flat_map(move |dy| (-1..=1).map(move |dx| SectorKey::new(self.x + dx, self.y + dy, self.z + dz)))
    })
  }

  /// Largest per-axis cell distance.
  #[inline]
  pub fn chebyshev_distance(self, other: SectorKey) -> i32 {
    (self.as_ivec3() - other.as_ivec3()).abs().max_element()
  }

  /// World-space cube covered by this cell.
  pub fn bounds(self, edge: f32) -> SectorBounds {
    SectorBounds::cube(self.as_ivec3().as_vec3() * edge, edge)
  }

  /// Stable 64-bit code, 21 bits per axis.
  pub fn packed(self) -> u64 {
    const MASK: u64 = (1 << 21) - 1;
    (self.x as u64 & MASK) | ((self.y as u64 & MASK) << 21) | ((self.z as u64 & MASK) << 42)
  }
}

/// One occupied sector in one cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sector {
  pub key: SectorKey,
  pub bounds: SectorBounds,
  /// Vertices of this sector form `vertex_offset..vertex_offset + vertex_count`
  /// in the cycle's sorted vertex array.
  pub vertex_offset: u32,
  pub vertex_count: u32,
  /// Triangles owned by this sector (owner = lowest vertex index), laid out
  /// contiguously once the triangle list is sorted.
  pub triangle_offset: u32,
  pub triangle_count: u32,
  /// Index of the containing sector one level coarser; `u32::MAX` for small
  /// sectors.
  pub parent: u32,
}

impl Sector {
  pub fn new(key: SectorKey, edge: f32, vertex_offset: u32, vertex_count: u32, parent: u32) -> Self {
    Self {
      key,
      bounds: key.bounds(edge),
      vertex_offset,
      vertex_count,
      triangle_offset: 0,
      triangle_count: 0,
      parent,
    }
  }

  #[inline]
  pub fn vertex_range(&self) -> std::ops::Range<usize> {
    self.vertex_offset as usize..(self.vertex_offset + self.vertex_count) as usize
  }

  #[inline]
  pub fn triangle_range(&self) -> std::ops::Range<usize> {
    self.triangle_offset as usize..(self.triangle_offset + self.triangle_count) as usize
  }
}

/// All occupied sectors of one level, in vertex order.
#[derive(Clone, Debug)]
pub struct SectorTable {
  level: SectorLevel,
  edge: f32,
  sectors: Vec<Sector>,
  index: HashMap<SectorKey, u32>,
}

impl SectorTable {
  pub fn new(level: SectorLevel, edge: f32, sectors: Vec<Sector>) -> Self {
    let index = sectors
      .iter()
      .enumerate()
      .map(|(i, s)| (s.key, i as u32))
      .collect();
    Self {
      level,
      edge,
      sectors,
      index,
    }
  }

  pub fn empty(level: SectorLevel) -> Self {
    Self::new(level, level.edge(SMALL_SECTOR_SIZE), Vec::new())
  }

  #[inline]
  pub fn level(&self) -> SectorLevel {
    self.level
  }

  #[inline]
  pub fn edge(&self) -> f32 {
    self.edge
  }

  #[inline]
  pub fn sectors(&self) -> &[Sector] {
    &self.sectors
  }

  #[inline]
  pub fn get(&self, id: u32) -> &Sector {
    &self.sectors[id as usize]
  }

  pub fn len(&self) -> usize {
    self.sectors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sectors.is_empty()
  }

  /// Sector id for `key`, if that sector is occupied this cycle.
  #[inline]
  pub fn find(&self, key: SectorKey) -> Option<u32> {
    self.index.get(&key).copied()
  }

  /// Occupied sectors among `key` and its 26 neighbors.
  pub fn neighbors(&self, key: SectorKey) -> impl Iterator<Item = u32> + '_ {
    key.neighborhood().filter_map(move |k| self.find(k))
  }

  /// Whether any occupied sector lies within one cell of `key`.
  pub fn has_neighbor(&self, key: SectorKey) -> bool {
    self.neighbors(key).next().is_some()
  }
}
