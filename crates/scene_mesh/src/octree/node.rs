//! OctreePath and OctreeNode.
//!
//! A node is identified by its path: the octant indices taken from the root
//! to reach it. Paths survive rebuilds, so they are what other cycles and
//! other structures hold on to; array positions are only valid within the
//! cycle that produced them.

use glam::Vec3;
use smallvec::SmallVec;

use crate::types::SectorBounds;

/// Octant-index sequence from the root.
///
/// Octant bits: bit 0 = +X, bit 1 = +Y, bit 2 = +Z relative to the parent's
/// center. Ordering is lexicographic, which visits a parent before its
/// children and children in octant order (the canonical node order).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OctreePath(SmallVec<[u8; 16]>);

impl OctreePath {
  pub fn root() -> Self {
    Self(SmallVec::new())
  }

  pub fn from_octants(octants: &[u8]) -> Self {
    debug_assert!(octants.iter().all(|&o| o < 8));
    Self(octants.iter().copied().collect())
  }

  /// Path of the child in `octant`.
  pub fn child(&self, octant: u8) -> Self {
    debug_assert!(octant < 8);
    let mut path = self.0.clone();
    path.push(octant);
    Self(path)
  }

  /// Path of the parent; `None` for the root.
  pub fn parent(&self) -> Option<Self> {
    if self.0.is_empty() {
      return None;
    }
    Some(Self(self.0[..self.0.len() - 1].iter().copied().collect()))
  }

  #[inline]
  pub fn depth(&self) -> usize {
    self.0.len()
  }

  #[inline]
  pub fn octants(&self) -> &[u8] {
    &self.0
  }

  pub fn last_octant(&self) -> Option<u8> {
    self.0.last().copied()
  }

  pub fn is_ancestor_of(&self, other: &OctreePath) -> bool {
    other.0.len() > self.0.len() && other.0.starts_with(&self.0)
  }
}

/// Offset of child `octant`'s center from its parent's center, in units of
/// the child's half-size.
#[inline]
pub fn octant_direction(octant: u8) -> Vec3 {
  Vec3::new(
    if octant & 1 != 0 { 1.0 } else { -1.0 },
    if octant & 2 != 0 { 1.0 } else { -1.0 },
    if octant & 4 != 0 { 1.0 } else { -1.0 },
  )
}

/// Octant of `point` relative to `center`.
#[inline]
pub fn octant_of(center: Vec3, point: Vec3) -> u8 {
  (point.x >= center.x) as u8 | ((point.y >= center.y) as u8) << 1 | ((point.z >= center.z) as u8) << 2
}

/// Center and half-size of the node at `path` in a tree centered on the
/// origin with the given root half-size.
pub fn node_geometry(root_half_size: f32, path: &OctreePath) -> (Vec3, f32) {
  let mut center = Vec3::ZERO;
  let mut half = root_half_size;
  for &octant in path.octants() {
    half *= 0.5;
    center += octant_direction(octant) * half;
  }
  (center, half)
}

/// One cube of the partition for one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct OctreeNode {
  pub path: OctreePath,
  pub center: Vec3,
  pub half_size: f32,
  /// Vertices inside this node.
  pub count: u32,
  /// First vertex of this node in the sorted vertex array.
  pub offset: u32,
  /// Child node indices in the owning octree's node array.
  pub children: [Option<u32>; 8],
}

impl OctreeNode {
  pub fn new(path: OctreePath, root_half_size: f32) -> Self {
    let (center, half_size) = node_geometry(root_half_size, &path);
    Self {
      path,
      center,
      half_size,
      count: 0,
      offset: 0,
      children: [None; 8],
    }
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.children.iter().all(Option::is_none)
  }

  #[inline]
  pub fn edge(&self) -> f32 {
    self.half_size * 2.0
  }

  pub fn bounds(&self) -> SectorBounds {
    SectorBounds::new(
      self.center - Vec3::splat(self.half_size),
      self.center + Vec3::splat(self.half_size),
    )
  }

  /// Octant of `point` within this node.
  #[inline]
  pub fn octant_of(&self, point: Vec3) -> u8 {
    octant_of(self.center, point)
  }

  pub fn child_indices(&self) -> impl Iterator<Item = u32> + '_ {
    self.children.iter().filter_map(|c| *c)
  }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
