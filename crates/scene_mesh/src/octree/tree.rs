//! Octree - explicit node array in canonical path order.
//!
//! The Sector Sorter materializes one octree per cycle. Nodes are stored in
//! preorder (lexicographic path order), which is also the order the sorted
//! vertex array is laid out in, so a node's vertices are the contiguous range
//! `offset..offset + count`.

use std::collections::{BTreeMap, HashMap};

use super::node::{OctreeNode, OctreePath};

/// One cycle's octree.
#[derive(Clone, Debug)]
pub struct Octree {
  nodes: Vec<OctreeNode>,
  index: HashMap<OctreePath, u32>,
  root_half_size: f32,
}

impl Octree {
  /// A single empty root node.
  pub fn empty(root_half_size: f32) -> Self {
    Self::from_leaves(root_half_size, std::iter::empty())
  }

  /// Rebuild a tree from leaf paths and their vertex counts.
  ///
  /// Ancestors are created as needed and carry the sum of their
  /// descendants' counts. Offsets follow canonical path order. Repeated
  /// leaf paths accumulate.
  pub fn from_leaves(
    root_half_size: f32,
    leaves: impl IntoIterator<Item = (OctreePath, u32)>,
  ) -> Self {
    let mut counts: BTreeMap<OctreePath, (u32, bool)> = BTreeMap::new();
    counts.insert(OctreePath::root(), (0, true));

    for (path, count) in leaves {
      let mut ancestor = path.parent();
      counts.entry(path).or_insert((0, true)).0 += count;
      while let Some(p) = ancestor {
        let entry = counts.entry(p.clone()).or_insert((0, false));
        entry.0 += count;
        entry.1 = false;
        ancestor = p.parent();
      }
    }

    let mut nodes = Vec::with_capacity(counts.len());
    let mut index = HashMap::with_capacity(counts.len());
    let mut running_offset = 0u32;
    for (path, (count, is_leaf)) in counts {
      let mut node = OctreeNode::new(path.clone(), root_half_size);
      node.count = count;
      node.offset = running_offset;
      if is_leaf {
        running_offset += count;
      }
      index.insert(path, nodes.len() as u32);
      nodes.push(node);
    }

    for i in 1..nodes.len() {
      let path = &nodes[i].path;
      let (Some(parent), Some(octant)) = (path.parent(), path.last_octant()) else {
        continue;
      };
      if let Some(&parent_index) = index.get(&parent) {
        nodes[parent_index as usize].children[octant as usize] = Some(i as u32);
      }
    }

    Self {
      nodes,
      index,
      root_half_size,
    }
  }

  pub fn root(&self) -> &OctreeNode {
    &self.nodes[0]
  }

  #[inline]
  pub fn root_half_size(&self) -> f32 {
    self.root_half_size
  }

  /// All nodes in canonical path order.
  #[inline]
  pub fn nodes(&self) -> &[OctreeNode] {
    &self.nodes
  }

  #[inline]
  pub fn node(&self, index: u32) -> &OctreeNode {
    &self.nodes[index as usize]
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  /// Never true: the root always exists.
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Look a node up by its path.
  pub fn select(&self, path: &OctreePath) -> Option<&OctreeNode> {
    self.index_of(path).map(|i| &self.nodes[i as usize])
  }

  pub fn index_of(&self, path: &OctreePath) -> Option<u32> {
    self.index.get(path).copied()
  }

  /// Leaves with their node indices, in canonical order.
  pub fn leaves(&self) -> impl Iterator<Item = (u32, &OctreeNode)> {
    self
      .nodes
      .iter()
      .enumerate()
      .filter(|(_, n)| n.is_leaf())
      .map(|(i, n)| (i as u32, n))
  }

  pub fn children<'a>(&'a self, node: &'a OctreeNode) -> impl Iterator<Item = &'a OctreeNode> {
    node.child_indices().map(move |i| &self.nodes[i as usize])
  }

  pub fn max_depth(&self) -> usize {
    self.nodes.iter().map(|n| n.path.depth()).max().unwrap_or(0)
  }

  /// Sum of counts over the nodes at `depth`.
  pub fn count_at_depth(&self, depth: usize) -> u64 {
    self
      .nodes
      .iter()
      .filter(|n| n.path.depth() == depth)
      .map(|n| n.count as u64)
      .sum()
  }

  /// Every internal node's count equals the sum of its children's.
  pub fn is_consistent(&self) -> bool {
    self.nodes.iter().all(|node| {
      node.is_leaf() || node.count as u64 == self.children(node).map(|c| c.count as u64).sum::<u64>()
    })
  }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
