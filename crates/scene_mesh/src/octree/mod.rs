//! Octree of the reconstructed vertex set.
//!
//! Nodes are addressed by [`OctreePath`], the sequence of octants taken from
//! the root. The tree is centered on the world origin, and the root's eight
//! children are the world octants split by the sign of each axis.
//!
//! ```text
//!            root (half-size = world octant edge)
//!        ┌────┬────┬────┬───┴───┬────┬────┬────┐
//!        0    1    2    3       4    5    6    7      world octants
//!        │
//!       ...   halve until edge == SMALL_SECTOR_SIZE
//!        │
//!      leaf = small sector
//! ```
//!
//! # Module Structure
//!
//! - [`node`]: `OctreePath` keys and the `OctreeNode` value type
//! - [`tree`]: `Octree`, the node array in canonical path order

pub mod node;
pub mod tree;

pub use node::{node_geometry, octant_direction, octant_of, OctreeNode, OctreePath};
pub use tree::Octree;
