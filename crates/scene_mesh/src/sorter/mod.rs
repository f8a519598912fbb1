//! Sector Sorter - buckets a raw vertex soup into the octree and the three
//! sector grids.
//!
//! # Stages
//!
//! ```text
//! stage 1  world octants     1 segment   → ≤ 8 nodes      (sign of x / y / z)
//! stage 2  small sectors     halve each node until edge == small sector
//! stage 3  micro sectors     each small sector → ≤ 512 cells
//! stage 4  nano sectors      each micro sector → ≤ 512 cells
//! ```
//!
//! Each stage is one [`bucket_pass`]: mark, count, CPU prefix, fill. A level
//! has to exist before its children's offsets can be computed, so the
//! stages run strictly in order. Empty buckets never become nodes or
//! sectors.

mod bucket;

pub use bucket::{bucket_pass, child_segments, Segment};

use glam::Vec3;
use rayon::prelude::*;

use crate::compute::{scatter_indices, ComputeQueue, GrowableBuffer, HierarchicalScan};
use crate::config::SorterConfig;
use crate::constants::{CELLS_PER_SECTOR, MAX_OCTREE_DEPTH, SECTOR_SUBDIVISIONS};
use crate::error::{ReconstructionError, Result};
use crate::octree::{octant_of, node_geometry, Octree, OctreePath};
use crate::sector::{Sector, SectorKey, SectorLevel, SectorTable};
use crate::types::{out_of_bounds, Vertex, VertexSectors};

/// Sorter output for one cycle.
#[derive(Clone, Debug)]
pub struct SortedMesh {
  pub octree: Octree,
  /// Vertices in canonical order: octree leaf, then micro cell, then nano
  /// cell, then input order.
  pub vertices: Vec<Vertex>,
  /// Raw index of each sorted vertex.
  pub source: Vec<u32>,
  /// Sorted position of each raw vertex.
  pub rank: Vec<u32>,
  pub vertex_sectors: Vec<VertexSectors>,
  pub small: SectorTable,
  pub micro: SectorTable,
  pub nano: SectorTable,
}

impl SortedMesh {
  pub fn empty(small_sector_size: f32) -> Self {
    Self {
      octree: Octree::empty(small_sector_size),
      vertices: Vec::new(),
      source: Vec::new(),
      rank: Vec::new(),
      vertex_sectors: Vec::new(),
      small: SectorTable::new(SectorLevel::Small, small_sector_size, Vec::new()),
      micro: SectorTable::new(SectorLevel::Micro, SectorLevel::Micro.edge(small_sector_size), Vec::new()),
      nano: SectorTable::new(SectorLevel::Nano, SectorLevel::Nano.edge(small_sector_size), Vec::new()),
    }
  }

  pub fn vertex_count(&self) -> usize {
    self.vertices.len()
  }
}

/// Four-stage sector sorter. Keeps its permutation buffers across cycles.
pub struct SectorSorter {
  config: SorterConfig,
  scan: HierarchicalScan,
  order: GrowableBuffer<u32>,
  scratch: GrowableBuffer<u32>,
}

impl SectorSorter {
  pub fn new(config: SorterConfig) -> Self {
    Self {
      config,
      scan: HierarchicalScan::standard(),
      order: GrowableBuffer::with_capacity("sort.order", config.initial_vertex_capacity),
      scratch: GrowableBuffer::with_capacity("sort.scratch", config.initial_vertex_capacity),
    }
  }

  pub fn config(&self) -> &SorterConfig {
    &self.config
  }

  /// Capacity of the permutation buffers.
  pub fn capacity(&self) -> usize {
    self.order.capacity().min(self.scratch.capacity())
  }

  /// Sort `vertices` into the octree and sector tables.
  ///
  /// An empty soup yields a single empty root and issues no dispatches.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "sector_sort"))]
  pub fn sort(&mut self, queue: &mut ComputeQueue, vertices: &[Vertex]) -> Result<SortedMesh> {
    let small_size = self.config.small_sector_size;
    if vertices.is_empty() {
      return Ok(SortedMesh::empty(small_size));
    }

    let n = vertices.len();
    if self.order.resize(n)? {
      queue.record_growth(self.order.label(), self.order.capacity());
    }
    self.order.as_mut_slice().par_iter_mut().enumerate().for_each(|(i, slot)| *slot = i as u32);

    let root_half = {
      let mut cmd = queue.command_buffer("sort.extent");
      let extent = cmd.dispatch("extent", n, || {
        vertices
          .par_iter()
          .map(|v| v.position().abs().max_element())
          .reduce(|| 0.0f32, f32::max)
      });
      cmd.commit_and_wait();
      let limit = self.config.world_bound();
      if extent > limit {
        let index = out_of_bounds(vertices, limit).unwrap_or(0);
        return Err(ReconstructionError::VertexOutOfBounds { index, limit });
      }
      root_half_size(extent, small_size)
    };

    // Stage 1: world octants.
    let root = Segment {
      offset: 0,
      count: n as u32,
    };
    let histograms = bucket_pass(
      queue,
      &self.scan,
      "sort.world",
      &mut self.order,
      &mut self.scratch,
      &[root],
      8,
      |_, v| octant_of(Vec3::ZERO, vertices[v as usize].position()) as u16,
    )?;
    let mut paths: Vec<OctreePath> = Vec::new();
    let mut segments: Vec<Segment> = Vec::new();
    for (_, octant, segment) in child_segments(&[root], &histograms, 8) {
      paths.push(OctreePath::root().child(octant as u8));
      segments.push(segment);
    }

    // Stage 2: halve until the leaves are small sectors.
    let mut edge = root_half;
    let mut depth = 1;
    while edge > small_size && depth < MAX_OCTREE_DEPTH {
      let centers: Vec<Vec3> = paths.iter().map(|p| node_geometry(root_half, p).0).collect();
      let histograms = bucket_pass(
        queue,
        &self.scan,
        "sort.small",
        &mut self.order,
        &mut self.scratch,
        &segments,
        8,
        |s, v| octant_of(centers[s], vertices[v as usize].position()) as u16,
      )?;
      let children = child_segments(&segments, &histograms, 8);
      paths = children.iter().map(|(s, octant, _)| paths[*s].child(*octant as u8)).collect();
      segments = children.into_iter().map(|(_, _, segment)| segment).collect();
      edge *= 0.5;
      depth += 1;
    }

    let octree = Octree::from_leaves(root_half, paths.iter().cloned().zip(segments.iter().map(|s| s.count)));
    let small_sectors: Vec<Sector> = paths
      .iter()
      .zip(&segments)
      .map(|(path, segment)| {
        let (center, _) = node_geometry(root_half, path);
        let key = SectorKey::from_position(center, small_size);
        Sector::new(key, small_size, segment.offset, segment.count, u32::MAX)
      })
      .collect();

    // Stages 3 and 4: 8×8×8 subdivision of each sector.
    let micro_sectors = self.subdivide(queue, "sort.micro", vertices, &small_sectors, SectorLevel::Micro)?;
    let nano_sectors = self.subdivide(queue, "sort.nano", vertices, &micro_sectors, SectorLevel::Nano)?;

    let source: Vec<u32> = self.order.as_slice().to_vec();
    let sorted: Vec<Vertex> = source.par_iter().map(|&i| vertices[i as usize]).collect();
    let rank = scatter_indices(&source, n);
    let vertex_sectors = sector_ids(&micro_sectors, &nano_sectors);

    Ok(SortedMesh {
      octree,
      vertices: sorted,
      source,
      rank,
      vertex_sectors,
      small: SectorTable::new(SectorLevel::Small, small_size, small_sectors),
      micro: SectorTable::new(SectorLevel::Micro, SectorLevel::Micro.edge(small_size), micro_sectors),
      nano: SectorTable::new(SectorLevel::Nano, SectorLevel::Nano.edge(small_size), nano_sectors),
    })
  }

  /// Split every parent sector into its occupied child cells.
  fn subdivide(
    &mut self,
    queue: &mut ComputeQueue,
    label: &'static str,
    vertices: &[Vertex],
    parents: &[Sector],
    level: SectorLevel,
  ) -> Result<Vec<Sector>> {
    let child_edge = level.edge(self.config.small_sector_size);
    let segments: Vec<Segment> = parents
      .iter()
      .map(|p| Segment {
        offset: p.vertex_offset,
        count: p.vertex_count,
      })
      .collect();
    let histograms = bucket_pass(
      queue,
      &self.scan,
      label,
      &mut self.order,
      &mut self.scratch,
      &segments,
      CELLS_PER_SECTOR,
      |s, v| cell_index(vertices[v as usize].position(), parents[s].bounds.min, child_edge),
    )?;
    Ok(
      child_segments(&segments, &histograms, CELLS_PER_SECTOR)
        .into_iter()
        .map(|(s, cell, segment)| {
          let key = parents[s].key.child(cell as u32);
          Sector::new(key, child_edge, segment.offset, segment.count, s as u32)
        })
        .collect(),
    )
  }
}

/// Smallest power-of-two multiple of the small sector edge strictly larger
/// than `extent`, stopping at the octree depth limit.
pub fn root_half_size(extent: f32, small_sector_size: f32) -> f32 {
  let mut half = small_sector_size;
  for _ in 1..MAX_OCTREE_DEPTH {
    if half > extent {
      break;
    }
    half *= 2.0;
  }
  half
}

/// Child cell of `position` inside the sector whose minimum corner is `min`.
#[inline]
fn cell_index(position: Vec3, min: Vec3, child_edge: f32) -> u16 {
  let max = SECTOR_SUBDIVISIONS as i32 - 1;
  let local = ((position - min) / child_edge).floor().as_ivec3().clamp(glam::IVec3::ZERO, glam::IVec3::splat(max));
  let n = SECTOR_SUBDIVISIONS as i32;
  (local.x + local.y * n + local.z * n * n) as u16
}

fn sector_ids(micro: &[Sector], nano: &[Sector]) -> Vec<VertexSectors> {
  nano
    .par_iter()
    .enumerate()
    .flat_map_iter(|(id, sector)| {
      let ids = VertexSectors {
        small: micro[sector.parent as usize].parent,
        micro: sector.parent,
        nano: id as u32,
      };
      std::iter::repeat(ids).take(sector.vertex_count as usize)
    })
    .collect()
}

#[cfg(test)]
#[path = "sorter_test.rs"]
mod sorter_test;
