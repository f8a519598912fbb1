//! Duplicate Remover - merges near-coincident vertices and compacts the
//! triangle list.
//!
//! Candidates are searched in the vertex's own nano sector and the 26
//! around it. A vertex merges into the lowest-indexed earlier vertex within
//! tolerance, and merge chains are collapsed by pointer jumping, so every
//! group ends up represented by its first member in sorted order. The
//! representative keeps its position; normals and colors are averaged over
//! the group. Representatives are pairwise further apart than the
//! tolerance, so running the pass again merges nothing.
//!
//! Output triangles are ordered by owner vertex (the lowest of their three
//! indices). Vertices are in sector order, so every sector's triangles are
//! one contiguous range as well.

use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;

use crate::compute::{ComputeQueue, HierarchicalScan};
use crate::config::DedupConfig;
use crate::matcher::MeshView;
use crate::octree::{Octree, OctreePath};
use crate::sector::{Sector, SectorTable};
use crate::sorter::SortedMesh;
use crate::types::packing::{pack_color, pack_normal};
use crate::types::{Vertex, VertexSectors};

/// Deduplicated, compacted mesh of one cycle.
#[derive(Clone, Debug)]
pub struct DedupMesh {
  pub octree: Octree,
  pub vertices: Vec<Vertex>,
  pub vertex_sectors: Vec<VertexSectors>,
  /// Triangles ordered by owner vertex.
  pub indices: Vec<[u32; 3]>,
  /// Triangles owned by vertex `v` are
  /// `vertex_triangle_offsets[v]..vertex_triangle_offsets[v + 1]`.
  pub vertex_triangle_offsets: Vec<u32>,
  pub small: SectorTable,
  pub micro: SectorTable,
  pub nano: SectorTable,
  /// Final vertex of each raw input vertex.
  pub remap: Vec<u32>,
  /// Raw input triangle of each output triangle.
  pub source_triangles: Vec<u32>,
}

impl DedupMesh {
  pub fn vertex_count(&self) -> usize {
    self.vertices.len()
  }

  pub fn triangle_count(&self) -> usize {
    self.indices.len()
  }

  pub fn view(&self) -> MeshView<'_> {
    MeshView {
      vertices: &self.vertices,
      indices: &self.indices,
      vertex_sectors: &self.vertex_sectors,
      vertex_triangle_offsets: &self.vertex_triangle_offsets,
      small: &self.small,
      micro: &self.micro,
      nano: &self.nano,
    }
  }

  /// Triangles whose lowest vertex index is `vertex`.
  pub fn owned_triangles(&self, vertex: u32) -> std::ops::Range<usize> {
    self.vertex_triangle_offsets[vertex as usize] as usize
      ..self.vertex_triangle_offsets[vertex as usize + 1] as usize
  }
}

/// Counts reported after a dedup pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DedupStats {
  pub merged_vertices: usize,
  pub dropped_triangles: usize,
}

pub struct DuplicateRemover {
  config: DedupConfig,
  scan: HierarchicalScan,
}

impl DuplicateRemover {
  pub fn new(config: DedupConfig) -> Self {
    Self {
      config,
      scan: HierarchicalScan::standard(),
    }
  }

  /// Merge duplicates of `sorted` and compact `raw_indices` (raw vertex
  /// indices) onto the merged vertices.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "dedup"))]
  pub fn run(&self, queue: &mut ComputeQueue, sorted: &SortedMesh, raw_indices: &[[u32; 3]]) -> (DedupMesh, DedupStats) {
    let n = sorted.vertex_count();
    let tolerance_sq = self.config.tolerance * self.config.tolerance;
    let vertices = &sorted.vertices;

    // Representatives.
    let mut cmd = queue.command_buffer("dedup.merge");
    let mut rep: Vec<u32> = cmd.dispatch("candidates", n, || {
      (0..n)
        .into_par_iter()
        .map(|i| {
          let p = vertices[i].position();
          let key = sorted.nano.get(sorted.vertex_sectors[i].nano).key;
          sorted
            .nano
            .neighbors(key)
            .flat_map(|s| sorted.nano.get(s).vertex_range())
            .filter(|&j| j < i && vertices[j].position().distance_squared(p) <= tolerance_sq)
            .min()
            .unwrap_or(i) as u32
        })
        .collect()
    });
    loop {
      let jumped: Vec<u32> = cmd.dispatch("jump", n, || rep.par_iter().map(|&r| rep[r as usize]).collect());
      if jumped == rep {
        break;
      }
      rep = jumped;
    }
    let keep: Vec<u32> = cmd.dispatch("keep", n, || {
      rep.par_iter().enumerate().map(|(i, &r)| (r as usize == i) as u32).collect()
    });
    cmd.commit_and_wait();

    let kept = self.scan.scan(queue, "dedup.vertices", &keep);
    let vertex_count = kept.total as usize;
    let new_index: Vec<u32> = rep.par_iter().map(|&r| kept.offsets[r as usize]).collect();

    let merged = merge_groups(vertices, &keep, &new_index, vertex_count);

    // Triangles.
    let mut cmd = queue.command_buffer("dedup.triangles");
    let remapped: Vec<[u32; 3]> = cmd.dispatch("remap", raw_indices.len(), || {
      raw_indices
        .par_iter()
        .map(|tri| tri.map(|raw| new_index[sorted.rank[raw as usize] as usize]))
        .collect()
    });
    let valid: Vec<u32> = cmd.dispatch("mark", remapped.len(), || {
      remapped
        .par_iter()
        .map(|t| (t[0] != t[1] && t[1] != t[2] && t[0] != t[2]) as u32)
        .collect()
    });
    cmd.commit_and_wait();

    let compacted = self.scan.scan(queue, "dedup.compact", &valid);
    let triangle_count = compacted.total as usize;

    let mut cmd = queue.command_buffer("dedup.owners");
    let mut triangles: Vec<([u32; 3], u32)> = cmd.dispatch("compact", remapped.len(), || {
      let mut out = Vec::with_capacity(triangle_count);
      out.par_extend(
        remapped
          .par_iter()
          .enumerate()
          .filter(|(t, _)| valid[*t] != 0)
          .map(|(t, tri)| (*tri, t as u32)),
      );
      out
    });
    debug_assert_eq!(triangles.len(), triangle_count);
    let owner_counts: Vec<u32> = cmd.dispatch("owners", triangle_count, || {
      let counts: Vec<AtomicU32> = (0..vertex_count).map(|_| AtomicU32::new(0)).collect();
      triangles.par_iter().for_each(|(tri, _)| {
        counts[owner(tri) as usize].fetch_add(1, Ordering::Relaxed);
      });
      counts.into_iter().map(AtomicU32::into_inner).collect()
    });
    cmd.commit_and_wait();

    let owned = self.scan.scan(queue, "dedup.owner_offsets", &owner_counts);
    let mut vertex_triangle_offsets = owned.offsets;
    vertex_triangle_offsets.push(owned.total);

    let mut cmd = queue.command_buffer("dedup.order");
    cmd.dispatch("sort", triangle_count, || triangles.par_sort_by_key(|(tri, _)| owner(tri)));
    cmd.commit_and_wait();
    let (indices, source_triangles): (Vec<[u32; 3]>, Vec<u32>) = triangles.into_iter().unzip();

    // Sectors.
    let tables = compact_sectors(sorted, &kept.offsets, &vertex_triangle_offsets, vertex_count);
    let vertex_sectors = tables.vertex_sectors();
    let remap: Vec<u32> = sorted.rank.par_iter().map(|&r| new_index[r as usize]).collect();

    let stats = DedupStats {
      merged_vertices: n - vertex_count,
      dropped_triangles: raw_indices.len() - triangle_count,
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(
      vertices = vertex_count,
      triangles = triangle_count,
      merged = stats.merged_vertices,
      dropped = stats.dropped_triangles,
      "dedup complete"
    );

    let mesh = DedupMesh {
      octree: Octree::from_leaves(sorted.octree.root_half_size(), tables.leaves),
      vertices: merged,
      vertex_sectors,
      indices,
      vertex_triangle_offsets,
      small: tables.small,
      micro: tables.micro,
      nano: tables.nano,
      remap,
      source_triangles,
    };
    (mesh, stats)
  }
}

#[inline]
fn owner(tri: &[u32; 3]) -> u32 {
  tri[0].min(tri[1]).min(tri[2])
}

/// Representative vertices with group-averaged normals and colors.
fn merge_groups(vertices: &[Vertex], keep: &[u32], new_index: &[u32], count: usize) -> Vec<Vertex> {
  let mut normals = vec![Vec3::ZERO; count];
  let mut colors = vec![[0u32; 4]; count];
  let mut members = vec![0u32; count];
  for (i, v) in vertices.iter().enumerate() {
    let target = new_index[i] as usize;
    normals[target] += v.normal();
    let c = v.color();
    for k in 0..4 {
      colors[target][k] += c[k] as u32;
    }
    members[target] += 1;
  }

  (0..vertices.len())
    .into_par_iter()
    .filter(|&i| keep[i] != 0)
    .map(|i| {
      let v = &vertices[i];
      let target = new_index[i] as usize;
      let m = members[target];
      if m == 1 {
        return *v;
      }
      let color = colors[target].map(|c| ((c + m / 2) / m) as u8);
      Vertex {
        position: v.position,
        normal: pack_normal(normals[target]),
        color: pack_color(color),
      }
    })
    .collect()
}

struct CompactedSectors {
  small: SectorTable,
  micro: SectorTable,
  nano: SectorTable,
  leaves: Vec<(OctreePath, u32)>,
}

impl CompactedSectors {
  fn vertex_sectors(&self) -> Vec<VertexSectors> {
    let micro = self.micro.sectors();
    self
      .nano
      .sectors()
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
}

/// Re-derive sector ranges after compaction and drop sectors that lost all
/// their vertices.
fn compact_sectors(
  sorted: &SortedMesh,
  kept_offsets: &[u32],
  vertex_triangle_offsets: &[u32],
  vertex_count: usize,
) -> CompactedSectors {
  let new_offset = |old: u32| -> u32 {
    kept_offsets
      .get(old as usize)
      .copied()
      .unwrap_or(vertex_count as u32)
  };
  let with_triangles = |mut sector: Sector| -> Sector {
    let start = vertex_triangle_offsets[sector.vertex_offset as usize];
    let end = vertex_triangle_offsets[(sector.vertex_offset + sector.vertex_count) as usize];
    sector.triangle_offset = start;
    sector.triangle_count = end - start;
    sector
  };

  // Remap one level; `parent_map` renumbers parents, returns the child
  // renumbering (u32::MAX = dropped).
  let compact = |table: &SectorTable, parent_map: Option<&[u32]>| -> (Vec<Sector>, Vec<u32>) {
    let mut sectors = Vec::with_capacity(table.len());
    let mut map = vec![u32::MAX; table.len()];
    for (id, sector) in table.sectors().iter().enumerate() {
      let start = new_offset(sector.vertex_offset);
      let end = new_offset(sector.vertex_offset + sector.vertex_count);
      if end == start {
        continue;
      }
      let mut s = *sector;
      s.vertex_offset = start;
      s.vertex_count = end - start;
      if let Some(parents) = parent_map {
        s.parent = parents[sector.parent as usize];
      }
      map[id] = sectors.len() as u32;
      sectors.push(with_triangles(s));
    }
    (sectors, map)
  };

  let (small, small_map) = compact(&sorted.small, None);
  let (micro, micro_map) = compact(&sorted.micro, Some(&small_map));
  let (nano, _) = compact(&sorted.nano, Some(&micro_map));

  let leaves = sorted
    .octree
    .leaves()
    .zip(small_map.iter())
    .filter(|(_, id)| **id != u32::MAX)
    .map(|((_, node), &id)| (node.path.clone(), small[id as usize].vertex_count))
    .collect();

  CompactedSectors {
    small: SectorTable::new(sorted.small.level(), sorted.small.edge(), small),
    micro: SectorTable::new(sorted.micro.level(), sorted.micro.edge(), micro),
    nano: SectorTable::new(sorted.nano.level(), sorted.nano.edge(), nano),
    leaves,
  }
}

#[cfg(test)]
#[path = "dedup_test.rs"]
mod dedup_test;
