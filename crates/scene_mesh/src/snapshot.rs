//! FrameMeshSnapshot - the published result of one reconstruction cycle.
//!
//! A cycle ends by copying its compacted mesh and texel allocations into a
//! set of [`SnapshotBuffers`] and freezing them into a [`FrameMeshSnapshot`].
//! From then on the snapshot is only read: by the matcher and rasterizer of
//! the next cycle, and by the culler every render frame.
//!
//! The per-triangle colors are the one thing that keeps changing after
//! publication, because the Occlusion Tester paints texels every few frames.
//! They live next to the snapshot in a [`PublishedMesh`], behind a lock.
//!
//! ```text
//!   SnapshotArena ──acquire──▶ cycle worker ──publish──▶ PublishedMesh (new)
//!        ▲                                                   │ swap
//!        └──────────────release (old, once unshared)─────────┘
//! ```

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use crate::compute::{ComputeQueue, GrowableBuffer};
use crate::config::TexelConfig;
use crate::dedup::{DedupMesh, DedupStats};
use crate::error::Result;
use crate::matcher::{MatchStats, MeshView};
use crate::octree::Octree;
use crate::sector::{SectorLevel, SectorTable};
use crate::texel::{PreviousTexels, RasterCoefficients, TexelAllocation, TexelOutcome, TexelStats, TexelStores};
use crate::types::{Vertex, VertexSectors};

/// Per-cycle buffers with power-of-two capacities.
#[derive(Clone, Debug)]
pub struct SnapshotBuffers {
  pub vertices: GrowableBuffer<Vertex>,
  pub vertex_sectors: GrowableBuffer<VertexSectors>,
  pub indices: GrowableBuffer<[u32; 3]>,
  pub vertex_triangle_offsets: GrowableBuffer<u32>,
  pub allocations: GrowableBuffer<TexelAllocation>,
  pub coefficients: GrowableBuffer<RasterCoefficients>,
}

impl SnapshotBuffers {
  pub fn new(vertex_capacity: usize, triangle_capacity: usize) -> Self {
    Self {
      vertices: GrowableBuffer::with_capacity("snapshot.vertices", vertex_capacity),
      vertex_sectors: GrowableBuffer::with_capacity("snapshot.vertex_sectors", vertex_capacity),
      indices: GrowableBuffer::with_capacity("snapshot.indices", triangle_capacity),
      vertex_triangle_offsets: GrowableBuffer::with_capacity("snapshot.vertex_triangle_offsets", vertex_capacity + 1),
      allocations: GrowableBuffer::with_capacity("snapshot.allocations", triangle_capacity),
      coefficients: GrowableBuffer::with_capacity("snapshot.coefficients", triangle_capacity),
    }
  }

  pub fn clear(&mut self) {
    self.vertices.clear();
    self.vertex_sectors.clear();
    self.indices.clear();
    self.vertex_triangle_offsets.clear();
    self.allocations.clear();
    self.coefficients.clear();
  }
}

/// Statistics gathered while building a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CycleStats {
  pub dedup: DedupStats,
  pub matching: MatchStats,
  pub texels: TexelStats,
}

/// Immutable mesh of one reconstruction cycle.
#[derive(Clone, Debug)]
pub struct FrameMeshSnapshot {
  cycle: u64,
  generation: u64,
  octree: Octree,
  small: SectorTable,
  micro: SectorTable,
  nano: SectorTable,
  buffers: SnapshotBuffers,
  stats: CycleStats,
}

impl FrameMeshSnapshot {
  /// The snapshot rendered before the first cycle completes.
  pub fn empty(small_sector_size: f32, buffers: SnapshotBuffers) -> Self {
    let mut buffers = buffers;
    buffers.clear();
    Self {
      cycle: 0,
      generation: 0,
      octree: Octree::empty(small_sector_size),
      small: SectorTable::empty(SectorLevel::Small),
      micro: SectorTable::empty(SectorLevel::Micro),
      nano: SectorTable::empty(SectorLevel::Nano),
      buffers,
      stats: CycleStats::default(),
    }
  }

  /// Freeze a cycle's mesh and texel layout into `buffers`.
  pub fn publish(
    queue: &mut ComputeQueue,
    cycle: u64,
    generation: u64,
    mesh: DedupMesh,
    texels: TexelOutcome,
    stats: CycleStats,
    buffers: SnapshotBuffers,
  ) -> Result<Self> {
    let mut buffers = buffers;
    buffers.clear();
    let mut cmd = queue.command_buffer("snapshot.publish");
    let growths = cmd.dispatch("copy", mesh.vertex_count() + mesh.triangle_count(), || -> Result<Vec<_>> {
      let mut grown = Vec::new();
      if buffers.vertices.assign(&mesh.vertices)? {
        grown.push((buffers.vertices.label(), buffers.vertices.capacity()));
      }
      if buffers.vertex_sectors.assign(&mesh.vertex_sectors)? {
        grown.push((buffers.vertex_sectors.label(), buffers.vertex_sectors.capacity()));
      }
      if buffers.indices.assign(&mesh.indices)? {
        grown.push((buffers.indices.label(), buffers.indices.capacity()));
      }
      if buffers.vertex_triangle_offsets.assign(&mesh.vertex_triangle_offsets)? {
        grown.push((
          buffers.vertex_triangle_offsets.label(),
          buffers.vertex_triangle_offsets.capacity(),
        ));
      }
      if buffers.allocations.assign(&texels.allocations)? {
        grown.push((buffers.allocations.label(), buffers.allocations.capacity()));
      }
      if buffers.coefficients.assign(&texels.coefficients)? {
        grown.push((buffers.coefficients.label(), buffers.coefficients.capacity()));
      }
      Ok(grown)
    })?;
    cmd.commit_and_wait();
    for (label, capacity) in growths {
      queue.record_growth(label, capacity);
    }

    Ok(Self {
      cycle,
      generation,
      octree: mesh.octree,
      small: mesh.small,
      micro: mesh.micro,
      nano: mesh.nano,
      buffers,
      stats,
    })
  }

  pub fn cycle(&self) -> u64 {
    self.cycle
  }

  /// Upstream mesh generation this snapshot was built from.
  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn octree(&self) -> &Octree {
    &self.octree
  }

  pub fn sectors(&self, level: SectorLevel) -> &SectorTable {
    match level {
      SectorLevel::Small => &self.small,
      SectorLevel::Micro => &self.micro,
      SectorLevel::Nano => &self.nano,
    }
  }

  pub fn stats(&self) -> &CycleStats {
    &self.stats
  }

  pub fn vertex_count(&self) -> usize {
    self.buffers.vertices.len()
  }

  pub fn triangle_count(&self) -> usize {
    self.buffers.indices.len()
  }

  pub fn vertices(&self) -> &[Vertex] {
    &self.buffers.vertices
  }

  pub fn indices(&self) -> &[[u32; 3]] {
    &self.buffers.indices
  }

  pub fn allocations(&self) -> &[TexelAllocation] {
    &self.buffers.allocations
  }

  pub fn coefficients(&self) -> &[RasterCoefficients] {
    &self.buffers.coefficients
  }

  /// Whether the mesh is worth drawing: non-empty, and at least as many
  /// triangles as vertices. Sparser meshes are mostly stray fragments.
  pub fn is_renderable(&self) -> bool {
    let (vertices, triangles) = (self.vertex_count(), self.triangle_count());
    vertices > 0 && triangles > 0 && triangles >= vertices
  }

  pub fn view(&self) -> MeshView<'_> {
    MeshView {
      vertices: &self.buffers.vertices,
      indices: &self.buffers.indices,
      vertex_sectors: &self.buffers.vertex_sectors,
      vertex_triangle_offsets: &self.buffers.vertex_triangle_offsets,
      small: &self.small,
      micro: &self.micro,
      nano: &self.nano,
    }
  }

  pub fn into_buffers(self) -> SnapshotBuffers {
    self.buffers
  }
}

/// A snapshot together with the colors painted onto it since publication.
///
/// Cheap to clone; clones share the snapshot and the color stores.
#[derive(Clone, Debug)]
pub struct PublishedMesh {
  snapshot: Arc<FrameMeshSnapshot>,
  colors: Arc<RwLock<TexelStores>>,
}

impl PublishedMesh {
  pub fn new(snapshot: FrameMeshSnapshot, colors: TexelStores) -> Self {
    Self {
      snapshot: Arc::new(snapshot),
      colors: Arc::new(RwLock::new(colors)),
    }
  }

  pub fn snapshot(&self) -> &FrameMeshSnapshot {
    &self.snapshot
  }

  pub fn cycle(&self) -> u64 {
    self.snapshot.cycle()
  }

  /// Shared read access to the texel stores.
  ///
  /// A writer that panicked leaves the stores intact, so poisoning is
  /// ignored.
  pub fn read_colors(&self) -> RwLockReadGuard<'_, TexelStores> {
    self.colors.read().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn write_colors(&self) -> RwLockWriteGuard<'_, TexelStores> {
    self.colors.write().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Exclusive access to the texel stores, or `None` while a reader such
  /// as a reconstruction worker holds them.
  pub fn try_write_colors(&self) -> Option<RwLockWriteGuard<'_, TexelStores>> {
    match self.colors.try_write() {
      Ok(guard) => Some(guard),
      Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
      Err(TryLockError::WouldBlock) => None,
    }
  }

  /// Run `f` with this cycle's texels as the predecessor of the next.
  pub fn with_previous_texels<R>(&self, f: impl FnOnce(PreviousTexels<'_>) -> R) -> R {
    let stores = self.read_colors();
    f(PreviousTexels {
      allocations: self.snapshot.allocations(),
      stores: &stores,
    })
  }

  /// Take the parts back if nothing else holds them.
  pub fn try_into_parts(self) -> Option<(FrameMeshSnapshot, TexelStores)> {
    let snapshot = Arc::try_unwrap(self.snapshot).ok()?;
    let colors = Arc::try_unwrap(self.colors).ok()?;
    let stores = colors.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    Some((snapshot, stores))
  }
}

/// Recycles retired snapshots' buffers into the next cycle.
#[derive(Debug)]
pub struct SnapshotArena {
  texel_config: TexelConfig,
  vertex_capacity: usize,
  triangle_capacity: usize,
  buffers: Option<SnapshotBuffers>,
  stores: Option<TexelStores>,
  recycled: u64,
}

impl SnapshotArena {
  pub fn new(vertex_capacity: usize, texel_config: TexelConfig) -> Self {
    Self {
      texel_config,
      vertex_capacity,
      triangle_capacity: texel_config.initial_triangle_capacity,
      buffers: None,
      stores: None,
      recycled: 0,
    }
  }

  /// Buffers for the next snapshot: a retired set if one is available.
  pub fn acquire_buffers(&mut self) -> SnapshotBuffers {
    self
      .buffers
      .take()
      .unwrap_or_else(|| SnapshotBuffers::new(self.vertex_capacity, self.triangle_capacity))
  }

  pub fn acquire_stores(&mut self) -> TexelStores {
    self.stores.take().unwrap_or_else(|| TexelStores::new(&self.texel_config))
  }

  /// Give a retired mesh back. Returns `false` when it is still shared and
  /// was simply dropped.
  pub fn release(&mut self, retired: PublishedMesh) -> bool {
    let Some((snapshot, stores)) = retired.try_into_parts() else {
      #[cfg(feature = "tracing")]
      tracing::debug!("retired snapshot still shared; dropping instead of recycling");
      return false;
    };
    self.buffers = Some(snapshot.into_buffers());
    self.stores = Some(stores);
    self.recycled += 1;
    true
  }

  /// Snapshots recycled so far.
  pub fn recycled(&self) -> u64 {
    self.recycled
  }

  pub fn has_spare(&self) -> bool {
    self.buffers.is_some()
  }
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod snapshot_test;
