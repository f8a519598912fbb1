//! Second and third pass: centroid proximity gated by color.
//!
//! Both passes look at old triangles by centroid, bucketed on the nano
//! grid. The second pass prefilters whole old nano sectors by their average
//! vertex color and refuses to pick between near-equal candidates. The
//! third pass only runs where the second pass gave up, compares the micro
//! sector averages of both cycles first, and then takes the nearest
//! remaining candidate.

use std::collections::HashMap;

use glam::Vec3;
use rayon::prelude::*;
use smallvec::SmallVec;

use super::view::{average_color, MeshView};
use crate::compute::CommandBuffer;
use crate::config::MatcherConfig;
use crate::sector::SectorKey;
use crate::types::packing::color_distance;
use crate::types::{TriangleMatch, Winding};

/// Old triangles bucketed by the nano cell of their centroid.
pub struct CentroidIndex {
  cells: HashMap<SectorKey, SmallVec<[u32; 4]>>,
  centroids: Vec<Vec3>,
  colors: Vec<[u8; 4]>,
  nano_colors: Vec<[u8; 4]>,
  edge: f32,
}

impl CentroidIndex {
  pub fn build(cmd: &mut CommandBuffer<'_>, old: &MeshView<'_>) -> Self {
    let edge = old.nano.edge();
    let (centroids, colors): (Vec<Vec3>, Vec<[u8; 4]>) = cmd.dispatch("triangle_centroids", old.triangle_count(), || {
      (0..old.triangle_count())
        .into_par_iter()
        .map(|t| (old.centroid(t), old.triangle_color(t)))
        .unzip()
    });
    let nano_colors = cmd.dispatch("nano_colors", old.nano.len(), || {
      old
        .nano
        .sectors()
        .par_iter()
        .map(|s| average_color(old.vertices[s.vertex_range()].iter().map(|v| v.color())))
        .collect()
    });
    let mut cells: HashMap<SectorKey, SmallVec<[u32; 4]>> = HashMap::new();
    for (t, c) in centroids.iter().enumerate() {
      cells.entry(SectorKey::from_position(*c, edge)).or_default().push(t as u32);
    }
    Self {
      cells,
      centroids,
      colors,
      nano_colors,
      edge,
    }
  }

  fn around(&self, p: Vec3) -> impl Iterator<Item = (SectorKey, u32)> + '_ {
    SectorKey::from_position(p, self.edge)
      .neighborhood()
      .filter_map(move |k| self.cells.get(&k).map(|ts| (k, ts)))
      .flat_map(|(k, ts)| ts.iter().map(move |&t| (k, t)))
  }
}

/// Second pass result for one new triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColorCandidate {
  None,
  Ambiguous,
  Found(TriangleMatch),
}

pub fn color_candidates(
  cmd: &mut CommandBuffer<'_>,
  config: &MatcherConfig,
  new: &MeshView<'_>,
  old: &MeshView<'_>,
  index: &CentroidIndex,
  flagged: &[bool],
  matches: &[TriangleMatch],
  taken: &[bool],
) -> Vec<ColorCandidate> {
  let position_tolerance = config.position_tolerance.max(f32::EPSILON);
  let color_threshold = config.color_threshold.max(1) as f32;
  cmd.dispatch("color_candidates", new.triangle_count(), || {
    (0..new.triangle_count())
      .into_par_iter()
      .map(|t| {
        if matches[t].is_matched() || !flagged[new.owner_small_sector(t) as usize] {
          return ColorCandidate::None;
        }
        let centroid = new.centroid(t);
        let color = new.triangle_color(t);
        let mut best: Option<(f32, u32)> = None;
        let mut runner_up = f32::INFINITY;
        for (cell, candidate) in index.around(centroid) {
          if let Some(sector) = old.nano.find(cell) {
            if color_distance(index.nano_colors[sector as usize], color) > config.color_threshold {
              continue;
            }
          }
          if taken[candidate as usize] {
            continue;
          }
          let distance = index.centroids[candidate as usize].distance(centroid);
          let color_diff = color_distance(index.colors[candidate as usize], color);
          if distance > position_tolerance || color_diff > config.color_threshold {
            continue;
          }
          let score = distance / position_tolerance + color_diff as f32 / color_threshold;
          match best {
            Some((s, b)) if score > s || (score == s && candidate > b) => runner_up = runner_up.min(score),
            Some((s, _)) => {
              runner_up = runner_up.min(s);
              best = Some((score, candidate));
            }
            None => best = Some((score, candidate)),
          }
        }
        match best {
          None => ColorCandidate::None,
          Some((score, _)) if runner_up - score < config.ambiguity_margin => ColorCandidate::Ambiguous,
          Some((_, candidate)) => ColorCandidate::Found(geometric_match(new, old, t, candidate)),
        }
      })
      .collect()
  })
}

/// Third pass: nearest remaining old triangle, for triangles of ambiguous
/// sectors whose micro sector kept its average color.
pub fn micro_candidates(
  cmd: &mut CommandBuffer<'_>,
  config: &MatcherConfig,
  new: &MeshView<'_>,
  old: &MeshView<'_>,
  index: &CentroidIndex,
  ambiguous: &[bool],
  matches: &[TriangleMatch],
  taken: &[bool],
) -> Vec<TriangleMatch> {
  let micro_edge = new.micro.edge();
  let micro_color = |view: &MeshView<'_>, key: SectorKey| {
    view
      .micro
      .find(key)
      .map(|s| average_color(view.vertices[view.micro.get(s).vertex_range()].iter().map(|v| v.color())))
  };
  cmd.dispatch("micro_candidates", new.triangle_count(), || {
    (0..new.triangle_count())
      .into_par_iter()
      .map(|t| {
        if matches[t].is_matched() || !ambiguous[new.owner_small_sector(t) as usize] {
          return TriangleMatch::Unmatched;
        }
        let centroid = new.centroid(t);
        let key = SectorKey::from_position(centroid, micro_edge);
        if let (Some(a), Some(b)) = (micro_color(new, key), micro_color(old, key)) {
          if color_distance(a, b) > config.micro_color_threshold {
            return TriangleMatch::Unmatched;
          }
        }
        let color = new.triangle_color(t);
        index
          .around(centroid)
          .map(|(_, candidate)| candidate)
          .filter(|&c| !taken[c as usize])
          .filter(|&c| color_distance(index.colors[c as usize], color) <= config.micro_color_threshold)
          .map(|c| (index.centroids[c as usize].distance(centroid), c))
          .filter(|&(d, _)| d <= config.position_tolerance)
          .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
          .map(|(_, c)| geometric_match(new, old, t, c))
          .unwrap_or_default()
      })
      .collect()
  })
}

/// Corner mapping minimizing the summed squared corner distance.
fn geometric_match(new: &MeshView<'_>, old: &MeshView<'_>, new_triangle: usize, old_triangle: u32) -> TriangleMatch {
  let (winding, rotation) = closest_correspondence(old.corners(old_triangle as usize), new.corners(new_triangle));
  TriangleMatch::Matched {
    old: old_triangle,
    winding,
    rotation,
  }
}

pub fn closest_correspondence(old: [Vec3; 3], new: [Vec3; 3]) -> (Winding, u8) {
  let mut best = (f32::INFINITY, Winding::Same, 0u8);
  for winding in [Winding::Same, Winding::Reversed] {
    for rotation in 0..3u8 {
      let probe = TriangleMatch::Matched {
        old: 0,
        winding,
        rotation,
      };
      let cost: f32 = (0..3).map(|k| old[k].distance_squared(new[probe.new_corner(k)])).sum();
      if cost < best.0 {
        best = (cost, winding, rotation);
      }
    }
  }
  (best.1, best.2)
}
