//! Mesh Matcher - pairs this cycle's triangles with last cycle's.
//!
//! A matched triangle inherits its predecessor's texels, so the color the
//! camera painted onto the surface survives the rebuild. Matching escalates
//! through three passes:
//!
//! | Pass | Scope                                   | Criterion                              |
//! |------|-----------------------------------------|----------------------------------------|
//! | 1    | small sectors present in both cycles    | all three corners match old vertices   |
//! | 2    | sectors below the clean-match ratio     | centroid + color, clear winner only    |
//! | 3    | sectors pass 2 flagged ambiguous        | micro-sector color, nearest centroid   |
//!
//! Passes 2 and 3 are skipped when nothing needs them. Every pass resolves
//! competing claims on one old triangle in favor of the lowest new triangle
//! index, so the final association is injective.

mod color_pass;
mod vertex_pass;
mod view;

pub use color_pass::{closest_correspondence, CentroidIndex, ColorCandidate};
pub use vertex_pass::{correspondence, NO_VERTEX};
pub use view::{average_color, MeshView};

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use crate::compute::{CommandBuffer, ComputeQueue};
use crate::config::MatcherConfig;
use crate::types::TriangleMatch;

/// What the matcher did in one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchStats {
  pub triangles: usize,
  pub vertex_pass: usize,
  pub color_pass: usize,
  pub micro_pass: usize,
  /// Small sectors handed to the second pass.
  pub flagged_sectors: usize,
  /// Small sectors handed to the third pass.
  pub ambiguous_sectors: usize,
  pub color_pass_ran: bool,
  pub micro_pass_ran: bool,
}

impl MatchStats {
  pub fn matched(&self) -> usize {
    self.vertex_pass + self.color_pass + self.micro_pass
  }

  pub fn unmatched(&self) -> usize {
    self.triangles - self.matched()
  }

  /// Fraction of this cycle's triangles that found a predecessor.
  pub fn match_rate(&self) -> f32 {
    if self.triangles == 0 {
      return 0.0;
    }
    self.matched() as f32 / self.triangles as f32
  }
}

/// Association of every new triangle with an old one, or none.
#[derive(Clone, Debug, Default)]
pub struct MatchOutcome {
  pub matches: Vec<TriangleMatch>,
  pub stats: MatchStats,
}

pub struct MeshMatcher {
  config: MatcherConfig,
}

impl MeshMatcher {
  pub fn new(config: MatcherConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &MatcherConfig {
    &self.config
  }

  /// Match `new` against `old`. Without an old mesh every triangle is
  /// unmatched and no work is issued.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "mesh_match"))]
  pub fn run(&self, queue: &mut ComputeQueue, new: &MeshView<'_>, old: Option<&MeshView<'_>>) -> MatchOutcome {
    let triangles = new.triangle_count();
    let mut stats = MatchStats {
      triangles,
      ..Default::default()
    };
    let old = match old {
      Some(old) if triangles > 0 && old.triangle_count() > 0 => old,
      _ => {
        return MatchOutcome {
          matches: vec![TriangleMatch::Unmatched; triangles],
          stats,
        }
      }
    };

    // Pass 1.
    let active: Vec<bool> = new
      .small
      .sectors()
      .iter()
      .map(|s| old.small.find(s.key).is_some())
      .collect();
    let mut taken = vec![false; old.triangle_count()];
    let mut cmd = queue.command_buffer("match.vertices");
    let vertex_matches = vertex_pass::match_vertices(&mut cmd, new, old, &active, self.config.vertex_tolerance);
    let candidates = vertex_pass::match_triangles(&mut cmd, new, old, &active, &vertex_matches);
    let mut matches = claim(&mut cmd, "claim_vertex_pass", &candidates, old.triangle_count());
    let sector_matched = matched_per_sector(&mut cmd, new, &matches);
    cmd.commit_and_wait();
    stats.vertex_pass = mark_taken(&matches, &mut taken);

    if !self.config.color_passes {
      return MatchOutcome { matches, stats };
    }

    // Sectors without a clean first-pass match, next to old geometry.
    let flagged: Vec<bool> = new
      .small
      .sectors()
      .iter()
      .zip(&sector_matched)
      .map(|(s, &matched)| {
        let ratio = if s.triangle_count == 0 {
          1.0
        } else {
          matched as f32 / s.triangle_count as f32
        };
        ratio < self.config.clean_match_ratio && old.small.has_neighbor(s.key)
      })
      .collect();
    stats.flagged_sectors = flagged.iter().filter(|&&f| f).count();
    if stats.flagged_sectors == 0 {
      return MatchOutcome { matches, stats };
    }

    // Pass 2.
    stats.color_pass_ran = true;
    let mut cmd = queue.command_buffer("match.color");
    let index = CentroidIndex::build(&mut cmd, old);
    let found = color_pass::color_candidates(&mut cmd, &self.config, new, old, &index, &flagged, &matches, &taken);
    let candidates: Vec<TriangleMatch> = found
      .iter()
      .map(|c| match c {
        ColorCandidate::Found(m) => *m,
        _ => TriangleMatch::Unmatched,
      })
      .collect();
    let winners = claim(&mut cmd, "claim_color_pass", &candidates, old.triangle_count());
    cmd.commit_and_wait();

    let mut ambiguous = vec![false; new.small.len()];
    for (t, candidate) in found.iter().enumerate() {
      let lost = matches!(candidate, ColorCandidate::Found(_)) && !winners[t].is_matched();
      if lost || *candidate == ColorCandidate::Ambiguous {
        ambiguous[new.owner_small_sector(t) as usize] = true;
      }
    }
    stats.color_pass = mark_taken(&winners, &mut taken);
    merge(&mut matches, &winners);

    stats.ambiguous_sectors = ambiguous.iter().filter(|&&a| a).count();
    if stats.ambiguous_sectors == 0 {
      return MatchOutcome { matches, stats };
    }

    // Pass 3.
    stats.micro_pass_ran = true;
    let mut cmd = queue.command_buffer("match.micro");
    let candidates = color_pass::micro_candidates(&mut cmd, &self.config, new, old, &index, &ambiguous, &matches, &taken);
    let winners = claim(&mut cmd, "claim_micro_pass", &candidates, old.triangle_count());
    cmd.commit_and_wait();
    stats.micro_pass = mark_taken(&winners, &mut taken);
    merge(&mut matches, &winners);

    #[cfg(feature = "tracing")]
    tracing::debug!(
      matched = stats.matched(),
      triangles = stats.triangles,
      flagged = stats.flagged_sectors,
      ambiguous = stats.ambiguous_sectors,
      "mesh match complete"
    );

    MatchOutcome { matches, stats }
  }
}

/// Resolve competing candidates: each old triangle goes to the lowest new
/// triangle index that asked for it.
fn claim(cmd: &mut CommandBuffer<'_>, kernel: &'static str, candidates: &[TriangleMatch], old_triangles: usize) -> Vec<TriangleMatch> {
  cmd.dispatch(kernel, candidates.len(), || {
    let claims: Vec<AtomicU32> = (0..old_triangles).map(|_| AtomicU32::new(u32::MAX)).collect();
    candidates.par_iter().enumerate().for_each(|(t, c)| {
      if let Some(old) = c.old_triangle() {
        claims[old as usize].fetch_min(t as u32, Ordering::Relaxed);
      }
    });
    candidates
      .par_iter()
      .enumerate()
      .map(|(t, c)| match c.old_triangle() {
        Some(old) if claims[old as usize].load(Ordering::Relaxed) == t as u32 => *c,
        _ => TriangleMatch::Unmatched,
      })
      .collect()
  })
}

/// Matched triangles per new small sector.
fn matched_per_sector(cmd: &mut CommandBuffer<'_>, new: &MeshView<'_>, matches: &[TriangleMatch]) -> Vec<u32> {
  cmd.dispatch("sector_tally", new.small.len(), || {
    new
      .small
      .sectors()
      .par_iter()
      .map(|s| matches[s.triangle_range()].iter().filter(|m| m.is_matched()).count() as u32)
      .collect()
  })
}

fn mark_taken(winners: &[TriangleMatch], taken: &mut [bool]) -> usize {
  let mut count = 0;
  for old in winners.iter().filter_map(TriangleMatch::old_triangle) {
    taken[old as usize] = true;
    count += 1;
  }
  count
}

fn merge(matches: &mut [TriangleMatch], winners: &[TriangleMatch]) {
  matches
    .par_iter_mut()
    .zip(winners.par_iter())
    .filter(|(_, w)| w.is_matched())
    .for_each(|(m, w)| *m = *w);
}
