use glam::{Mat4, Vec3};

use super::*;
use crate::snapshot::PublishedMesh;
use crate::synthetic::{self, look_at};
use crate::test_utils::{publish, two_patches};

const ASPECT: f32 = 4.0 / 3.0;

/// Looks down at the patch near the origin; the one at x = 10 is off to
/// the right.
fn near_patch_view() -> Mat4 {
  look_at(Vec3::new(0.3, 1.0, 2.0), Vec3::new(0.3, 0.5, 0.3), 1.0, ASPECT)
}

fn far_patch_view() -> Mat4 {
  look_at(Vec3::new(10.3, 1.0, 2.0), Vec3::new(10.3, 0.5, 0.3), 1.0, ASPECT)
}

fn cull(published: &PublishedMesh, views: &[Mat4]) -> (CulledGeometry, CullStats, ComputeQueue) {
  let mut queue = ComputeQueue::new();
  let mut out = CulledGeometry::new(CullTarget::Render, 16, 16);
  let stats = Culler::new(CullerConfig::default())
    .cull(&mut queue, published.snapshot(), views, &mut out)
    .expect("cull");
  (out, stats, queue)
}

/// Compacted triangles reference only compacted vertices and reproduce
/// the snapshot triangles they came from.
fn assert_faithful(published: &PublishedMesh, out: &CulledGeometry) {
  let view = published.snapshot().view();
  for t in 0..out.triangle_count() {
    assert!(out.indices[t].iter().all(|&v| (v as usize) < out.vertex_count()));
    assert_eq!(out.corners(t), view.corners(out.triangle_ids[t] as usize));
  }
}

// =========================================================================
// Batch 1: Sector visibility
// =========================================================================

#[test]
fn test_bounds_in_front_are_visible() {
  let view = near_patch_view();
  assert!(bounds_visible(&SectorBounds::cube(Vec3::ZERO, 2.0), &view));
  assert!(!bounds_visible(&SectorBounds::cube(Vec3::new(10.0, 0.0, 0.0), 2.0), &view));
  // Behind the camera.
  assert!(!bounds_visible(&SectorBounds::cube(Vec3::new(0.0, 0.0, 6.0), 2.0), &view));
}

#[test]
fn test_frustum_excluding_a_sector_drops_its_geometry() {
  let published = publish(&two_patches());
  let (out, stats, _) = cull(&published, &[near_patch_view()]);

  assert_eq!(stats.visible_sectors, 1);
  assert_eq!(stats.culled_sectors, 1);
  assert_eq!(out.triangle_count(), 32);
  assert_eq!(out.vertex_count(), 25);
  assert_eq!(out.draw_args, DrawIndirectArgs::triangles(32));
  assert!(out.vertices.iter().all(|v| v.position()[0] < 1.0));
  assert_faithful(&published, &out);
}

#[test]
fn test_stereo_views_keep_the_union() {
  let published = publish(&two_patches());
  let (out, stats, _) = cull(&published, &[near_patch_view(), far_patch_view()]);
  assert_eq!(stats.visible_sectors, 2);
  assert_eq!(out.triangle_count(), published.snapshot().triangle_count());
  assert_eq!(out.vertex_count(), published.snapshot().vertex_count());
  assert_faithful(&published, &out);
}

#[test]
fn test_camera_facing_away_culls_everything() {
  let published = publish(&two_patches());
  let away = look_at(Vec3::new(0.3, 1.0, 2.5), Vec3::new(0.3, 1.0, 10.0), 1.0, ASPECT);
  let (out, stats, _) = cull(&published, &[away]);
  assert_eq!(stats.visible_sectors, 0);
  assert!(out.is_empty());
  assert_eq!(out.vertex_count(), 0);
  assert_eq!(out.draw_args.instance_count, 0);
}

// =========================================================================
// Batch 2: Gating and buffers
// =========================================================================

#[test]
fn test_unrenderable_mesh_issues_no_work() {
  let strip = synthetic::plane_patch(Vec3::new(0.1, 0.5, 0.1), Vec3::X * 0.5, Vec3::Z * 0.05, 10, 1, [90, 90, 90]);
  let published = publish(&strip);
  let (out, stats, queue) = cull(&published, &[near_patch_view()]);
  assert!(out.is_empty());
  assert_eq!(stats, CullStats::default());
  assert_eq!(queue.stats().dispatches, 0);

  let mut queue = ComputeQueue::new();
  let mut out = CulledGeometry::new(CullTarget::Render, 16, 16);
  let stats = Culler::new(CullerConfig::default().with_require_renderable(false))
    .cull(&mut queue, published.snapshot(), &[near_patch_view()], &mut out)
    .expect("cull");
  assert_eq!(stats.triangles, 20);
}

#[test]
fn test_no_views_issue_no_work() {
  let published = publish(&two_patches());
  let (out, _, queue) = cull(&published, &[]);
  assert!(out.is_empty());
  assert_eq!(queue.stats().command_buffers, 0);
}

#[test]
fn test_output_buffers_grow_and_are_reused() {
  let published = publish(&two_patches());
  let culler = Culler::new(CullerConfig::default());
  let mut queue = ComputeQueue::new();
  let mut out = CulledGeometry::new(CullTarget::Occlusion, 4, 4);
  let views = [near_patch_view(), far_patch_view()];

  culler.cull(&mut queue, published.snapshot(), &views, &mut out).expect("cull");
  assert_eq!(out.vertices.capacity(), 64);
  assert_eq!(out.indices.capacity(), 64);
  let growths = queue.stats().buffer_growths;
  assert_eq!(growths, 3);

  culler.cull(&mut queue, published.snapshot(), &views[..1], &mut out).expect("cull");
  assert_eq!(out.triangle_count(), 32);
  assert_eq!(out.indices.capacity(), 64);
  assert_eq!(queue.stats().buffer_growths, growths);
}

#[test]
fn test_each_cull_is_two_lock_step_command_buffers() {
  let published = publish(&two_patches());
  let (_, _, queue) = cull(&published, &[near_patch_view()]);
  assert_eq!(queue.stats().command_buffers, 2);
  assert_eq!(queue.stats().cpu_handoffs, 2);
}
