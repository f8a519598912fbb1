use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;

use super::*;
use crate::config::{FrameConfig, TriggerConfig};
use crate::frames::frame_channel;
use crate::synthetic::{self, look_at};
use crate::test_utils::{camera_frame, test_config, two_patches};

const WAIT: Duration = Duration::from_secs(30);
const ASPECT: f32 = 4.0 / 3.0;
const PAINT: [u8; 4] = [200, 100, 50, 255];

fn reconstructor() -> SceneReconstructor {
  SceneReconstructor::new(test_config())
}

fn eager_reconstructor() -> SceneReconstructor {
  SceneReconstructor::new(test_config().with_trigger(TriggerConfig::default().with_min_frames_between_cycles(0)))
}

/// Looks down at the patch near the origin.
fn near_view() -> Mat4 {
  look_at(Vec3::new(0.3, 1.2, 0.9), Vec3::new(0.3, 0.5, 0.3), 1.0, ASPECT)
}

fn far_view() -> Mat4 {
  look_at(Vec3::new(10.3, 1.2, 0.9), Vec3::new(10.3, 0.5, 0.3), 1.0, ASPECT)
}

fn frame(index: u64) -> CameraFrame {
  camera_frame(index, near_view(), PAINT)
}

/// Run frames until a finished cycle is swapped in.
fn run_until_swap(reconstructor: &mut SceneReconstructor) -> FrameStart {
  let deadline = Instant::now() + WAIT;
  loop {
    let start = reconstructor.begin_frame();
    if start.swapped {
      return start;
    }
    assert!(Instant::now() < deadline, "cycle never finished");
    thread::sleep(Duration::from_millis(1));
  }
}

// =========================================================================
// Batch 1: Cycle lifecycle
// =========================================================================

#[test]
fn test_nothing_happens_without_a_mesh() {
  let mut reconstructor = reconstructor();
  assert_eq!(reconstructor.begin_frame(), FrameStart::default());
  assert!(!reconstructor.is_matching());
  assert!(reconstructor.current().is_none());
}

#[test]
fn test_cycle_runs_in_background_and_swaps_on_a_later_frame() {
  let mut reconstructor = reconstructor();
  reconstructor.submit_mesh(two_patches().with_generation(1));

  let start = reconstructor.begin_frame();
  assert_eq!(start.started, Some(1));
  assert!(!start.swapped);
  assert!(reconstructor.is_matching());
  assert!(reconstructor.current().is_none());

  run_until_swap(&mut reconstructor);
  assert!(!reconstructor.is_matching());
  let current = reconstructor.current().expect("swapped in");
  assert_eq!(current.cycle(), 1);
  assert_eq!(current.snapshot().generation(), 1);
  assert_eq!(reconstructor.stats().cycles_swapped, 1);
  assert_eq!(reconstructor.stats().last_cycle.map(|s| s.cycle), Some(1));
}

#[test]
fn test_no_second_cycle_starts_while_one_is_in_flight() {
  let mut reconstructor = eager_reconstructor();
  reconstructor.submit_mesh(two_patches().with_generation(1));
  assert_eq!(reconstructor.begin_frame().started, Some(1));

  reconstructor.submit_mesh(two_patches().with_generation(2));
  let next = reconstructor.begin_frame();
  // A new cycle may only start once the previous one was swapped in.
  assert!(next.started.is_none() || next.swapped);
}

#[test]
fn test_unchanged_generation_does_not_restart() {
  let mut reconstructor = eager_reconstructor();
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(5), WAIT));
  for _ in 0..10 {
    assert_eq!(reconstructor.begin_frame().started, None);
  }
  reconstructor.submit_mesh(two_patches().with_generation(6));
  assert_eq!(reconstructor.begin_frame().started, Some(2));
}

#[test]
fn test_trigger_waits_for_minimum_frames() {
  let mut reconstructor = SceneReconstructor::new(
    test_config().with_trigger(TriggerConfig::default().with_min_frames_between_cycles(5)),
  );
  reconstructor.submit_mesh(two_patches().with_generation(1));
  assert_eq!(reconstructor.begin_frame().started, Some(1));
  assert!(reconstructor.finish_in_flight(WAIT));

  reconstructor.submit_mesh(two_patches().with_generation(2));
  let started: Vec<Option<u64>> = (0..5).map(|_| reconstructor.begin_frame().started).collect();
  assert_eq!(started, vec![None, None, None, None, Some(2)]);
}

#[test]
fn test_blocking_reconstruction_recycles_the_retired_mesh() {
  let mut reconstructor = reconstructor();
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(1), WAIT));
  assert_eq!(reconstructor.arena().recycled(), 0);

  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(2), WAIT));
  assert_eq!(reconstructor.arena().recycled(), 1);
  let last = reconstructor.stats().last_cycle.expect("summary");
  assert_eq!(last.cycle, 2);
  assert_eq!(last.stats.matching.match_rate(), 1.0);
  assert_eq!(last.stats.texels.fresh_triangles, 0);
}

#[test]
fn test_failed_cycle_is_skipped_and_keeps_the_current_mesh() {
  let mut reconstructor = reconstructor();
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(1), WAIT));
  assert!(!reconstructor.reconstruct_blocking(RawMesh::default().with_generation(2), WAIT));

  assert_eq!(reconstructor.stats().skipped_cycles, 1);
  assert!(!reconstructor.is_matching());
  assert_eq!(reconstructor.current().map(PublishedMesh::cycle), Some(1));
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(3), WAIT));
  assert_eq!(reconstructor.current().map(PublishedMesh::cycle), Some(3));
}

#[test]
fn test_far_away_observation_is_skipped_once() {
  let mut reconstructor = eager_reconstructor();
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(1), WAIT));

  let mut far = two_patches().with_generation(2);
  far.vertices[3].position[1] = 1.0e9;
  assert!(!reconstructor.reconstruct_blocking(far, WAIT));
  assert_eq!(reconstructor.stats().skipped_cycles, 1);
  assert_eq!(reconstructor.stats().lost_workers, 0);
  assert!(!reconstructor.is_matching());

  // The rejected generation is not retried.
  for i in 0..20 {
    assert_eq!(reconstructor.begin_frame().started, None);
    reconstructor.render_frame(&frame(i));
  }
  assert_eq!(reconstructor.current().map(PublishedMesh::cycle), Some(1));
}

// =========================================================================
// Batch 2: Render frames
// =========================================================================

#[test]
fn test_render_without_a_mesh_draws_nothing() {
  let mut reconstructor = reconstructor();
  assert_eq!(reconstructor.render_frame(&frame(0)), RenderStats::default());
  assert_eq!(reconstructor.stats().frames, 1);
}

#[test]
fn test_render_culls_and_paints_the_visible_patch() {
  let mut reconstructor = reconstructor();
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(1), WAIT));

  let stats = reconstructor.render_frame(&frame(0));
  assert_eq!(stats.render.triangles, 32);
  assert_eq!(stats.occlusion.triangles, 32);
  assert_eq!(stats.visibility.visible_triangles, 32);
  assert_eq!(stats.color.map(|c| c.triangles), Some(32));
  assert_eq!(reconstructor.render_set().draw_args.instance_count, 32);
  assert_eq!(reconstructor.stats().color_updates, 1);
}

#[test]
fn test_stereo_render_set_is_wider_than_occlusion_set() {
  let mut reconstructor = reconstructor();
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(1), WAIT));

  let stereo = frame(0).with_eye_views([near_view(), far_view()]);
  let stats = reconstructor.render_frame(&stereo);
  assert_eq!(stats.render.triangles, 64);
  assert_eq!(stats.occlusion.triangles, 32);
}

#[test]
fn test_color_refresh_follows_the_throttle() {
  let mut reconstructor = reconstructor();
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(1), WAIT));

  let sampled: Vec<bool> = (0..13)
    .map(|i| reconstructor.render_frame(&frame(i)).color.is_some())
    .collect();
  let expected: Vec<bool> = (0..13).map(|i| i % 6 == 0).collect();
  assert_eq!(sampled, expected);
  assert_eq!(reconstructor.stats().skipped_color_updates, 10);

  // A swap forces the next frame to refresh.
  reconstructor.render_frame(&frame(13));
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(2), WAIT));
  assert!(reconstructor.render_frame(&frame(14)).color.is_some());
}

#[test]
fn test_critical_thermal_state_stops_color_refresh() {
  let mut reconstructor = reconstructor();
  reconstructor.set_thermal_state(ThermalState::Critical);
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(1), WAIT));
  for i in 0..30 {
    let stats = reconstructor.render_frame(&frame(i));
    assert_eq!(stats.render.triangles, 32);
    assert!(stats.color.is_none());
  }
}

#[test]
fn test_missing_frame_keeps_geometry_and_skips_color() {
  let mut reconstructor = reconstructor();
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(1), WAIT));
  reconstructor.render_frame(&frame(0));

  let (_tx, rx) = frame_channel(&FrameConfig::default().with_max_wait(Duration::from_millis(1)));
  let stats = reconstructor.render_next(&rx);
  assert_eq!(stats.render.triangles, 32);
  assert!(stats.color.is_none());
  assert_eq!(reconstructor.stats().missing_frames, 1);
}

#[test]
fn test_render_next_uses_the_newest_queued_frame() {
  let mut reconstructor = reconstructor();
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(1), WAIT));
  let (tx, rx) = frame_channel(&FrameConfig::default());
  tx.send(camera_frame(0, far_view(), PAINT)).expect("send");
  tx.send(frame(1)).expect("send");

  let stats = reconstructor.render_next(&rx);
  assert_eq!(stats.render.triangles, 32);
  assert!(reconstructor.render_set().vertices.iter().all(|v| v.position()[0] < 1.0));
}

#[test]
fn test_render_skips_color_while_the_worker_reads_texels() {
  let mut reconstructor = reconstructor();
  assert!(reconstructor.reconstruct_blocking(two_patches().with_generation(1), WAIT));
  let published = reconstructor.current().cloned().expect("current");

  let (held_tx, held_rx) = crossbeam_channel::bounded::<()>(0);
  let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
  let reader = thread::spawn(move || {
    published.with_previous_texels(|_| {
      held_tx.send(()).expect("held");
      let _ = release_rx.recv_timeout(Duration::from_millis(500));
    });
  });
  held_rx.recv().expect("reader holds the stores");

  let start = Instant::now();
  let stats = reconstructor.render_frame(&frame(0));
  let elapsed = start.elapsed();
  let _ = release_tx.send(());
  reader.join().expect("reader");

  assert!(elapsed < Duration::from_millis(250), "render waited {elapsed:?}");
  assert_eq!(stats.render.triangles, 32);
  assert!(stats.color.is_none());
  assert_eq!(reconstructor.stats().skipped_color_updates, 1);

  // The deferred refresh happens on the next frame.
  assert_eq!(reconstructor.render_frame(&frame(1)).color.map(|c| c.triangles), Some(32));
}

// =========================================================================
// Batch 3: Color survives reconstruction
// =========================================================================

#[test]
fn test_painted_colors_carry_into_the_next_cycle() {
  let mut reconstructor = reconstructor();
  let mesh = two_patches();
  assert!(reconstructor.reconstruct_blocking(mesh.clone().with_generation(1), WAIT));
  reconstructor.render_frame(&frame(0));

  let moved = synthetic::perturbed(&mesh, 0.001, 7).with_generation(2);
  assert!(reconstructor.reconstruct_blocking(moved, WAIT));

  let current = reconstructor.current().expect("current");
  let view = current.snapshot().view();
  let colors = current.read_colors();
  for (t, allocation) in current.snapshot().allocations().iter().enumerate() {
    let near_patch = view.corners(t).iter().all(|c| c.x < 1.0);
    let expected = if near_patch { PAINT } else { crate::constants::UNSAMPLED_TEXEL };
    assert!(colors.texels(allocation).iter().all(|&texel| texel == expected));
  }
}
