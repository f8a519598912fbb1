//! Scene-mesh session replay.
//!
//! Feeds a synthetic room through the reconstruction core cycle by cycle,
//! renders frames from an orbiting camera in between and reports what every
//! cycle and frame cost. The final mesh can be exported as a byte blob.

mod config;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use scene_mesh::export::{export_snapshot, read_export};
use scene_mesh::frames::frame_channel;
use scene_mesh::pipeline::{CycleSummary, RenderStats};
use scene_mesh::{metrics, SceneReconstructor};

use config::Config;
use session::{OrbitCamera, Session};

/// Scene-mesh reconstruction replay.
#[derive(Parser, Debug)]
#[command(name = "scene_replay")]
#[command(about = "Replays a synthetic AR session through the scene-mesh core")]
struct Args {
	/// Path to configuration TOML file.
	#[arg(short, long)]
	config: PathBuf,

	/// Override the number of cycles.
	#[arg(long)]
	cycles: Option<u32>,

	/// Override the export path.
	#[arg(short, long)]
	export: Option<PathBuf>,

	/// How long to wait for a cycle still in flight at the end of its frames.
	#[arg(long, default_value_t = 30_000)]
	timeout_ms: u64,
}

fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.init();

	let args = Args::parse();
	println!("Loading config from: {}", args.config.display());
	let mut config = Config::load(&args.config)?;
	if let Some(cycles) = args.cycles {
		config.cycles = cycles.max(1);
	}
	if args.export.is_some() {
		config.export = args.export;
	}
	let timeout = Duration::from_millis(args.timeout_ms);

	let core = config.reconstruction();
	let mut reconstructor = SceneReconstructor::new(core);
	reconstructor.set_thermal_state(config.reconstruction.thermal_state.into());
	let session = Session::new(&config.room, config.seed);
	let camera = OrbitCamera::new(&config.camera);
	let (frames_tx, frames_rx) = frame_channel(&core.frames);

	println!(
		"Replaying {} cycles of {} frames (thermal state {:?})",
		config.cycles,
		config.frames_per_cycle,
		reconstructor.thermal_state()
	);

	let mut frame_index = 0u64;
	let mut last_reported = 0u64;
	for cycle in 0..config.cycles {
		let observation = session.observation(cycle);
		println!(
			"\nObservation {}: {} vertices, {} triangles",
			observation.generation,
			observation.vertex_count(),
			observation.triangle_count()
		);
		reconstructor.submit_mesh(observation);

		let mut last_frame = RenderStats::default();
		for _ in 0..config.frames_per_cycle {
			if frames_tx.try_send(camera.frame(frame_index)).is_err() {
				tracing::debug!(frame = frame_index, "frame queue full, dropping frame");
			}
			frame_index += 1;

			let start = reconstructor.begin_frame();
			if let Some(started) = start.started {
				tracing::info!(cycle = started, "reconstruction started");
			}
			last_frame = reconstructor.render_next(&frames_rx);
			if let Some(summary) = new_summary(&reconstructor, &mut last_reported) {
				report_cycle(&summary);
			}
		}

		if reconstructor.finish_in_flight(timeout) {
			if let Some(summary) = new_summary(&reconstructor, &mut last_reported) {
				report_cycle(&summary);
			}
		} else if reconstructor.is_matching() {
			anyhow::bail!("cycle still in flight after {timeout:?}");
		}
		report_frame(&last_frame);
	}

	report_session(&reconstructor);

	if let Some(path) = &config.export {
		let current = reconstructor
			.current()
			.context("No reconstruction was published, nothing to export")?;
		let blob = export_snapshot(current);
		let header = read_export(&blob).context("Exported blob failed its own header check")?;
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			std::fs::create_dir_all(parent)
				.with_context(|| format!("Failed to create output dir: {}", parent.display()))?;
		}
		std::fs::write(path, &blob).with_context(|| format!("Failed to write: {}", path.display()))?;
		println!(
			"\nExported cycle {} ({} vertices, {} triangles, {} bytes) to: {}",
			header.cycle,
			header.vertex_count,
			header.triangle_count,
			blob.len(),
			path.display()
		);
	}

	Ok(())
}

/// Summary of the latest swapped cycle, once per cycle.
fn new_summary(reconstructor: &SceneReconstructor, last_reported: &mut u64) -> Option<CycleSummary> {
	let summary = reconstructor.stats().last_cycle?;
	if summary.cycle == *last_reported {
		return None;
	}
	*last_reported = summary.cycle;
	Some(summary)
}

fn report_cycle(summary: &CycleSummary) {
	let stats = &summary.stats;
	println!(
		"  cycle {:>3} (generation {}): merged {} vertices, dropped {} triangles",
		summary.cycle, summary.generation, stats.dedup.merged_vertices, stats.dedup.dropped_triangles
	);
	println!(
		"    matched {}/{} ({:.1}%): vertex {}, color {}, micro {}",
		stats.matching.matched(),
		stats.matching.triangles,
		stats.matching.match_rate() * 100.0,
		stats.matching.vertex_pass,
		stats.matching.color_pass,
		stats.matching.micro_pass
	);
	println!(
		"    texels: {} copied, {} fresh, {} small + {} large",
		stats.texels.copied_triangles, stats.texels.fresh_triangles, stats.texels.small_texels, stats.texels.large_texels
	);
	let t = &summary.timings;
	println!(
		"    {} us: sort {}, dedup {}, match {}, texels {}, publish {} | {} command buffers, {} dispatches, {} growths",
		t.total_us(),
		t.sort_us,
		t.dedup_us,
		t.match_us,
		t.texel_us,
		t.publish_us,
		summary.dispatch.command_buffers,
		summary.dispatch.dispatches,
		summary.dispatch.buffer_growths
	);
}

fn report_frame(frame: &RenderStats) {
	println!(
		"  last frame: {} triangles drawn ({} sectors culled), {} of {} camera triangles visible, color {}",
		frame.render.triangles,
		frame.render.culled_sectors,
		frame.visibility.visible_triangles,
		frame.occlusion.triangles,
		match frame.color {
			Some(update) => format!("{} triangles / {} texels", update.triangles, update.texels),
			None => "not refreshed".to_string(),
		}
	);
}

fn report_session(reconstructor: &SceneReconstructor) {
	let stats = reconstructor.stats();
	println!(
		"\nSession: {} cycles started, {} swapped, {} skipped, {} workers lost",
		stats.cycles_started, stats.cycles_swapped, stats.skipped_cycles, stats.lost_workers
	);
	println!(
		"  {} frames ({} missing), {} color refreshes, {} skipped",
		stats.frames, stats.missing_frames, stats.color_updates, stats.skipped_color_updates
	);
	println!("  {} snapshot sets recycled", reconstructor.arena().recycled());

	if metrics::is_enabled() {
		let m = reconstructor.metrics();
		println!(
			"  avg cycle {:.0} us, avg match rate {:.1}%, {} fresh triangles total",
			m.avg_cycle_timing_us(),
			m.avg_match_rate() * 100.0,
			m.total_fresh_triangles
		);
	}
}
