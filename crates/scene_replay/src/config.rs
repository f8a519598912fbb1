//! Configuration parsing for session replays.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use scene_mesh::config::{
	DedupConfig, FrameConfig, MatcherConfig, OcclusionConfig, ReconstructionConfig, TexelConfig,
	TriggerConfig,
};
use scene_mesh::ThermalState;

/// Root configuration for a replay.
#[derive(Debug, Deserialize)]
pub struct Config {
	/// Number of reconstruction cycles to run.
	pub cycles: u32,
	/// Render frames between mesh updates.
	pub frames_per_cycle: u32,
	/// Seed of the per-cycle perturbation.
	#[serde(default = "default_seed")]
	pub seed: u64,
	/// Where to write the final mesh export, if anywhere.
	#[serde(default)]
	pub export: Option<PathBuf>,
	pub room: RoomConfig,
	pub camera: CameraConfig,
	#[serde(default)]
	pub reconstruction: TuningConfig,
}

/// Synthetic room the session observes.
#[derive(Debug, Deserialize)]
pub struct RoomConfig {
	/// Half the floor's edge length, in meters.
	pub half_extent: f32,
	/// Wall height, in meters.
	pub height: f32,
	/// Distance between grid vertices.
	pub spacing: f32,
	/// Per-cycle random displacement of every vertex, in meters.
	#[serde(default)]
	pub perturbation: f32,
}

/// Synthetic camera orbiting the room center.
#[derive(Debug, Deserialize)]
pub struct CameraConfig {
	pub eye: [f32; 3],
	pub target: [f32; 3],
	/// Vertical field of view, in degrees.
	#[serde(default = "default_fov")]
	pub fov_degrees: f32,
	/// Orbit speed around the vertical axis through the target.
	#[serde(default)]
	pub orbit_degrees_per_frame: f32,
	/// Eye separation for stereo rendering. Mono when absent.
	#[serde(default)]
	pub stereo_ipd: Option<f32>,
	#[serde(default = "default_image_width")]
	pub image_width: u32,
	#[serde(default = "default_image_height")]
	pub image_height: u32,
}

/// Knobs of the reconstruction core. Missing values keep the core defaults.
#[derive(Debug, Default, Deserialize)]
pub struct TuningConfig {
	pub min_frames_between_cycles: Option<u32>,
	pub texel_size: Option<f32>,
	pub dedup_tolerance: Option<f32>,
	pub vertex_tolerance: Option<f32>,
	pub color_passes: Option<bool>,
	pub occlusion_resolution: Option<[u32; 2]>,
	pub frame_buffering: Option<usize>,
	#[serde(default)]
	pub thermal_state: ThermalSetting,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermalSetting {
	#[default]
	Nominal,
	Fair,
	Serious,
	Critical,
}

impl From<ThermalSetting> for ThermalState {
	fn from(setting: ThermalSetting) -> Self {
		match setting {
			ThermalSetting::Nominal => ThermalState::Nominal,
			ThermalSetting::Fair => ThermalState::Fair,
			ThermalSetting::Serious => ThermalState::Serious,
			ThermalSetting::Critical => ThermalState::Critical,
		}
	}
}

fn default_seed() -> u64 {
	1
}

fn default_fov() -> f32 {
	60.0
}

fn default_image_width() -> u32 {
	256
}

fn default_image_height() -> u32 {
	192
}

impl Config {
	/// Load configuration from a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {}", path.display()))?;
		Self::parse(&content)
	}

	pub fn parse(content: &str) -> Result<Self> {
		let config: Config = toml::from_str(content).context("Failed to parse config TOML")?;

		if config.cycles == 0 {
			anyhow::bail!("cycles must be at least 1");
		}
		if config.room.spacing <= 0.0 || config.room.half_extent <= 0.0 || config.room.height <= 0.0 {
			anyhow::bail!("room dimensions and spacing must be positive");
		}
		if config.camera.image_width == 0 || config.camera.image_height == 0 {
			anyhow::bail!(
				"camera image must not be empty, got {}x{}",
				config.camera.image_width,
				config.camera.image_height
			);
		}

		Ok(config)
	}

	/// Core configuration with this replay's overrides applied.
	pub fn reconstruction(&self) -> ReconstructionConfig {
		let tuning = &self.reconstruction;
		let mut config = ReconstructionConfig::default();

		if let Some(frames) = tuning.min_frames_between_cycles {
			config = config.with_trigger(TriggerConfig::default().with_min_frames_between_cycles(frames));
		}
		if let Some(size) = tuning.texel_size {
			config = config.with_texel(TexelConfig::default().with_texel_size(size));
		}
		if let Some(tolerance) = tuning.dedup_tolerance {
			config = config.with_dedup(DedupConfig::default().with_tolerance(tolerance));
		}
		let mut matcher = MatcherConfig::default();
		if let Some(tolerance) = tuning.vertex_tolerance {
			matcher = matcher.with_vertex_tolerance(tolerance);
		}
		if let Some(enabled) = tuning.color_passes {
			matcher = matcher.with_color_passes(enabled);
		}
		config = config.with_matcher(matcher);
		if let Some([width, height]) = tuning.occlusion_resolution {
			config = config.with_occlusion(OcclusionConfig::default().with_resolution(width, height));
		}
		if let Some(frames) = tuning.frame_buffering {
			config = config.with_frames(FrameConfig::default().with_buffering(frames));
		}

		config
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
		cycles = 3
		frames_per_cycle = 10

		[room]
		half_extent = 2.0
		height = 2.5
		spacing = 0.1

		[camera]
		eye = [0.0, 1.6, 1.5]
		target = [0.0, 1.0, -1.0]
	"#;

	#[test]
	fn test_minimal_config_keeps_core_defaults() {
		let config = Config::parse(MINIMAL).expect("parse");
		assert_eq!(config.seed, 1);
		assert!(config.export.is_none());
		assert_eq!(config.camera.image_width, 256);
		assert_eq!(config.reconstruction(), ReconstructionConfig::default());
	}

	#[test]
	fn test_overrides_reach_the_builders() {
		let content = format!(
			"{MINIMAL}\n[reconstruction]\nmin_frames_between_cycles = 4\ntexel_size = 0.05\nthermal_state = \"serious\"\n"
		);
		let config = Config::parse(&content).expect("parse");
		let core = config.reconstruction();
		assert_eq!(core.trigger.min_frames_between_cycles, 4);
		assert_eq!(core.texel.texel_size, 0.05);
		assert_eq!(ThermalState::from(config.reconstruction.thermal_state), ThermalState::Serious);
	}

	#[test]
	fn test_rejects_zero_cycles() {
		let content = MINIMAL.replace("cycles = 3", "cycles = 0");
		assert!(Config::parse(&content).is_err());
	}
}
