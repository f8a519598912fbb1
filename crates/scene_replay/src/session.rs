//! Synthetic AR session: a room observed by an orbiting camera.

use glam::{Mat4, Quat, Vec3};
use scene_mesh::frames::CameraFrame;
use scene_mesh::occlusion::{ColorImage, SegmentationMask};
use scene_mesh::synthetic::{self, look_at, stereo_look_at};
use scene_mesh::RawMesh;

use crate::config::{CameraConfig, RoomConfig};

/// Observations of one replay, cycle by cycle.
pub struct Session {
	room: RawMesh,
	perturbation: f32,
	seed: u64,
}

impl Session {
	pub fn new(config: &RoomConfig, seed: u64) -> Self {
		Self {
			room: synthetic::room(config.half_extent, config.height, config.spacing),
			perturbation: config.perturbation,
			seed,
		}
	}

	/// Mesh the upstream reducer reports for `cycle`.
	pub fn observation(&self, cycle: u32) -> RawMesh {
		let generation = cycle as u64 + 1;
		if cycle == 0 || self.perturbation <= 0.0 {
			return self.room.clone().with_generation(generation);
		}
		synthetic::perturbed(&self.room, self.perturbation, self.seed.wrapping_add(cycle as u64))
			.with_generation(generation)
	}
}

/// Camera orbiting its target around the vertical axis.
pub struct OrbitCamera {
	eye: Vec3,
	target: Vec3,
	fov_y: f32,
	step: f32,
	stereo_ipd: Option<f32>,
	image: ColorImage,
	mask: SegmentationMask,
}

impl OrbitCamera {
	pub fn new(config: &CameraConfig) -> Self {
		let (width, height) = (config.image_width, config.image_height);
		Self {
			eye: Vec3::from_array(config.eye),
			target: Vec3::from_array(config.target),
			fov_y: config.fov_degrees.to_radians(),
			step: config.orbit_degrees_per_frame.to_radians(),
			stereo_ipd: config.stereo_ipd,
			image: gradient(width, height),
			mask: SegmentationMask::clear(width, height),
		}
	}

	fn aspect(&self) -> f32 {
		self.image.width as f32 / self.image.height as f32
	}

	/// Eye position at frame `index`.
	pub fn eye_at(&self, index: u64) -> Vec3 {
		let rotation = Quat::from_rotation_y(self.step * index as f32);
		self.target + rotation * (self.eye - self.target)
	}

	pub fn frame(&self, index: u64) -> CameraFrame {
		let eye = self.eye_at(index);
		let view_projection = look_at(eye, self.target, self.fov_y, self.aspect());
		let pose = Mat4::look_at_rh(eye, self.target, Vec3::Y).inverse();
		let frame = CameraFrame::new(index, pose, view_projection, self.image.clone(), self.mask.clone());
		match self.stereo_ipd {
			Some(ipd) => frame.with_eye_views(stereo_look_at(eye, self.target, ipd, self.fov_y, self.aspect())),
			None => frame,
		}
	}
}

/// Camera image varying across both axes, so painted texels show where
/// they were sampled.
fn gradient(width: u32, height: u32) -> ColorImage {
	let pixels = (0..height)
		.flat_map(|y| {
			(0..width).map(move |x| {
				[
					(x * 255 / width.max(1)) as u8,
					(y * 255 / height.max(1)) as u8,
					160,
					255,
				]
			})
		})
		.collect();
	ColorImage::new(width, height, pixels)
}
