//! Recorded frame format.
//!
//! A recording is a JSON-lines file; every line is one [`RecordedFrame`]:
//!
//! ```text
//! {"stamp_ns": 1000, "width": 640, "height": 480,
//!  "intrinsics": [fx, fy, cx, cy],
//!  "translation": [x, y, z], "rotation": [x, y, z, w],
//!  "points": [[x, y, z] | null, ...], "labels": [id, ...],
//!  "classes": [[instance_id, class_id], ...]}
//! ```
//!
//! Points are in the sensor frame; `null` marks missing depth. The pose is
//! sensor-to-world.

use anyhow::{ensure, Result};
use glam::{DAffine3, DQuat, DVec3};
use instance_map::{CameraIntrinsics, ClassId, FrameInput, InstanceId, LabelImage, PointImage, Timestamp};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RecordedFrame {
	pub stamp_ns: u64,
	pub width: usize,
	pub height: usize,
	pub intrinsics: [f64; 4],
	pub translation: [f64; 3],
	/// Quaternion, `[x, y, z, w]`.
	pub rotation: [f64; 4],
	pub points: Vec<Option<[f64; 3]>>,
	pub labels: Vec<InstanceId>,
	#[serde(default)]
	pub classes: Vec<(InstanceId, ClassId)>,
}

impl RecordedFrame {
	pub fn stamp(&self) -> Timestamp {
		Timestamp::from_nanos(self.stamp_ns)
	}

	pub fn sensor_to_world(&self) -> Result<DAffine3> {
		let rotation = DQuat::from_array(self.rotation);
		ensure!(rotation.is_finite() && rotation.length() > 0.0, "degenerate rotation");
		Ok(DAffine3::from_rotation_translation(
			rotation.normalize(),
			DVec3::from_array(self.translation),
		))
	}

	/// Convert into a frame the mapping server accepts.
	pub fn into_input(self) -> Result<FrameInput> {
		let pixels = self.width * self.height;
		ensure!(
			self.points.len() == pixels,
			"frame {} has {} points for {}x{} pixels",
			self.stamp_ns,
			self.points.len(),
			self.width,
			self.height
		);
		ensure!(
			self.labels.len() == pixels,
			"frame {} has {} labels for {}x{} pixels",
			self.stamp_ns,
			self.labels.len(),
			self.width,
			self.height
		);

		let [fx, fy, cx, cy] = self.intrinsics;
		let points = self
			.points
			.iter()
			.map(|p| p.map_or(DVec3::NAN, DVec3::from_array))
			.collect();

		Ok(FrameInput {
			stamp: self.stamp(),
			intrinsics: CameraIntrinsics::new(fx, fy, cx, cy),
			points: PointImage::new(self.width, self.height, points),
			labels: LabelImage::new(self.width, self.height, self.labels),
			classes: self.classes.into_iter().collect(),
		})
	}
}
