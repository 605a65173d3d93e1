//! Configuration parsing for frame replay.

use anyhow::{Context, Result};
use instance_map::{MapperConfig, SnapshotKind};
use serde::Deserialize;
use std::path::Path;

/// Root configuration for a replay run.
#[derive(Debug, Deserialize)]
pub struct ReplayConfig {
	/// Recording to replay, one JSON frame per line.
	pub recording: String,
	/// Output directory, relative to the config file.
	pub output_dir: String,
	/// Encoding of the background snapshot written at the end.
	#[serde(default = "default_snapshot")]
	pub snapshot: SnapshotKind,
	/// Stop after this many frames.
	#[serde(default)]
	pub max_frames: Option<usize>,
	/// No-entry rules applied to sensor grids.
	#[serde(default)]
	pub ground_as_no_entry: bool,
	#[serde(default)]
	pub free_as_no_entry: bool,
	/// Mapping parameters.
	#[serde(default)]
	pub mapper: MapperConfig,
}

fn default_snapshot() -> SnapshotKind {
	SnapshotKind::Binary
}

impl ReplayConfig {
	/// Load configuration from a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {}", path.display()))?;
		let config: ReplayConfig =
			toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;

		if config.recording.is_empty() {
			anyhow::bail!("recording path must not be empty");
		}
		if config.max_frames == Some(0) {
			anyhow::bail!("max_frames must be positive when set");
		}
		config
			.mapper
			.validate()
			.with_context(|| "Invalid [mapper] section")?;

		Ok(config)
	}
}
