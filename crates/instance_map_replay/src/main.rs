//! Labelled depth frame replay.
//!
//! Streams a recorded session through the mapping server and writes the
//! resulting background map and per-object grid summary.
//!
//! Outputs:
//! - background.bt / background.ot: binary or full background snapshot
//! - grids.json: world grid summary of every tracked object

mod config;
mod recording;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{self as channel, Receiver, Sender};
use glam::DAffine3;
use instance_map::{
	ClassId, FrameInput, InstanceId, MappingServer, SnapshotKind, Timestamp, TransformSource,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use config::ReplayConfig;
use recording::RecordedFrame;

/// Frames buffered between the loader thread and the mapper.
const FRAME_QUEUE: usize = 5;

/// Replay recorded labelled depth frames through the instance mapper.
#[derive(Parser, Debug)]
#[command(name = "replay_frames")]
#[command(about = "Replays a labelled depth recording into an instance map")]
struct Args {
	/// Path to configuration TOML file.
	#[arg(short, long)]
	config: PathBuf,

	/// Output directory (default: from config, relative to the config file).
	#[arg(short, long)]
	output_dir: Option<PathBuf>,
}

/// Sensor poses read from the recording, keyed by frame stamp.
#[derive(Clone, Default)]
struct RecordedPoses(Arc<RwLock<BTreeMap<Timestamp, DAffine3>>>);

impl RecordedPoses {
	fn insert(&self, stamp: Timestamp, pose: DAffine3) {
		self.0.write().insert(stamp, pose);
	}

	fn forget(&self, stamp: Timestamp) {
		self.0.write().remove(&stamp);
	}
}

impl TransformSource for RecordedPoses {
	fn lookup(&self, _target_frame: &str, _source_frame: &str, stamp: Timestamp) -> Option<DAffine3> {
		self.0.read().get(&stamp).copied()
	}
}

/// Per-object entry of grids.json.
#[derive(Debug, Serialize)]
struct GridSummary {
	instance_id: InstanceId,
	class_id: ClassId,
	pitch: f64,
	origin: [f64; 3],
	occupied: usize,
}

fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive("instance_map=info".parse()?)
				.add_directive("replay_frames=info".parse()?),
		)
		.init();

	let args = Args::parse();
	let base_dir = args
		.config
		.parent()
		.unwrap_or(Path::new("."))
		.to_path_buf();

	tracing::info!(config = %args.config.display(), "loading config");
	let config = ReplayConfig::load(&args.config)?;
	let output_dir = args
		.output_dir
		.unwrap_or_else(|| base_dir.join(&config.output_dir));

	let poses = RecordedPoses::default();
	let server = MappingServer::new(config.mapper.clone())?.with_transforms(poses.clone());
	server.configure(config.ground_as_no_entry, config.free_as_no_entry);

	// Loader thread: parse frames ahead of the mapper
	let recording = base_dir.join(&config.recording);
	let (sender, receiver) = channel::bounded(FRAME_QUEUE);
	let loader = {
		let poses = poses.clone();
		let max_frames = config.max_frames;
		thread::spawn(move || load_frames(&recording, &poses, max_frames, sender))
	};

	let (processed, dropped) = replay(&server, &poses, receiver);
	let skipped = loader
		.join()
		.map_err(|_| anyhow::anyhow!("frame loader panicked"))??;

	tracing::info!(processed, dropped, skipped, "replay finished");

	std::fs::create_dir_all(&output_dir)
		.with_context(|| format!("Failed to create output dir: {}", output_dir.display()))?;
	write_snapshot(&server, config.snapshot, &output_dir)?;
	write_grids(&server, &output_dir)?;

	tracing::info!(output = %output_dir.display(), "done");
	Ok(())
}

/// Read the recording line by line, returning the number of malformed
/// frames skipped.
fn load_frames(
	path: &Path,
	poses: &RecordedPoses,
	max_frames: Option<usize>,
	sender: Sender<FrameInput>,
) -> Result<usize> {
	let file =
		File::open(path).with_context(|| format!("Failed to open recording: {}", path.display()))?;
	let limit = max_frames.unwrap_or(usize::MAX);
	let mut sent = 0;
	let mut skipped = 0;

	for (line_no, line) in BufReader::new(file).lines().enumerate() {
		if sent >= limit {
			break;
		}
		let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
		if line.trim().is_empty() {
			continue;
		}

		let parsed = serde_json::from_str::<RecordedFrame>(&line)
			.with_context(|| format!("line {}", line_no + 1))
			.and_then(|frame| {
				let pose = frame.sensor_to_world()?;
				Ok((pose, frame.into_input()?))
			});
		let (pose, input) = match parsed {
			Ok(parsed) => parsed,
			Err(error) => {
				tracing::warn!("skipping malformed frame: {error:#}");
				skipped += 1;
				continue;
			}
		};

		poses.insert(input.stamp, pose);
		if sender.send(input).is_err() {
			// mapper stopped
			break;
		}
		sent += 1;
	}
	Ok(skipped)
}

/// Feed frames to the server until the loader closes the channel.
fn replay(server: &MappingServer, poses: &RecordedPoses, receiver: Receiver<FrameInput>) -> (usize, usize) {
	let mut processed = 0;
	let mut dropped = 0;

	for input in receiver {
		match server.process_frame(&input) {
			Ok(output) => {
				processed += 1;
				tracing::debug!(
					stamp = input.stamp.0,
					points = output.stats.points,
					active = output.active_instances.len(),
					grids = output.grids.len(),
					"frame integrated"
				);
			}
			Err(error) => {
				dropped += 1;
				tracing::warn!(code = error.code(), %error, "frame dropped");
			}
		}
		poses.forget(input.stamp);

		if processed > 0 && processed % 100 == 0 {
			tracing::info!(processed, instances = server.classes().len(), "progress");
		}
	}
	(processed, dropped)
}

fn write_snapshot(server: &MappingServer, kind: SnapshotKind, output_dir: &Path) -> Result<()> {
	let snapshot = server
		.query_map_snapshot(kind)
		.context("Failed to encode background map")?;
	let name = match kind {
		SnapshotKind::Binary => "background.bt",
		SnapshotKind::Full => "background.ot",
	};
	let path = output_dir.join(name);
	std::fs::write(&path, &snapshot.bytes)
		.with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
	tracing::info!(
		path = %path.display(),
		nodes = snapshot.node_count,
		bytes = snapshot.bytes.len(),
		"wrote background snapshot"
	);
	Ok(())
}

fn write_grids(server: &MappingServer, output_dir: &Path) -> Result<()> {
	let stamp = Timestamp::now();
	let grids = server
		.query_world_grids(stamp)
		.context("Failed to extract world grids")?;
	let summary: Vec<GridSummary> = grids
		.iter()
		.map(|grid| GridSummary {
			instance_id: grid.instance_id,
			class_id: grid.class_id,
			pitch: grid.pitch,
			origin: grid.origin.to_array(),
			occupied: grid.len(),
		})
		.collect();

	let path = output_dir.join("grids.json");
	let file = File::create(&path)
		.with_context(|| format!("Failed to create {}", path.display()))?;
	serde_json::to_writer_pretty(file, &summary).context("Failed to write grids.json")?;
	tracing::info!(path = %path.display(), objects = summary.len(), "wrote grid summary");
	Ok(())
}
