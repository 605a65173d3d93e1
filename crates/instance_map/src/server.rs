//! Mapping server: the frame-level entry point.
//!
//! Owns the registry behind one frame-wide mutex, so a reset can never
//! interleave with a frame. Collaborators the server does not implement
//! (pose lookup, instance association, remote rendering) are injected as
//! trait objects.
//!
//! ```text
//! process_frame
//!   stale check ─► transform ─► points to world ─► render ─► associate
//!       ─► merge known classes ─► integrate ─► sensor grids + no-entry
//! ```

use glam::DAffine3;
use parking_lot::Mutex;
use web_time::Instant;

use crate::config::MapperConfig;
use crate::error::{ConfigError, FrameError, RenderServiceError, SnapshotError};
use crate::metrics::{MapMetrics, Stage};
use crate::octree::{codec, MapSnapshot, SnapshotKind};
use crate::pipeline::{self, GridPair, InstanceCubes, IntegrationStats, NoEntryPolicy, SensorPose, VoxelGrid};
use crate::registry::{Epoch, Registry};
use crate::types::{CameraIntrinsics, ClassId, ClassMap, InstanceId, LabelImage, PointImage, Timestamp};

// =============================================================================
// Collaborators
// =============================================================================

/// Rigid transform lookup between named frames.
pub trait TransformSource: Send + Sync {
  /// Transform taking points in `source_frame` to `target_frame` at `stamp`.
  fn lookup(&self, target_frame: &str, source_frame: &str, stamp: Timestamp) -> Option<DAffine3>;
}

/// Same transform for every lookup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticTransform(pub DAffine3);

impl TransformSource for StaticTransform {
  fn lookup(&self, _target_frame: &str, _source_frame: &str, _stamp: Timestamp) -> Option<DAffine3> {
    Some(self.0)
  }
}

/// Maps detector labels onto registry instance IDs.
///
/// May allocate new IDs by advancing `counter`, which must stay above every
/// ID it has handed out.
pub trait InstanceAssociator: Send + Sync {
  fn associate(
    &self,
    rendered: &LabelImage,
    observed: &LabelImage,
    classes: &ClassMap,
    counter: &mut InstanceId,
  ) -> (LabelImage, ClassMap);
}

/// Uses detector labels as instance IDs unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughAssociator;

impl InstanceAssociator for PassthroughAssociator {
  fn associate(
    &self,
    _rendered: &LabelImage,
    observed: &LabelImage,
    classes: &ClassMap,
    counter: &mut InstanceId,
  ) -> (LabelImage, ClassMap) {
    if let Some(&max_id) = observed.unique().last() {
      *counter = (*counter).max(max_id.saturating_add(1));
    }
    (observed.clone(), classes.clone())
  }
}

/// What a remote renderer receives.
#[derive(Debug)]
pub struct RenderRequest<'a> {
  pub pose: &'a SensorPose,
  /// Sensor-frame points of the current frame.
  pub points: &'a PointImage,
  /// World grids of every tracked object.
  pub grids: &'a [VoxelGrid],
}

/// Out-of-process label renderer, used instead of the local one when
/// `use_render_service` is set.
pub trait RenderService: Send + Sync {
  fn render(&self, request: &RenderRequest<'_>) -> Result<LabelImage, RenderServiceError>;
}

// =============================================================================
// Frame I/O
// =============================================================================

/// One camera frame in the sensor frame.
#[derive(Clone, Debug)]
pub struct FrameInput {
  pub stamp: Timestamp,
  pub intrinsics: CameraIntrinsics,
  /// Sensor-frame points, NaN where depth is missing.
  pub points: PointImage,
  /// Detector instance labels.
  pub labels: LabelImage,
  /// Detector class per labelled instance.
  pub classes: ClassMap,
}

/// Result of a fully processed frame.
#[derive(Clone, Debug)]
pub struct FrameOutput {
  /// Labels predicted from the map before integration.
  pub rendered_labels: LabelImage,
  /// Labels after association, as integrated.
  pub tracked_labels: LabelImage,
  /// Class of every instance in the tracked labels.
  pub classes: ClassMap,
  /// Sensor-frame object and no-entry grids.
  pub grids: Vec<GridPair>,
  /// Instances present in the rendered labels, ascending.
  pub active_instances: Vec<InstanceId>,
  pub stats: IntegrationStats,
}

// =============================================================================
// MappingServer
// =============================================================================

struct ServerState {
  registry: Registry,
  config: MapperConfig,
  /// Frames stamped before this are stale.
  reset_stamp: Timestamp,
  metrics: MapMetrics,
}

impl ServerState {
  fn check_stale(&mut self, stamp: Timestamp) -> Result<(), FrameError> {
    if stamp < self.reset_stamp {
      tracing::debug!(stamp = stamp.0, reset = self.reset_stamp.0, "dropping stale frame");
      return Err(self.drop_frame(FrameError::StaleFrame {
        stamp,
        reset: self.reset_stamp,
      }));
    }
    Ok(())
  }

  fn drop_frame(&mut self, error: FrameError) -> FrameError {
    self.metrics.record_drop(error.code());
    error
  }
}

/// Thread-safe owner of the instance map.
pub struct MappingServer {
  state: Mutex<ServerState>,
  transforms: Box<dyn TransformSource>,
  associator: Box<dyn InstanceAssociator>,
  render_service: Option<Box<dyn RenderService>>,
}

impl MappingServer {
  /// Server with identity transforms and pass-through association.
  pub fn new(config: MapperConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    tracing::info!(
      resolution = config.resolution,
      world_frame = %config.world_frame,
      sensor_frame = %config.sensor_frame,
      "mapping server started"
    );
    Ok(Self {
      state: Mutex::new(ServerState {
        registry: Registry::new(),
        config,
        reset_stamp: Timestamp::default(),
        metrics: MapMetrics::new(),
      }),
      transforms: Box::new(StaticTransform(DAffine3::IDENTITY)),
      associator: Box::new(PassthroughAssociator),
      render_service: None,
    })
  }

  pub fn with_transforms(mut self, transforms: impl TransformSource + 'static) -> Self {
    self.transforms = Box::new(transforms);
    self
  }

  pub fn with_associator(mut self, associator: impl InstanceAssociator + 'static) -> Self {
    self.associator = Box::new(associator);
    self
  }

  pub fn with_render_service(mut self, service: impl RenderService + 'static) -> Self {
    self.render_service = Some(Box::new(service));
    self
  }

  // ===========================================================================
  // Commands
  // ===========================================================================

  /// Clear the map now. Frames stamped earlier are dropped from here on.
  pub fn reset(&self) -> Epoch {
    self.reset_at(Timestamp::now())
  }

  /// Clear the map and drop frames stamped before `stamp`.
  pub fn reset_at(&self, stamp: Timestamp) -> Epoch {
    let mut state = self.state.lock();
    state.reset_stamp = stamp;
    state.metrics.reset();
    let epoch = state.registry.reset();
    tracing::info!(epoch = epoch.0, stamp = stamp.0, "map reset");
    epoch
  }

  /// Set the no-entry rules used by subsequent sensor grid queries.
  pub fn configure(&self, ground_as_no_entry: bool, free_as_no_entry: bool) {
    let policy = NoEntryPolicy {
      ground_as_no_entry,
      free_as_no_entry,
    };
    self.state.lock().config.no_entry = policy;
    tracing::info!(ground_as_no_entry, free_as_no_entry, "no-entry policy updated");
  }

  /// Integrate sensor-frame points already labelled with registry IDs.
  pub fn ingest(
    &self,
    pose: &SensorPose,
    points: &PointImage,
    labels: &LabelImage,
    classes: &ClassMap,
    stamp: Timestamp,
  ) -> Result<IntegrationStats, FrameError> {
    let mut state = self.state.lock();
    state.check_stale(stamp)?;

    let world_points = points.transformed(&pose.sensor_to_world);
    let mut classes = classes.clone();
    state.registry.merge_known_classes(&mut classes);

    let ServerState {
      registry,
      config,
      metrics,
      ..
    } = &mut *state;
    let start = Instant::now();
    let result = pipeline::integrate(registry, config, pose.origin(), &world_points, labels, &classes);
    metrics.record_stage(Stage::Integrate, start.elapsed().as_micros() as u64);
    if let Err(error) = &result {
      metrics.record_drop(error.code());
    }
    result
  }

  /// Run a camera frame through the whole pipeline.
  pub fn process_frame(&self, input: &FrameInput) -> Result<FrameOutput, FrameError> {
    let frame_start = Instant::now();
    let mut state = self.state.lock();
    state.check_stale(input.stamp)?;
    if !input.labels.same_shape(&input.points) {
      return Err(state.drop_frame(FrameError::shape_mismatch(&input.labels, &input.points)));
    }

    let Some(sensor_to_world) =
      self
        .transforms
        .lookup(&state.config.world_frame, &state.config.sensor_frame, input.stamp)
    else {
      tracing::warn!(
        target_frame = %state.config.world_frame,
        source_frame = %state.config.sensor_frame,
        stamp = input.stamp.0,
        "no transform for frame"
      );
      let error = FrameError::MissingTransform {
        target_frame: state.config.world_frame.clone(),
        source_frame: state.config.sensor_frame.clone(),
        stamp: input.stamp,
      };
      return Err(state.drop_frame(error));
    };

    let pose = SensorPose::new(sensor_to_world, input.intrinsics);
    let world_points = input.points.transformed(&sensor_to_world);

    let start = Instant::now();
    let rendered = self.render_labels(&mut state, &pose, &input.points, &world_points);
    state.metrics.record_stage(Stage::Render, start.elapsed().as_micros() as u64);

    let ServerState {
      registry,
      config,
      metrics,
      ..
    } = &mut *state;

    let (tracked, mut classes) = self.associator.associate(
      &rendered,
      &input.labels,
      &input.classes,
      registry.instance_counter_mut(),
    );
    registry.merge_known_classes(&mut classes);

    let start = Instant::now();
    let integrated = pipeline::integrate(registry, config, pose.origin(), &world_points, &tracked, &classes);
    metrics.record_stage(Stage::Integrate, start.elapsed().as_micros() as u64);
    let stats = match integrated {
      Ok(stats) => stats,
      Err(error) => {
        metrics.record_drop(error.code());
        return Err(error);
      }
    };

    let start = Instant::now();
    let grids = pipeline::sensor_grids(registry, &sensor_to_world, config.no_entry);
    metrics.record_stage(Stage::Extract, start.elapsed().as_micros() as u64);

    let active_instances = active_in(&rendered);
    metrics.record_frame(frame_start.elapsed().as_micros() as u64);
    tracing::debug!(
      stamp = input.stamp.0,
      instances = registry.len(),
      active = active_instances.len(),
      "processed frame"
    );

    Ok(FrameOutput {
      rendered_labels: rendered,
      tracked_labels: tracked,
      classes,
      grids,
      active_instances,
      stats,
    })
  }

  /// Remote render when enabled and available, local otherwise.
  fn render_labels(
    &self,
    state: &mut ServerState,
    pose: &SensorPose,
    sensor_points: &PointImage,
    world_points: &PointImage,
  ) -> LabelImage {
    if let (true, Some(service)) = (state.config.use_render_service, self.render_service.as_ref()) {
      let grids = pipeline::world_grids(&state.registry);
      let request = RenderRequest {
        pose,
        points: sensor_points,
        grids: &grids,
      };
      let remote = service.render(&request).and_then(|labels| {
        if labels.same_shape(world_points) {
          Ok(labels)
        } else {
          Err(RenderServiceError::ShapeMismatch {
            width: labels.width,
            height: labels.height,
            len: labels.labels.len(),
            expected_width: world_points.width,
            expected_height: world_points.height,
          })
        }
      });
      match remote {
        Ok(labels) => {
          state.metrics.record_remote_render(false);
          return labels;
        }
        Err(error) => {
          tracing::warn!(%error, "remote render failed, rendering locally");
          state.metrics.record_remote_render(true);
        }
      }
    }
    pipeline::render(&state.registry, pose, world_points).labels
  }

  // ===========================================================================
  // Queries
  // ===========================================================================

  /// World-frame grids of every tracked object.
  pub fn query_world_grids(&self, stamp: Timestamp) -> Result<Vec<VoxelGrid>, FrameError> {
    let mut state = self.state.lock();
    state.check_stale(stamp)?;
    Ok(pipeline::world_grids(&state.registry))
  }

  /// Sensor-frame object grids and no-entry grids for `pose`.
  pub fn query_sensor_grids_and_no_entry(
    &self,
    pose: &SensorPose,
    stamp: Timestamp,
  ) -> Result<Vec<GridPair>, FrameError> {
    let mut state = self.state.lock();
    state.check_stale(stamp)?;
    Ok(pipeline::sensor_grids(&state.registry, &pose.sensor_to_world, state.config.no_entry))
  }

  /// Serialized background map.
  pub fn query_map_snapshot(&self, kind: SnapshotKind) -> Result<MapSnapshot, SnapshotError> {
    let state = self.state.lock();
    let background = state.registry.background().ok_or(SnapshotError::EmptyMap)?;
    codec::encode(&background.index, kind)
  }

  /// Occupancy cubes of every index for visualization.
  pub fn query_cubes(&self) -> Vec<InstanceCubes> {
    let state = self.state.lock();
    pipeline::occupancy_cubes(&state.registry, state.config.filter_speckles)
  }

  /// `(instance_id, class_id)` of every tracked object, ascending.
  pub fn classes(&self) -> Vec<(InstanceId, ClassId)> {
    self.state.lock().registry.classes()
  }

  pub fn epoch(&self) -> Epoch {
    self.state.lock().registry.epoch()
  }

  pub fn no_entry_policy(&self) -> NoEntryPolicy {
    self.state.lock().config.no_entry
  }

  pub fn config(&self) -> MapperConfig {
    self.state.lock().config.clone()
  }

  /// Run `f` with read access to the registry, holding the frame lock.
  pub fn with_registry<R>(&self, f: impl FnOnce(&Registry) -> R) -> R {
    f(&self.state.lock().registry)
  }

  pub fn metrics(&self) -> MapMetrics {
    self.state.lock().metrics.clone()
  }
}

fn active_in(labels: &LabelImage) -> Vec<InstanceId> {
  labels
    .unique()
    .into_iter()
    .filter(|&id| crate::types::is_foreground(id))
    .collect()
}

#[cfg(test)]
#[path = "server_test.rs"]
mod server_test;
