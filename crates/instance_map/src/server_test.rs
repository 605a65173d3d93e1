use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use super::*;
use crate::pipeline::test_utils::{identity_pose, plane_points, test_intrinsics};
use crate::types::{BACKGROUND, UNCERTAIN};

const W: usize = 4;
const H: usize = 4;
const DEPTH: f64 = 1.1;

/// Plane at depth 1.1, left half instance 1, right half background.
fn frame(stamp: u64, classes: &[(InstanceId, ClassId)]) -> FrameInput {
  let pose = identity_pose(W, H);
  let mut labels = LabelImage::filled(W, H, BACKGROUND);
  for row in 0..H {
    for col in 0..W / 2 {
      labels.set(row, col, 1);
    }
  }
  FrameInput {
    stamp: Timestamp(stamp),
    intrinsics: test_intrinsics(W, H),
    points: plane_points(&pose, W, H, DEPTH),
    labels,
    classes: classes.iter().copied().collect(),
  }
}

fn server() -> MappingServer {
  MappingServer::new(MapperConfig::default()).unwrap()
}

struct NoTransform;

impl TransformSource for NoTransform {
  fn lookup(&self, _target_frame: &str, _source_frame: &str, _stamp: Timestamp) -> Option<DAffine3> {
    None
  }
}

/// Returns a label image whose buffer is shorter than its stated size.
struct TruncatedRenderer;

impl RenderService for TruncatedRenderer {
  fn render(&self, request: &RenderRequest<'_>) -> Result<LabelImage, RenderServiceError> {
    Ok(LabelImage {
      width: request.points.width,
      height: request.points.height,
      labels: Vec::new(),
    })
  }
}

/// Renders every pixel as `label`, or fails when `label` is `None`.
struct FixedRenderer {
  label: Option<InstanceId>,
  calls: Arc<AtomicUsize>,
}

impl RenderService for FixedRenderer {
  fn render(&self, request: &RenderRequest<'_>) -> Result<LabelImage, RenderServiceError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    match self.label {
      Some(label) => Ok(LabelImage::filled(request.points.width, request.points.height, label)),
      None => Err(RenderServiceError::Unavailable("connection refused".to_string())),
    }
  }
}

#[test]
fn test_invalid_config_rejected() {
  let config = MapperConfig {
    resolution: 0.0,
    ..Default::default()
  };
  assert!(matches!(MappingServer::new(config), Err(ConfigError::InvalidResolution(_))));
}

#[test]
fn test_process_frame_builds_map() {
  let server = server();
  let output = server.process_frame(&frame(10, &[(1, 2)])).unwrap();

  assert_eq!(output.stats.points, 4);
  assert!(output.rendered_labels.labels.iter().all(|&l| l == UNCERTAIN));
  assert!(output.active_instances.is_empty());
  assert_eq!(output.tracked_labels.get(0, 0), 1);
  assert_eq!(output.grids.len(), 1);
  assert_eq!(output.grids[0].object.instance_id, 1);
  assert!(!output.grids[0].object.is_empty());
  assert_eq!(server.classes(), vec![(1, 2)]);

  // the second frame sees instance 1 in the rendered labels
  let output = server.process_frame(&frame(20, &[(1, 2)])).unwrap();
  assert_eq!(output.rendered_labels.get(0, 0), 1);
  assert_eq!(output.active_instances, vec![1]);
}

/// Instance classes from earlier frames fill gaps in the frame's class map.
#[test]
fn test_known_classes_merged() {
  let server = server();
  server.process_frame(&frame(10, &[(1, 2)])).unwrap();
  let output = server.process_frame(&frame(20, &[])).unwrap();
  assert_eq!(output.classes.get(&1), Some(&2));
}

#[test]
fn test_unknown_class_drops_frame() {
  let server = server();
  let err = server.process_frame(&frame(10, &[])).unwrap_err();
  assert_eq!(err, FrameError::UnknownInstanceClass { instance_id: 1 });
  server.with_registry(|registry| assert!(registry.is_empty()));
}

#[test]
fn test_missing_transform_drops_frame() {
  let server = server().with_transforms(NoTransform);
  let err = server.process_frame(&frame(10, &[(1, 2)])).unwrap_err();
  assert!(matches!(err, FrameError::MissingTransform { .. }));
  assert_eq!(err.code(), "missing_transform");
  server.with_registry(|registry| assert!(registry.is_empty()));
}

#[test]
fn test_stale_frames_dropped_after_reset() {
  let server = server();
  server.process_frame(&frame(10, &[(1, 2)])).unwrap();
  server.reset_at(Timestamp(100));
  server.with_registry(|registry| assert!(registry.is_empty()));

  let err = server.process_frame(&frame(50, &[(1, 2)])).unwrap_err();
  assert!(matches!(err, FrameError::StaleFrame { .. }));
  assert!(server.query_world_grids(Timestamp(50)).is_err());
  server.with_registry(|registry| assert!(registry.is_empty()));

  server.process_frame(&frame(150, &[(1, 2)])).unwrap();
  assert_eq!(server.query_world_grids(Timestamp(150)).unwrap().len(), 1);
}

#[test]
fn test_reset_is_idempotent() {
  let server = server();
  server.process_frame(&frame(10, &[(1, 2)])).unwrap();
  let first = server.reset_at(Timestamp(200));
  let second = server.reset_at(Timestamp(300));
  assert!(second > first);

  server.with_registry(|registry| assert!(registry.is_empty()));
  assert!(server.classes().is_empty());
  assert!(server.process_frame(&frame(250, &[(1, 2)])).is_err());
  assert!(server.process_frame(&frame(300, &[(1, 2)])).is_ok());
}

#[test]
fn test_ingest_uses_pose() {
  let server = server();
  let pose = SensorPose::new(
    DAffine3::from_translation(glam::DVec3::new(0.0, 0.0, 0.5)),
    test_intrinsics(W, H),
  );
  let input = frame(10, &[(1, 2)]);
  let stats = server
    .ingest(&pose, &input.points, &input.labels, &input.classes, input.stamp)
    .unwrap();
  assert_eq!(stats.points, 4);

  let grids = server.query_world_grids(Timestamp(10)).unwrap();
  let centroid = grids[0].origin + glam::DVec3::splat(15.5 * grids[0].pitch);
  assert!((centroid.z - 1.6).abs() < 1e-9, "centroid {:?}", centroid);
}

#[test]
fn test_ingest_rejects_short_label_buffer() {
  let server = server();
  let pose = identity_pose(W, H);
  let labels = LabelImage {
    width: W,
    height: H,
    labels: vec![BACKGROUND],
  };
  let err = server
    .ingest(&pose, &plane_points(&pose, W, H, DEPTH), &labels, &ClassMap::new(), Timestamp(1))
    .unwrap_err();
  assert!(matches!(err, FrameError::ShapeMismatch { labels_len: 1, .. }));
  server.with_registry(|registry| assert!(registry.is_empty()));
}

#[test]
fn test_process_frame_rejects_short_point_buffer() {
  let server = server();
  let mut input = frame(10, &[(1, 2)]);
  input.points.points.truncate(3);
  let err = server.process_frame(&input).unwrap_err();
  assert_eq!(err.code(), "shape_mismatch");
  server.with_registry(|registry| assert!(registry.is_empty()));

  // the server keeps working afterwards
  server.process_frame(&frame(20, &[(1, 2)])).unwrap();
}

#[test]
fn test_configure_no_entry() {
  let server = server();
  assert_eq!(server.no_entry_policy(), NoEntryPolicy::default());
  server.configure(true, false);
  assert!(server.no_entry_policy().ground_as_no_entry);

  // the plane sits at world z = 0.2, so the lattice reaches below ground
  let pose = SensorPose::new(
    DAffine3::from_translation(glam::DVec3::new(0.0, 0.0, -0.9)),
    test_intrinsics(W, H),
  );
  let input = frame(10, &[(1, 2)]);
  server
    .ingest(&pose, &input.points, &input.labels, &input.classes, input.stamp)
    .unwrap();
  let pairs = server.query_sensor_grids_and_no_entry(&pose, Timestamp(10)).unwrap();
  assert_eq!(pairs.len(), 1);
  assert!(!pairs[0].no_entry.is_empty());

  server.configure(false, false);
  let pairs = server.query_sensor_grids_and_no_entry(&pose, Timestamp(10)).unwrap();
  assert!(pairs[0].no_entry.is_empty());
}

#[test]
fn test_remote_render_replaces_local() {
  let calls = Arc::new(AtomicUsize::new(0));
  let config = MapperConfig {
    use_render_service: true,
    ..Default::default()
  };
  let server = MappingServer::new(config).unwrap().with_render_service(FixedRenderer {
    label: Some(7),
    calls: calls.clone(),
  });

  let output = server.process_frame(&frame(10, &[(1, 2)])).unwrap();
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert!(output.rendered_labels.labels.iter().all(|&l| l == 7));
  assert_eq!(output.active_instances, vec![7]);
  // association still decides what is integrated
  assert_eq!(output.tracked_labels.get(0, 0), 1);
}

#[test]
fn test_remote_render_failure_falls_back() {
  let calls = Arc::new(AtomicUsize::new(0));
  let config = MapperConfig {
    use_render_service: true,
    ..Default::default()
  };
  let server = MappingServer::new(config).unwrap().with_render_service(FixedRenderer {
    label: None,
    calls: calls.clone(),
  });

  server.process_frame(&frame(10, &[(1, 2)])).unwrap();
  let output = server.process_frame(&frame(20, &[(1, 2)])).unwrap();
  assert_eq!(calls.load(Ordering::SeqCst), 2);
  assert_eq!(output.rendered_labels.get(0, 0), 1);
}

#[test]
fn test_truncated_remote_render_falls_back() {
  let config = MapperConfig {
    use_render_service: true,
    ..Default::default()
  };
  let server = MappingServer::new(config).unwrap().with_render_service(TruncatedRenderer);

  server.process_frame(&frame(10, &[(1, 2)])).unwrap();
  let output = server.process_frame(&frame(20, &[(1, 2)])).unwrap();
  assert!(output.rendered_labels.is_complete());
  assert_eq!(output.rendered_labels.get(0, 0), 1);
}

#[test]
fn test_render_service_unused_when_disabled() {
  let calls = Arc::new(AtomicUsize::new(0));
  let server = server().with_render_service(FixedRenderer {
    label: Some(7),
    calls: calls.clone(),
  });
  server.process_frame(&frame(10, &[(1, 2)])).unwrap();
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_map_snapshot_is_background_only() {
  let server = server();
  assert!(matches!(
    server.query_map_snapshot(SnapshotKind::Binary),
    Err(SnapshotError::EmptyMap)
  ));

  server.process_frame(&frame(10, &[(1, 2)])).unwrap();
  let snapshot = server.query_map_snapshot(SnapshotKind::Full).unwrap();
  let decoded = codec::read_full(&snapshot.bytes, crate::octree::SensorModel::default()).unwrap();
  let background_nodes = server.with_registry(|r| r.background().unwrap().index.node_count());
  assert_eq!(decoded.node_count(), background_nodes);
}

#[test]
fn test_cubes_cover_every_index() {
  let server = server();
  server.process_frame(&frame(10, &[(1, 2)])).unwrap();
  let cubes = server.query_cubes();
  let ids: Vec<_> = cubes.iter().map(|c| c.instance_id).collect();
  assert_eq!(ids, vec![BACKGROUND, 1]);
  assert!(cubes[0].free_count() > 0);
  assert!(cubes[1].occupied_count() > 0);
}

#[test]
fn test_passthrough_advances_counter() {
  let labels = LabelImage::new(3, 1, vec![UNCERTAIN, 4, BACKGROUND]);
  let mut counter = 2;
  let (tracked, _) = PassthroughAssociator.associate(&labels, &labels, &ClassMap::new(), &mut counter);
  assert_eq!(tracked, labels);
  assert_eq!(counter, 5);
}

/// A reset racing a stream of frames never leaves a pre-reset frame applied.
#[test]
fn test_reset_excludes_in_flight_frames() {
  let server = server();
  let applied = AtomicBool::new(false);
  let reset_stamp = Timestamp(1_000);

  let results = thread::scope(|scope| {
    let frames = scope.spawn(|| {
      (1..200)
        .map(|stamp| {
          let result = server.process_frame(&frame(stamp, &[(1, 2)]));
          if result.is_ok() {
            applied.store(true, Ordering::SeqCst);
          }
          result
        })
        .collect::<Vec<_>>()
    });
    scope.spawn(|| {
      while !applied.load(Ordering::SeqCst) {
        thread::yield_now();
      }
      server.reset_at(reset_stamp);
    });
    frames.join().unwrap()
  });

  // every frame is either applied before the reset or dropped as stale
  let first_stale = results.iter().position(|r| r.is_err()).unwrap_or(results.len());
  assert!(first_stale > 0);
  assert!(results[..first_stale].iter().all(|r| r.is_ok()));
  assert!(results[first_stale..]
    .iter()
    .all(|r| matches!(r, Err(FrameError::StaleFrame { .. }))));

  server.with_registry(|registry| assert!(registry.is_empty()));
  assert!(server.classes().is_empty());
  assert!(server.query_world_grids(Timestamp(500)).is_err());
}
