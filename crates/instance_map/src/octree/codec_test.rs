use glam::DVec3;

use super::*;

fn sample_tree() -> OccupancyOctree {
  let mut t = OccupancyOctree::new(0.5, SensorModel::default());
  let origin = DVec3::new(0.25, 0.25, 0.25);
  for end in [
    DVec3::new(3.25, 0.25, 0.25),
    DVec3::new(0.25, -2.75, 1.25),
    DVec3::new(-1.75, 1.25, 0.25),
  ] {
    let ray = t.compute_ray_keys(origin, end).unwrap();
    for key in ray {
      t.update_free(key);
    }
    let key = t.coord_to_key_checked(end).unwrap();
    t.update_occupied(key);
    t.update_occupied(key);
  }
  t
}

fn samples() -> Vec<DVec3> {
  let mut points = Vec::new();
  for x in -8..8 {
    for y in -8..8 {
      for z in -2..4 {
        points.push(DVec3::new(x as f64, y as f64, z as f64) * 0.5 + DVec3::splat(0.25));
      }
    }
  }
  points
}

#[test]
fn test_header_is_32_bytes() {
  assert_eq!(HEADER_SIZE, 32);
}

#[test]
fn test_empty_map_is_error() {
  let t = OccupancyOctree::new(0.5, SensorModel::default());
  assert!(matches!(write_binary(&t), Err(SnapshotError::EmptyMap)));
  assert!(matches!(write_full(&t), Err(SnapshotError::EmptyMap)));
}

/// The full encoding reproduces every leaf exactly.
#[test]
fn test_full_snapshot_is_lossless() {
  let t = sample_tree();
  let snapshot = write_full(&t).unwrap();
  assert_eq!(snapshot.kind, SnapshotKind::Full);
  assert_eq!(snapshot.node_count, t.node_count() as u64);
  assert_eq!(&snapshot.bytes[..8], &SNAPSHOT_MAGIC);

  let decoded = read_full(&snapshot.bytes, SensorModel::default()).unwrap();
  assert_eq!(decoded.resolution(), 0.5);
  assert_eq!(decoded.leaves(), t.leaves());
}

/// The binary encoding keeps occupied/free/unknown classification.
#[test]
fn test_binary_snapshot_keeps_classification() {
  let t = sample_tree();
  let snapshot = write_binary(&t).unwrap();
  let decoded = read_binary(&snapshot.bytes, SensorModel::default()).unwrap();
  let model = *decoded.log_odds_model();

  for p in samples() {
    let original = t.search(p, 0).map(|n| n.is_occupied());
    let restored = decoded.search(p, 0).map(|n| n.is_occupied());
    assert_eq!(original, restored, "classification differs at {:?}", p);

    if let Some(node) = decoded.search(p, 0) {
      let expected = if node.is_occupied() { model.max } else { model.min };
      assert_eq!(node.log_odds(), expected);
    }
  }
}

#[test]
fn test_binary_snapshot_does_not_modify_source() {
  let t = sample_tree();
  let before = t.node_count();
  write_binary(&t).unwrap();
  assert_eq!(t.node_count(), before);
}

#[test]
fn test_truncated_snapshot_is_error() {
  let snapshot = write_full(&sample_tree()).unwrap();
  let short = &snapshot.bytes[..snapshot.bytes.len() - 3];
  assert!(matches!(
    read_full(short, SensorModel::default()),
    Err(SnapshotError::Truncated { .. })
  ));
  assert!(matches!(
    read_full(&snapshot.bytes[..10], SensorModel::default()),
    Err(SnapshotError::Truncated { .. })
  ));
}

#[test]
fn test_kind_and_magic_checked() {
  let snapshot = write_binary(&sample_tree()).unwrap();
  assert!(matches!(
    read_full(&snapshot.bytes, SensorModel::default()),
    Err(SnapshotError::KindMismatch { found: 0 })
  ));

  let mut corrupt = snapshot.bytes.clone();
  corrupt[0] = b'X';
  assert!(matches!(
    read_binary(&corrupt, SensorModel::default()),
    Err(SnapshotError::BadMagic)
  ));
}
