use glam::{DAffine3, DVec3};

use super::*;
use crate::constants::{GRID_SIZE, GRID_SIZE_SQ};
use crate::pipeline::test_utils::box_registry;
use crate::types::BACKGROUND;

/// 4x4x4 cells centred on (0.1, 0.1, z_center) at pitch 0.05.
fn cube_registry(z_center: f64) -> Registry {
  box_registry(
    &[(
      1,
      3,
      DVec3::new(0.025, 0.025, z_center - 0.075),
      DVec3::new(0.175, 0.175, z_center + 0.075),
    )],
    0.05,
  )
}

fn policy(ground: bool, free: bool) -> NoEntryPolicy {
  NoEntryPolicy {
    ground_as_no_entry: ground,
    free_as_no_entry: free,
  }
}

#[test]
fn test_world_grid_lists_occupied_cells() {
  let registry = cube_registry(1.1);
  let grids = world_grids(&registry);
  assert_eq!(grids.len(), 1);

  let grid = &grids[0];
  assert_eq!(grid.instance_id, 1);
  assert_eq!(grid.class_id, 3);
  assert_eq!(grid.lattice_len(), 32768);
  assert_eq!(grid.len(), 64);
  // centroid sits between cells 15 and 16, the box covers cells 14..=17
  for i in 14..=17 {
    assert!(grid.value_at(i, i, i).is_some(), "cell {}", i);
  }
  assert_eq!(grid.value_at(13, 15, 15), None);
  assert!(grid.indices.windows(2).all(|w| w[0] < w[1]));
  assert!(grid.values.iter().all(|&v| (v - 0.7).abs() < 1e-6));
}

#[test]
fn test_instances_without_centroid_are_skipped() {
  let mut registry = cube_registry(1.1);
  registry.ensure_instance(8, 1, 0.05, Default::default());
  let ids: Vec<_> = world_grids(&registry).iter().map(|g| g.instance_id).collect();
  assert_eq!(ids, vec![1]);
  assert_eq!(sensor_grids(&registry, &DAffine3::IDENTITY, policy(true, true)).len(), 1);
}

#[test]
fn test_identity_sensor_grid_matches_world_grid() {
  let registry = cube_registry(1.1);
  let world = world_grid(registry.get(1).unwrap()).unwrap();
  let pairs = sensor_grids(&registry, &DAffine3::IDENTITY, policy(false, false));
  assert_eq!(pairs.len(), 1);
  assert_eq!(pairs[0].object, world);
  assert!(pairs[0].no_entry.is_empty());
}

/// A sensor rotated about Z sees the same cube, laid out along its own axes.
#[test]
fn test_rotated_sensor_grid() {
  let registry = cube_registry(1.1);
  let sensor_to_world =
    DAffine3::from_rotation_translation(glam::DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2), DVec3::new(2.0, -1.0, 0.3));
  let pairs = sensor_grids(&registry, &sensor_to_world, policy(false, false));
  let object = &pairs[0].object;
  assert_eq!(object.len(), 64);

  let centroid = sensor_to_world
    .inverse()
    .transform_point3(registry.get(1).unwrap().centroid.unwrap());
  assert!((object.origin - (centroid - DVec3::splat(15.5 * 0.05))).length() < 1e-9);
}

#[test]
fn test_ground_cells_are_no_entry() {
  let registry = cube_registry(0.1);
  let pair = sensor_grid(&registry, registry.get(1).unwrap(), &DAffine3::IDENTITY, policy(true, false)).unwrap();

  // lattice z = 0.1 - 0.775 + k * 0.05, negative for k in 0..=13
  assert_eq!(pair.no_entry.len(), GRID_SIZE_SQ * 14);
  assert_eq!(pair.no_entry.value_at(0, 0, 0), Some(0.97));
  assert_eq!(pair.no_entry.value_at(0, 0, 13), Some(0.97));
  assert_eq!(pair.no_entry.value_at(0, 0, 14), None);
}

#[test]
fn test_own_occupied_cells_never_no_entry() {
  let registry = cube_registry(0.0);
  let pair = sensor_grid(&registry, registry.get(1).unwrap(), &DAffine3::IDENTITY, policy(true, false)).unwrap();

  assert_eq!(pair.object.len(), 64);
  for index in &pair.object.indices {
    assert!(pair.no_entry.indices.binary_search(index).is_err());
  }
  // 14 full ground layers plus the uncovered part of layers 14 and 15
  assert_eq!(pair.no_entry.len(), GRID_SIZE_SQ * 16 - 32);
}

#[test]
fn test_background_free_is_no_entry() {
  let mut registry = cube_registry(1.1);
  let origin = world_grid(registry.get(1).unwrap()).unwrap().origin;
  let position = origin + DVec3::new(0.0, 0.0, (GRID_SIZE - 1) as f64 * 0.05);
  {
    let bg = &mut registry.get_mut(BACKGROUND).unwrap().index;
    let key = bg.coord_to_key_checked(position).unwrap();
    bg.update_free(key);
  }

  let pair = sensor_grid(&registry, registry.get(1).unwrap(), &DAffine3::IDENTITY, policy(false, true)).unwrap();
  assert_eq!(pair.no_entry.len(), 1);
  let value = pair.no_entry.value_at(0, 0, GRID_SIZE - 1).unwrap();
  assert!((value - 0.6).abs() < 1e-6, "value {}", value);

  let off = sensor_grid(&registry, registry.get(1).unwrap(), &DAffine3::IDENTITY, policy(false, false)).unwrap();
  assert!(off.no_entry.is_empty());
}

/// Only another index at its clamp max blocks a cell; rules apply in order.
#[test]
fn test_confident_other_index_and_precedence() {
  let mut registry = cube_registry(1.1);
  let origin = world_grid(registry.get(1).unwrap()).unwrap().origin;
  let confident = origin + DVec3::new(0.05, 0.05, 0.05);
  let tentative = origin + DVec3::new(0.1, 0.1, 0.1);
  let shared = origin + DVec3::new(0.15, 0.15, 0.15);
  {
    let (other, _) = registry.ensure_instance(2, 4, 0.05, Default::default());
    let index = &mut other.index;
    let confident_key = index.coord_to_key_checked(confident).unwrap();
    let tentative_key = index.coord_to_key_checked(tentative).unwrap();
    let shared_key = index.coord_to_key_checked(shared).unwrap();
    for _ in 0..10 {
      index.update_occupied(confident_key);
      index.update_occupied(shared_key);
    }
    index.update_occupied(tentative_key);
  }
  {
    let bg = &mut registry.get_mut(BACKGROUND).unwrap().index;
    let key = bg.coord_to_key_checked(shared).unwrap();
    bg.update_free(key);
  }

  let pair = sensor_grid(&registry, registry.get(1).unwrap(), &DAffine3::IDENTITY, policy(false, true)).unwrap();
  assert_eq!(pair.no_entry.len(), 2);
  let blocked = pair.no_entry.value_at(1, 1, 1).unwrap();
  assert!((blocked - 0.97).abs() < 1e-6, "value {}", blocked);
  assert_eq!(pair.no_entry.value_at(2, 2, 2), None);
  // background free is checked before other indices
  let first_match = pair.no_entry.value_at(3, 3, 3).unwrap();
  assert!((first_match - 0.6).abs() < 1e-6, "value {}", first_match);
}
