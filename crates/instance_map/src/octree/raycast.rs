//! Ray traversal over the finest-depth cell lattice.
//!
//! Both operations use the same 3D DDA walk (Amanatides & Woo): step into
//! the neighbouring cell across whichever cell boundary the ray reaches
//! first.

use glam::DVec3;
use smallvec::SmallVec;

use super::key::CellKey;
use super::tree::OccupancyOctree;

/// Cells traversed by a ray, origin cell first.
pub type KeyRay = SmallVec<[CellKey; 64]>;

/// DDA state for one ray.
struct Walker {
  key: [u16; 3],
  step: [i32; 3],
  t_max: [f64; 3],
  t_delta: [f64; 3],
}

impl Walker {
  fn new(tree: &OccupancyOctree, origin: DVec3, key: CellKey, direction: DVec3) -> Self {
    let resolution = tree.resolution();
    let center = tree.key_to_coord(key);
    let mut step = [0; 3];
    let mut t_max = [f64::MAX; 3];
    let mut t_delta = [f64::MAX; 3];
    for i in 0..3 {
      let d = direction[i];
      if d > 0.0 {
        step[i] = 1;
      } else if d < 0.0 {
        step[i] = -1;
      }
      if step[i] != 0 {
        let border = center[i] + step[i] as f64 * resolution * 0.5;
        t_max[i] = (border - origin[i]) / d;
        t_delta[i] = resolution / d.abs();
      }
    }
    Self {
      key: [key.x, key.y, key.z],
      step,
      t_max,
      t_delta,
    }
  }

  /// Advance to the next cell. `None` when the walk leaves the key range.
  fn advance(&mut self) -> Option<CellKey> {
    let dim = if self.t_max[0] < self.t_max[1] {
      if self.t_max[0] < self.t_max[2] {
        0
      } else {
        2
      }
    } else if self.t_max[1] < self.t_max[2] {
      1
    } else {
      2
    };
    let next = u16::try_from(self.key[dim] as i32 + self.step[dim]).ok()?;
    self.key[dim] = next;
    self.t_max[dim] += self.t_delta[dim];
    Some(CellKey::new(self.key[0], self.key[1], self.key[2]))
  }

  /// Ray parameter at which the current cell is left.
  fn exit_distance(&self) -> f64 {
    self.t_max[0].min(self.t_max[1]).min(self.t_max[2])
  }
}

impl OccupancyOctree {
  /// Keys of every cell traversed from `origin` to `end`, excluding the
  /// cell containing `end`.
  ///
  /// Returns `None` when either endpoint is outside the addressable range.
  pub fn compute_ray_keys(&self, origin: DVec3, end: DVec3) -> Option<KeyRay> {
    let key_origin = self.coord_to_key_checked(origin)?;
    let key_end = self.coord_to_key_checked(end)?;

    let mut ray = KeyRay::new();
    if key_origin == key_end {
      return Some(ray);
    }
    ray.push(key_origin);

    let offset = end - origin;
    let length = offset.length();
    let direction = offset / length;
    let mut walker = Walker::new(self, origin, key_origin, direction);

    loop {
      let key = walker.advance()?;
      if key == key_end {
        break;
      }
      // numerical overshoot past the end cell
      if walker.exit_distance() > length {
        break;
      }
      ray.push(key);
    }
    Some(ray)
  }

  /// Walk from `origin` along `direction` and return the centre of the first
  /// occupied cell.
  ///
  /// Unknown cells end the walk with no hit unless `ignore_unknown` is set.
  /// Cells whose centre is farther than `max_range` from `origin` are not
  /// considered; a non-positive `max_range` walks until the key range ends.
  pub fn cast_ray(
    &self,
    origin: DVec3,
    direction: DVec3,
    ignore_unknown: bool,
    max_range: f64,
  ) -> Option<DVec3> {
    let key = self.coord_to_key_checked(origin)?;
    let direction = direction.try_normalize()?;

    match self.search_key(key, 0) {
      Some(node) if node.is_occupied() => return Some(self.key_to_coord(key)),
      None if !ignore_unknown => return None,
      _ => {}
    }

    let max_range_sq = (max_range > 0.0).then_some(max_range * max_range);
    let mut walker = Walker::new(self, origin, key, direction);
    loop {
      let key = walker.advance()?;
      let center = self.key_to_coord(key);
      if let Some(limit) = max_range_sq {
        if center.distance_squared(origin) > limit {
          return None;
        }
      }
      match self.search_key(key, 0) {
        Some(node) if node.is_occupied() => return Some(center),
        Some(_) => {}
        None if ignore_unknown => {}
        None => return None,
      }
    }
  }
}

#[cfg(test)]
#[path = "raycast_test.rs"]
mod raycast_test;
