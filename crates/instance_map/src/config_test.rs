use super::*;
use crate::types::BACKGROUND;

#[test]
fn test_defaults() {
  let config = MapperConfig::default();
  assert_eq!(config.resolution, 0.05);
  assert_eq!(config.max_range, None);
  assert_eq!(config.sensor_model, SensorModel::new(0.7, 0.4, 0.12, 0.97));
  assert!(!config.compress_map);
  assert!(!config.no_entry.ground_as_no_entry);
  assert!(!config.no_entry.free_as_no_entry);
  assert!(config.validate().is_ok());
}

#[test]
fn test_class_pitch_lookup() {
  let config = MapperConfig::default()
    .with_class_pitch(2, 0.01)
    .with_class_pitch(5, 0.02)
    .with_class_pitch(2, 0.015);

  assert_eq!(config.class_pitch(2), 0.015);
  assert_eq!(config.class_pitch(5), 0.02);
  assert_eq!(config.class_pitch(9), 0.05, "unknown class uses base resolution");
  assert_eq!(config.pitch_for(BACKGROUND, 2), 0.05, "background uses base resolution");
  assert_eq!(config.pitch_for(3, 5), 0.02);
}

#[test]
fn test_validate_rejects_bad_values() {
  let mut config = MapperConfig::default();
  config.resolution = 0.0;
  assert_eq!(config.validate(), Err(ConfigError::InvalidResolution(0.0)));

  let mut config = MapperConfig::default();
  config.max_range = Some(-1.0);
  assert_eq!(config.validate(), Err(ConfigError::InvalidMaxRange(-1.0)));

  let config = MapperConfig::default().with_class_pitch(4, f64::NAN);
  assert!(matches!(
    config.validate(),
    Err(ConfigError::InvalidPitch { class_id: 4, .. })
  ));

  let mut config = MapperConfig::default();
  config.sensor_model.clamp_max = 1.5;
  assert!(matches!(
    config.validate(),
    Err(ConfigError::InvalidProbability { name: "clamp_max", .. })
  ));
}
