//! Bench stand-ins for running the controller without the Pi hat attached.

use std::path::{Path, PathBuf};

use super::{Actuator, Camera, Device, Position, SensorId, Sensors};
use crate::error::{PetCareError, Result};

/// Logs every servo command and keeps a history of them.
#[derive(Default)]
pub struct LoggingActuator {
    history: Vec<(Device, Position)>,
}

impl LoggingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[(Device, Position)] {
        &self.history
    }
}

impl Actuator for LoggingActuator {
    fn actuate(&mut self, device: Device, position: Position) {
        log::info!("{} servo -> {:?}", device, position);
        self.history.push((device, position));
    }
}

/// Serves configured readings.
#[derive(Clone, Debug)]
pub struct FixedSensors {
    food_distance_cm: f32,
    door_distance_cm: f32,
    motion: bool,
}

impl FixedSensors {
    pub fn new(food_distance_cm: f32, door_distance_cm: f32, motion: bool) -> Self {
        Self {
            food_distance_cm,
            door_distance_cm,
            motion,
        }
    }
}

impl Sensors for FixedSensors {
    fn read_distance(&mut self, sensor: SensorId) -> Result<f32> {
        Ok(match sensor {
            SensorId::FoodLevel => self.food_distance_cm,
            SensorId::Door => self.door_distance_cm,
        })
    }

    fn read_motion(&mut self) -> bool {
        self.motion
    }
}

/// Copies a fixed image into place for every capture.
pub struct StaticCamera {
    source: PathBuf,
    snapshot_dir: PathBuf,
}

impl StaticCamera {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(source: P, snapshot_dir: Q) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            snapshot_dir: snapshot_dir.as_ref().to_path_buf(),
        }
    }
}

impl Camera for StaticCamera {
    fn capture(&mut self, label: &str) -> Result<PathBuf> {
        let extension = self
            .source
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("jpg");
        std::fs::create_dir_all(&self.snapshot_dir)?;
        let target = self.snapshot_dir.join(format!("{}.{}", label, extension));
        std::fs::copy(&self.source, &target).map_err(|e| {
            PetCareError::ImageDecode(format!(
                "failed to copy {} to {}: {}",
                self.source.display(),
                target.display(),
                e
            ))
        })?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_camera_copies_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("pet.png");
        std::fs::write(&source, b"png bytes").unwrap();

        let mut camera = StaticCamera::new(&source, dir.path().join("snaps"));
        let path = camera.capture("motion_1").unwrap();
        assert_eq!(path, dir.path().join("snaps").join("motion_1.png"));
        assert_eq!(std::fs::read(path).unwrap(), b"png bytes");
    }

    #[test]
    fn logging_actuator_records_commands() {
        let mut actuator = LoggingActuator::new();
        actuator.actuate(Device::Door, Position::Closed);
        assert_eq!(actuator.history(), &[(Device::Door, Position::Closed)]);
    }

    #[test]
    fn fixed_sensors_serve_configured_values() {
        let mut sensors = FixedSensors::new(12.5, 80.0, true);
        assert_eq!(sensors.read_distance(SensorId::FoodLevel).unwrap(), 12.5);
        assert_eq!(sensors.read_distance(SensorId::Door).unwrap(), 80.0);
        assert!(sensors.read_motion());
    }
}
