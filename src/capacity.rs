//! Food level from the ultrasonic distance sensor.
//!
//! The sensor sits above the food pot; an empty pot reads the full range and
//! a full pot reads close to zero.

use std::time::Duration;

use crate::error::{PetCareError, Result};

pub const DEFAULT_MAX_RANGE_CM: f32 = 30.0;

/// Speed of sound in cm per microsecond.
const SOUND_CM_PER_US: f32 = 0.0343;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CapacityMapper {
    max_range_cm: f32,
}

impl CapacityMapper {
    pub fn new(max_range_cm: f32) -> Result<Self> {
        if !max_range_cm.is_finite() || max_range_cm <= 0.0 {
            return Err(PetCareError::Config(format!(
                "capacity max range must be a positive distance, got {}",
                max_range_cm
            )));
        }
        Ok(Self { max_range_cm })
    }

    pub fn max_range_cm(&self) -> f32 {
        self.max_range_cm
    }

    /// Percent full, clamped to [0, 100].
    pub fn capacity_percent(&self, distance_cm: f32) -> Result<f32> {
        let distance_cm = validate_distance(distance_cm)?;
        let percent = (self.max_range_cm - distance_cm) / self.max_range_cm * 100.0;
        Ok(percent.clamp(0.0, 100.0))
    }
}

impl Default for CapacityMapper {
    fn default() -> Self {
        Self {
            max_range_cm: DEFAULT_MAX_RANGE_CM,
        }
    }
}

/// Reject negative and non-finite readings.
pub fn validate_distance(distance_cm: f32) -> Result<f32> {
    if !distance_cm.is_finite() || distance_cm < 0.0 {
        return Err(PetCareError::InvalidReading(format!(
            "distance must be a finite non-negative number of cm, got {}",
            distance_cm
        )));
    }
    Ok(distance_cm)
}

/// Convert an ultrasonic echo pulse width into a one-way distance.
pub fn distance_from_echo(echo: Duration) -> f32 {
    echo.as_micros() as f32 * SOUND_CM_PER_US / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_range_endpoints() {
        let mapper = CapacityMapper::default();
        assert_eq!(mapper.capacity_percent(0.0).unwrap(), 100.0);
        assert_eq!(mapper.capacity_percent(30.0).unwrap(), 0.0);
        assert_eq!(mapper.capacity_percent(15.0).unwrap(), 50.0);
    }

    #[test]
    fn clamps_beyond_range() {
        let mapper = CapacityMapper::default();
        assert_eq!(mapper.capacity_percent(45.0).unwrap(), 0.0);
    }

    #[test]
    fn rejects_invalid_readings() {
        let mapper = CapacityMapper::default();
        for bad in [-5.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                mapper.capacity_percent(bad),
                Err(PetCareError::InvalidReading(_))
            ));
        }
    }

    #[test]
    fn rejects_bad_range() {
        assert!(CapacityMapper::new(0.0).is_err());
        assert!(CapacityMapper::new(-1.0).is_err());
        assert!(CapacityMapper::new(f32::NAN).is_err());
    }

    #[test]
    fn echo_conversion() {
        // 1 ms round trip is about 17 cm.
        let cm = distance_from_echo(Duration::from_millis(1));
        assert!((cm - 17.15).abs() < 0.01);
    }
}
