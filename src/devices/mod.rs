//! Hardware collaborators.
//!
//! The pipeline only sees these traits. Pin-level GPIO work, servo PWM and
//! camera internals live behind them. Implementations here cover what can run
//! on any host: a command-driven still camera and bench stand-ins.

pub mod bench;
pub mod camera;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;

pub use bench::{FixedSensors, LoggingActuator, StaticCamera};
pub use camera::CommandCamera;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Device {
    Feeder,
    Door,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Position {
    Open,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SensorId {
    /// Ultrasonic sensor above the food pot.
    FoodLevel,
    /// Ultrasonic sensor watching the door approach.
    Door,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Feeder => f.write_str("feeder"),
            Device::Door => f.write_str("door"),
        }
    }
}

/// Still camera. Returns the path of the written snapshot.
pub trait Camera: Send {
    fn capture(&mut self, label: &str) -> Result<PathBuf>;
}

/// Servo control. Fire-and-forget: failures are the implementation's to log.
pub trait Actuator: Send {
    fn actuate(&mut self, device: Device, position: Position);
}

/// Synchronous sensor polls.
pub trait Sensors: Send {
    fn read_distance(&mut self, sensor: SensorId) -> Result<f32>;

    fn read_motion(&mut self) -> bool;
}
