//! Telemetry snapshots pushed by the simulator export bridge.

use serde::{Deserialize, Serialize};

/// A geographic position. Altitude is in feet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    #[serde(default)]
    pub alt: f64,
}

/// One telemetry sample for a single aircraft.
///
/// Only `speed` (knots) and `position.alt` drive phase inference. A sample
/// without a position reads as being on the ground.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub position: Option<Position>,
}

impl Telemetry {
    /// Builds a sample from speed and altitude alone.
    pub fn new(speed: f64, altitude: f64) -> Self {
        Self {
            speed,
            position: Some(Position {
                alt: altitude,
                ..Default::default()
            }),
        }
    }

    pub fn altitude(&self) -> f64 {
        self.position.map_or(0.0, |p| p.alt)
    }
}
