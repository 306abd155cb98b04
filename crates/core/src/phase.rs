use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle phase of a tracked aircraft.
///
/// Every callsign has exactly one phase at a time. Callsigns the controller has
/// never written to read as `ColdStart`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    ColdStart,
    Startup,
    Taxi,
    Takeoff,
    Airborne,
    Approach,
    Landing,
    Landed,
}

impl Phase {
    /// All phases in lifecycle order.
    pub const ALL: [Phase; 8] = [
        Phase::ColdStart,
        Phase::Startup,
        Phase::Taxi,
        Phase::Takeoff,
        Phase::Airborne,
        Phase::Approach,
        Phase::Landing,
        Phase::Landed,
    ];

    /// The snake_case tag used on the wire and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::ColdStart => "cold_start",
            Phase::Startup => "startup",
            Phase::Taxi => "taxi",
            Phase::Takeoff => "takeoff",
            Phase::Airborne => "airborne",
            Phase::Approach => "approach",
            Phase::Landing => "landing",
            Phase::Landed => "landed",
        }
    }

    /// Whether the aircraft is expected to be off the ground.
    pub fn is_airborne(self) -> bool {
        matches!(self, Phase::Airborne | Phase::Approach | Phase::Landing)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
