//! API Models
//!
//! Request and response bodies for the REST API. Core types are mapped into
//! these views so that `utoipa` can describe them without the core crate
//! depending on it.

use atc_core::ParsedCommand;
use atc_core::queue::QueueEntry;
use atc_core::telemetry::{Position, Telemetry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct ParsePayload {
    #[schema(example = "Tower, Viper 1-1, request takeoff clearance runway 27L")]
    pub text: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionPayload {
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    /// Altitude in feet.
    #[serde(default)]
    #[schema(example = 5000.0)]
    pub alt: f64,
}

/// A telemetry sample. A sample without a position reads as on the ground.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryPayload {
    /// Ground speed in knots.
    #[serde(default)]
    #[schema(example = 300.0)]
    pub speed: f64,
    #[serde(default)]
    pub position: Option<PositionPayload>,
}

impl From<TelemetryPayload> for Telemetry {
    fn from(payload: TelemetryPayload) -> Self {
        Telemetry {
            speed: payload.speed,
            position: payload.position.map(|p| Position {
                lat: p.lat,
                lon: p.lon,
                alt: p.alt,
            }),
        }
    }
}

impl From<Telemetry> for TelemetryPayload {
    fn from(telemetry: Telemetry) -> Self {
        TelemetryPayload {
            speed: telemetry.speed,
            position: telemetry.position.map(|p| PositionPayload {
                lat: p.lat,
                lon: p.lon,
                alt: p.alt,
            }),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct TransmissionPayload {
    #[schema(example = "Ground, Viper 1-1, request taxi")]
    pub text: String,
    #[serde(default)]
    pub telemetry: Option<TelemetryPayload>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct CommandView {
    #[schema(example = "request_takeoff")]
    pub intent: String,
    pub entities: BTreeMap<String, String>,
    pub raw_text: String,
}

impl From<ParsedCommand> for CommandView {
    fn from(command: ParsedCommand) -> Self {
        CommandView {
            intent: command.intent.as_str().to_string(),
            entities: command
                .entities
                .iter()
                .map(|(kind, value)| (kind.as_str().to_string(), value.to_string()))
                .collect(),
            raw_text: command.raw_text,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TransmissionResponse {
    pub callsign: String,
    #[schema(example = "Viper 1-1, taxi via alpha to runway 31")]
    pub response: String,
    #[schema(example = "taxi")]
    pub phase: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct PhaseResponse {
    pub callsign: String,
    #[schema(example = "airborne")]
    pub phase: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct AircraftDetail {
    pub callsign: String,
    pub phase: String,
    /// Processed transmissions, oldest first.
    pub history: Vec<CommandView>,
    /// Most recent telemetry sample, if one was ever received.
    pub telemetry: Option<TelemetryPayload>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct QueueEntryView {
    pub callsign: String,
    pub priority: bool,
}

impl From<QueueEntry> for QueueEntryView {
    fn from(entry: QueueEntry) -> Self {
        QueueEntryView {
            callsign: entry.callsign,
            priority: entry.priority,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct EnqueuePayload {
    #[schema(example = "Viper 1-1")]
    pub callsign: String,
    #[serde(default)]
    pub priority: bool,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct QueuePositionResponse {
    /// 0-based position in the queue.
    pub position: usize,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct RemovedResponse {
    pub removed: usize,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub generator_available: bool,
    #[schema(example = "military")]
    pub phraseology: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
