//! Core logic for the ATC radio assistant: parsing pilot transmissions,
//! tracking each aircraft's flight phase, sequencing runway queues and
//! producing controller replies.

pub mod controller;
pub mod entities;
pub mod intent;
pub mod llm_client;
pub mod parser;
pub mod phase;
pub mod queue;
pub mod response;
pub mod session;
pub mod telemetry;

pub use controller::{AtcController, ControllerSettings, PhaseChange, Transmission};
pub use parser::{CommandParser, ParsedCommand};
pub use phase::Phase;
pub use telemetry::Telemetry;
