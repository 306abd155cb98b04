//! Session Registry and Phase State Machine
//!
//! One [`Session`] per callsign holds the authoritative [`Phase`] and the
//! trailing command history. Two independent drivers move the phase:
//! explicit pilot requests (see [`RULES`]) and telemetry inference
//! (see [`infer_phase`]).
//!
//! The registry is plain data with `&mut self` methods; the controller puts it
//! behind a single lock.

use crate::entities::{Entities, EntityKind};
use crate::intent::Intent;
use crate::parser::ParsedCommand;
use crate::phase::Phase;
use crate::telemetry::Telemetry;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::info;

/// Number of processed commands kept per session.
pub const HISTORY_LIMIT: usize = 10;

/// Condition a request must satisfy before its rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,
    /// The current phase must be one of `allowed`.
    PhaseIn {
        allowed: &'static [Phase],
        refusal: &'static str,
    },
    /// The transmission must carry `entity`.
    Requires {
        entity: EntityKind,
        refusal: &'static str,
    },
}

impl Guard {
    /// Returns the refusal message when the guard does not hold.
    pub fn check(&self, current: Phase, entities: &Entities) -> Result<(), &'static str> {
        match *self {
            Guard::Always => Ok(()),
            Guard::PhaseIn { allowed, refusal } => {
                if allowed.contains(&current) {
                    Ok(())
                } else {
                    Err(refusal)
                }
            }
            Guard::Requires { entity, refusal } => {
                if entities.contains(entity) {
                    Ok(())
                } else {
                    Err(refusal)
                }
            }
        }
    }
}

/// One row of the explicit-request transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub intent: Intent,
    pub guard: Guard,
    /// Phase to move to when the guard holds; `None` leaves the phase alone.
    pub next: Option<Phase>,
}

/// Transition table for explicit requests. Intents without a row are
/// acknowledged without a phase change.
///
/// `RequestTaxi` has no guard and is granted from any phase, including
/// airborne ones.
pub const RULES: &[Rule] = &[
    Rule {
        intent: Intent::RequestStartup,
        guard: Guard::Always,
        next: Some(Phase::Startup),
    },
    Rule {
        intent: Intent::RequestTaxi,
        guard: Guard::Always,
        next: Some(Phase::Taxi),
    },
    Rule {
        intent: Intent::RequestTakeoff,
        guard: Guard::PhaseIn {
            allowed: &[Phase::Taxi, Phase::Takeoff],
            refusal: "unable, not in position for takeoff",
        },
        next: Some(Phase::Takeoff),
    },
    Rule {
        intent: Intent::RequestLanding,
        guard: Guard::PhaseIn {
            allowed: &[Phase::Approach, Phase::Airborne],
            refusal: "unable, not in position for landing",
        },
        next: Some(Phase::Landing),
    },
    Rule {
        intent: Intent::AltitudeChange,
        guard: Guard::Requires {
            entity: EntityKind::Altitude,
            refusal: "say altitude",
        },
        next: None,
    },
    Rule {
        intent: Intent::HeadingChange,
        guard: Guard::Requires {
            entity: EntityKind::Heading,
            refusal: "say heading",
        },
        next: None,
    },
];

/// Looks up the rule for `intent`.
pub fn rule_for(intent: Intent) -> Option<&'static Rule> {
    RULES.iter().find(|rule| rule.intent == intent)
}

/// The outcome of an explicit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request was granted and the phase overwritten.
    Transition { from: Phase, to: Phase },
    /// The request was accepted; the phase did not change.
    Acknowledge { phase: Phase },
    /// The request was refused; the phase did not change.
    Refuse { phase: Phase, reason: &'static str },
}

impl Decision {
    /// The phase after the decision was applied.
    pub fn phase(&self) -> Phase {
        match *self {
            Decision::Transition { to, .. } => to,
            Decision::Acknowledge { phase } | Decision::Refuse { phase, .. } => phase,
        }
    }

    pub fn is_refused(&self) -> bool {
        matches!(self, Decision::Refuse { .. })
    }
}

/// Decides an explicit request against the current phase without touching
/// any state.
pub fn decide(current: Phase, command: &ParsedCommand) -> Decision {
    let Some(rule) = rule_for(command.intent) else {
        return Decision::Acknowledge { phase: current };
    };
    match rule.guard.check(current, &command.entities) {
        Err(reason) => Decision::Refuse {
            phase: current,
            reason,
        },
        Ok(()) => match rule.next {
            Some(to) => Decision::Transition { from: current, to },
            None => Decision::Acknowledge { phase: current },
        },
    }
}

/// Infers a phase change from a telemetry sample.
///
/// Fast and high promotes to `Airborne`, then to `Approach` once below
/// 3000 ft. Slow and low after an approach or landing clearance means
/// `Landed`. Everything else, including the band between 200 and 500 ft,
/// leaves the phase alone.
pub fn infer_phase(current: Phase, speed: f64, altitude: f64) -> Option<Phase> {
    if altitude > 500.0 && speed > 100.0 {
        if altitude < 3000.0 && current == Phase::Airborne {
            Some(Phase::Approach)
        } else if !matches!(current, Phase::Airborne | Phase::Approach) {
            Some(Phase::Airborne)
        } else {
            None
        }
    } else if altitude < 200.0 && speed < 50.0 {
        matches!(current, Phase::Approach | Phase::Landing).then_some(Phase::Landed)
    } else {
        None
    }
}

/// Per-callsign state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Session {
    pub phase: Phase,
    history: VecDeque<ParsedCommand>,
}

impl Session {
    fn record(&mut self, command: ParsedCommand) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(command);
    }

    /// Processed commands, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &ParsedCommand> {
        self.history.iter()
    }
}

/// All tracked sessions, keyed by callsign exactly as given.
///
/// The last telemetry sample per callsign is kept beside the sessions, so
/// recording it never registers an aircraft.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    last_telemetry: HashMap<String, Telemetry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current phase. Unknown callsigns read as `ColdStart` and are not
    /// registered by the read.
    pub fn phase(&self, callsign: &str) -> Phase {
        self.sessions
            .get(callsign)
            .map(|s| s.phase)
            .unwrap_or_default()
    }

    /// Snapshot of every registered callsign's phase.
    pub fn phases(&self) -> HashMap<String, Phase> {
        self.sessions
            .iter()
            .map(|(callsign, session)| (callsign.clone(), session.phase))
            .collect()
    }

    pub fn session(&self, callsign: &str) -> Option<&Session> {
        self.sessions.get(callsign)
    }

    /// Processed commands for `callsign`, oldest first.
    pub fn history(&self, callsign: &str) -> Vec<ParsedCommand> {
        self.sessions
            .get(callsign)
            .map(|s| s.history().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Stores `telemetry` as the last known state of `callsign`.
    pub fn record_telemetry(&mut self, callsign: &str, telemetry: Telemetry) {
        self.last_telemetry.insert(callsign.to_string(), telemetry);
    }

    pub fn last_telemetry(&self, callsign: &str) -> Option<Telemetry> {
        self.last_telemetry.get(callsign).copied()
    }

    /// Forgets a callsign entirely, including its last known state. Returns
    /// whether it had a session.
    pub fn clear_session(&mut self, callsign: &str) -> bool {
        self.last_telemetry.remove(callsign);
        let removed = self.sessions.remove(callsign).is_some();
        if removed {
            info!(%callsign, "Session cleared");
        }
        removed
    }

    /// Overwrites the phase unconditionally.
    pub fn set_phase(&mut self, callsign: &str, phase: Phase) {
        let session = self.sessions.entry(callsign.to_string()).or_default();
        let old = session.phase;
        session.phase = phase;
        if old != phase {
            info!(%callsign, from = %old, to = %phase, "Phase changed");
        }
    }

    /// Applies an explicit request. The command is recorded in the session
    /// history whether or not it is granted.
    pub fn process_request(&mut self, callsign: &str, command: &ParsedCommand) -> Decision {
        let session = self.sessions.entry(callsign.to_string()).or_default();
        let decision = decide(session.phase, command);
        session.record(command.clone());

        match decision {
            Decision::Transition { from, to } => {
                session.phase = to;
                info!(%callsign, intent = %command.intent, %from, %to, "Phase changed");
            }
            Decision::Refuse { phase, reason } => {
                info!(%callsign, intent = %command.intent, %phase, reason, "Request refused");
            }
            Decision::Acknowledge { .. } => {}
        }
        decision
    }

    /// Applies telemetry inference. Returns `(from, to)` when the phase
    /// changed. No session is created when nothing changes.
    pub fn update_from_telemetry(
        &mut self,
        callsign: &str,
        speed: f64,
        altitude: f64,
    ) -> Option<(Phase, Phase)> {
        let current = self.phase(callsign);
        let next = infer_phase(current, speed, altitude)?;
        let session = self.sessions.entry(callsign.to_string()).or_default();
        session.phase = next;
        info!(%callsign, from = %current, to = %next, speed, altitude, "Phase changed from telemetry");
        Some((current, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CommandParser;

    fn command(text: &str) -> ParsedCommand {
        CommandParser::new().parse(text)
    }

    #[test]
    fn test_unknown_callsign_reads_cold_start_without_registering() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.phase("Viper 1-1"), Phase::ColdStart);
        assert!(registry.is_empty());
        assert!(registry.phases().is_empty());
    }

    #[test]
    fn test_callsigns_are_case_sensitive() {
        let mut registry = SessionRegistry::new();
        registry.set_phase("Viper 1-1", Phase::Taxi);
        assert_eq!(registry.phase("viper 1-1"), Phase::ColdStart);
    }

    #[test]
    fn test_every_rule_row() {
        let cases = [
            (Phase::ColdStart, "request startup", Decision::Transition { from: Phase::ColdStart, to: Phase::Startup }),
            (Phase::Startup, "request taxi", Decision::Transition { from: Phase::Startup, to: Phase::Taxi }),
            (Phase::Taxi, "request takeoff clearance", Decision::Transition { from: Phase::Taxi, to: Phase::Takeoff }),
            (Phase::Takeoff, "ready for takeoff", Decision::Transition { from: Phase::Takeoff, to: Phase::Takeoff }),
            (Phase::Airborne, "request landing", Decision::Transition { from: Phase::Airborne, to: Phase::Landing }),
            (Phase::Approach, "inbound for landing", Decision::Transition { from: Phase::Approach, to: Phase::Landing }),
            (Phase::Airborne, "request climb to flight level 350", Decision::Acknowledge { phase: Phase::Airborne }),
            (Phase::Airborne, "turn left 330", Decision::Acknowledge { phase: Phase::Airborne }),
            (Phase::Taxi, "roger", Decision::Acknowledge { phase: Phase::Taxi }),
            (Phase::Taxi, "asdf qwerty", Decision::Acknowledge { phase: Phase::Taxi }),
        ];
        for (phase, text, expected) in cases {
            assert_eq!(decide(phase, &command(text)), expected, "{phase} / {text}");
        }
    }

    #[test]
    fn test_guard_failures() {
        assert_eq!(
            decide(Phase::ColdStart, &command("request takeoff clearance")),
            Decision::Refuse { phase: Phase::ColdStart, reason: "unable, not in position for takeoff" }
        );
        assert_eq!(
            decide(Phase::Taxi, &command("request landing clearance")),
            Decision::Refuse { phase: Phase::Taxi, reason: "unable, not in position for landing" }
        );
        assert_eq!(
            decide(Phase::Airborne, &command("request climb")),
            Decision::Refuse { phase: Phase::Airborne, reason: "say altitude" }
        );
        assert_eq!(
            decide(Phase::Airborne, &command("request heading")),
            Decision::Refuse { phase: Phase::Airborne, reason: "say heading" }
        );
    }

    #[test]
    fn test_taxi_is_granted_from_any_phase() {
        // Taxi has no guard, even from an airborne phase.
        for phase in Phase::ALL {
            assert_eq!(
                decide(phase, &command("request taxi")),
                Decision::Transition { from: phase, to: Phase::Taxi }
            );
        }
    }

    #[test]
    fn test_heading_is_not_range_checked() {
        assert_eq!(
            decide(Phase::Airborne, &command("heading 999")),
            Decision::Acknowledge { phase: Phase::Airborne }
        );
    }

    #[test]
    fn test_process_request_transitions_and_records() {
        let mut registry = SessionRegistry::new();
        registry.set_phase("Viper 1-1", Phase::Taxi);

        let decision = registry.process_request("Viper 1-1", &command("request takeoff clearance"));

        assert_eq!(decision, Decision::Transition { from: Phase::Taxi, to: Phase::Takeoff });
        assert_eq!(registry.phase("Viper 1-1"), Phase::Takeoff);
        assert_eq!(registry.history("Viper 1-1").len(), 1);
    }

    #[test]
    fn test_refused_request_keeps_phase() {
        let mut registry = SessionRegistry::new();
        let decision = registry.process_request("Viper 1-1", &command("request takeoff clearance"));

        assert!(decision.is_refused());
        assert_eq!(registry.phase("Viper 1-1"), Phase::ColdStart);
        assert_eq!(registry.history("Viper 1-1").len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut registry = SessionRegistry::new();
        for i in 0..15 {
            registry.process_request("Viper 1-1", &command(&format!("transmission {}", i)));
        }

        let history = registry.history("Viper 1-1");
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.first().unwrap().raw_text, "transmission 5");
        assert_eq!(history.last().unwrap().raw_text, "transmission 14");
    }

    #[test]
    fn test_telemetry_airborne_then_approach() {
        let mut registry = SessionRegistry::new();

        assert_eq!(
            registry.update_from_telemetry("Viper 1-1", 300.0, 5000.0),
            Some((Phase::ColdStart, Phase::Airborne))
        );
        assert_eq!(
            registry.update_from_telemetry("Viper 1-1", 200.0, 1500.0),
            Some((Phase::Airborne, Phase::Approach))
        );
        assert_eq!(registry.phase("Viper 1-1"), Phase::Approach);
    }

    #[test]
    fn test_telemetry_is_idempotent_once_settled() {
        let mut registry = SessionRegistry::new();
        registry.update_from_telemetry("Viper 1-1", 300.0, 5000.0);

        assert_eq!(registry.update_from_telemetry("Viper 1-1", 300.0, 5000.0), None);
        assert_eq!(registry.update_from_telemetry("Viper 1-1", 300.0, 5000.0), None);
        assert_eq!(registry.phase("Viper 1-1"), Phase::Airborne);
    }

    #[test]
    fn test_telemetry_landing() {
        let mut registry = SessionRegistry::new();
        registry.set_phase("Viper 1-1", Phase::Landing);

        assert_eq!(
            registry.update_from_telemetry("Viper 1-1", 20.0, 50.0),
            Some((Phase::Landing, Phase::Landed))
        );
        assert_eq!(registry.update_from_telemetry("Viper 1-1", 0.0, 50.0), None);
    }

    #[test]
    fn test_telemetry_on_ground_does_not_register() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.update_from_telemetry("Viper 1-1", 0.0, 50.0), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_infer_phase_table() {
        assert_eq!(infer_phase(Phase::Taxi, 150.0, 800.0), Some(Phase::Airborne));
        assert_eq!(infer_phase(Phase::Approach, 150.0, 800.0), None);
        assert_eq!(infer_phase(Phase::Airborne, 150.0, 2999.0), Some(Phase::Approach));
        assert_eq!(infer_phase(Phase::Airborne, 150.0, 3000.0), None);
        assert_eq!(infer_phase(Phase::Approach, 40.0, 100.0), Some(Phase::Landed));
        assert_eq!(infer_phase(Phase::Taxi, 40.0, 100.0), None);
        // Between the ground and airborne bands nothing changes.
        assert_eq!(infer_phase(Phase::Approach, 80.0, 300.0), None);
        // Boundaries are strict.
        assert_eq!(infer_phase(Phase::ColdStart, 100.0, 5000.0), None);
        assert_eq!(infer_phase(Phase::Landing, 50.0, 100.0), None);
    }

    #[test]
    fn test_recorded_telemetry_does_not_register() {
        let mut registry = SessionRegistry::new();
        registry.record_telemetry("Viper 1-1", Telemetry::new(0.0, 50.0));

        assert!(registry.is_empty());
        assert_eq!(
            registry.last_telemetry("Viper 1-1"),
            Some(Telemetry::new(0.0, 50.0))
        );

        registry.record_telemetry("Viper 1-1", Telemetry::new(140.0, 900.0));
        assert_eq!(registry.last_telemetry("Viper 1-1").map(|t| t.speed), Some(140.0));
        assert_eq!(registry.last_telemetry("Viper 1-2"), None);
    }

    #[test]
    fn test_clear_session_drops_recorded_telemetry() {
        let mut registry = SessionRegistry::new();
        registry.set_phase("Viper 1-1", Phase::Airborne);
        registry.record_telemetry("Viper 1-1", Telemetry::new(300.0, 5000.0));

        assert!(registry.clear_session("Viper 1-1"));
        assert_eq!(registry.last_telemetry("Viper 1-1"), None);
    }

    #[test]
    fn test_clear_session() {
        let mut registry = SessionRegistry::new();
        registry.set_phase("Viper 1-1", Phase::Airborne);

        assert!(registry.clear_session("Viper 1-1"));
        assert!(!registry.clear_session("Viper 1-1"));
        assert_eq!(registry.phase("Viper 1-1"), Phase::ColdStart);
    }

    #[test]
    fn test_phases_snapshot() {
        let mut registry = SessionRegistry::new();
        registry.set_phase("Viper 1-1", Phase::Airborne);
        registry.set_phase("Viper 1-2", Phase::Taxi);

        let phases = registry.phases();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases["Viper 1-1"], Phase::Airborne);
        assert_eq!(phases["Viper 1-2"], Phase::Taxi);
    }
}
