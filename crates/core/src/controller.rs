//! ATC Controller Service
//!
//! This module ties the parser, the phase state machine, the runway queues and
//! the response generator together behind one service object. It is the API
//! the rest of the system talks to: the voice pipeline hands it transcribed
//! transmissions, the simulator bridge hands it telemetry.
//!
//! The session registry and the queue map each sit behind their own lock.
//! Whenever both are needed they are taken in one order, sessions then
//! queues, and held together so that phase and queue effects commit as one
//! step. The reply is generated only after both locks are released, so a slow
//! text generator never stalls telemetry ingestion.

use crate::intent::Intent;
use crate::llm_client::{Phraseology, TextGeneration};
use crate::parser::{CommandParser, ParsedCommand};
use crate::phase::Phase;
use crate::queue::{QueueEntry, QueueManager};
use crate::response::{ResponseContext, ResponseGenerator};
use crate::session::{Decision, SessionRegistry};
use crate::telemetry::Telemetry;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

/// Queue of aircraft cleared to taxi and waiting to depart.
pub const TAKEOFF_QUEUE: &str = "takeoff";
/// Queue of aircraft cleared to land, emergencies first.
pub const LANDING_QUEUE: &str = "landing";

/// What moved a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Request,
    Telemetry,
}

/// A committed phase change, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseChange {
    pub callsign: String,
    pub from: Phase,
    pub to: Phase,
    pub source: ChangeSource,
}

/// The outcome of one transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transmission {
    pub response: String,
    /// Phase the aircraft is in once the transmission has been applied.
    pub phase: Phase,
}

/// Controller-wide settings.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub phraseology: Phraseology,
    /// Runway used in replies when the pilot did not name one.
    pub default_runway: String,
    /// Taxiway used in taxi clearances.
    pub default_taxiway: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            phraseology: Phraseology::Military,
            default_runway: "31".to_string(),
            default_taxiway: "alpha".to_string(),
        }
    }
}

/// The ATC service: one instance owns all tracked sessions and queues.
pub struct AtcController {
    parser: CommandParser,
    responder: ResponseGenerator,
    settings: ControllerSettings,
    /// Phase and history per callsign.
    sessions: Arc<Mutex<SessionRegistry>>,
    /// Runway queues by tag.
    queues: Arc<Mutex<QueueManager>>,
    /// Optional channel for broadcasting phase changes to subscribers.
    phase_tx: Option<mpsc::Sender<PhaseChange>>,
}

impl AtcController {
    /// Creates a controller with no tracked aircraft.
    pub fn new(generation: TextGeneration, settings: ControllerSettings) -> Self {
        Self {
            parser: CommandParser::new(),
            responder: ResponseGenerator::new(generation, settings.phraseology),
            settings,
            sessions: Arc::new(Mutex::new(SessionRegistry::new())),
            queues: Arc::new(Mutex::new(QueueManager::new())),
            phase_tx: None,
        }
    }

    /// Broadcasts every committed phase change on `tx`.
    pub fn with_phase_updates(mut self, tx: mpsc::Sender<PhaseChange>) -> Self {
        self.phase_tx = Some(tx);
        self
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Parses a transmission without touching any state.
    pub fn parse(&self, text: &str) -> ParsedCommand {
        self.parser.parse(text)
    }

    /// Handles one pilot transmission end to end and returns the reply.
    ///
    /// See [`AtcController::process_transmission`]. This never fails.
    pub async fn process_request(
        &self,
        callsign: &str,
        text: &str,
        telemetry: Option<&Telemetry>,
    ) -> String {
        self.process_transmission(callsign, text, telemetry)
            .await
            .response
    }

    /// Handles one pilot transmission and returns the reply together with
    /// the phase the transmission left the aircraft in.
    ///
    /// The transmission is parsed, checked against the phase rules and
    /// applied to the session and queues while both locks are held (sessions
    /// first, then queues). Refusals and clarification requests are answered
    /// with a fixed phrase; everything else goes through the response
    /// generator once both locks are released. When the transmission carries
    /// no telemetry, the last recorded sample for the aircraft is used.
    pub async fn process_transmission(
        &self,
        callsign: &str,
        text: &str,
        telemetry: Option<&Telemetry>,
    ) -> Transmission {
        let command = self.parser.parse(text);

        let (decision, history, known_state) = {
            let mut sessions = self.sessions.lock().await;
            let decision = sessions.process_request(callsign, &command);
            if let Some(sample) = telemetry {
                sessions.record_telemetry(callsign, *sample);
            }
            let known_state = sessions.last_telemetry(callsign);

            let mut queues = self.queues.lock().await;
            apply_queue_policy(&mut queues, callsign, command.intent, &decision);

            (decision, sessions.history(callsign), known_state)
        };

        if let Decision::Transition { from, to } = decision {
            self.publish(PhaseChange {
                callsign: callsign.to_string(),
                from,
                to,
                source: ChangeSource::Request,
            })
            .await;
        }

        let phase = decision.phase();
        let response = match decision {
            Decision::Refuse { reason, .. } => format!("{}, {}", callsign, reason),
            _ => {
                let context =
                    self.response_context(callsign, command, phase, known_state, history);
                self.responder.generate(&context).await
            }
        };

        info!(%callsign, %text, %response, %phase, "Processed transmission");
        Transmission { response, phase }
    }

    fn response_context(
        &self,
        callsign: &str,
        command: ParsedCommand,
        phase: Phase,
        telemetry: Option<Telemetry>,
        history: Vec<ParsedCommand>,
    ) -> ResponseContext {
        // The session history already ends with this transmission.
        let mut earlier: Vec<String> = history.into_iter().map(|c| c.raw_text).collect();
        earlier.pop();

        ResponseContext {
            callsign: Some(callsign.to_string()),
            intent: command.intent,
            entities: command.entities,
            phase,
            raw_text: Some(command.raw_text),
            telemetry,
            history: earlier,
            defaults: BTreeMap::from([
                ("runway".to_string(), self.settings.default_runway.clone()),
                ("taxiway".to_string(), self.settings.default_taxiway.clone()),
            ]),
        }
    }

    /// Feeds one telemetry sample into phase inference.
    ///
    /// The sample is always recorded as the aircraft's last known state.
    /// Returns the committed change, if any. A transition to `Landed` also
    /// releases the aircraft from the landing queue before the session lock
    /// is given up.
    pub async fn update_from_telemetry(
        &self,
        callsign: &str,
        telemetry: &Telemetry,
    ) -> Option<PhaseChange> {
        let (from, to) = {
            let mut sessions = self.sessions.lock().await;
            sessions.record_telemetry(callsign, *telemetry);
            let (from, to) =
                sessions.update_from_telemetry(callsign, telemetry.speed, telemetry.altitude())?;

            if to == Phase::Landed {
                self.queues.lock().await.remove(LANDING_QUEUE, callsign);
            }
            (from, to)
        };

        let change = PhaseChange {
            callsign: callsign.to_string(),
            from,
            to,
            source: ChangeSource::Telemetry,
        };
        self.publish(change.clone()).await;
        Some(change)
    }

    async fn publish(&self, change: PhaseChange) {
        if let Some(tx) = &self.phase_tx {
            if tx.send(change).await.is_err() {
                warn!("Failed to broadcast phase change: receiver dropped.");
            }
        }
    }

    // --- Session queries ---

    pub async fn phase(&self, callsign: &str) -> Phase {
        self.sessions.lock().await.phase(callsign)
    }

    pub async fn phases(&self) -> HashMap<String, Phase> {
        self.sessions.lock().await.phases()
    }

    pub async fn history(&self, callsign: &str) -> Vec<ParsedCommand> {
        self.sessions.lock().await.history(callsign)
    }

    /// Most recent telemetry sample seen for the aircraft.
    pub async fn last_telemetry(&self, callsign: &str) -> Option<Telemetry> {
        self.sessions.lock().await.last_telemetry(callsign)
    }

    /// Operator override of an aircraft's phase.
    pub async fn set_phase(&self, callsign: &str, phase: Phase) {
        self.sessions.lock().await.set_phase(callsign, phase);
    }

    /// Forgets an aircraft's session. Queue entries are left alone.
    pub async fn clear_session(&self, callsign: &str) -> bool {
        self.sessions.lock().await.clear_session(callsign)
    }

    // --- Queue API ---

    pub async fn enqueue(&self, tag: &str, callsign: &str, priority: bool) -> usize {
        self.queues.lock().await.enqueue(tag, callsign, priority)
    }

    pub async fn remove(&self, tag: &str, callsign: &str) -> usize {
        self.queues.lock().await.remove(tag, callsign)
    }

    pub async fn contains(&self, tag: &str, callsign: &str) -> bool {
        self.queues.lock().await.contains(tag, callsign)
    }

    pub async fn position_of(&self, tag: &str, callsign: &str) -> Option<usize> {
        self.queues.lock().await.position_of(tag, callsign)
    }

    pub async fn peek_next(&self, tag: &str) -> Option<String> {
        self.queues.lock().await.peek_next(tag).map(str::to_string)
    }

    pub async fn pop_next(&self, tag: &str) -> Option<QueueEntry> {
        self.queues.lock().await.pop_next(tag)
    }

    pub async fn clear(&self, tag: &str) -> usize {
        self.queues.lock().await.clear(tag)
    }

    pub async fn queue(&self, tag: &str) -> Vec<QueueEntry> {
        self.queues.lock().await.entries(tag)
    }

    /// Whether replies can currently come from the text generator.
    pub async fn generator_available(&self) -> bool {
        self.responder.generator_available().await
    }
}

/// Keeps the runway queues in step with granted requests.
fn apply_queue_policy(
    queues: &mut QueueManager,
    callsign: &str,
    intent: Intent,
    decision: &Decision,
) {
    let granted = matches!(decision, Decision::Transition { .. });

    match intent {
        Intent::RequestTaxi if granted => {
            if !queues.contains(TAKEOFF_QUEUE, callsign) {
                queues.enqueue(TAKEOFF_QUEUE, callsign, false);
            }
        }
        Intent::RequestTakeoff if granted => {
            queues.remove(TAKEOFF_QUEUE, callsign);
        }
        Intent::RequestLanding if granted => {
            if !queues.contains(LANDING_QUEUE, callsign) {
                queues.enqueue(LANDING_QUEUE, callsign, false);
            }
        }
        Intent::Emergency if decision.phase().is_airborne() => {
            queues.remove(LANDING_QUEUE, callsign);
            queues.enqueue(LANDING_QUEUE, callsign, true);
        }
        _ => {}
    }
}

impl Default for AtcController {
    fn default() -> Self {
        Self::new(TextGeneration::Unavailable, ControllerSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{MockTextGenerator, StyleContext, TextGenerator};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_takeoff_from_taxi_is_cleared() {
        let controller = AtcController::default();
        controller.set_phase("Viper 1-1", Phase::Taxi).await;

        let response = controller
            .process_request("Viper 1-1", "request takeoff clearance", None)
            .await;

        assert_eq!(controller.phase("Viper 1-1").await, Phase::Takeoff);
        assert!(response.contains("cleared for takeoff"), "{response}");
        assert!(response.starts_with("Viper 1-1"));
    }

    #[tokio::test]
    async fn test_takeoff_from_cold_start_is_refused() {
        let controller = AtcController::default();

        let response = controller
            .process_request("Viper 1-1", "request takeoff clearance", None)
            .await;

        assert_eq!(controller.phase("Viper 1-1").await, Phase::ColdStart);
        assert!(response.contains("unable"), "{response}");
        assert_eq!(response, "Viper 1-1, unable, not in position for takeoff");
    }

    #[tokio::test]
    async fn test_missing_entity_asks_for_it() {
        let controller = AtcController::default();
        controller.set_phase("Viper 1-1", Phase::Airborne).await;

        assert_eq!(
            controller.process_request("Viper 1-1", "request climb", None).await,
            "Viper 1-1, say altitude"
        );
        assert_eq!(
            controller.process_request("Viper 1-1", "request heading", None).await,
            "Viper 1-1, say heading"
        );
        assert_eq!(controller.phase("Viper 1-1").await, Phase::Airborne);
    }

    #[tokio::test]
    async fn test_unknown_transmission_gets_roger() {
        let controller = AtcController::default();
        let response = controller
            .process_request("Viper 1-1", "asdf qwerty zxcv", None)
            .await;

        assert_eq!(response, "Viper 1-1, roger");
        assert_eq!(controller.phase("Viper 1-1").await, Phase::ColdStart);
    }

    #[tokio::test]
    async fn test_taxi_uses_configured_defaults() {
        let controller = AtcController::new(
            TextGeneration::Unavailable,
            ControllerSettings {
                default_runway: "13".to_string(),
                default_taxiway: "bravo".to_string(),
                ..Default::default()
            },
        );

        let response = controller
            .process_request("Viper 1-1", "Ground, Viper 1-1, request taxi", None)
            .await;

        assert_eq!(response, "Viper 1-1, taxi via bravo to runway 13");
        assert_eq!(controller.phase("Viper 1-1").await, Phase::Taxi);
    }

    #[tokio::test]
    async fn test_taxi_enqueues_and_takeoff_releases() {
        let controller = AtcController::default();

        controller.process_request("Viper 1-1", "request taxi", None).await;
        controller.process_request("Viper 1-1", "request taxi", None).await;
        controller.process_request("Viper 1-2", "request taxi", None).await;

        assert_eq!(controller.queue(TAKEOFF_QUEUE).await.len(), 2);
        assert_eq!(controller.peek_next(TAKEOFF_QUEUE).await.as_deref(), Some("Viper 1-1"));

        controller
            .process_request("Viper 1-1", "ready for takeoff", None)
            .await;
        assert!(!controller.contains(TAKEOFF_QUEUE, "Viper 1-1").await);
        assert_eq!(controller.position_of(TAKEOFF_QUEUE, "Viper 1-2").await, Some(0));
    }

    #[tokio::test]
    async fn test_emergency_jumps_landing_queue() {
        let controller = AtcController::default();
        controller.set_phase("Viper 1-1", Phase::Airborne).await;
        controller.set_phase("Viper 1-2", Phase::Airborne).await;

        controller
            .process_request("Viper 1-1", "request landing", None)
            .await;
        let response = controller
            .process_request("Viper 1-2", "mayday mayday, engine fire", None)
            .await;

        assert!(response.contains("emergency"), "{response}");
        assert_eq!(controller.peek_next(LANDING_QUEUE).await.as_deref(), Some("Viper 1-2"));
        assert_eq!(controller.position_of(LANDING_QUEUE, "Viper 1-1").await, Some(1));
    }

    #[tokio::test]
    async fn test_emergency_on_ground_is_not_queued() {
        let controller = AtcController::default();
        controller.set_phase("Viper 1-1", Phase::Taxi).await;

        controller
            .process_request("Viper 1-1", "pan pan, hydraulic failure", None)
            .await;

        assert!(controller.queue(LANDING_QUEUE).await.is_empty());
        assert_eq!(controller.phase("Viper 1-1").await, Phase::Taxi);
    }

    #[tokio::test]
    async fn test_landed_leaves_landing_queue() {
        let controller = AtcController::default();
        controller.set_phase("Viper 1-1", Phase::Approach).await;
        controller
            .process_request("Viper 1-1", "request landing", None)
            .await;
        assert!(controller.contains(LANDING_QUEUE, "Viper 1-1").await);

        let change = controller
            .update_from_telemetry("Viper 1-1", &Telemetry::new(30.0, 40.0))
            .await
            .unwrap();

        assert_eq!(change.from, Phase::Landing);
        assert_eq!(change.to, Phase::Landed);
        assert!(!controller.contains(LANDING_QUEUE, "Viper 1-1").await);
    }

    #[tokio::test]
    async fn test_phase_changes_are_broadcast() {
        let (tx, mut rx) = mpsc::channel(8);
        let controller = AtcController::default().with_phase_updates(tx);

        controller
            .process_request("Viper 1-1", "request startup", None)
            .await;
        controller
            .update_from_telemetry("Viper 1-1", &Telemetry::new(300.0, 5000.0))
            .await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.to, Phase::Startup);
        assert_eq!(first.source, ChangeSource::Request);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.to, Phase::Airborne);
        assert_eq!(second.source, ChangeSource::Telemetry);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_break_processing() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let controller = AtcController::default().with_phase_updates(tx);

        let response = controller
            .process_request("Viper 1-1", "request startup", None)
            .await;
        assert_eq!(response, "Viper 1-1, cleared for startup");
    }

    #[tokio::test]
    async fn test_transmission_reports_resulting_phase() {
        let controller = AtcController::default();
        controller.set_phase("Viper 1-1", Phase::Taxi).await;

        let cleared = controller
            .process_transmission("Viper 1-1", "request takeoff clearance", None)
            .await;
        assert_eq!(cleared.phase, Phase::Takeoff);
        assert!(cleared.response.contains("cleared for takeoff"));

        let refused = controller
            .process_transmission("Viper 1-2", "request takeoff clearance", None)
            .await;
        assert_eq!(refused.phase, Phase::ColdStart);
        assert_eq!(refused.response, "Viper 1-2, unable, not in position for takeoff");
    }

    #[tokio::test]
    async fn test_last_telemetry_reaches_the_reply() {
        let mut mock = MockTextGenerator::new();
        mock.expect_available().returning(|| true);
        mock.expect_generate()
            .withf(|prompt, _| {
                prompt.contains("Aircraft state: speed 300 knots, altitude 5000 feet")
            })
            .times(1)
            .returning(|_, _| Ok("Viper 1-1, copy".to_string()));
        let controller =
            AtcController::new(TextGeneration::available(mock), ControllerSettings::default());
        controller.set_phase("Viper 1-1", Phase::Airborne).await;

        let change = controller
            .update_from_telemetry("Viper 1-1", &Telemetry::new(300.0, 5000.0))
            .await;
        assert!(change.is_none());
        assert_eq!(
            controller.last_telemetry("Viper 1-1").await,
            Some(Telemetry::new(300.0, 5000.0))
        );

        let response = controller
            .process_request("Viper 1-1", "Viper 1-1, copy", None)
            .await;
        assert_eq!(response, "Viper 1-1, copy");
    }

    #[tokio::test]
    async fn test_attached_telemetry_replaces_recorded_state() {
        let controller = AtcController::default();
        controller
            .update_from_telemetry("Viper 1-1", &Telemetry::new(300.0, 5000.0))
            .await;

        controller
            .process_request("Viper 1-1", "request landing", Some(&Telemetry::new(180.0, 1500.0)))
            .await;

        assert_eq!(
            controller.last_telemetry("Viper 1-1").await,
            Some(Telemetry::new(180.0, 1500.0))
        );
    }

    #[tokio::test]
    async fn test_queue_effects_commit_under_session_lock() {
        let controller = Arc::new(AtcController::default());
        controller.set_phase("Viper 1-1", Phase::Approach).await;

        let queues = controller.queues.lock().await;
        let pending = {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .process_transmission("Viper 1-1", "request landing", None)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The request has its decision and is waiting on the queues, so the
        // registry must not be observable in between.
        let observed =
            tokio::time::timeout(Duration::from_millis(50), controller.phase("Viper 1-1")).await;
        assert!(observed.is_err());

        drop(queues);
        let transmission = pending.await.unwrap();
        assert_eq!(transmission.phase, Phase::Landing);
        assert!(controller.contains(LANDING_QUEUE, "Viper 1-1").await);

        let change = controller
            .update_from_telemetry("Viper 1-1", &Telemetry::new(20.0, 40.0))
            .await;
        assert_eq!(change.map(|c| c.to), Some(Phase::Landed));
        assert!(controller.queue(LANDING_QUEUE).await.is_empty());
    }

    /// A generator that parks until released, to observe lock behavior.
    struct ParkedGenerator {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl TextGenerator for ParkedGenerator {
        async fn available(&self) -> bool {
            true
        }

        async fn generate(&self, _prompt: &str, style: &StyleContext) -> Result<String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(format!("{}, generated", style.callsign))
        }
    }

    #[tokio::test]
    async fn test_generation_runs_outside_locks() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let controller = Arc::new(AtcController::new(
            TextGeneration::available(ParkedGenerator {
                entered: entered.clone(),
                release: release.clone(),
            }),
            ControllerSettings::default(),
        ));

        let pending = {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .process_request("Viper 1-1", "request startup", None)
                    .await
            })
        };
        entered.notified().await;

        // The generator is parked; registry and queues must still be usable.
        let telemetry = tokio::time::timeout(
            Duration::from_secs(1),
            controller.update_from_telemetry("Viper 1-1", &Telemetry::new(300.0, 5000.0)),
        )
        .await
        .expect("registry lock held during generation");
        assert_eq!(telemetry.map(|c| c.to), Some(Phase::Airborne));
        tokio::time::timeout(Duration::from_secs(1), controller.peek_next(TAKEOFF_QUEUE))
            .await
            .expect("queue lock held during generation");

        release.notify_one();
        assert_eq!(pending.await.unwrap(), "Viper 1-1, generated");
    }

    #[tokio::test]
    async fn test_concurrent_requests_and_telemetry() {
        let controller = Arc::new(AtcController::default());
        let mut handles = Vec::new();

        for i in 0..8 {
            let controller = controller.clone();
            let callsign = format!("Viper 1-{}", i);
            handles.push(tokio::spawn(async move {
                controller.process_request(&callsign, "request startup", None).await;
                controller.process_request(&callsign, "request taxi", None).await;
                controller
                    .update_from_telemetry(&callsign, &Telemetry::new(300.0, 5000.0))
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let phases = controller.phases().await;
        assert_eq!(phases.len(), 8);
        assert!(phases.values().all(|p| *p == Phase::Airborne));
        assert_eq!(controller.queue(TAKEOFF_QUEUE).await.len(), 8);
    }
}
