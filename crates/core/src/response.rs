//! Response Generation
//!
//! Turns a classified transmission into the controller's spoken reply. A
//! configured [`TextGenerator`] is asked first; when it is missing,
//! unavailable or fails, the reply comes from a fixed per-intent template.
//! If no template for the intent can be filled, the reply degrades to
//! `"{callsign}, roger"`.

use crate::entities::{Entities, EntityKind};
use crate::intent::Intent;
use crate::llm_client::{Phraseology, StyleContext, TextGeneration};
use crate::phase::Phase;
use crate::telemetry::Telemetry;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Callsign used in replies when neither the session nor the transmission
/// names one.
pub const DEFAULT_CALLSIGN: &str = "Aircraft";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("valid placeholder regex"));

/// Candidate templates per intent, tried in order.
const TEMPLATES: &[(Intent, &[&str])] = &[
    (
        Intent::RequestTakeoff,
        &["{callsign}, cleared for takeoff runway {runway}"],
    ),
    (
        Intent::RequestLanding,
        &["{callsign}, cleared to land runway {runway}"],
    ),
    (
        Intent::RequestTaxi,
        &["{callsign}, taxi via {taxiway} to runway {runway}"],
    ),
    (Intent::RequestStartup, &["{callsign}, cleared for startup"]),
    (
        Intent::AltitudeChange,
        &["{callsign}, climb and maintain {altitude}"],
    ),
    (
        Intent::HeadingChange,
        &[
            "{callsign}, turn {direction} heading {heading}",
            "{callsign}, fly heading {heading}",
        ],
    ),
    (Intent::SpeedChange, &["{callsign}, maintain {speed} knots"]),
    (Intent::ReportPosition, &["{callsign}, radar contact"]),
    (Intent::HoldPosition, &["{callsign}, hold position"]),
    (Intent::Roger, &["{callsign}, roger"]),
    (
        Intent::Emergency,
        &["{callsign}, roger emergency, all runways available, say intentions"],
    ),
    (Intent::Unknown, &["{callsign}, roger"]),
];

/// Everything the generator needs to know about one transmission.
#[derive(Debug, Clone, Default)]
pub struct ResponseContext {
    /// The session callsign. Wins over a callsign heard in the transmission.
    pub callsign: Option<String>,
    pub intent: Intent,
    pub entities: Entities,
    pub phase: Phase,
    pub raw_text: Option<String>,
    pub telemetry: Option<Telemetry>,
    /// Earlier transmissions from the same aircraft, oldest first.
    pub history: Vec<String>,
    /// Placeholder values used when the pilot did not say them (runway, taxiway).
    pub defaults: BTreeMap<String, String>,
}

impl ResponseContext {
    pub fn new(intent: Intent, entities: Entities, phase: Phase) -> Self {
        Self {
            intent,
            entities,
            phase,
            ..Default::default()
        }
    }

    /// The callsign to address: session, then transmission, then [`DEFAULT_CALLSIGN`].
    pub fn callsign(&self) -> &str {
        self.callsign
            .as_deref()
            .or_else(|| self.entities.get(EntityKind::Callsign))
            .unwrap_or(DEFAULT_CALLSIGN)
    }

    /// Renders the user prompt sent to the text generator.
    pub fn prompt(&self, phraseology: Phraseology) -> String {
        let entities = serde_json::to_string(&self.entities).unwrap_or_default();
        let mut prompt = format!(
            "Pilot transmission: \"{}\"\nIntent: {}\nEntities: {}\nFlight phase: {}\n",
            self.raw_text.as_deref().unwrap_or_default(),
            self.intent,
            entities,
            self.phase
        );
        if let Some(telemetry) = &self.telemetry {
            prompt.push_str(&format!(
                "Aircraft state: speed {:.0} knots, altitude {:.0} feet\n",
                telemetry.speed,
                telemetry.altitude()
            ));
        }
        if !self.history.is_empty() {
            prompt.push_str("Recent transmissions:\n");
            for line in &self.history {
                prompt.push_str(&format!("- \"{}\"\n", line));
            }
        }
        prompt.push_str(&format!(
            "\nProvide a brief, authentic ATC response (1-2 sentences max). \
             Use proper {} phraseology.",
            phraseology
        ));
        prompt
    }
}

/// Fills `{name}` placeholders from `values`. Returns `None` if any
/// placeholder has no value.
pub fn fill_template(template: &str, values: &BTreeMap<&str, &str>) -> Option<String> {
    let mut missing = false;
    let filled = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        match values.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => {
                missing = true;
                String::new()
            }
        }
    });
    if missing { None } else { Some(filled.into_owned()) }
}

/// Produces controller replies.
#[derive(Debug, Clone, Default)]
pub struct ResponseGenerator {
    generation: TextGeneration,
    phraseology: Phraseology,
}

impl ResponseGenerator {
    pub fn new(generation: TextGeneration, phraseology: Phraseology) -> Self {
        Self {
            generation,
            phraseology,
        }
    }

    pub fn phraseology(&self) -> Phraseology {
        self.phraseology
    }

    /// Whether a text generator is configured and currently reachable.
    pub async fn generator_available(&self) -> bool {
        match &self.generation {
            TextGeneration::Unavailable => false,
            TextGeneration::Available(generator) => generator.available().await,
        }
    }

    /// Produces a reply. Never fails.
    pub async fn generate(&self, context: &ResponseContext) -> String {
        if let TextGeneration::Available(generator) = &self.generation {
            if generator.available().await {
                let style = StyleContext {
                    phraseology: self.phraseology,
                    callsign: context.callsign().to_string(),
                    phase: context.phase,
                };
                match generator
                    .generate(&context.prompt(self.phraseology), &style)
                    .await
                {
                    Ok(reply) => return reply,
                    Err(e) => warn!(error = ?e, "Text generation failed, using template"),
                }
            } else {
                debug!("Text generator unavailable, using template");
            }
        }

        self.from_template(context)
    }

    /// The deterministic template reply for `context`.
    pub fn from_template(&self, context: &ResponseContext) -> String {
        let callsign = context.callsign();

        let mut values: BTreeMap<&str, &str> = context
            .defaults
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        values.extend(context.entities.iter().map(|(k, v)| (k.as_str(), v)));
        values.insert("callsign", callsign);

        let candidates = TEMPLATES
            .iter()
            .find(|(intent, _)| *intent == context.intent)
            .map(|(_, templates)| *templates)
            .unwrap_or_default();

        candidates
            .iter()
            .find_map(|template| fill_template(template, &values))
            .unwrap_or_else(|| {
                debug!(intent = %context.intent, "Template placeholders missing, replying roger");
                format!("{}, roger", callsign)
            })
    }
}
