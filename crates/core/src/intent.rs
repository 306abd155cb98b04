//! Intent Classification
//!
//! Maps a raw transmission to one discrete [`Intent`] using an ordered table of
//! regex rules. The table is walked in declaration order and the first pattern
//! that matches anywhere in the text decides the intent, so the order below is
//! part of the behavior: "request climb to 5000 heading 270" is an altitude
//! change, not a heading change.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// The purpose of a pilot transmission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    RequestTakeoff,
    RequestLanding,
    RequestTaxi,
    RequestStartup,
    AltitudeChange,
    HeadingChange,
    SpeedChange,
    ReportPosition,
    HoldPosition,
    Roger,
    Emergency,
    #[default]
    Unknown,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::RequestTakeoff => "request_takeoff",
            Intent::RequestLanding => "request_landing",
            Intent::RequestTaxi => "request_taxi",
            Intent::RequestStartup => "request_startup",
            Intent::AltitudeChange => "altitude_change",
            Intent::HeadingChange => "heading_change",
            Intent::SpeedChange => "speed_change",
            Intent::ReportPosition => "report_position",
            Intent::HoldPosition => "hold_position",
            Intent::Roger => "roger",
            Intent::Emergency => "emergency",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intent rules in priority order. Patterns run against lower-cased text.
const INTENT_PATTERNS: &[(Intent, &[&str])] = &[
    (
        Intent::RequestTakeoff,
        &[
            r"\b(request|ready for|cleared for)\s+(takeoff|departure)",
            r"\btakeoff clearance\b",
            r"\brequest departure\b",
        ],
    ),
    (
        Intent::RequestLanding,
        &[
            r"\b(request|ready for|cleared for)\s+landing",
            r"\blanding clearance\b",
            r"\binbound for landing\b",
            r"\brequest to land\b",
        ],
    ),
    (
        Intent::RequestTaxi,
        &[
            r"\b(request|ready for)\s+taxi",
            r"\btaxi clearance\b",
            r"\btaxi to\b",
        ],
    ),
    (
        Intent::RequestStartup,
        &[
            r"\b(request|ready for)\s+startup",
            r"\bstartup clearance\b",
        ],
    ),
    (
        Intent::AltitudeChange,
        &[
            r"\b(climb|descend|maintain)\s+(and maintain|to|altitude)",
            r"\brequest (climb|descent)\b",
            r"\bflight level\b",
        ],
    ),
    (
        Intent::HeadingChange,
        &[
            r"\b(turn|heading)\s+(left|right|to)?\s*\d{3}",
            r"\brequest heading\b",
        ],
    ),
    (
        Intent::SpeedChange,
        &[
            r"\b(increase|decrease|maintain)\s+speed",
            r"\b\d+\s+knots\b",
        ],
    ),
    (
        Intent::ReportPosition,
        &[
            r"\breporting\b",
            r"\bposition\b",
            r"\bmiles (north|south|east|west)\b",
        ],
    ),
    (
        Intent::HoldPosition,
        &[r"\bhold (short|position)\b", r"\bholding\b"],
    ),
    (Intent::Roger, &[r"\b(roger|copy|wilco|affirm)\b"]),
    (Intent::Emergency, &[r"\b(mayday|emergency|pan pan)\b"]),
];

/// Rule-based intent classifier.
///
/// Patterns are compiled once in [`IntentClassifier::new`]; `classify` is a
/// pure function of its input and safe to call from any number of tasks.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<(Intent, Vec<Regex>)>,
}

impl IntentClassifier {
    pub fn new() -> Self {
        let rules = INTENT_PATTERNS
            .iter()
            .map(|(intent, patterns)| {
                let compiled = patterns
                    .iter()
                    .map(|p| Regex::new(p).expect("valid intent regex"))
                    .collect();
                (*intent, compiled)
            })
            .collect();
        Self { rules }
    }

    /// Classifies `text`, returning [`Intent::Unknown`] when nothing matches.
    pub fn classify(&self, text: &str) -> Intent {
        let text_lower = text.to_lowercase();

        for (intent, patterns) in &self.rules {
            if patterns.iter().any(|p| p.is_match(&text_lower)) {
                debug!(%intent, "Classified intent");
                return *intent;
            }
        }

        debug!("Unknown intent");
        Intent::Unknown
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}
