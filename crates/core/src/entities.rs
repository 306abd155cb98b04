//! Entity Extraction
//!
//! Pulls typed fields (callsign, altitude, heading, runway, ...) out of a raw
//! transmission. Each field has its own ordered pattern list and extraction
//! for that field stops at the first pattern that matches.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A field that can be extracted from a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Callsign,
    Altitude,
    Heading,
    Runway,
    Speed,
    Frequency,
    Direction,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Callsign,
        EntityKind::Altitude,
        EntityKind::Heading,
        EntityKind::Runway,
        EntityKind::Speed,
        EntityKind::Frequency,
        EntityKind::Direction,
    ];

    /// The placeholder / JSON key name of this field.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Callsign => "callsign",
            EntityKind::Altitude => "altitude",
            EntityKind::Heading => "heading",
            EntityKind::Runway => "runway",
            EntityKind::Speed => "speed",
            EntityKind::Frequency => "frequency",
            EntityKind::Direction => "direction",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fields found in one transmission. Fields that did not match are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entities(BTreeMap<EntityKind, String>);

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: EntityKind) -> Option<&str> {
        self.0.get(&kind).map(String::as_str)
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.0.contains_key(&kind)
    }

    pub fn insert(&mut self, kind: EntityKind, value: impl Into<String>) -> Option<String> {
        self.0.insert(kind, value.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl FromIterator<(EntityKind, String)> for Entities {
    fn from_iter<I: IntoIterator<Item = (EntityKind, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Frequency reported when the pilot says "guard".
const GUARD_FREQUENCY: &str = "243.0";

const CALLSIGN_PATTERNS: &[&str] = &[
    r"\b([A-Z][a-z]+\s+\d+-\d+)\b",                     // Viper 1-1
    r"\b(Navy\s+[A-Z][a-z]+\s+[A-Z][a-z]+\s+\d+)\b", // Navy Golf Alfa 21
    r"\b([A-Z]+\s+\d{4,})\b",                         // REACH 31792
    r"\b(N\d+[A-Z]{1,2})\b",                          // N978CP
];

const ALTITUDE_PATTERNS: &[&str] = &[
    r"\bflight level\s+(\d{2,3})\b",
    r"\bFL\s*(\d{2,3})\b",
    r"\b([\d,]+)\s*feet\b",
    r"\bangels?\s+(\d+)\b",
];

const HEADING_PATTERNS: &[&str] = &[
    r"\bheading\s+(\d{3})\b",
    r"\b(left|right)\s+(\d{3})\b",
    r"\bturn\s+.*?(\d{3})\b",
];

const RUNWAY_PATTERNS: &[&str] = &[
    r"\brunway\s+(\d{1,2}[LRC]?)\b",
    r"\bRWY\s+(\d{1,2}[LRC]?)\b",
];

const SPEED_PATTERNS: &[&str] = &[r"\b(\d{2,3})\s+knots\b", r"\bmach\s+([\d.]+)\b"];

const FREQUENCY_PATTERNS: &[&str] = &[r"\b(\d{3}\.\d{1,3})\b", r"\bguard\b"];

const DIRECTION_PATTERNS: &[&str] = &[r"\b(left|right)\b"];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("valid entity regex")
        })
        .collect()
}

/// Regex-based extractor for aviation entities.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    patterns: BTreeMap<EntityKind, Vec<Regex>>,
}

impl EntityExtractor {
    pub fn new() -> Self {
        let patterns = BTreeMap::from([
            (EntityKind::Callsign, compile(CALLSIGN_PATTERNS)),
            (EntityKind::Altitude, compile(ALTITUDE_PATTERNS)),
            (EntityKind::Heading, compile(HEADING_PATTERNS)),
            (EntityKind::Runway, compile(RUNWAY_PATTERNS)),
            (EntityKind::Speed, compile(SPEED_PATTERNS)),
            (EntityKind::Frequency, compile(FREQUENCY_PATTERNS)),
            (EntityKind::Direction, compile(DIRECTION_PATTERNS)),
        ]);
        Self { patterns }
    }

    /// Runs the pattern list for `kind` and returns the capture groups of the
    /// first pattern that matches. Group 0 (the whole match) is always present.
    fn first_match<'t>(&self, kind: EntityKind, text: &'t str) -> Option<Vec<&'t str>> {
        self.patterns.get(&kind)?.iter().find_map(|pattern| {
            pattern.captures(text).map(|caps| {
                caps.iter()
                    .flatten()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
            })
        })
    }

    /// Extracts one field, applying that field's post-processing.
    pub fn extract(&self, kind: EntityKind, text: &str) -> Option<String> {
        let groups = self.first_match(kind, text)?;
        let value = match kind {
            EntityKind::Altitude => groups.get(1)?.replace(',', ""),
            // Digits sit in different groups depending on the phrasing
            // ("heading 270" vs "turn left 330"), so take the last one.
            EntityKind::Heading => groups.last()?.to_string(),
            EntityKind::Frequency => match groups.get(1) {
                Some(freq) => freq.to_string(),
                None => GUARD_FREQUENCY.to_string(),
            },
            EntityKind::Direction => groups.get(1)?.to_lowercase(),
            EntityKind::Callsign | EntityKind::Runway | EntityKind::Speed => {
                groups.get(1)?.to_string()
            }
        };
        Some(value)
    }

    pub fn extract_callsign(&self, text: &str) -> Option<String> {
        self.extract(EntityKind::Callsign, text)
    }

    pub fn extract_altitude(&self, text: &str) -> Option<String> {
        self.extract(EntityKind::Altitude, text)
    }

    pub fn extract_heading(&self, text: &str) -> Option<String> {
        self.extract(EntityKind::Heading, text)
    }

    pub fn extract_runway(&self, text: &str) -> Option<String> {
        self.extract(EntityKind::Runway, text)
    }

    pub fn extract_speed(&self, text: &str) -> Option<String> {
        self.extract(EntityKind::Speed, text)
    }

    pub fn extract_frequency(&self, text: &str) -> Option<String> {
        self.extract(EntityKind::Frequency, text)
    }

    pub fn extract_direction(&self, text: &str) -> Option<String> {
        self.extract(EntityKind::Direction, text)
    }

    /// Extracts every field that matches; unmatched fields are omitted.
    pub fn extract_all(&self, text: &str) -> Entities {
        EntityKind::ALL
            .iter()
            .filter_map(|&kind| self.extract(kind, text).map(|value| (kind, value)))
            .collect()
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}
