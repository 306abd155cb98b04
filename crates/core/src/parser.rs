//! Command Parser
//!
//! Composes the intent classifier and the entity extractor into a single
//! [`ParsedCommand`].

use crate::entities::{Entities, EntityExtractor};
use crate::intent::{Intent, IntentClassifier};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The structured reading of one transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub intent: Intent,
    pub entities: Entities,
    pub raw_text: String,
}

/// Parses raw transmissions. Holds the compiled pattern sets, so build it once
/// and share it.
#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    classifier: IntentClassifier,
    extractor: EntityExtractor,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, text: &str) -> ParsedCommand {
        let parsed = ParsedCommand {
            intent: self.classifier.classify(text),
            entities: self.extractor.extract_all(text),
            raw_text: text.to_string(),
        };
        debug!(?parsed, "Parsed command");
        parsed
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }
}
