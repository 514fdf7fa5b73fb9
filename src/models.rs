use serde::{Deserialize, Serialize};
use std::fmt;

/// Elemental association of a card
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Element {
    Air,
    Water,
    Fire,
    Earth,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Meanings {
    pub upright: Vec<String>,
    pub reversed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub id: u32,
    pub name: String,
    pub element: Element,
    pub keywords: Vec<String>,
    pub meanings: Meanings,
    pub description: String,
    pub image: String, // opaque asset reference, never read by the reading pipeline
}

/// Spread layout requested by the caller. Unknown tags fall back to `OneCard`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingType {
    #[default]
    OneCard,
    ThreeCard,
    CelticCross,
}

impl ReadingType {
    /// Lenient parse: accepts the spelled-out tags and the short `1-card`/`3-card` forms
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "one-card" | "1-card" | "single" => ReadingType::OneCard,
            "three-card" | "3-card" => ReadingType::ThreeCard,
            "celtic-cross" | "10-card" => ReadingType::CelticCross,
            _ => ReadingType::default(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingType::OneCard => "one-card",
            ReadingType::ThreeCard => "three-card",
            ReadingType::CelticCross => "celtic-cross",
        }
    }

    /// Number of cards the spread is laid out for
    pub fn expected_cards(&self) -> usize {
        match self {
            ReadingType::OneCard => 1,
            ReadingType::ThreeCard => 3,
            ReadingType::CelticCross => 10,
        }
    }

    /// Named spread positions; empty for spreads without positional meaning
    pub fn positions(&self) -> &'static [&'static str] {
        match self {
            ReadingType::OneCard => &[],
            ReadingType::ThreeCard => &THREE_CARD_POSITIONS,
            ReadingType::CelticCross => &CELTIC_CROSS_POSITIONS,
        }
    }

    /// Label for the card at `index` (0-based) within this spread
    pub fn position_label(&self, index: usize) -> String {
        let positions = self.positions();
        if positions.is_empty() {
            return SINGLE_CARD_LABEL.to_string();
        }
        match positions.get(index) {
            Some(label) => label.to_string(),
            None => format!("Card {}", index + 1),
        }
    }
}

pub const SINGLE_CARD_LABEL: &str = "Your Card";

pub const THREE_CARD_POSITIONS: [&str; 3] = ["Past", "Present", "Future"];

pub const CELTIC_CROSS_POSITIONS: [&str; 10] = [
    "Present",
    "Challenge",
    "Past",
    "Future",
    "Above (Conscious Goal)",
    "Below (Foundation)",
    "Advice",
    "External Influences",
    "Hopes and Fears",
    "Outcome",
];

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ReadingRequest {
    pub question: String,
    pub reading_type: ReadingType,
    pub cards: Vec<Card>, // order encodes spread position
}

impl ReadingRequest {
    pub fn new(question: impl Into<String>, reading_type: &str, cards: Vec<Card>) -> Self {
        Self {
            question: question.into(),
            reading_type: ReadingType::parse(reading_type),
            cards,
        }
    }
}

/// Where the returned reading text came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "name")]
pub enum Provenance {
    Provider(String),
    Fallback,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Provider(name) => write!(f, "{}", name),
            Provenance::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadingResult {
    pub text: String,
    pub provenance: Provenance,
    pub reports: Vec<crate::retry::ProviderReport>,
}
