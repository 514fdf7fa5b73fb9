use crate::models::{Card, ReadingType};

pub const CLOSING_SENTENCE: &str = "Trust your intuition as you reflect on these cards. The insights they offer are a starting point for your own reflection and growth.";

const GENERAL_GUIDANCE: &str = "General guidance";
const MAX_THEMES: usize = 4;

/// Template reading built only from card data. Used when no provider produced usable text.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackReader;

impl FallbackReader {
    pub fn render(&self, question: &str, reading_type: ReadingType, cards: &[Card]) -> String {
        let question = match question.trim() {
            "" => GENERAL_GUIDANCE,
            q => q,
        };

        let mut parts = Vec::with_capacity(cards.len() + 3);
        parts.push(title(reading_type).to_string());
        parts.push(format!("Question: {}", question));

        for (index, card) in cards.iter().enumerate() {
            parts.push(render_card(&reading_type.position_label(index), card));
        }

        parts.push(CLOSING_SENTENCE.to_string());
        parts.join("\n\n")
    }
}

fn title(reading_type: ReadingType) -> &'static str {
    match reading_type {
        ReadingType::OneCard => "Your Single Card Reading",
        ReadingType::ThreeCard => "Your Past, Present & Future Reading",
        ReadingType::CelticCross => "Your Celtic Cross Reading",
    }
}

fn render_card(label: &str, card: &Card) -> String {
    let description = card.description.trim();

    let meaning = if description.is_empty() {
        format!("{} invites a moment of quiet reflection.", card.name)
    } else {
        description.to_string()
    };

    let themes = if card.keywords.is_empty() {
        "Key themes: open to your own interpretation".to_string()
    } else {
        let themes: Vec<&str> = card
            .keywords
            .iter()
            .take(MAX_THEMES)
            .map(String::as_str)
            .collect();
        format!("Key themes: {}", themes.join(", "))
    };

    let suggestion = match first_clause(description) {
        Some(clause) => format!("This card suggests {}.", lowercase_first(clause)),
        None => "This card suggests a time for patience and reflection.".to_string(),
    };

    format!(
        "{}: {}\n{}\n{}\n{}",
        label, card.name, meaning, themes, suggestion
    )
}

/// Text up to the first comma, without trailing sentence punctuation
fn first_clause(description: &str) -> Option<&str> {
    let clause = description
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches(['.', '!', '?']);
    if clause.is_empty() { None } else { Some(clause) }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
