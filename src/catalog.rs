use std::path::Path;
use tracing::info;

use crate::models::Card;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read card catalog at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Card catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Card catalog is empty")]
    Empty,

    #[error("Card at position {position} has id {id}; ids must be dense and start at 0")]
    NonDenseId { position: usize, id: u32 },
}

/// Immutable, id-addressable card table loaded once at startup
#[derive(Debug, Clone)]
pub struct CardCatalog {
    cards: Vec<Card>,
}

impl CardCatalog {
    pub fn new(cards: Vec<Card>) -> Result<Self, CatalogError> {
        if cards.is_empty() {
            return Err(CatalogError::Empty);
        }

        for (position, card) in cards.iter().enumerate() {
            if card.id as usize != position {
                return Err(CatalogError::NonDenseId {
                    position,
                    id: card.id,
                });
            }
        }

        Ok(Self { cards })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let cards: Vec<Card> = serde_json::from_str(raw)?;
        Self::new(cards)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let catalog = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            card_count = catalog.len(),
            "Card catalog loaded"
        );
        Ok(catalog)
    }

    pub fn get(&self, id: u32) -> Option<&Card> {
        self.cards.get(id as usize)
    }

    /// Resolve ids in order, dropping any that are out of range
    pub fn select(&self, ids: &[i64]) -> Vec<Card> {
        ids.iter()
            .filter_map(|&id| u32::try_from(id).ok())
            .filter_map(|id| self.get(id).cloned())
            .collect()
    }

    pub fn all(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Element, Meanings};

    fn card(id: u32, name: &str) -> Card {
        Card {
            id,
            name: name.to_string(),
            element: Element::Water,
            keywords: vec![],
            meanings: Meanings::default(),
            description: String::new(),
            image: String::new(),
        }
    }

    #[test]
    fn test_select_keeps_order_and_drops_invalid_ids() {
        let catalog = CardCatalog::new(vec![card(0, "A"), card(1, "B"), card(2, "C")]).unwrap();

        let selected = catalog.select(&[2, -1, 0, 99]);
        let names: Vec<&str> = selected.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A"]);
    }

    #[test]
    fn test_rejects_gaps_in_ids() {
        let result = CardCatalog::new(vec![card(0, "A"), card(2, "C")]);
        assert!(matches!(
            result,
            Err(CatalogError::NonDenseId { position: 1, id: 2 })
        ));
    }

    #[test]
    fn test_rejects_empty_catalog() {
        assert!(matches!(CardCatalog::new(vec![]), Err(CatalogError::Empty)));
        assert!(matches!(
            CardCatalog::from_json_str("not json"),
            Err(CatalogError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_bundled_catalog_loads() {
        let catalog = CardCatalog::load(concat!(env!("CARGO_MANIFEST_DIR"), "/data/cards.json"))
            .await
            .unwrap();

        assert_eq!(catalog.len(), 78);
        assert_eq!(catalog.get(0).unwrap().name, "The Fool");
    }
}
