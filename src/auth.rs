//! Driver card authorization
//!
//! The card reader driver reports each tag's UID as upper-case hex. The
//! [`AuthorizationGate`] maps that id to the vehicle plate the driver may fuel.

use serde::Deserialize;
use tracing::debug;

use crate::constants::MAX_DRIVER_CARDS;
use crate::error::ConfigError;

/// Card id to plate lookup.
pub trait AuthorizationGate {
    /// Plate registered for `card_id`, if the card is authorized.
    fn lookup_card(&self, card_id: &str) -> Option<String>;
}

/// Registered driver card
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DriverCard {
    /// Card UID as hex
    pub uid: String,
    /// Vehicle plate
    pub plate: String,
}

impl DriverCard {
    /// Card with the given UID and plate
    pub fn new(uid: impl Into<String>, plate: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            plate: plate.into(),
        }
    }
}

/// Render a raw UID the way the reader driver reports it.
pub fn uid_to_hex(uid: &[u8]) -> String {
    uid.iter().map(|b| format!("{:02X}", b)).collect()
}

/// In-memory table of up to [`MAX_DRIVER_CARDS`] cards.
#[derive(Debug, Clone, Default)]
pub struct CardTable {
    cards: Vec<DriverCard>,
}

impl CardTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from configured cards, rejecting oversize lists.
    pub fn from_cards(cards: impl IntoIterator<Item = DriverCard>) -> Result<Self, ConfigError> {
        let mut table = Self::new();
        for card in cards {
            table.insert(card)?;
        }
        Ok(table)
    }

    /// Register a card; an existing UID gets its plate replaced.
    pub fn insert(&mut self, card: DriverCard) -> Result<(), ConfigError> {
        let uid = card.uid.trim().to_ascii_uppercase();

        if let Some(existing) = self.cards.iter_mut().find(|c| c.uid == uid) {
            existing.plate = card.plate;
            return Ok(());
        }

        if self.cards.len() >= MAX_DRIVER_CARDS {
            return Err(ConfigError::invalid(
                "drivers",
                format!("at most {} driver cards can be registered", MAX_DRIVER_CARDS),
            ));
        }

        self.cards.push(DriverCard {
            uid,
            plate: card.plate,
        });
        Ok(())
    }

    /// Number of registered cards
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// True if no card is registered
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Registered cards, UIDs upper-cased, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &DriverCard> {
        self.cards.iter()
    }
}

impl AuthorizationGate for CardTable {
    fn lookup_card(&self, card_id: &str) -> Option<String> {
        let card_id = card_id.trim();
        let found = self
            .cards
            .iter()
            .find(|c| c.uid.eq_ignore_ascii_case(card_id))
            .map(|c| c.plate.clone());

        if found.is_none() {
            debug!("Card {} not registered", card_id);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_to_hex() {
        assert_eq!(uid_to_hex(&[0x04, 0xA1, 0xB2, 0xC3]), "04A1B2C3");
        assert_eq!(uid_to_hex(&[]), "");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = CardTable::from_cards([DriverCard::new("04a1b2c3", "34 ABC 123")]).unwrap();

        assert_eq!(table.lookup_card("04A1B2C3").as_deref(), Some("34 ABC 123"));
        assert_eq!(table.lookup_card("04a1b2c3").as_deref(), Some("34 ABC 123"));
        assert_eq!(table.lookup_card("DEADBEEF"), None);
    }

    #[test]
    fn test_insert_replaces_existing_plate() {
        let mut table = CardTable::new();
        table.insert(DriverCard::new("AA", "OLD")).unwrap();
        table.insert(DriverCard::new("aa", "NEW")).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup_card("AA").as_deref(), Some("NEW"));
    }

    #[test]
    fn test_table_capacity() {
        let cards = (0..MAX_DRIVER_CARDS).map(|i| DriverCard::new(format!("{:08X}", i), "P"));
        let mut table = CardTable::from_cards(cards).unwrap();
        assert_eq!(table.len(), MAX_DRIVER_CARDS);

        let err = table.insert(DriverCard::new("FFFFFFFF", "P")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "drivers", .. }));
    }
}
