//! Character entity - an actor with a position, stats and an inventory.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::Record;
use crate::error::DomainError;
use crate::keys::EntityKind;
use crate::{CharacterName, Coords, ItemName};

/// A simulated or player-controlled actor.
///
/// The character's narrative log is addressed by its name. `inventory` mirrors
/// the items whose location is held by this character; it is maintained by the
/// store when items move and cannot be edited directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: CharacterName,
    pub coords: Coords,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, i64>,
    #[serde(default)]
    pub inventory: BTreeSet<ItemName>,
}

impl Character {
    pub fn new(name: CharacterName, coords: Coords) -> Self {
        Self {
            name,
            coords,
            description: String::new(),
            objective: None,
            attributes: BTreeMap::new(),
            inventory: BTreeSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = Some(objective.into());
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>, value: i64) -> Self {
        self.attributes.insert(attribute.into(), value);
        self
    }

    /// Current value of an attribute; absent attributes read as zero.
    pub fn attribute(&self, attribute: &str) -> i64 {
        self.attributes.get(attribute).copied().unwrap_or(0)
    }

    pub fn adjust_attribute(&mut self, attribute: &str, delta: i64) {
        let value = self.attributes.entry(attribute.to_string()).or_insert(0);
        *value = value.saturating_add(delta);
    }

    pub fn holds(&self, item: &ItemName) -> bool {
        self.inventory.contains(item)
    }
}

impl Record for Character {
    type Key = CharacterName;

    const KIND: EntityKind = EntityKind::Character;

    fn key(&self) -> CharacterName {
        self.name.clone()
    }

    fn placeholder(key: &CharacterName, _now: DateTime<Utc>) -> Self {
        Self::new(key.clone(), Coords::ORIGIN)
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.attributes.keys().any(|k| k.trim().is_empty()) {
            return Err(DomainError::validation(format!(
                "Character '{}' has an attribute with an empty name",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alvin() -> Character {
        Character::new(CharacterName::new("Alvin").unwrap(), Coords::ORIGIN)
    }

    #[test]
    fn missing_attribute_reads_zero() {
        assert_eq!(alvin().attribute("health"), 0);
    }

    #[test]
    fn adjust_attribute_creates_and_accumulates() {
        let mut c = alvin().with_attribute("health", 10);
        c.adjust_attribute("health", -3);
        c.adjust_attribute("gold", 5);
        assert_eq!(c.attribute("health"), 7);
        assert_eq!(c.attribute("gold"), 5);
    }

    #[test]
    fn adjust_attribute_saturates() {
        let mut c = alvin().with_attribute("luck", i64::MAX);
        c.adjust_attribute("luck", 1);
        assert_eq!(c.attribute("luck"), i64::MAX);
    }

    #[test]
    fn empty_attribute_name_is_invalid() {
        let c = alvin().with_attribute(" ", 1);
        assert!(matches!(c.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn defaults_fill_missing_fields_on_deserialize() {
        let c: Character =
            serde_json::from_str(r#"{"name":"Alvin","coords":{"x":1,"y":2}}"#).unwrap();
        assert_eq!(c.coords, Coords::new(1, 2));
        assert!(c.inventory.is_empty());
        assert!(c.objective.is_none());
    }
}
