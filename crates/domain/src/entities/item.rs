//! Item entity - an object lying in a place or held by a character.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::Record;
use crate::keys::EntityKind;
use crate::{CharacterName, Coords, ItemName};

/// Where an item is. Exactly one of the two, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemLocation {
    /// Lying in the place at these coordinates
    Place(Coords),
    /// Held in this character's inventory
    Holder(CharacterName),
}

impl ItemLocation {
    pub fn coords(&self) -> Option<Coords> {
        match self {
            Self::Place(coords) => Some(*coords),
            Self::Holder(_) => None,
        }
    }

    pub fn holder(&self) -> Option<&CharacterName> {
        match self {
            Self::Place(_) => None,
            Self::Holder(name) => Some(name),
        }
    }
}

impl std::fmt::Display for ItemLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Place(coords) => write!(f, "lying at {coords}"),
            Self::Holder(name) => write!(f, "held by {name}"),
        }
    }
}

/// An object in the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: ItemName,
    #[serde(default)]
    pub description: String,
    pub location: ItemLocation,
}

impl Item {
    pub fn new(name: ItemName, location: ItemLocation) -> Self {
        Self {
            name,
            description: String::new(),
            location,
        }
    }

    pub fn lying_at(name: ItemName, coords: Coords) -> Self {
        Self::new(name, ItemLocation::Place(coords))
    }

    pub fn held_by(name: ItemName, holder: CharacterName) -> Self {
        Self::new(name, ItemLocation::Holder(holder))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Record for Item {
    type Key = ItemName;

    const KIND: EntityKind = EntityKind::Item;

    fn key(&self) -> ItemName {
        self.name.clone()
    }

    fn placeholder(key: &ItemName, _now: DateTime<Utc>) -> Self {
        Self::lying_at(key.clone(), Coords::ORIGIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_accessors_are_exclusive() {
        let lying = ItemLocation::Place(Coords::new(1, 1));
        assert_eq!(lying.coords(), Some(Coords::new(1, 1)));
        assert!(lying.holder().is_none());

        let held = ItemLocation::Holder(CharacterName::new("Alvin").unwrap());
        assert!(held.coords().is_none());
        assert_eq!(held.holder().map(|n| n.as_str()), Some("Alvin"));
    }

    #[test]
    fn dual_location_json_is_rejected() {
        let both = r#"{"name":"lamp","location":{"place":{"x":0,"y":0},"holder":"Alvin"}}"#;
        assert!(serde_json::from_str::<Item>(both).is_err());

        let neither = r#"{"name":"lamp","location":{}}"#;
        assert!(serde_json::from_str::<Item>(neither).is_err());
    }

    #[test]
    fn single_location_json_is_accepted() {
        let item: Item =
            serde_json::from_str(r#"{"name":"lamp","location":{"holder":"Alvin"}}"#).unwrap();
        assert_eq!(
            item.location,
            ItemLocation::Holder(CharacterName::new("Alvin").unwrap())
        );
    }
}
