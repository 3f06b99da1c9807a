//! Place entity - a named cell of the world grid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::Record;
use crate::error::DomainError;
use crate::keys::EntityKind;
use crate::Coords;

/// Name given to places created on first reference.
pub const UNCHARTED_PLACE_NAME: &str = "Uncharted territory";

/// A location keyed by its coordinates.
///
/// Exits are not stored: a neighbouring cell is reachable when a place exists
/// there, so adjacency is always derived from the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub coords: Coords,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Place {
    pub fn new(coords: Coords, name: impl Into<String>) -> Self {
        Self {
            coords,
            name: name.into(),
            description: String::new(),
        }
    }

    /// The place the store creates when something first refers to `coords`.
    pub fn uncharted(coords: Coords) -> Self {
        Self::new(coords, UNCHARTED_PLACE_NAME)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_uncharted(&self) -> bool {
        self.name == UNCHARTED_PLACE_NAME && self.description.is_empty()
    }
}

impl Record for Place {
    type Key = Coords;

    const KIND: EntityKind = EntityKind::Place;

    fn key(&self) -> Coords {
        self.coords
    }

    fn placeholder(key: &Coords, _now: DateTime<Utc>) -> Self {
        Self::uncharted(*key)
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "Place at {} needs a name",
                self.coords
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncharted_place_is_valid() {
        let place = Place::uncharted(Coords::new(2, 2));
        assert!(place.validate().is_ok());
        assert!(place.is_uncharted());
    }

    #[test]
    fn blank_name_is_invalid() {
        let place = Place::new(Coords::ORIGIN, "  ");
        assert!(matches!(place.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn described_place_is_not_uncharted() {
        let place = Place::uncharted(Coords::ORIGIN).with_description("Fog everywhere.");
        assert!(!place.is_uncharted());
    }
}
