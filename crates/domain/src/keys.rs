//! Entity kinds and store keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AccountName, CharacterName, Coords, ItemName};

/// The four kinds of record the world store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Account,
    Character,
    Item,
    Place,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Account,
        EntityKind::Character,
        EntityKind::Item,
        EntityKind::Place,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Character => "character",
            Self::Item => "item",
            Self::Place => "place",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a single record in the world store.
///
/// The derived ordering (all accounts, then characters, then items, then
/// places; by value within a kind) is the order in which multi-key operations
/// acquire their locks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKey {
    Account(AccountName),
    Character(CharacterName),
    Item(ItemName),
    Place(Coords),
}

impl EntityKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Account(_) => EntityKind::Account,
            Self::Character(_) => EntityKind::Character,
            Self::Item(_) => EntityKind::Item,
            Self::Place(_) => EntityKind::Place,
        }
    }

    /// Canonical storage form of the key within its kind.
    pub fn id(&self) -> String {
        match self {
            Self::Account(name) => name.to_string(),
            Self::Character(name) => name.to_string(),
            Self::Item(name) => name.to_string(),
            Self::Place(coords) => format!("{},{}", coords.x, coords.y),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Place(coords) => write!(f, "place {coords}"),
            other => write!(f, "{} '{}'", other.kind(), other.id()),
        }
    }
}

impl From<AccountName> for EntityKey {
    fn from(name: AccountName) -> Self {
        Self::Account(name)
    }
}

impl From<CharacterName> for EntityKey {
    fn from(name: CharacterName) -> Self {
        Self::Character(name)
    }
}

impl From<ItemName> for EntityKey {
    fn from(name: ItemName) -> Self {
        Self::Item(name)
    }
}

impl From<Coords> for EntityKey {
    fn from(coords: Coords) -> Self {
        Self::Place(coords)
    }
}
