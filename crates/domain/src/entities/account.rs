//! Account entity - groups characters under an operator identity.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::Record;
use crate::keys::EntityKind;
use crate::{AccountName, CharacterName};

/// An ownership record. Deleting an account leaves its characters in the
/// world, ownerless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: AccountName,
    #[serde(default)]
    pub characters: BTreeSet<CharacterName>,
    /// Opaque credential material; never interpreted by the engine.
    #[serde(default)]
    pub secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(name: AccountName, created_at: DateTime<Utc>) -> Self {
        Self {
            name,
            characters: BTreeSet::new(),
            secret: None,
            created_at,
        }
    }

    pub fn with_character(mut self, character: CharacterName) -> Self {
        self.characters.insert(character);
        self
    }

    pub fn owns(&self, character: &CharacterName) -> bool {
        self.characters.contains(character)
    }
}

impl Record for Account {
    type Key = AccountName;

    const KIND: EntityKind = EntityKind::Account;

    fn key(&self) -> AccountName {
        self.name.clone()
    }

    fn placeholder(key: &AccountName, now: DateTime<Utc>) -> Self {
        Self::new(key.clone(), now)
    }
}
