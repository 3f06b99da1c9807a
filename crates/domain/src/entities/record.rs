//! Common contract of every record kept in the world store.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::DomainError;
use crate::keys::{EntityKey, EntityKind};

/// A world entity that can be stored, fetched and replaced as one unit.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Key: Clone + Into<EntityKey> + Send + Sync + 'static;

    const KIND: EntityKind;

    fn key(&self) -> Self::Key;

    /// The value an `update` starts from when the key is absent.
    fn placeholder(key: &Self::Key, now: DateTime<Utc>) -> Self;

    /// Self-contained invariants. Cross-entity invariants are checked by the store.
    fn validate(&self) -> Result<(), DomainError> {
        Ok(())
    }

    fn entity_key(&self) -> EntityKey {
        self.key().into()
    }
}
