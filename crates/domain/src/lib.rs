//! Domain model of the Chasm world: coordinates, names, entities and
//! narrative records. Pure data and invariants; no I/O.

pub mod entities;
pub mod error;
pub mod keys;
pub mod value_objects;

pub use entities::{
    Account, Character, Item, ItemLocation, NarrativeEntry, NarrativeEvent, Place, Record, Seq,
    UnnumberedEntry, UNCHARTED_PLACE_NAME,
};
pub use error::DomainError;
pub use keys::{EntityKey, EntityKind};
pub use value_objects::{AccountName, CharacterName, Coords, ItemName};
