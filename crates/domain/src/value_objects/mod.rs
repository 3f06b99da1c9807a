//! Value objects: identity and position types with no lifecycle of their own.

mod coords;
mod names;

pub use coords::Coords;
pub use names::{AccountName, CharacterName, ItemName};
