//! World entities and narrative records

mod account;
mod character;
mod item;
mod narrative;
mod place;
mod record;

pub use account::Account;
pub use character::Character;
pub use item::{Item, ItemLocation};
pub use narrative::{NarrativeEntry, NarrativeEvent, Seq, UnnumberedEntry};
pub use place::{Place, UNCHARTED_PLACE_NAME};
pub use record::Record;
