//! Storage adapters for the world and narrative ports.

mod memory;
mod sqlite;

pub use memory::{InMemoryNarrativeRepo, InMemoryWorldRepo};
pub use sqlite::{connect as connect_sqlite, SqliteNarrativeRepo, SqliteWorldRepo};
