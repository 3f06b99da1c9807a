//! World state and narrative storage.
//!
//! - `WorldStore` - per-key atomic get/set/update/delete over world records
//! - `NarrativeLog` - append-only per-character history
//! - `KeyLocks` - the per-key lock table both rely on

mod error;
mod key_locks;
pub mod narrative;
pub mod world;

pub use error::StoreError;
pub use key_locks::{KeyGuards, KeyLocks};
pub use narrative::{render, NarrativeLog, NarrativeQuery, NarrativeRange};
pub use world::{PlaceDeletePolicy, WorldStore};
