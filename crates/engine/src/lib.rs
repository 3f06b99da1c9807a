//! Chasm Engine library.
//!
//! ## Structure
//!
//! - `stores/` - world state store and narrative log with per-key atomicity
//! - `use_cases/` - simulation scheduler, behavior collaborators, entity editor
//! - `infrastructure/` - ports and their adapters (SQLite, memory, Ollama, config)
//! - `app` - application composition

pub mod app;
pub mod infrastructure;
pub mod stores;
pub mod use_cases;

/// End-to-end scenarios over a composed `App`.
#[cfg(test)]
mod e2e_tests;

pub use app::App;
