//! End-to-end tests over a fully composed `App`.
//!
//! Every scenario runs against the in-memory backend; the storage-sensitive
//! ones run against SQLite in a temp directory as well.
//!
//! ```bash
//! cargo test -p chasm-engine --lib e2e_tests
//! ```

mod e2e_helpers;
mod simulation_tests;

pub use e2e_helpers::*;
