//! Port traits for infrastructure boundaries.
//!
//! Ports exist for:
//! - Record storage (memory or SQLite)
//! - Narrative storage (memory or SQLite)
//! - LLM calls (Ollama today, any OpenAI-compatible server)
//! - Clock/Random (for testing)

mod error;
mod external;
mod repos;
mod testing;

// =============================================================================
// Repository Ports
// =============================================================================
pub use repos::{
    Expect, NarrativeRepo, RecordKey, RecordWrite, StoredRecord, WorldRepo, WriteOp,
};

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{ChatMessage, FinishReason, LlmPort, LlmRequest, LlmResponse, MessageRole};

// =============================================================================
// Errors
// =============================================================================
pub use error::{LlmError, RepoError};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use repos::{MockNarrativeRepo, MockWorldRepo};

#[cfg(test)]
pub use external::MockLlmPort;

#[cfg(test)]
pub use testing::{MockClockPort, MockRandomPort};

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::{ClockPort, RandomPort};
