//! Behavior collaborators that answer the scheduler's Decide step.

mod llm;
mod wander;

pub use llm::{build_prompt, parse_decision, LlmBehavior};
pub use wander::WanderBehavior;
