//! World simulation.
//!
//! Each tick the scheduler selects characters and runs their turns
//! concurrently. A turn is Observe (read-only snapshot), Decide (behavior
//! collaborator, bounded by a timeout), Apply (per-key store operations in
//! key order) and Record (narrative entries for the actor and witnesses).

pub mod apply;
mod decision;
mod observe;
mod scheduler;
mod select;

pub use apply::{ApplyError, Effect, PartialApplyError};
pub use decision::{
    Action, AttributeChange, BehaviorError, BehaviorPort, Decision, DecisionContext,
};
pub use observe::{pending_input, unanswered_input, Observe};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError, TickReport, TurnOutcome};
pub use select::{PendingInput, RoundRobin, SelectPolicy};

#[cfg(test)]
pub use decision::MockBehaviorPort;
