//! Use cases - the simulation loop, its behavior collaborators and the
//! entity editor.

pub mod behavior;
pub mod editor;
pub mod simulation;

pub use editor::{Editor, Look};
pub use simulation::{Scheduler, SchedulerConfig, SchedulerError, TurnOutcome};
