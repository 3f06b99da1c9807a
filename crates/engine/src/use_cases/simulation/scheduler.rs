//! The simulation loop: select, observe, decide, apply, record.

use std::sync::Arc;
use std::time::Duration;

use chasm_domain::{CharacterName, Coords, NarrativeEvent};
use futures_util::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::apply::{self, ApplyError};
use super::decision::{BehaviorError, BehaviorPort, Decision, DecisionContext};
use super::observe::Observe;
use super::select::SelectPolicy;
use crate::stores::{NarrativeLog, StoreError, WorldStore};

/// Timing and concurrency knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between ticks
    pub tick_interval: Duration,
    /// Upper bound on one Decide call
    pub decision_timeout: Duration,
    /// Turns of one tick running at the same time
    pub max_concurrent_turns: usize,
    /// Narrative entries handed to the behavior as context
    pub recent_entries: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            decision_timeout: Duration::from_secs(30),
            max_concurrent_turns: 8,
            recent_entries: 10,
        }
    }
}

/// How one character's turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    /// The turn never started (e.g. the character was deleted)
    Skipped(String),
    TimedOut,
    DecisionFailed,
    Rejected,
    PartiallyApplied,
}

/// Per-character outcomes of one tick.
#[derive(Debug, Default, Clone)]
pub struct TickReport {
    pub turns: Vec<(CharacterName, TurnOutcome)>,
}

impl TickReport {
    pub fn count(&self, outcome: &TurnOutcome) -> usize {
        self.turns.iter().filter(|(_, o)| o == outcome).count()
    }

    pub fn outcome_of(&self, character: &CharacterName) -> Option<&TurnOutcome> {
        self.turns
            .iter()
            .find(|(name, _)| name == character)
            .map(|(_, outcome)| outcome)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Storage is unusable; the simulation must stop.
    #[error("Fatal storage error: {0}")]
    Fatal(StoreError),
}

fn fatal(error: StoreError) -> SchedulerError {
    SchedulerError::Fatal(error)
}

/// Drives world time forward.
pub struct Scheduler {
    world: Arc<WorldStore>,
    narrative: Arc<NarrativeLog>,
    behavior: Arc<dyn BehaviorPort>,
    select: Mutex<Box<dyn SelectPolicy>>,
    observe: Observe,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        world: Arc<WorldStore>,
        narrative: Arc<NarrativeLog>,
        behavior: Arc<dyn BehaviorPort>,
        select: Box<dyn SelectPolicy>,
        config: SchedulerConfig,
    ) -> Self {
        let observe = Observe::new(world.clone(), narrative.clone(), config.recent_entries);
        Self {
            world,
            narrative,
            behavior,
            select: Mutex::new(select),
            observe,
            config,
        }
    }

    /// Tick until `cancel` fires. A tick that has started always finishes.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SchedulerError> {
        let policy = self.select.lock().await.name();
        tracing::info!(
            policy,
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            decision_timeout_ms = self.config.decision_timeout.as_millis() as u64,
            "Simulation started"
        );

        let mut ticks: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let report = self.tick().await.map_err(|e| {
                tracing::error!(error = %e, ticks, "Simulation halted");
                e
            })?;
            ticks += 1;
            if !report.turns.is_empty() {
                tracing::debug!(
                    tick = ticks,
                    turns = report.turns.len(),
                    completed = report.count(&TurnOutcome::Completed),
                    timed_out = report.count(&TurnOutcome::TimedOut),
                    "Tick finished"
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.tick_interval) => {}
            }
        }

        tracing::info!(ticks, "Simulation stopped");
        Ok(())
    }

    /// One tick: every selected character takes a turn, concurrently.
    ///
    /// All turns run to completion before a fatal error is returned.
    pub async fn tick(&self) -> Result<TickReport, SchedulerError> {
        let selected = {
            let mut policy = self.select.lock().await;
            policy
                .select(&self.world, &self.narrative)
                .await
                .map_err(fatal)?
        };

        let results: Vec<(CharacterName, Result<TurnOutcome, SchedulerError>)> =
            stream::iter(selected)
                .map(|name| async move {
                    let outcome = self.turn(&name).await;
                    (name, outcome)
                })
                .buffer_unordered(self.config.max_concurrent_turns.max(1))
                .collect()
                .await;

        let mut report = TickReport::default();
        let mut first_fatal = None;
        for (name, result) in results {
            match result {
                Ok(outcome) => report.turns.push((name, outcome)),
                Err(e) => {
                    if first_fatal.is_none() {
                        first_fatal = Some(e);
                    }
                }
            }
        }
        match first_fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// One character's turn. Only storage failures escape as errors.
    pub async fn turn(&self, name: &CharacterName) -> Result<TurnOutcome, SchedulerError> {
        let Some(context) = self.observe.execute(name).await.map_err(fatal)? else {
            tracing::debug!(character = %name, "Character vanished before its turn");
            return Ok(TurnOutcome::Skipped("character no longer exists".to_string()));
        };

        let decision = match self.decide(&context).await {
            Ok(decision) => decision,
            Err(BehaviorError::Timeout) => {
                tracing::warn!(
                    character = %name,
                    timeout_ms = self.config.decision_timeout.as_millis() as u64,
                    "Decision timed out, character idles"
                );
                self.narrative
                    .record(name, NarrativeEvent::DecisionTimeout)
                    .await
                    .map_err(fatal)?;
                return Ok(TurnOutcome::TimedOut);
            }
            Err(e) => {
                tracing::warn!(character = %name, error = %e, "Decision failed, turn skipped");
                self.narrative
                    .record(
                        name,
                        NarrativeEvent::DecisionFailed {
                            reason: e.to_string(),
                        },
                    )
                    .await
                    .map_err(fatal)?;
                return Ok(TurnOutcome::DecisionFailed);
            }
        };
        tracing::debug!(character = %name, action = ?decision.action, "Decision received");

        let effects = match apply::plan(&context, &decision) {
            Ok(effects) => effects,
            Err(e) => return self.reject(name, e).await,
        };

        match apply::execute(&self.world, &effects).await {
            Ok(()) => {
                self.record_outcome(&context, &decision).await?;
                Ok(TurnOutcome::Completed)
            }
            Err(e) if e.is_fatal() => Err(fatal(e.into_store_error())),
            Err(ApplyError::Rejected(e)) => self.reject(name, e).await,
            Err(ApplyError::Partial(partial)) => {
                tracing::error!(
                    character = %name,
                    applied = ?partial.applied,
                    failed = %partial.failed,
                    error = %partial.source,
                    "Action partially applied; committed effects were kept"
                );
                self.narrative
                    .record(
                        name,
                        NarrativeEvent::PartiallyApplied {
                            applied: partial.applied,
                            failed: partial.failed,
                            reason: partial.source.to_string(),
                        },
                    )
                    .await
                    .map_err(fatal)?;
                Ok(TurnOutcome::PartiallyApplied)
            }
        }
    }

    async fn decide(&self, context: &DecisionContext) -> Result<Decision, BehaviorError> {
        match tokio::time::timeout(self.config.decision_timeout, self.behavior.decide(context)).await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(BehaviorError::Timeout),
        }
    }

    async fn reject(
        &self,
        name: &CharacterName,
        error: StoreError,
    ) -> Result<TurnOutcome, SchedulerError> {
        tracing::warn!(character = %name, error = %error, "Action rejected");
        let reason = match &error {
            StoreError::Validation(reason) | StoreError::Conflict(reason) => reason.clone(),
            other => other.to_string(),
        };
        self.narrative
            .record(name, NarrativeEvent::ActionRejected { reason })
            .await
            .map_err(fatal)?;
        Ok(TurnOutcome::Rejected)
    }

    async fn record_outcome(
        &self,
        context: &DecisionContext,
        decision: &Decision,
    ) -> Result<(), SchedulerError> {
        let actor = &context.actor.name;
        let origin: Coords = context.actor.coords;

        let event = apply::outcome_event(origin, &decision.action);
        let text = decision
            .narration
            .clone()
            .unwrap_or_else(|| event.describe());
        self.narrative
            .append(actor, event, text)
            .await
            .map_err(fatal)?;

        if let Some(summary) = apply::witness_summary(origin, &decision.action) {
            for witness in &context.characters_here {
                let event = NarrativeEvent::Witnessed {
                    actor: actor.clone(),
                    summary: summary.clone(),
                };
                self.narrative
                    .record(&witness.name, event)
                    .await
                    .map_err(fatal)?;
            }
        }

        for change in &decision.adjustments {
            self.narrative
                .record(
                    &change.character,
                    NarrativeEvent::AttributeChanged {
                        attribute: change.attribute.clone(),
                        delta: change.delta,
                    },
                )
                .await
                .map_err(fatal)?;
        }

        tracing::debug!(character = %actor, action = ?decision.action, "Turn completed");
        Ok(())
    }
}
