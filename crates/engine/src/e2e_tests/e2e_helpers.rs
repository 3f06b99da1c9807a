//! Helpers for building an `App` with seeded test data.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chasm_domain::{Character, CharacterName, Coords, ItemName, NarrativeEntry, Place};
use tempfile::TempDir;

use crate::app::App;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::{AppConfig, StorageBackend};
use crate::infrastructure::persistence::{
    connect_sqlite, InMemoryNarrativeRepo, InMemoryWorldRepo, SqliteNarrativeRepo,
    SqliteWorldRepo,
};
use crate::stores::NarrativeRange;
use crate::use_cases::simulation::{
    BehaviorError, BehaviorPort, Decision, DecisionContext, RoundRobin, Scheduler,
    SchedulerConfig,
};

// =============================================================================
// Backends
// =============================================================================

/// An app plus whatever must outlive it.
pub struct TestWorld {
    pub app: App,
    _dir: Option<TempDir>,
}

impl TestWorld {
    pub fn memory() -> Self {
        let app = App::with_repos(
            AppConfig {
                storage: StorageBackend::Memory,
                ..AppConfig::default()
            },
            Arc::new(InMemoryWorldRepo::new()),
            Arc::new(InMemoryNarrativeRepo::new()),
            Arc::new(SystemClock::new()),
        );
        Self { app, _dir: None }
    }

    pub async fn sqlite() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("world.db");
        let pool = connect_sqlite(&path.to_string_lossy())
            .await
            .expect("sqlite opens");
        let app = App::with_repos(
            AppConfig {
                storage: StorageBackend::Sqlite,
                sqlite_path: path.to_string_lossy().into_owned(),
                ..AppConfig::default()
            },
            Arc::new(SqliteWorldRepo::new(pool.clone())),
            Arc::new(SqliteNarrativeRepo::new(pool)),
            Arc::new(SystemClock::new()),
        );
        Self {
            app,
            _dir: Some(dir),
        }
    }

    /// Both backends, memory first.
    pub async fn all() -> Vec<(&'static str, Self)> {
        vec![("memory", Self::memory()), ("sqlite", Self::sqlite().await)]
    }

    /// Place "Square" at the origin with Alvin standing in it.
    pub async fn with_square_and_alvin(self) -> Self {
        self.app
            .world
            .set_place(Place::new(Coords::ORIGIN, "Square"))
            .await
            .expect("place saved");
        self.app
            .world
            .set_character(Character::new(name("Alvin"), Coords::ORIGIN))
            .await
            .expect("character saved");
        self
    }

    pub fn scheduler(&self, behavior: impl BehaviorPort + 'static) -> Scheduler {
        Scheduler::new(
            self.app.world.clone(),
            self.app.narrative.clone(),
            Arc::new(behavior),
            Box::new(RoundRobin::new(0)),
            fast_config(),
        )
    }

    pub async fn narrative_of(&self, character: &str) -> Vec<NarrativeEntry> {
        self.app
            .narrative
            .read(&name(character), NarrativeRange::All)
            .collect()
            .await
            .expect("narrative readable")
    }
}

pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        tick_interval: Duration::from_millis(5),
        decision_timeout: Duration::from_millis(50),
        max_concurrent_turns: 8,
        recent_entries: 5,
    }
}

pub fn name(name: &str) -> CharacterName {
    CharacterName::new(name).expect("valid character name")
}

pub fn item(name: &str) -> ItemName {
    ItemName::new(name).expect("valid item name")
}

// =============================================================================
// Behavior stubs
// =============================================================================

/// Never answers within any reasonable timeout.
pub struct StalledBehavior;

#[async_trait]
impl BehaviorPort for StalledBehavior {
    async fn decide(&self, _context: &DecisionContext) -> Result<Decision, BehaviorError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Decision::idle())
    }
}
