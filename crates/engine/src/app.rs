//! Application state and composition.

use std::sync::Arc;

use anyhow::Context;

use crate::infrastructure::{
    clock::{Dice, SystemClock},
    config::{AppConfig, BehaviorKind, SelectPolicyKind, StorageBackend},
    ollama::OllamaClient,
    persistence::{
        connect_sqlite, InMemoryNarrativeRepo, InMemoryWorldRepo, SqliteNarrativeRepo,
        SqliteWorldRepo,
    },
    ports::{ClockPort, LlmPort, NarrativeRepo, WorldRepo},
    resilient_llm::{ResilientLlmClient, RetryConfig},
};
use crate::stores::{NarrativeLog, WorldStore};
use crate::use_cases::behavior::{LlmBehavior, WanderBehavior};
use crate::use_cases::editor::Editor;
use crate::use_cases::simulation::{
    BehaviorPort, PendingInput, RoundRobin, Scheduler, SelectPolicy,
};

/// Main application state.
///
/// The simulation and the editor share one `WorldStore` and one
/// `NarrativeLog`; there is no other path to the records.
pub struct App {
    pub config: AppConfig,
    pub world: Arc<WorldStore>,
    pub narrative: Arc<NarrativeLog>,
    pub editor: Editor,
}

impl App {
    /// Open the configured storage backend.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let (world_repo, narrative_repo): (Arc<dyn WorldRepo>, Arc<dyn NarrativeRepo>) =
            match config.storage {
                StorageBackend::Memory => {
                    tracing::warn!("Using in-memory storage; nothing survives a restart");
                    (
                        Arc::new(InMemoryWorldRepo::new()),
                        Arc::new(InMemoryNarrativeRepo::new()),
                    )
                }
                StorageBackend::Sqlite => {
                    if let Some(parent) = std::path::Path::new(&config.sqlite_path).parent() {
                        if !parent.as_os_str().is_empty() {
                            std::fs::create_dir_all(parent).with_context(|| {
                                format!("creating directory for {}", config.sqlite_path)
                            })?;
                        }
                    }
                    tracing::info!(path = %config.sqlite_path, "Opening SQLite storage");
                    let pool = connect_sqlite(&config.sqlite_path)
                        .await
                        .with_context(|| format!("opening {}", config.sqlite_path))?;
                    (
                        Arc::new(SqliteWorldRepo::new(pool.clone())),
                        Arc::new(SqliteNarrativeRepo::new(pool)),
                    )
                }
            };

        Ok(Self::with_repos(
            config,
            world_repo,
            narrative_repo,
            Arc::new(SystemClock::new()),
        ))
    }

    pub fn with_repos(
        config: AppConfig,
        world_repo: Arc<dyn WorldRepo>,
        narrative_repo: Arc<dyn NarrativeRepo>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        let world = Arc::new(WorldStore::new(world_repo, clock.clone()));
        let narrative = Arc::new(NarrativeLog::new(narrative_repo, clock));
        let editor = Editor::new(world.clone(), narrative.clone());
        Self {
            config,
            world,
            narrative,
            editor,
        }
    }

    /// Build the simulation with the configured behavior and select policy.
    pub fn scheduler(&self) -> Scheduler {
        let behavior: Arc<dyn BehaviorPort> = match self.config.behavior {
            BehaviorKind::Wander => {
                Arc::new(WanderBehavior::new(Arc::new(Dice::new(self.config.wander_seed))))
            }
            BehaviorKind::Llm => {
                tracing::info!(
                    base_url = %self.config.ollama_base_url,
                    model = %self.config.ollama_model,
                    "Using LLM behavior"
                );
                let client = OllamaClient::new(&self.config.ollama_base_url, &self.config.ollama_model);
                let llm: Arc<dyn LlmPort> = Arc::new(ResilientLlmClient::new(
                    Arc::new(client),
                    Arc::new(Dice::from_entropy()),
                    RetryConfig::default(),
                ));
                Arc::new(LlmBehavior::new(llm))
            }
        };

        let select: Box<dyn SelectPolicy> = match self.config.select_policy {
            SelectPolicyKind::RoundRobin => Box::new(RoundRobin::new(self.config.batch_size)),
            SelectPolicyKind::PendingInput => Box::new(PendingInput::new()),
        };

        Scheduler::new(
            self.world.clone(),
            self.narrative.clone(),
            behavior,
            select,
            self.config.scheduler(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chasm_domain::{Character, CharacterName, Coords};

    #[tokio::test]
    async fn memory_backend_builds() {
        let config = AppConfig {
            storage: StorageBackend::Memory,
            ..AppConfig::default()
        };
        let app = App::from_config(config).await.unwrap();
        assert!(app.editor.characters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_backend_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("world.db");
        let config = AppConfig {
            storage: StorageBackend::Sqlite,
            sqlite_path: path.to_string_lossy().into_owned(),
            ..AppConfig::default()
        };

        let app = App::from_config(config.clone()).await.unwrap();
        app.world
            .set_character(Character::new(CharacterName::new("Alvin").unwrap(), Coords::ORIGIN))
            .await
            .unwrap();
        drop(app);

        let reopened = App::from_config(config).await.unwrap();
        assert_eq!(reopened.editor.characters().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn llm_scheduler_builds_without_contacting_ollama() {
        let config = AppConfig {
            storage: StorageBackend::Memory,
            behavior: BehaviorKind::Llm,
            select_policy: SelectPolicyKind::PendingInput,
            ..AppConfig::default()
        };
        let app = App::from_config(config).await.unwrap();
        // No pending input anywhere: nothing is selected, nothing is called.
        let report = app.scheduler().tick().await.unwrap();
        assert!(report.turns.is_empty());
    }
}
