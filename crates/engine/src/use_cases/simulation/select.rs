//! Select step: which characters act this tick.

use async_trait::async_trait;
use chasm_domain::CharacterName;

use super::observe::unanswered_input;
use crate::stores::{NarrativeLog, StoreError, WorldStore};

/// Pluggable actor selection.
#[async_trait]
pub trait SelectPolicy: Send {
    fn name(&self) -> &'static str;

    async fn select(
        &mut self,
        world: &WorldStore,
        narrative: &NarrativeLog,
    ) -> Result<Vec<CharacterName>, StoreError>;
}

/// Rotates through all characters in name order, `batch_size` per tick.
/// A batch size of 0 selects everyone every tick.
pub struct RoundRobin {
    batch_size: usize,
    cursor: Option<CharacterName>,
}

impl RoundRobin {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            cursor: None,
        }
    }
}

#[async_trait]
impl SelectPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    async fn select(
        &mut self,
        world: &WorldStore,
        _narrative: &NarrativeLog,
    ) -> Result<Vec<CharacterName>, StoreError> {
        let mut names: Vec<CharacterName> =
            world.characters().await?.into_iter().map(|c| c.name).collect();
        if names.is_empty() {
            return Ok(names);
        }
        names.sort();

        let take = match self.batch_size {
            0 => names.len(),
            n => n.min(names.len()),
        };
        let start = self
            .cursor
            .as_ref()
            .and_then(|cursor| names.iter().position(|n| n > cursor))
            .unwrap_or(0);

        let chosen: Vec<CharacterName> = names.iter().cycle().skip(start).take(take).cloned().collect();
        self.cursor = chosen.last().cloned();
        Ok(chosen)
    }
}

/// Selects only characters with player input newer than their last turn.
#[derive(Default)]
pub struct PendingInput;

impl PendingInput {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SelectPolicy for PendingInput {
    fn name(&self) -> &'static str {
        "pending-input"
    }

    async fn select(
        &mut self,
        world: &WorldStore,
        narrative: &NarrativeLog,
    ) -> Result<Vec<CharacterName>, StoreError> {
        let mut waiting = Vec::new();
        for character in world.characters().await? {
            if unanswered_input(narrative, &character.name).await?.is_some() {
                waiting.push(character.name);
            }
        }
        Ok(waiting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::persistence::{InMemoryNarrativeRepo, InMemoryWorldRepo};
    use chasm_domain::{Character, Coords, NarrativeEvent};
    use std::sync::Arc;

    fn cname(name: &str) -> CharacterName {
        CharacterName::new(name).unwrap()
    }

    async fn setup(names: &[&str]) -> (WorldStore, NarrativeLog) {
        let world = WorldStore::new(Arc::new(InMemoryWorldRepo::new()), Arc::new(SystemClock));
        for name in names {
            world
                .set_character(Character::new(cname(name), Coords::ORIGIN))
                .await
                .unwrap();
        }
        let narrative =
            NarrativeLog::new(Arc::new(InMemoryNarrativeRepo::new()), Arc::new(SystemClock));
        (world, narrative)
    }

    fn names(selected: &[CharacterName]) -> Vec<&str> {
        selected.iter().map(CharacterName::as_str).collect()
    }

    #[tokio::test]
    async fn round_robin_rotates_and_wraps() {
        let (world, narrative) = setup(&["Alvin", "Bea", "Cato"]).await;
        let mut policy = RoundRobin::new(2);

        let first = policy.select(&world, &narrative).await.unwrap();
        let second = policy.select(&world, &narrative).await.unwrap();
        let third = policy.select(&world, &narrative).await.unwrap();

        assert_eq!(names(&first), vec!["Alvin", "Bea"]);
        assert_eq!(names(&second), vec!["Cato", "Alvin"]);
        assert_eq!(names(&third), vec!["Bea", "Cato"]);
    }

    #[tokio::test]
    async fn round_robin_survives_deleted_cursor() {
        let (world, narrative) = setup(&["Alvin", "Bea", "Cato"]).await;
        let mut policy = RoundRobin::new(1);
        policy.select(&world, &narrative).await.unwrap();
        policy.select(&world, &narrative).await.unwrap();
        world.delete_character(&cname("Bea")).await.unwrap();

        let next = policy.select(&world, &narrative).await.unwrap();
        assert_eq!(names(&next), vec!["Cato"]);
    }

    #[tokio::test]
    async fn zero_batch_selects_everyone() {
        let (world, narrative) = setup(&["Alvin", "Bea"]).await;
        let mut policy = RoundRobin::new(0);
        assert_eq!(policy.select(&world, &narrative).await.unwrap().len(), 2);
        assert_eq!(policy.select(&world, &narrative).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn pending_input_selects_only_waiting_characters() {
        let (world, narrative) = setup(&["Alvin", "Bea", "Cato"]).await;
        narrative
            .record(&cname("Bea"), NarrativeEvent::PlayerInput { text: "wave".into() })
            .await
            .unwrap();
        narrative
            .record(&cname("Cato"), NarrativeEvent::PlayerInput { text: "sit".into() })
            .await
            .unwrap();
        narrative
            .record(&cname("Cato"), NarrativeEvent::Idled)
            .await
            .unwrap();

        let mut policy = PendingInput::new();
        let selected = policy.select(&world, &narrative).await.unwrap();
        assert_eq!(names(&selected), vec!["Bea"]);
    }

    #[tokio::test]
    async fn witnessing_after_input_keeps_the_character_waiting() {
        let (world, narrative) = setup(&["Alvin", "Bea"]).await;
        narrative
            .record(&cname("Bea"), NarrativeEvent::PlayerInput { text: "go east".into() })
            .await
            .unwrap();
        narrative
            .record(
                &cname("Bea"),
                NarrativeEvent::Witnessed {
                    actor: cname("Alvin"),
                    summary: "says \"morning\"".into(),
                },
            )
            .await
            .unwrap();

        let mut policy = PendingInput::new();
        let selected = policy.select(&world, &narrative).await.unwrap();
        assert_eq!(names(&selected), vec!["Bea"]);
    }
}
