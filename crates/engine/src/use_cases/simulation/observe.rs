//! Observe step: a read-only snapshot around one character.

use std::sync::Arc;

use chasm_domain::{CharacterName, NarrativeEntry, NarrativeEvent, Place};

use super::decision::DecisionContext;
use crate::stores::{NarrativeLog, NarrativeRange, StoreError, WorldStore};

/// Builds the decision context for a character's turn. Never writes.
pub struct Observe {
    world: Arc<WorldStore>,
    narrative: Arc<NarrativeLog>,
    recent_entries: u64,
}

impl Observe {
    pub fn new(world: Arc<WorldStore>, narrative: Arc<NarrativeLog>, recent_entries: u64) -> Self {
        Self {
            world,
            narrative,
            recent_entries,
        }
    }

    /// `None` when the character no longer exists.
    pub async fn execute(
        &self,
        name: &CharacterName,
    ) -> Result<Option<DecisionContext>, StoreError> {
        let actor = match self.world.get_character(name).await {
            Ok(actor) => actor,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let place = match self.world.get_place(actor.coords).await {
            Ok(place) => place,
            Err(e) if e.is_not_found() => Place::uncharted(actor.coords),
            Err(e) => return Err(e),
        };
        let exits = self.world.exits(actor.coords).await?;
        let characters_here = self
            .world
            .characters_at(actor.coords)
            .await?
            .into_iter()
            .filter(|c| &c.name != name)
            .collect();
        let items_here = self.world.items_at(actor.coords).await?;

        let mut inventory = Vec::with_capacity(actor.inventory.len());
        for item in &actor.inventory {
            match self.world.get_item(item).await {
                Ok(item) => inventory.push(item),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let recent = self
            .narrative
            .read(name, NarrativeRange::Last(self.recent_entries.max(1)))
            .collect()
            .await?;
        let player_input = unanswered_input(&self.narrative, name).await?;

        Ok(Some(DecisionContext {
            actor,
            place,
            exits,
            characters_here,
            items_here,
            inventory,
            recent,
            player_input,
        }))
    }
}

/// Text of the `PlayerInput` entries after the character's last turn outcome,
/// joined by newlines. Entries others wrote in between do not answer input.
pub fn pending_input(recent: &[NarrativeEntry]) -> Option<String> {
    let mut lines: Vec<&str> = recent
        .iter()
        .rev()
        .take_while(|entry| !entry.event.is_turn_outcome())
        .filter_map(|entry| match &entry.event {
            NarrativeEvent::PlayerInput { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    Some(lines.join("\n"))
}

/// Input `name` has not had a turn since, reading back until the last turn
/// outcome or the start of the narrative.
pub async fn unanswered_input(
    narrative: &NarrativeLog,
    name: &CharacterName,
) -> Result<Option<String>, StoreError> {
    let mut window = 16;
    loop {
        let tail = narrative
            .read(name, NarrativeRange::Last(window))
            .collect()
            .await?;
        let complete = (tail.len() as u64) < window
            || tail.iter().any(|entry| entry.event.is_turn_outcome());
        if complete {
            return Ok(pending_input(&tail));
        }
        window = window.saturating_mul(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::persistence::{InMemoryNarrativeRepo, InMemoryWorldRepo};
    use chasm_domain::{Character, Coords, Item, ItemName};
    use chrono::Utc;

    fn entry(seq: u64, event: NarrativeEvent) -> NarrativeEntry {
        NarrativeEntry {
            character: CharacterName::new("Alvin").unwrap(),
            seq,
            recorded_at: Utc::now(),
            text: event.describe(),
            event,
        }
    }

    #[test]
    fn inputs_after_the_last_turn_are_pending() {
        let recent = vec![
            entry(1, NarrativeEvent::PlayerInput { text: "old".into() }),
            entry(2, NarrativeEvent::Idled),
            entry(3, NarrativeEvent::PlayerInput { text: "go east".into() }),
            entry(
                4,
                NarrativeEvent::Witnessed {
                    actor: CharacterName::new("Bea").unwrap(),
                    summary: "says \"hello\"".into(),
                },
            ),
            entry(5, NarrativeEvent::PlayerInput { text: "quickly".into() }),
            entry(6, NarrativeEvent::Note { text: "storm".into() }),
        ];
        assert_eq!(pending_input(&recent).as_deref(), Some("go east\nquickly"));
        assert_eq!(pending_input(&recent[..2]), None);
    }

    #[tokio::test]
    async fn unanswered_input_reads_past_a_long_run_of_witnessing() {
        let narrative = NarrativeLog::new(
            Arc::new(InMemoryNarrativeRepo::new()),
            Arc::new(SystemClock),
        );
        let alvin = CharacterName::new("Alvin").unwrap();
        narrative.record(&alvin, NarrativeEvent::Idled).await.unwrap();
        narrative
            .record(&alvin, NarrativeEvent::PlayerInput { text: "wave".into() })
            .await
            .unwrap();
        for _ in 0..40 {
            narrative
                .record(
                    &alvin,
                    NarrativeEvent::Witnessed {
                        actor: CharacterName::new("Bea").unwrap(),
                        summary: "waits".into(),
                    },
                )
                .await
                .unwrap();
        }
        assert_eq!(
            unanswered_input(&narrative, &alvin).await.unwrap().as_deref(),
            Some("wave")
        );

        narrative.record(&alvin, NarrativeEvent::Idled).await.unwrap();
        assert_eq!(unanswered_input(&narrative, &alvin).await.unwrap(), None);
    }

    #[tokio::test]
    async fn context_covers_surroundings() {
        let world = Arc::new(WorldStore::new(
            Arc::new(InMemoryWorldRepo::new()),
            Arc::new(SystemClock),
        ));
        let narrative = Arc::new(NarrativeLog::new(
            Arc::new(InMemoryNarrativeRepo::new()),
            Arc::new(SystemClock),
        ));
        let alvin = CharacterName::new("Alvin").unwrap();
        let bea = CharacterName::new("Bea").unwrap();

        world
            .set_place(Place::new(Coords::ORIGIN, "Square"))
            .await
            .unwrap();
        world
            .set_place(Place::new(Coords::new(0, 1), "North Street"))
            .await
            .unwrap();
        world
            .set_character(Character::new(alvin.clone(), Coords::ORIGIN))
            .await
            .unwrap();
        world
            .set_character(Character::new(bea.clone(), Coords::ORIGIN))
            .await
            .unwrap();
        world
            .set_item(Item::lying_at(ItemName::new("lamp").unwrap(), Coords::ORIGIN))
            .await
            .unwrap();
        world
            .set_item(Item::held_by(ItemName::new("coin").unwrap(), alvin.clone()))
            .await
            .unwrap();
        narrative
            .record(&alvin, NarrativeEvent::PlayerInput { text: "look".into() })
            .await
            .unwrap();

        let observe = Observe::new(world, narrative, 5);
        let context = observe.execute(&alvin).await.unwrap().unwrap();

        assert_eq!(context.place.name, "Square");
        assert_eq!(context.exits, vec![Coords::new(0, 1)]);
        assert_eq!(context.characters_here.len(), 1);
        assert!(context.sees_character(&bea));
        assert!(context.sees_item(&ItemName::new("lamp").unwrap()));
        assert_eq!(context.inventory.len(), 1);
        assert_eq!(context.player_input.as_deref(), Some("look"));

        let nobody = CharacterName::new("Nobody").unwrap();
        assert!(observe.execute(&nobody).await.unwrap().is_none());
    }
}
