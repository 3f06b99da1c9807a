//! Entity editor: inspect and edit any record while the world runs.
//!
//! Every write goes through the same `WorldStore` and `NarrativeLog` the
//! simulation uses. World writes commit only if the records they read are
//! unchanged, so edits from any process never overwrite a turn's writes or
//! the other way round.

use std::fmt;
use std::sync::Arc;

use chasm_domain::{
    Account, AccountName, Character, CharacterName, Coords, EntityKey, Item, ItemName,
    NarrativeEntry, NarrativeEvent, Place, Record,
};
use serde::Serialize;

use crate::stores::{
    render, NarrativeLog, NarrativeRange, PlaceDeletePolicy, StoreError, WorldStore,
};

/// What a visitor sees at one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Look {
    pub place: Place,
    /// `false` when no place record exists at these coordinates
    pub charted: bool,
    pub exits: Vec<Coords>,
    pub characters: Vec<Character>,
    pub items: Vec<Item>,
}

impl fmt::Display for Look {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.place.name, self.place.coords)?;
        if !self.place.description.is_empty() {
            writeln!(f, "{}", self.place.description)?;
        }
        let exits: Vec<String> = self
            .exits
            .iter()
            .map(|to| match self.place.coords.direction_to(to) {
                Some(direction) => direction.to_string(),
                None => to.to_string(),
            })
            .collect();
        writeln!(f, "Exits: {}", join_or_none(exits))?;
        writeln!(
            f,
            "Characters: {}",
            join_or_none(self.characters.iter().map(|c| c.name.to_string()))
        )?;
        write!(
            f,
            "Items: {}",
            join_or_none(self.items.iter().map(|i| i.name.to_string()))
        )
    }
}

fn join_or_none(values: impl IntoIterator<Item = String>) -> String {
    let values: Vec<String> = values.into_iter().collect();
    if values.is_empty() {
        "none".to_string()
    } else {
        values.join(", ")
    }
}

pub struct Editor {
    world: Arc<WorldStore>,
    narrative: Arc<NarrativeLog>,
}

impl Editor {
    pub fn new(world: Arc<WorldStore>, narrative: Arc<NarrativeLog>) -> Self {
        Self { world, narrative }
    }

    // =========================================================================
    // Listings
    // =========================================================================

    pub async fn accounts(&self) -> Result<Vec<AccountName>, StoreError> {
        let mut names: Vec<_> = self.world.accounts().await?.into_iter().map(|a| a.name).collect();
        names.sort();
        Ok(names)
    }

    pub async fn characters(&self) -> Result<Vec<CharacterName>, StoreError> {
        let mut names: Vec<_> = self
            .world
            .characters()
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        names.sort();
        Ok(names)
    }

    pub async fn look(&self, coords: Coords) -> Result<Look, StoreError> {
        let (place, charted) = match self.world.get_place(coords).await {
            Ok(place) => (place, true),
            Err(e) if e.is_not_found() => (Place::uncharted(coords), false),
            Err(e) => return Err(e),
        };
        Ok(Look {
            place,
            charted,
            exits: self.world.exits(coords).await?,
            characters: self.world.characters_at(coords).await?,
            items: self.world.items_at(coords).await?,
        })
    }

    // =========================================================================
    // Show (pretty JSON)
    // =========================================================================

    pub async fn show_account(&self, name: &AccountName) -> Result<String, StoreError> {
        to_json(&self.world.get_account(name).await?)
    }

    pub async fn show_character(&self, name: &CharacterName) -> Result<String, StoreError> {
        to_json(&self.world.get_character(name).await?)
    }

    pub async fn show_item(&self, name: &ItemName) -> Result<String, StoreError> {
        to_json(&self.world.get_item(name).await?)
    }

    pub async fn show_place(&self, coords: Coords) -> Result<String, StoreError> {
        to_json(&self.world.get_place(coords).await?)
    }

    // =========================================================================
    // Replace from JSON
    // =========================================================================

    pub async fn replace_account(
        &self,
        name: &AccountName,
        json: &str,
    ) -> Result<Account, StoreError> {
        let account: Account = from_json(json, name.clone())?;
        self.world.set_account(account).await
    }

    pub async fn replace_character(
        &self,
        name: &CharacterName,
        json: &str,
    ) -> Result<Character, StoreError> {
        let character: Character = from_json(json, name.clone())?;
        self.world.set_character(character).await
    }

    pub async fn replace_item(&self, name: &ItemName, json: &str) -> Result<Item, StoreError> {
        let item: Item = from_json(json, name.clone())?;
        self.world.set_item(item).await
    }

    pub async fn replace_place(&self, coords: Coords, json: &str) -> Result<Place, StoreError> {
        let place: Place = from_json(json, coords)?;
        self.world.set_place(place).await
    }

    // =========================================================================
    // Delete
    // =========================================================================

    pub async fn delete_account(&self, name: &AccountName) -> Result<Account, StoreError> {
        self.world.delete_account(name).await
    }

    /// Deletes the character; its narrative is kept.
    pub async fn delete_character(&self, name: &CharacterName) -> Result<Character, StoreError> {
        self.world.delete_character(name).await
    }

    pub async fn delete_item(&self, name: &ItemName) -> Result<Item, StoreError> {
        self.world.delete_item(name).await
    }

    pub async fn delete_place(
        &self,
        coords: Coords,
        policy: PlaceDeletePolicy,
    ) -> Result<Place, StoreError> {
        self.world.delete_place(coords, policy).await
    }

    // =========================================================================
    // Narrative
    // =========================================================================

    pub async fn narrative(
        &self,
        name: &CharacterName,
        range: NarrativeRange,
    ) -> Result<String, StoreError> {
        let entries = self.narrative.read(name, range).collect().await?;
        Ok(render(&entries))
    }

    /// Append an operator note to a character's narrative.
    pub async fn annotate(
        &self,
        name: &CharacterName,
        text: &str,
    ) -> Result<NarrativeEntry, StoreError> {
        self.world.get_character(name).await?;
        self.narrative
            .record(
                name,
                NarrativeEvent::Note {
                    text: text.to_string(),
                },
            )
            .await
    }

    /// Queue player input; the character's next turn answers it.
    pub async fn submit_input(
        &self,
        name: &CharacterName,
        text: &str,
    ) -> Result<NarrativeEntry, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::validation("Player input cannot be empty"));
        }
        self.world.get_character(name).await?;
        tracing::info!(character = %name, "Player input queued");
        self.narrative
            .record(
                name,
                NarrativeEvent::PlayerInput {
                    text: text.to_string(),
                },
            )
            .await
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string_pretty(value).map_err(|e| StoreError::storage("encode", e))
}

/// Parse a record and check it is the one being edited.
fn from_json<R: Record>(json: &str, expected: R::Key) -> Result<R, StoreError> {
    let record: R = serde_json::from_str(json)
        .map_err(|e| StoreError::validation(format!("Invalid {} JSON: {e}", R::KIND)))?;
    let expected: EntityKey = expected.into();
    if record.entity_key() != expected {
        return Err(StoreError::validation(format!(
            "Record is for {} but {} was being edited",
            record.entity_key(),
            expected
        )));
    }
    Ok(record)
}
