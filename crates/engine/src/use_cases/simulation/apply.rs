//! Apply step: turn a decision into ordered store operations and run them.

use chasm_domain::{CharacterName, Coords, EntityKey, ItemLocation, ItemName, NarrativeEvent};

use super::decision::{Action, AttributeChange, Decision, DecisionContext};
use crate::stores::{StoreError, WorldStore};

/// One store operation on one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    MoveCharacter {
        character: CharacterName,
        from: Coords,
        to: Coords,
    },
    TakeItem {
        item: ItemName,
        taker: CharacterName,
        at: Coords,
    },
    DropItem {
        item: ItemName,
        holder: CharacterName,
        at: Coords,
    },
    GiveItem {
        item: ItemName,
        from: CharacterName,
        to: CharacterName,
    },
    Adjust(AttributeChange),
}

impl Effect {
    /// The entity this effect writes; plans execute in this order.
    pub fn key(&self) -> EntityKey {
        match self {
            Self::MoveCharacter { character, .. } => EntityKey::Character(character.clone()),
            Self::TakeItem { item, .. } | Self::DropItem { item, .. } | Self::GiveItem { item, .. } => {
                EntityKey::Item(item.clone())
            }
            Self::Adjust(change) => EntityKey::Character(change.character.clone()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::MoveCharacter { to, .. } => format!("move to {to}"),
            Self::TakeItem { item, .. } => format!("take the {item}"),
            Self::DropItem { item, .. } => format!("drop the {item}"),
            Self::GiveItem { item, to, .. } => format!("give the {item} to {to}"),
            Self::Adjust(change) => format!(
                "change {}'s {} by {:+}",
                change.character, change.attribute, change.delta
            ),
        }
    }

    async fn apply(&self, world: &WorldStore) -> Result<(), StoreError> {
        match self {
            Self::MoveCharacter {
                character,
                from,
                to,
            } => {
                world
                    .modify_character(character, |mut c| {
                        if c.coords != *from {
                            return Err(StoreError::conflict(format!(
                                "{} is no longer at {}",
                                c.name, from
                            )));
                        }
                        c.coords = *to;
                        Ok(c)
                    })
                    .await?;
            }
            Self::TakeItem { item, taker, at } => {
                world
                    .move_item(
                        item,
                        ItemLocation::Holder(taker.clone()),
                        Some(ItemLocation::Place(*at)),
                    )
                    .await?;
            }
            Self::DropItem { item, holder, at } => {
                world
                    .move_item(
                        item,
                        ItemLocation::Place(*at),
                        Some(ItemLocation::Holder(holder.clone())),
                    )
                    .await?;
            }
            Self::GiveItem { item, from, to } => {
                world
                    .move_item(
                        item,
                        ItemLocation::Holder(to.clone()),
                        Some(ItemLocation::Holder(from.clone())),
                    )
                    .await?;
            }
            Self::Adjust(change) => {
                world
                    .modify_character(&change.character, |mut c| {
                        c.adjust_attribute(&change.attribute, change.delta);
                        Ok(c)
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

/// A multi-entity action stopped after some of its effects were committed.
///
/// The committed effects are not rolled back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("applied [{}] before `{failed}` failed: {source}", .applied.join(", "))]
pub struct PartialApplyError {
    pub applied: Vec<String>,
    pub failed: String,
    pub source: StoreError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// Nothing was committed
    Rejected(StoreError),
    Partial(PartialApplyError),
}

impl ApplyError {
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Rejected(e) => e.is_fatal(),
            Self::Partial(p) => p.source.is_fatal(),
        }
    }

    pub fn into_store_error(self) -> StoreError {
        match self {
            Self::Rejected(e) => e,
            Self::Partial(p) => p.source,
        }
    }
}

/// Check the decision against what the actor observed and build its effects,
/// sorted by entity key.
pub fn plan(context: &DecisionContext, decision: &Decision) -> Result<Vec<Effect>, StoreError> {
    let actor = &context.actor;
    let mut effects = Vec::new();

    match &decision.action {
        Action::Move { to } => {
            if !actor.coords.is_adjacent(to) {
                return Err(StoreError::validation(format!(
                    "{} is not next to {}",
                    to, actor.coords
                )));
            }
            effects.push(Effect::MoveCharacter {
                character: actor.name.clone(),
                from: actor.coords,
                to: *to,
            });
        }
        Action::Take { item } => {
            if !context.sees_item(item) {
                return Err(StoreError::validation(format!("there is no {item} here")));
            }
            effects.push(Effect::TakeItem {
                item: item.clone(),
                taker: actor.name.clone(),
                at: actor.coords,
            });
        }
        Action::Drop { item } => {
            if !actor.holds(item) {
                return Err(StoreError::validation(format!("you are not holding the {item}")));
            }
            effects.push(Effect::DropItem {
                item: item.clone(),
                holder: actor.name.clone(),
                at: actor.coords,
            });
        }
        Action::Give { item, to } => {
            if !actor.holds(item) {
                return Err(StoreError::validation(format!("you are not holding the {item}")));
            }
            if !context.sees_character(to) {
                return Err(StoreError::validation(format!("{to} is not here")));
            }
            effects.push(Effect::GiveItem {
                item: item.clone(),
                from: actor.name.clone(),
                to: to.clone(),
            });
        }
        Action::Speak { .. } | Action::Idle => {}
    }

    for change in &decision.adjustments {
        if change.attribute.trim().is_empty() {
            return Err(StoreError::validation("attribute name cannot be empty"));
        }
        effects.push(Effect::Adjust(change.clone()));
    }

    effects.sort_by_key(Effect::key);
    Ok(effects)
}

/// Run effects in order. The first failure stops the plan.
pub async fn execute(world: &WorldStore, effects: &[Effect]) -> Result<(), ApplyError> {
    let mut applied = Vec::with_capacity(effects.len());
    for effect in effects {
        if let Err(source) = effect.apply(world).await {
            if applied.is_empty() {
                return Err(ApplyError::Rejected(source));
            }
            return Err(ApplyError::Partial(PartialApplyError {
                applied,
                failed: effect.describe(),
                source,
            }));
        }
        applied.push(effect.describe());
    }
    Ok(())
}

/// The actor's narrative event for a fully applied action.
pub fn outcome_event(actor_coords: Coords, action: &Action) -> NarrativeEvent {
    match action {
        Action::Move { to } => NarrativeEvent::Moved {
            from: actor_coords,
            to: *to,
        },
        Action::Take { item } => NarrativeEvent::TookItem { item: item.clone() },
        Action::Drop { item } => NarrativeEvent::DroppedItem { item: item.clone() },
        Action::Give { item, to } => NarrativeEvent::GaveItem {
            item: item.clone(),
            to: to.clone(),
        },
        Action::Speak { words } => NarrativeEvent::Spoke {
            words: words.clone(),
        },
        Action::Idle => NarrativeEvent::Idled,
    }
}

/// What bystanders see, or `None` for actions nobody notices.
pub fn witness_summary(actor_coords: Coords, action: &Action) -> Option<String> {
    match action {
        Action::Move { to } => Some(match actor_coords.direction_to(to) {
            Some(direction) => format!("leaves heading {direction}."),
            None => format!("leaves for {to}."),
        }),
        Action::Take { item } => Some(format!("picks up the {item}.")),
        Action::Drop { item } => Some(format!("drops the {item}.")),
        Action::Give { item, to } => Some(format!("hands the {item} to {to}.")),
        Action::Speak { words } => Some(format!("says: \"{words}\"")),
        Action::Idle => None,
    }
}
