//! Decision context and the behavior-resolution port.

use async_trait::async_trait;
use chasm_domain::{Character, CharacterName, Coords, Item, ItemName, NarrativeEntry, Place};
use serde::{Deserialize, Serialize};

/// What one character sees at the start of its turn.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionContext {
    pub actor: Character,
    pub place: Place,
    /// Neighbouring cells that have a place
    pub exits: Vec<Coords>,
    /// Other characters at the same place
    pub characters_here: Vec<Character>,
    /// Items lying at the place
    pub items_here: Vec<Item>,
    /// Items the actor holds
    pub inventory: Vec<Item>,
    /// Newest narrative entries, oldest first
    pub recent: Vec<NarrativeEntry>,
    /// Player input not yet answered by a turn
    pub player_input: Option<String>,
}

impl DecisionContext {
    pub fn sees_item(&self, item: &ItemName) -> bool {
        self.items_here.iter().any(|i| &i.name == item)
    }

    pub fn sees_character(&self, name: &CharacterName) -> bool {
        self.characters_here.iter().any(|c| &c.name == name)
    }
}

/// One proposed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Move { to: Coords },
    Take { item: ItemName },
    Drop { item: ItemName },
    Give { item: ItemName, to: CharacterName },
    Speak { words: String },
    Idle,
}

/// A change to a numeric attribute that accompanies an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub character: CharacterName,
    pub attribute: String,
    pub delta: i64,
}

/// The collaborator's answer for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(flatten)]
    pub action: Action,
    #[serde(default)]
    pub adjustments: Vec<AttributeChange>,
    /// Prose for the actor's narrative; the event's default text otherwise
    #[serde(default)]
    pub narration: Option<String>,
}

impl Decision {
    pub fn act(action: Action) -> Self {
        Self {
            action,
            adjustments: Vec::new(),
            narration: None,
        }
    }

    pub fn idle() -> Self {
        Self::act(Action::Idle)
    }

    pub fn with_adjustment(
        mut self,
        character: CharacterName,
        attribute: impl Into<String>,
        delta: i64,
    ) -> Self {
        self.adjustments.push(AttributeChange {
            character,
            attribute: attribute.into(),
            delta,
        });
        self
    }

    pub fn with_narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = Some(narration.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BehaviorError {
    #[error("Decision timed out")]
    Timeout,
    #[error("Decision request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid decision: {0}")]
    InvalidResponse(String),
}

/// Behavior resolution: slow, untrusted, possibly remote.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BehaviorPort: Send + Sync {
    async fn decide(&self, context: &DecisionContext) -> Result<Decision, BehaviorError>;
}
