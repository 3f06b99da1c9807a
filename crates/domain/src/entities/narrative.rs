//! Narrative entries - the per-character, append-only story of what happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CharacterName, Coords, ItemName};

/// Position of an entry within one character's narrative; starts at 1.
pub type Seq = u64;

/// What a narrative entry records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NarrativeEvent {
    Moved {
        from: Coords,
        to: Coords,
    },
    TookItem {
        item: ItemName,
    },
    DroppedItem {
        item: ItemName,
    },
    GaveItem {
        item: ItemName,
        to: CharacterName,
    },
    Spoke {
        words: String,
    },
    Idled,
    /// Another character acted in the same place
    Witnessed {
        actor: CharacterName,
        summary: String,
    },
    AttributeChanged {
        attribute: String,
        delta: i64,
    },
    /// The decision for this turn did not arrive in time; nothing was applied
    DecisionTimeout,
    DecisionFailed {
        reason: String,
    },
    /// The decided action failed validation before anything was applied
    ActionRejected {
        reason: String,
    },
    /// Some effects were committed before a later one failed
    PartiallyApplied {
        applied: Vec<String>,
        failed: String,
        reason: String,
    },
    PlayerInput {
        text: String,
    },
    /// Free-form annotation added by an operator
    Note {
        text: String,
    },
}

impl NarrativeEvent {
    /// Short label used in logs and transcripts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Moved { .. } => "moved",
            Self::TookItem { .. } => "took",
            Self::DroppedItem { .. } => "dropped",
            Self::GaveItem { .. } => "gave",
            Self::Spoke { .. } => "spoke",
            Self::Idled => "idled",
            Self::Witnessed { .. } => "witnessed",
            Self::AttributeChanged { .. } => "attribute",
            Self::DecisionTimeout => "timeout",
            Self::DecisionFailed { .. } => "decision-failed",
            Self::ActionRejected { .. } => "rejected",
            Self::PartiallyApplied { .. } => "partial",
            Self::PlayerInput { .. } => "input",
            Self::Note { .. } => "note",
        }
    }

    /// True for the entry a character's own turn ends with. Entries written
    /// by others (witnessing, notes, input, attribute changes) are not.
    pub fn is_turn_outcome(&self) -> bool {
        match self {
            Self::Moved { .. }
            | Self::TookItem { .. }
            | Self::DroppedItem { .. }
            | Self::GaveItem { .. }
            | Self::Spoke { .. }
            | Self::Idled
            | Self::DecisionTimeout
            | Self::DecisionFailed { .. }
            | Self::ActionRejected { .. }
            | Self::PartiallyApplied { .. } => true,
            Self::Witnessed { .. }
            | Self::AttributeChanged { .. }
            | Self::PlayerInput { .. }
            | Self::Note { .. } => false,
        }
    }

    /// Default prose for the event when no narration was supplied.
    pub fn describe(&self) -> String {
        match self {
            Self::Moved { from, to } => match from.direction_to(to) {
                Some(direction) => format!("You walk {direction} to {to}."),
                None => format!("You travel from {from} to {to}."),
            },
            Self::TookItem { item } => format!("You pick up the {item}."),
            Self::DroppedItem { item } => format!("You drop the {item}."),
            Self::GaveItem { item, to } => format!("You hand the {item} to {to}."),
            Self::Spoke { words } => format!("You say: \"{words}\""),
            Self::Idled => "You wait.".to_string(),
            Self::Witnessed { actor, summary } => format!("{actor} {summary}"),
            Self::AttributeChanged { attribute, delta } => {
                format!("Your {attribute} changes by {delta:+}.")
            }
            Self::DecisionTimeout => "You hesitate, and the moment passes.".to_string(),
            Self::DecisionFailed { reason } => format!("You cannot decide what to do ({reason})."),
            Self::ActionRejected { reason } => format!("You cannot do that: {reason}."),
            Self::PartiallyApplied {
                applied, failed, ..
            } => {
                if applied.is_empty() {
                    format!("Your attempt to {failed} falls through.")
                } else {
                    format!(
                        "You manage to {}, but your attempt to {failed} falls through.",
                        applied.join(", ")
                    )
                }
            }
            Self::PlayerInput { text } => format!("> {text}"),
            Self::Note { text } => text.clone(),
        }
    }
}

/// An entry before storage has given it a sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnnumberedEntry {
    pub character: CharacterName,
    pub recorded_at: DateTime<Utc>,
    pub event: NarrativeEvent,
    pub text: String,
}

impl UnnumberedEntry {
    pub fn numbered(self, seq: Seq) -> NarrativeEntry {
        NarrativeEntry {
            character: self.character,
            seq,
            recorded_at: self.recorded_at,
            event: self.event,
            text: self.text,
        }
    }
}

/// One immutable record in a character's narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeEntry {
    pub character: CharacterName,
    pub seq: Seq,
    pub recorded_at: DateTime<Utc>,
    pub event: NarrativeEvent,
    /// Rendered prose shown to the character
    pub text: String,
}

impl NarrativeEntry {
    /// One transcript line: `[seq] time label: text`.
    pub fn transcript_line(&self) -> String {
        format!(
            "[{}] {} {}: {}",
            self.seq,
            self.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            self.event.label(),
            self.text
        )
    }
}
