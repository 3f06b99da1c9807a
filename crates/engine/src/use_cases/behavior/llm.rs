//! LLM-backed behavior: describe the scene, ask for one JSON decision.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;

use crate::infrastructure::ports::{ChatMessage, LlmError, LlmPort, LlmRequest};
use crate::use_cases::simulation::{BehaviorError, BehaviorPort, Decision, DecisionContext};

const SYSTEM_PROMPT: &str = r#"You decide what one character in a text world does next.
Answer with a single JSON object and nothing else. Its "action" field is one of:
  {"action": "move", "to": {"x": X, "y": Y}}      step to an adjacent exit
  {"action": "take", "item": "NAME"}              pick up an item lying here
  {"action": "drop", "item": "NAME"}              put down an item you hold
  {"action": "give", "item": "NAME", "to": "WHO"} hand a held item to someone here
  {"action": "speak", "words": "..."}             say something aloud
  {"action": "idle"}                              do nothing
Optional fields:
  "narration": one or two sentences in the second person describing the moment
  "adjustments": [{"character": "WHO", "attribute": "NAME", "delta": N}]
If the player gave an instruction, follow it when it is possible."#;

pub struct LlmBehavior {
    llm: Arc<dyn LlmPort>,
    temperature: f32,
}

impl LlmBehavior {
    pub fn new(llm: Arc<dyn LlmPort>) -> Self {
        Self {
            llm,
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl BehaviorPort for LlmBehavior {
    async fn decide(&self, context: &DecisionContext) -> Result<Decision, BehaviorError> {
        let request = LlmRequest::new(vec![ChatMessage::user(build_prompt(context))])
            .with_system_prompt(SYSTEM_PROMPT)
            .with_temperature(self.temperature)
            .with_max_tokens(Some(400));

        let response = self.llm.generate(request).await.map_err(|e| match e {
            LlmError::RequestFailed(msg) => BehaviorError::RequestFailed(msg),
            LlmError::InvalidResponse(msg) => BehaviorError::InvalidResponse(msg),
        })?;

        parse_decision(&response.content)
    }
}

/// The scene as the character perceives it.
pub fn build_prompt(context: &DecisionContext) -> String {
    let actor = &context.actor;
    let mut prompt = String::new();

    let _ = writeln!(prompt, "You are {}.", actor.name);
    if !actor.description.is_empty() {
        let _ = writeln!(prompt, "{}", actor.description);
    }
    if let Some(objective) = &actor.objective {
        let _ = writeln!(prompt, "Your objective: {objective}");
    }
    if !actor.attributes.is_empty() {
        let attributes: Vec<String> = actor
            .attributes
            .iter()
            .map(|(name, value)| format!("{name} {value}"))
            .collect();
        let _ = writeln!(prompt, "Attributes: {}", attributes.join(", "));
    }

    let _ = writeln!(
        prompt,
        "\nYou are at {} {}.",
        context.place.name, context.place.coords
    );
    if !context.place.description.is_empty() {
        let _ = writeln!(prompt, "{}", context.place.description);
    }

    let exits: Vec<String> = context
        .exits
        .iter()
        .map(|to| match actor.coords.direction_to(to) {
            Some(direction) => format!("{direction} {to}"),
            None => to.to_string(),
        })
        .collect();
    let _ = writeln!(prompt, "Exits: {}", list_or_none(&exits));

    let people: Vec<String> = context
        .characters_here
        .iter()
        .map(|c| c.name.to_string())
        .collect();
    let _ = writeln!(prompt, "Also here: {}", list_or_none(&people));

    let items: Vec<String> = context
        .items_here
        .iter()
        .map(|i| i.name.to_string())
        .collect();
    let _ = writeln!(prompt, "Lying here: {}", list_or_none(&items));

    let held: Vec<String> = context
        .inventory
        .iter()
        .map(|i| i.name.to_string())
        .collect();
    let _ = writeln!(prompt, "You hold: {}", list_or_none(&held));

    if !context.recent.is_empty() {
        let _ = writeln!(prompt, "\nWhat happened recently:");
        for entry in &context.recent {
            let _ = writeln!(prompt, "- {}", entry.text);
        }
    }

    if let Some(input) = &context.player_input {
        let _ = writeln!(prompt, "\nThe player asks: {input}");
    }

    prompt
}

fn list_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "none".to_string()
    } else {
        values.join(", ")
    }
}

/// Pull the first JSON object out of a reply, tolerating prose or code
/// fences around it.
pub fn parse_decision(raw: &str) -> Result<Decision, BehaviorError> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(BehaviorError::InvalidResponse(format!(
            "no JSON object in reply: {}",
            truncate(raw)
        )));
    };
    if end < start {
        return Err(BehaviorError::InvalidResponse(format!(
            "no JSON object in reply: {}",
            truncate(raw)
        )));
    }

    serde_json::from_str(&raw[start..=end]).map_err(|e| {
        tracing::debug!(error = %e, reply = %truncate(raw), "Unparseable decision");
        BehaviorError::InvalidResponse(e.to_string())
    })
}

fn truncate(raw: &str) -> String {
    const MAX: usize = 120;
    match raw.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &raw[..cut]),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{FinishReason, LlmResponse, MockLlmPort};
    use crate::use_cases::simulation::Action;
    use chasm_domain::{Character, CharacterName, Coords, Item, ItemName, Place};

    fn context() -> DecisionContext {
        let actor = Character::new(CharacterName::new("Alvin").unwrap(), Coords::ORIGIN)
            .with_objective("find the lamp");
        DecisionContext {
            actor,
            place: Place::new(Coords::ORIGIN, "Square"),
            exits: vec![Coords::new(1, 0)],
            characters_here: vec![Character::new(
                CharacterName::new("Bea").unwrap(),
                Coords::ORIGIN,
            )],
            items_here: vec![Item::lying_at(ItemName::new("lamp").unwrap(), Coords::ORIGIN)],
            inventory: Vec::new(),
            recent: Vec::new(),
            player_input: Some("grab the lamp".into()),
        }
    }

    fn reply(content: &str) -> LlmResponse {
        LlmResponse {
            content: content.to_string(),
            finish_reason: FinishReason::Stop,
        }
    }

    #[test]
    fn prompt_describes_the_scene() {
        let prompt = build_prompt(&context());
        assert!(prompt.contains("You are Alvin."));
        assert!(prompt.contains("Your objective: find the lamp"));
        assert!(prompt.contains("Exits: east (1, 0)"));
        assert!(prompt.contains("Also here: Bea"));
        assert!(prompt.contains("Lying here: lamp"));
        assert!(prompt.contains("You hold: none"));
        assert!(prompt.contains("The player asks: grab the lamp"));
    }

    #[test]
    fn parses_fenced_json() {
        let decision =
            parse_decision("Sure!\n```json\n{\"action\": \"take\", \"item\": \"lamp\"}\n```")
                .unwrap();
        assert_eq!(
            decision.action,
            Action::Take {
                item: ItemName::new("lamp").unwrap()
            }
        );
    }

    #[test]
    fn malformed_reply_is_invalid_response() {
        assert!(matches!(
            parse_decision("I think Alvin should rest."),
            Err(BehaviorError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_decision(r#"{"action": "teleport"}"#),
            Err(BehaviorError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn decide_sends_prompt_and_parses_reply() {
        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .withf(|req| {
                req.system_prompt.is_some() && req.messages[0].content.contains("You are Alvin.")
            })
            .returning(|_| {
                Ok(reply(
                    r#"{"action":"speak","words":"Hello, Bea.","narration":"You greet Bea."}"#,
                ))
            });

        let decision = LlmBehavior::new(Arc::new(llm))
            .decide(&context())
            .await
            .unwrap();
        assert_eq!(
            decision.action,
            Action::Speak {
                words: "Hello, Bea.".into()
            }
        );
        assert_eq!(decision.narration.as_deref(), Some("You greet Bea."));
    }

    #[tokio::test]
    async fn llm_failure_is_request_failed() {
        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .returning(|_| Err(LlmError::RequestFailed("connection refused".into())));

        let result = LlmBehavior::new(Arc::new(llm)).decide(&context()).await;
        assert!(matches!(result, Err(BehaviorError::RequestFailed(_))));
    }
}
