//! Rule-based behavior: idle most of the time, sometimes wander or pick
//! something up. Follows simple player commands when there are any.

use std::sync::Arc;

use async_trait::async_trait;
use chasm_domain::{CharacterName, ItemName};

use crate::infrastructure::ports::RandomPort;
use crate::use_cases::simulation::{Action, BehaviorError, BehaviorPort, Decision, DecisionContext};

/// Percent chance to pick up a loose item when one is here.
const TAKE_CHANCE: i32 = 30;
/// Percent chance to step to a neighbouring place.
const MOVE_CHANCE: i32 = 25;

pub struct WanderBehavior {
    random: Arc<dyn RandomPort>,
}

impl WanderBehavior {
    pub fn new(random: Arc<dyn RandomPort>) -> Self {
        Self { random }
    }

    fn pick<'a, T>(&self, choices: &'a [T]) -> Option<&'a T> {
        if choices.is_empty() {
            return None;
        }
        let last = i32::try_from(choices.len() - 1).unwrap_or(i32::MAX);
        let index = usize::try_from(self.random.gen_range(0, last)).unwrap_or(0);
        choices.get(index)
    }

    fn roam(&self, context: &DecisionContext) -> Decision {
        let roll = self.random.gen_range(1, 100);

        if roll <= TAKE_CHANCE {
            if let Some(item) = self.pick(&context.items_here) {
                return Decision::act(Action::Take {
                    item: item.name.clone(),
                });
            }
        }
        if roll > 100 - MOVE_CHANCE {
            if let Some(to) = self.pick(&context.exits) {
                return Decision::act(Action::Move { to: *to });
            }
        }
        Decision::idle()
    }
}

#[async_trait]
impl BehaviorPort for WanderBehavior {
    async fn decide(&self, context: &DecisionContext) -> Result<Decision, BehaviorError> {
        match &context.player_input {
            Some(input) => Ok(follow(context, input)),
            None => Ok(self.roam(context)),
        }
    }
}

/// Interpret the last line of player input as a short command:
/// `go <direction>`, `take <item>`, `drop <item>`, `give <item> to <name>`,
/// `say <words>`. Anything else is said aloud.
fn follow(context: &DecisionContext, input: &str) -> Decision {
    let line = input.lines().last().unwrap_or_default().trim();
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let action = match verb.to_ascii_lowercase().as_str() {
        "go" | "walk" => {
            let here = context.actor.coords;
            here.neighbours()
                .into_iter()
                .find(|to| here.direction_to(to) == Some(rest))
                .map(|to| Action::Move { to })
        }
        "take" | "get" => ItemName::new(rest).ok().map(|item| Action::Take { item }),
        "drop" => ItemName::new(rest).ok().map(|item| Action::Drop { item }),
        "give" => rest.split_once(" to ").and_then(|(item, to)| {
            Some(Action::Give {
                item: ItemName::new(item.trim()).ok()?,
                to: CharacterName::new(to.trim()).ok()?,
            })
        }),
        "say" if !rest.is_empty() => Some(Action::Speak {
            words: rest.to_string(),
        }),
        "wait" => Some(Action::Idle),
        _ => None,
    };

    match action {
        Some(action) => Decision::act(action),
        None if line.is_empty() => Decision::idle(),
        None => Decision::act(Action::Speak {
            words: line.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::MockRandomPort;
    use chasm_domain::{Character, Coords, Item, Place};

    fn context() -> DecisionContext {
        let name = CharacterName::new("Alvin").unwrap();
        DecisionContext {
            actor: Character::new(name, Coords::ORIGIN),
            place: Place::new(Coords::ORIGIN, "Square"),
            exits: vec![Coords::new(0, 1), Coords::new(1, 0)],
            characters_here: Vec::new(),
            items_here: vec![Item::lying_at(ItemName::new("lamp").unwrap(), Coords::ORIGIN)],
            inventory: Vec::new(),
            recent: Vec::new(),
            player_input: None,
        }
    }

    fn behavior(roll: fn(i32, i32) -> i32) -> WanderBehavior {
        let mut random = MockRandomPort::new();
        random.expect_gen_range().returning(roll);
        WanderBehavior::new(Arc::new(random))
    }

    #[tokio::test]
    async fn low_roll_takes_a_loose_item() {
        let decision = behavior(|min, _| min).decide(&context()).await.unwrap();
        assert_eq!(
            decision.action,
            Action::Take {
                item: ItemName::new("lamp").unwrap()
            }
        );
    }

    #[tokio::test]
    async fn high_roll_moves_to_an_exit() {
        let decision = behavior(|_, max| max).decide(&context()).await.unwrap();
        assert_eq!(decision.action, Action::Move { to: Coords::new(1, 0) });
    }

    #[tokio::test]
    async fn middle_roll_idles() {
        let decision = behavior(|min, max| (min + max) / 2)
            .decide(&context())
            .await
            .unwrap();
        assert_eq!(decision, Decision::idle());
    }

    #[tokio::test]
    async fn nowhere_to_go_idles() {
        let mut ctx = context();
        ctx.exits.clear();
        let decision = behavior(|_, max| max).decide(&ctx).await.unwrap();
        assert_eq!(decision, Decision::idle());
    }

    mod commands {
        use super::*;

        fn with_input(input: &str) -> DecisionContext {
            DecisionContext {
                player_input: Some(input.to_string()),
                ..context()
            }
        }

        async fn decide(input: &str) -> Action {
            // Commands never consult randomness.
            let behavior = WanderBehavior::new(Arc::new(MockRandomPort::new()));
            behavior.decide(&with_input(input)).await.unwrap().action
        }

        #[tokio::test]
        async fn go_uses_compass_directions() {
            assert_eq!(
                decide("go north-east").await,
                Action::Move {
                    to: Coords::new(1, 1)
                }
            );
        }

        #[tokio::test]
        async fn give_parses_recipient() {
            assert_eq!(
                decide("give coin to Bea").await,
                Action::Give {
                    item: ItemName::new("coin").unwrap(),
                    to: CharacterName::new("Bea").unwrap(),
                }
            );
        }

        #[tokio::test]
        async fn only_the_newest_line_counts() {
            assert_eq!(decide("take lamp\nsay hello").await, Action::Speak {
                words: "hello".into()
            });
        }

        #[tokio::test]
        async fn unknown_input_is_spoken() {
            assert_eq!(
                decide("go nowhere").await,
                Action::Speak {
                    words: "go nowhere".into()
                }
            );
        }
    }
}
