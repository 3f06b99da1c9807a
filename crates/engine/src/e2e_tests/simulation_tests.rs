//! Full turns through the scheduler, with stubbed behavior.

use std::sync::Arc;
use std::time::Duration;

use chasm_domain::{Character, Coords, Item, NarrativeEvent};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::use_cases::simulation::{Action, Decision, MockBehaviorPort, TurnOutcome};

#[tokio::test]
async fn alvin_walks_east_and_it_is_written_down_once() {
    for (backend, world) in TestWorld::all().await {
        let world = world.with_square_and_alvin().await;
        let mut behavior = MockBehaviorPort::new();
        behavior.expect_decide().times(1).returning(|_| {
            Ok(Decision::act(Action::Move {
                to: Coords::new(1, 0),
            }))
        });

        let report = world.scheduler(behavior).tick().await.unwrap();

        assert_eq!(report.outcome_of(&name("Alvin")), Some(&TurnOutcome::Completed));
        let alvin = world.app.world.get_character(&name("Alvin")).await.unwrap();
        assert_eq!(alvin.coords, Coords::new(1, 0), "{backend}");
        // The destination did not exist; moving there charted it.
        assert!(world.app.world.get_place(Coords::new(1, 0)).await.is_ok());

        let log = world.narrative_of("Alvin").await;
        assert_eq!(log.len(), 1, "{backend}");
        assert_eq!(
            log[0].event,
            NarrativeEvent::Moved {
                from: Coords::ORIGIN,
                to: Coords::new(1, 0)
            }
        );
        assert_eq!(log[0].text, "You walk east to (1, 0).");
    }
}

#[tokio::test]
async fn stalled_behavior_times_out_once_and_changes_nothing() {
    for (backend, world) in TestWorld::all().await {
        let world = world.with_square_and_alvin().await;
        let before = world.app.world.get_character(&name("Alvin")).await.unwrap();

        let report = world.scheduler(StalledBehavior).tick().await.unwrap();

        assert_eq!(report.outcome_of(&name("Alvin")), Some(&TurnOutcome::TimedOut));
        assert_eq!(
            world.app.world.get_character(&name("Alvin")).await.unwrap(),
            before,
            "{backend}"
        );
        let timeouts: Vec<_> = world
            .narrative_of("Alvin")
            .await
            .into_iter()
            .filter(|e| e.event == NarrativeEvent::DecisionTimeout)
            .collect();
        assert_eq!(timeouts.len(), 1, "{backend}");
    }
}

#[tokio::test]
async fn one_slow_actor_does_not_hold_up_the_others() {
    let world = TestWorld::memory().with_square_and_alvin().await;
    world
        .app
        .world
        .set_character(Character::new(name("Bea"), Coords::ORIGIN))
        .await
        .unwrap();
    world
        .app
        .world
        .set_item(Item::lying_at(item("lamp"), Coords::ORIGIN))
        .await
        .unwrap();

    struct SlowAlvin;
    #[async_trait::async_trait]
    impl crate::use_cases::simulation::BehaviorPort for SlowAlvin {
        async fn decide(
            &self,
            context: &crate::use_cases::simulation::DecisionContext,
        ) -> Result<Decision, crate::use_cases::simulation::BehaviorError> {
            if context.actor.name.as_str() == "Alvin" {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(Decision::act(Action::Take { item: item("lamp") }))
        }
    }

    let report = world.scheduler(SlowAlvin).tick().await.unwrap();

    assert_eq!(report.outcome_of(&name("Alvin")), Some(&TurnOutcome::TimedOut));
    assert_eq!(report.outcome_of(&name("Bea")), Some(&TurnOutcome::Completed));
    let bea = world.app.world.get_character(&name("Bea")).await.unwrap();
    assert!(bea.holds(&item("lamp")));
    // Alvin stood in the square and saw it happen.
    assert!(world.narrative_of("Alvin").await.iter().any(|e| matches!(
        &e.event,
        NarrativeEvent::Witnessed { actor, .. } if *actor == name("Bea")
    )));
}

#[tokio::test]
async fn editor_and_scheduler_never_lose_each_others_writes() {
    let world = TestWorld::memory().with_square_and_alvin().await;
    let mut behavior = MockBehaviorPort::new();
    behavior
        .expect_decide()
        .returning(|ctx| Ok(Decision::idle().with_adjustment(ctx.actor.name.clone(), "turns", 1)));
    let scheduler = Arc::new(world.scheduler(behavior));
    let cancel = CancellationToken::new();

    let running = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    for i in 0..20 {
        world
            .app
            .world
            .update_character(&name("Alvin"), |mut c| {
                c.adjust_attribute("edits", 1);
                c.description = format!("edited {i} times");
                c
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cancel.cancel();
    running.await.unwrap().unwrap();

    let alvin = world.app.world.get_character(&name("Alvin")).await.unwrap();
    let idled = world
        .narrative_of("Alvin")
        .await
        .iter()
        .filter(|e| e.event == NarrativeEvent::Idled)
        .count();
    assert_eq!(alvin.attribute("edits"), 20);
    assert_eq!(alvin.attribute("turns"), i64::try_from(idled).unwrap());
    assert!(idled > 0);
}

#[tokio::test]
async fn player_input_reaches_the_behavior_and_is_consumed() {
    let world = TestWorld::memory().with_square_and_alvin().await;
    world
        .app
        .editor
        .submit_input(&name("Alvin"), "say hello")
        .await
        .unwrap();

    let mut behavior = MockBehaviorPort::new();
    behavior
        .expect_decide()
        .withf(|ctx| ctx.player_input.as_deref() == Some("say hello"))
        .times(1)
        .returning(|_| {
            Ok(Decision::act(Action::Speak {
                words: "hello".into(),
            }))
        });
    let scheduler = crate::use_cases::simulation::Scheduler::new(
        world.app.world.clone(),
        world.app.narrative.clone(),
        Arc::new(behavior),
        Box::new(crate::use_cases::simulation::PendingInput::new()),
        fast_config(),
    );

    assert_eq!(scheduler.tick().await.unwrap().turns.len(), 1);
    // Answered: the next tick selects nobody.
    assert!(scheduler.tick().await.unwrap().turns.is_empty());
}

#[tokio::test]
async fn input_survives_witnessing_another_characters_turn() {
    let world = TestWorld::memory().with_square_and_alvin().await;
    world
        .app
        .world
        .set_character(Character::new(name("Bea"), Coords::ORIGIN))
        .await
        .unwrap();
    world
        .app
        .editor
        .submit_input(&name("Bea"), "go east")
        .await
        .unwrap();

    let mut behavior = MockBehaviorPort::new();
    behavior
        .expect_decide()
        .withf(|ctx| ctx.actor.name == name("Alvin"))
        .times(1)
        .returning(|_| {
            Ok(Decision::act(Action::Speak {
                words: "morning".into(),
            }))
        });
    behavior
        .expect_decide()
        .withf(|ctx| {
            ctx.actor.name == name("Bea") && ctx.player_input.as_deref() == Some("go east")
        })
        .times(1)
        .returning(|_| {
            Ok(Decision::act(Action::Move {
                to: Coords::new(1, 0),
            }))
        });
    let scheduler = crate::use_cases::simulation::Scheduler::new(
        world.app.world.clone(),
        world.app.narrative.clone(),
        Arc::new(behavior),
        Box::new(crate::use_cases::simulation::RoundRobin::new(1)),
        fast_config(),
    );

    let first = scheduler.tick().await.unwrap();
    assert_eq!(first.outcome_of(&name("Alvin")), Some(&TurnOutcome::Completed));
    assert!(matches!(
        world.narrative_of("Bea").await.last().map(|e| &e.event),
        Some(NarrativeEvent::Witnessed { .. })
    ));

    let second = scheduler.tick().await.unwrap();
    assert_eq!(second.outcome_of(&name("Bea")), Some(&TurnOutcome::Completed));
    let bea = world.app.world.get_character(&name("Bea")).await.unwrap();
    assert_eq!(bea.coords, Coords::new(1, 0));
}
