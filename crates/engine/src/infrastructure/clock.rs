//! Time and dice for the running world.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::infrastructure::ports::{ClockPort, RandomPort};

/// Wall-clock time for narrative timestamps and new accounts.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Dice for wandering characters and retry jitter.
///
/// Dice built from a seed roll the same sequence on every run, so a wandering
/// world can be replayed.
pub struct Dice {
    rng: Mutex<StdRng>,
}

impl Dice {
    /// Seeded from `seed` when given, otherwise from the operating system.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => {
                tracing::info!(seed, "Rolling seeded dice");
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    pub fn from_entropy() -> Self {
        Self::new(None)
    }
}

impl RandomPort for Dice {
    fn gen_range(&self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(min..=max)
    }
}

#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rolls(dice: &Dice) -> Vec<i32> {
        (0..20).map(|_| dice.gen_range(0, 7)).collect()
    }

    #[test]
    fn rolls_stay_in_range() {
        let dice = Dice::from_entropy();
        for _ in 0..100 {
            let n = dice.gen_range(-2, 3);
            assert!((-2..=3).contains(&n));
        }
    }

    #[test]
    fn empty_range_rolls_its_lower_bound() {
        assert_eq!(Dice::from_entropy().gen_range(4, 4), 4);
        assert_eq!(Dice::new(Some(1)).gen_range(9, 2), 9);
    }

    #[test]
    fn same_seed_replays_the_same_rolls() {
        assert_eq!(rolls(&Dice::new(Some(42))), rolls(&Dice::new(Some(42))));
    }
}
