//! Payoff schedule generation.
//!
//! Pure function of (round number, prior-round history, strategy
//! parameters). Strategies are deterministic given their seed: the same
//! session seed and round always produce the same schedule.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::rounds::RoundRecord;
use crate::domain::state::GameAction;

/// Per-round table mapping (own action, count of *other* cooperators) to a
/// payoff. Opting out yields the fixed `opt_out` value regardless of
/// others' actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoffSchedule {
    pub round: u32,
    /// Indexed by the number of other participants who cooperated.
    pub cooperate: Vec<f64>,
    pub defect: Vec<f64>,
    pub opt_out: f64,
}

impl PayoffSchedule {
    pub fn payoff(&self, action: GameAction, others_cooperating: usize) -> f64 {
        match action {
            GameAction::OptOut => self.opt_out,
            GameAction::Cooperate => self
                .cooperate
                .get(others_cooperating)
                .copied()
                .unwrap_or(self.opt_out),
            GameAction::Defect => self
                .defect
                .get(others_cooperating)
                .copied()
                .unwrap_or(self.opt_out),
        }
    }
}

/// Strategy selection, supplied at session creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PayoffStrategy {
    /// Fixed schedule derived from seat count.
    Static,
    /// Static schedule perturbed by symmetric multiplicative noise.
    BoundedNoise { noise_pct: f64 },
    /// Cooperation penalized when the preceding round's cooperation rate
    /// exceeded `threshold`.
    Adaptive { threshold: f64, penalty: f64 },
    /// Static schedule scaled linearly by the round index.
    Escalating { factor: f64 },
}

/// Configured validity bounds for generated payoffs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PayoffBounds {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoffParams {
    pub strategy: PayoffStrategy,
    pub bounds: PayoffBounds,
    pub opt_out_payoff: f64,
}

/// Schedule seed for a round, derived so each round draws an independent
/// but reproducible noise stream.
fn derive_schedule_seed(session_seed: u64, round: u32) -> u64 {
    session_seed
        .wrapping_mul(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(u64::from(round))
}

/// Generate the payoff schedule for `round`.
///
/// Out-of-bounds values are logged as warnings and NOT clamped: a schedule
/// escaping its bounds is a misconfigured strategy and must stay visible.
pub fn generate(
    round: u32,
    history: &[RoundRecord],
    params: &PayoffParams,
    seats: usize,
    session_seed: u64,
) -> PayoffSchedule {
    let mut schedule = static_schedule(round, seats, params.opt_out_payoff);

    match &params.strategy {
        PayoffStrategy::Static => {}
        PayoffStrategy::BoundedNoise { noise_pct } => {
            let mut rng = ChaCha8Rng::seed_from_u64(derive_schedule_seed(session_seed, round));
            let pct = noise_pct.abs();
            for value in schedule
                .cooperate
                .iter_mut()
                .chain(schedule.defect.iter_mut())
            {
                let factor = 1.0 + rng.random_range(-pct..=pct);
                *value *= factor;
            }
        }
        PayoffStrategy::Adaptive { threshold, penalty } => {
            if let Some(previous) = history.last() {
                if previous.outcome.cooperation_rate > *threshold {
                    for value in schedule.cooperate.iter_mut() {
                        *value *= 1.0 - penalty;
                    }
                }
            }
        }
        PayoffStrategy::Escalating { factor } => {
            let scale = 1.0 + factor * f64::from(round.saturating_sub(1));
            for value in schedule
                .cooperate
                .iter_mut()
                .chain(schedule.defect.iter_mut())
            {
                *value *= scale;
            }
        }
    }

    for violation in bounds_violations(&schedule, params.bounds) {
        warn!(
            round,
            action = violation.action,
            others_cooperating = violation.others_cooperating,
            value = violation.value,
            min = params.bounds.min,
            max = params.bounds.max,
            "generated payoff outside configured bounds"
        );
    }

    schedule
}

/// Fixed schedule derived from seat count: both rows increase with the
/// count of other cooperators, and defection strictly dominates.
fn static_schedule(round: u32, seats: usize, opt_out_payoff: f64) -> PayoffSchedule {
    let mut cooperate = Vec::with_capacity(seats);
    let mut defect = Vec::with_capacity(seats);
    for k in 0..seats {
        cooperate.push(1.0 + 2.0 * k as f64);
        defect.push(2.0 + 2.0 * k as f64);
    }
    PayoffSchedule {
        round,
        cooperate,
        defect,
        opt_out: opt_out_payoff,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundsViolation {
    pub action: &'static str,
    pub others_cooperating: usize,
    pub value: f64,
}

pub fn bounds_violations(schedule: &PayoffSchedule, bounds: PayoffBounds) -> Vec<BoundsViolation> {
    let mut violations = Vec::new();
    for (action, row) in [
        ("cooperate", &schedule.cooperate),
        ("defect", &schedule.defect),
    ] {
        for (k, value) in row.iter().enumerate() {
            if *value < bounds.min || *value > bounds.max {
                violations.push(BoundsViolation {
                    action,
                    others_cooperating: k,
                    value: *value,
                });
            }
        }
    }
    violations
}
