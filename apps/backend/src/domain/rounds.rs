//! Round resolution: deadline defaults, refusal-budget accounting, payoff
//! application, and the immutable `RoundRecord` archive entry.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::errors::{DomainError, ValidationKind};
use crate::domain::payoff::PayoffSchedule;
use crate::domain::state::{GameAction, Participant, Seat};

/// Revealed result of one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round: u32,
    pub actions: Vec<(Seat, GameAction)>,
    pub payoffs: Vec<(Seat, f64)>,
    pub cumulative: Vec<(Seat, f64)>,
    /// Fraction of participants who cooperated this round.
    pub cooperation_rate: f64,
}

/// Created once per round at the revelation transition; immutable after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    pub schedule: PayoffSchedule,
    pub outcome: RoundOutcome,
    #[serde(with = "time::serde::rfc3339")]
    pub revealed_at: OffsetDateTime,
}

/// Validate an action submission against phase-independent rules.
///
/// Phase gating happens in the session actor; this checks the per-
/// participant rules: one submission per round, and opt-out only while
/// refusal budget remains (rejected, not coerced).
pub fn validate_submission(
    participant: &Participant,
    action: GameAction,
) -> Result<(), DomainError> {
    if participant.submitted {
        return Err(DomainError::validation(
            ValidationKind::AlreadySubmitted,
            format!("seat {} already submitted this round", participant.seat),
        ));
    }
    if action == GameAction::OptOut && participant.refusal_budget == 0 {
        return Err(DomainError::validation(
            ValidationKind::BudgetExhausted,
            format!("seat {} has no refusal budget remaining", participant.seat),
        ));
    }
    Ok(())
}

/// Assign the deadline default to every participant who has not submitted:
/// opt-out while refusal budget remains (consuming one unit), defect
/// otherwise. Returns the seats that were defaulted.
pub fn apply_deadline_defaults(participants: &mut [Participant]) -> Vec<Seat> {
    let mut defaulted = Vec::new();
    for p in participants.iter_mut().filter(|p| !p.submitted) {
        let action = if p.refusal_budget > 0 {
            p.refusal_budget -= 1;
            GameAction::OptOut
        } else {
            GameAction::Defect
        };
        p.pending_action = Some(action);
        p.submitted = true;
        defaulted.push(p.seat);
    }
    defaulted
}

/// Resolve the round: compute each payoff from the schedule and the action
/// profile, update cumulative scores, clear per-round submission state,
/// and return the outcome.
///
/// Every participant must carry a pending action when this is called
/// (deadline defaults are applied first).
pub fn resolve_round(
    round: u32,
    participants: &mut [Participant],
    schedule: &PayoffSchedule,
) -> Result<RoundOutcome, DomainError> {
    let mut actions: Vec<(Seat, GameAction)> = Vec::with_capacity(participants.len());
    for p in participants.iter() {
        let action = p.pending_action.ok_or_else(|| {
            DomainError::invariant(format!(
                "seat {} reached revelation without a pending action",
                p.seat
            ))
        })?;
        actions.push((p.seat, action));
    }

    let cooperators = actions
        .iter()
        .filter(|(_, a)| *a == GameAction::Cooperate)
        .count();

    let mut payoffs = Vec::with_capacity(participants.len());
    let mut cumulative = Vec::with_capacity(participants.len());
    for p in participants.iter_mut() {
        let action = p.pending_action.unwrap_or(GameAction::Defect);
        let others_cooperating = match action {
            GameAction::Cooperate => cooperators.saturating_sub(1),
            _ => cooperators,
        };
        let payoff = schedule.payoff(action, others_cooperating);
        p.cumulative_score += payoff;
        payoffs.push((p.seat, payoff));
        cumulative.push((p.seat, p.cumulative_score));

        p.pending_action = None;
        p.submitted = false;
    }

    let cooperation_rate = if participants.is_empty() {
        0.0
    } else {
        cooperators as f64 / participants.len() as f64
    };

    Ok(RoundOutcome {
        round,
        actions,
        payoffs,
        cumulative,
        cooperation_rate,
    })
}
