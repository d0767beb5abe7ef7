use proptest::prelude::*;

use crate::domain::errors::{DomainError, ValidationKind};
use crate::domain::payoff::PayoffSchedule;
use crate::domain::rounds::{apply_deadline_defaults, resolve_round, validate_submission};
use crate::domain::state::{GameAction, Participant, ParticipantKind};

fn schedule_for(seats: usize) -> PayoffSchedule {
    PayoffSchedule {
        round: 1,
        cooperate: (0..seats).map(|k| 1.0 + 2.0 * k as f64).collect(),
        defect: (0..seats).map(|k| 2.0 + 2.0 * k as f64).collect(),
        opt_out: 0.5,
    }
}

fn participants(n: usize, refusal_budget: u32) -> Vec<Participant> {
    (0..n)
        .map(|i| {
            Participant::new(
                format!("p{i}"),
                i as u8,
                ParticipantKind::Human,
                refusal_budget,
            )
        })
        .collect()
}

fn submit(p: &mut Participant, action: GameAction) {
    p.pending_action = Some(action);
    p.submitted = true;
}

#[test]
fn silent_seat_defaults_to_opt_out_then_payoffs_follow_schedule() {
    // 3 seats, one round: A cooperates, B defects, C never submits.
    let mut seats = participants(3, 1);
    submit(&mut seats[0], GameAction::Cooperate);
    submit(&mut seats[1], GameAction::Defect);

    let defaulted = apply_deadline_defaults(&mut seats);
    assert_eq!(defaulted, vec![2]);
    assert_eq!(seats[2].pending_action, Some(GameAction::OptOut));
    assert_eq!(seats[2].refusal_budget, 0);

    let schedule = schedule_for(3);
    let outcome = resolve_round(1, &mut seats, &schedule).unwrap();

    let payoff_of = |seat: u8| {
        outcome
            .payoffs
            .iter()
            .find(|(s, _)| *s == seat)
            .map(|(_, p)| *p)
            .unwrap()
    };
    // Defector against one cooperator must beat the lone cooperator.
    assert!(payoff_of(1) > payoff_of(0));
    assert_eq!(payoff_of(0), 1.0); // cooperate, zero other cooperators
    assert_eq!(payoff_of(1), 4.0); // defect, one other cooperator
    assert_eq!(payoff_of(2), 0.5); // fixed opt-out value
    assert!((outcome.cooperation_rate - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn exhausted_budget_defaults_to_defect() {
    let mut seats = participants(2, 0);
    submit(&mut seats[0], GameAction::Cooperate);
    apply_deadline_defaults(&mut seats);
    assert_eq!(seats[1].pending_action, Some(GameAction::Defect));
}

#[test]
fn opt_out_with_no_budget_is_rejected_not_coerced() {
    let mut seats = participants(1, 0);
    let err = validate_submission(&seats[0], GameAction::OptOut).unwrap_err();
    assert!(matches!(
        err,
        DomainError::Validation(ValidationKind::BudgetExhausted, _)
    ));
    // Rejection leaves the participant untouched.
    assert!(!seats[0].submitted);
    assert_eq!(seats[0].refusal_budget, 0);
    // Cooperate and defect stay legal.
    assert!(validate_submission(&seats[0], GameAction::Cooperate).is_ok());
    submit(&mut seats[0], GameAction::Defect);
}

#[test]
fn double_submission_is_rejected() {
    let mut seats = participants(1, 1);
    submit(&mut seats[0], GameAction::Cooperate);
    let err = validate_submission(&seats[0], GameAction::Defect).unwrap_err();
    assert!(matches!(
        err,
        DomainError::Validation(ValidationKind::AlreadySubmitted, _)
    ));
}

#[test]
fn cumulative_scores_are_monotonic_across_rounds() {
    let mut seats = participants(3, 2);
    let schedule = schedule_for(3);

    let mut previous: Vec<f64> = vec![0.0; 3];
    for round in 1..=4 {
        for p in seats.iter_mut() {
            submit(p, GameAction::OptOut);
        }
        // Consume budget the way the deadline path would.
        for p in seats.iter_mut() {
            p.refusal_budget = p.refusal_budget.saturating_sub(1);
        }
        let outcome = resolve_round(round, &mut seats, &schedule).unwrap();
        for (i, (_, total)) in outcome.cumulative.iter().enumerate() {
            assert!(*total >= previous[i]);
            previous[i] = *total;
        }
    }
}

#[test]
fn resolution_clears_per_round_state() {
    let mut seats = participants(2, 1);
    submit(&mut seats[0], GameAction::Cooperate);
    submit(&mut seats[1], GameAction::Defect);
    resolve_round(1, &mut seats, &schedule_for(2)).unwrap();
    for p in &seats {
        assert!(!p.submitted);
        assert_eq!(p.pending_action, None);
    }
}

#[test]
fn resolution_without_pending_action_is_an_invariant_violation() {
    let mut seats = participants(2, 1);
    submit(&mut seats[0], GameAction::Cooperate);
    let err = resolve_round(1, &mut seats, &schedule_for(2)).unwrap_err();
    assert!(matches!(err, DomainError::Invariant(_)));
}

fn any_action() -> impl Strategy<Value = GameAction> {
    prop_oneof![
        Just(GameAction::Cooperate),
        Just(GameAction::Defect),
        Just(GameAction::OptOut),
    ]
}

proptest! {
    #[test]
    fn resolution_properties_hold_for_any_profile(
        actions in prop::collection::vec(any_action(), 2..=8)
    ) {
        let n = actions.len();
        let mut seats = participants(n, 1);
        for (p, action) in seats.iter_mut().zip(actions.iter()) {
            submit(p, *action);
        }
        let schedule = schedule_for(n);
        let outcome = resolve_round(1, &mut seats, &schedule).unwrap();

        prop_assert!((0.0..=1.0).contains(&outcome.cooperation_rate));
        prop_assert_eq!(outcome.payoffs.len(), n);
        for (seat, payoff) in &outcome.payoffs {
            // Every payoff is traceable to the schedule.
            let action = actions[usize::from(*seat)];
            let possible = match action {
                GameAction::OptOut => vec![schedule.opt_out],
                GameAction::Cooperate => schedule.cooperate.clone(),
                GameAction::Defect => schedule.defect.clone(),
            };
            prop_assert!(possible.contains(payoff));
        }
    }
}
