use uuid::Uuid;

use crate::domain::snapshot::{snapshot, StateDelta};
use crate::domain::state::{
    GameAction, Participant, ParticipantKind, Phase, SessionState,
};

fn state_with(phase: Phase) -> SessionState {
    let participants = vec![
        Participant::new("alice".into(), 0, ParticipantKind::Human, 2),
        Participant::new("random#1".into(), 1, ParticipantKind::Automated, 2),
    ];
    let mut state = SessionState::new(Uuid::new_v4(), 4, participants, "ctrl".into(), 64);
    state.phase = phase;
    state
}

#[test]
fn snapshot_reflects_seating_and_phase() {
    let mut state = state_with(Phase::Action);
    state.current_round = 2;
    state.participants[0].connected = true;
    state.participants[0].cumulative_score = 7.5;
    state.participants[0].submitted = true;
    state.participants[0].pending_action = Some(GameAction::Cooperate);

    let snap = snapshot(&state, Some(123_456));
    assert_eq!(snap.phase, Phase::Action);
    assert_eq!(snap.deadline_ms, Some(123_456));
    assert_eq!(snap.header.round, 2);
    assert_eq!(snap.header.total_rounds, 4);
    assert_eq!(snap.header.seating.len(), 2);

    let seat0 = &snap.header.seating[0];
    assert!(seat0.connected);
    assert_eq!(seat0.cumulative_score, 7.5);
    // The submission flag is public; the chosen action is not part of the
    // snapshot type at all.
    assert!(seat0.submitted);
}

#[test]
fn snapshot_deadline_absent_when_held() {
    let state = state_with(Phase::Communication);
    let snap = snapshot(&state, None);
    assert_eq!(snap.deadline_ms, None);
}

#[test]
fn phase_changed_delta_omits_empty_schedule() {
    let delta = StateDelta::PhaseChanged {
        phase: Phase::Communication,
        round: 1,
        deadline_ms: Some(1),
        schedule: None,
    };
    let json = serde_json::to_value(&delta).unwrap();
    assert_eq!(json["kind"], "phase_changed");
    assert!(json.get("schedule").is_none());
}

#[test]
fn deltas_serialize_with_snake_case_tags() {
    let delta = StateDelta::ActionSubmitted { seat: 1 };
    let json = serde_json::to_value(&delta).unwrap();
    assert_eq!(json["kind"], "action_submitted");
    assert_eq!(json["seat"], 1);
}
