use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix::Actor;
use actix::Addr;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::domain::chat::ChatRecipient;
use crate::domain::snapshot::SessionSnapshot;
use crate::domain::state::{GameAction, ParticipantKind, Phase};
use crate::error::AppError;
use crate::providers::{ActionProvider, ScriptedProvider};
use crate::services::connections::ConnectionManager;
use crate::services::session::{
    Attach, Begin, ControlOp, ControllerOp, Detach, GetSnapshot, SendChat, SessionActor,
    SubmitAction,
};
use crate::storage::{MemoryStore, SessionStatus};
use crate::ws::hub::SessionHub;

const CONTROLLER: &str = "ctrl";

struct Harness {
    session_id: Uuid,
    addr: Addr<SessionActor>,
    store: Arc<MemoryStore>,
    connections: Arc<ConnectionManager>,
}

fn spawn_session(
    cfg: SessionConfig,
    humans: &[&str],
    providers: HashMap<u8, Arc<dyn ActionProvider>>,
) -> Harness {
    let session_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    let connections = Arc::new(ConnectionManager::default());
    let hub = Arc::new(SessionHub::new());

    let mut seated: Vec<(String, ParticipantKind)> = humans
        .iter()
        .map(|id| (id.to_string(), ParticipantKind::Human))
        .collect();
    for seat in providers.keys() {
        seated.push((format!("bot#{seat}"), ParticipantKind::Automated));
    }

    let addr = SessionActor::new(
        session_id,
        cfg,
        seated,
        CONTROLLER.to_string(),
        providers,
        hub,
        store.clone(),
        connections.clone(),
    )
    .start();

    Harness {
        session_id,
        addr,
        store,
        connections,
    }
}

async fn snapshot(addr: &Addr<SessionActor>) -> SessionSnapshot {
    addr.send(GetSnapshot).await.unwrap().unwrap().1
}

async fn advance(addr: &Addr<SessionActor>) {
    addr.send(ControllerOp {
        identity: CONTROLLER.to_string(),
        op: ControlOp::ForceAdvance,
    })
    .await
    .unwrap()
    .unwrap();
}

async fn submit(addr: &Addr<SessionActor>, identity: &str, action: GameAction) -> Result<(), AppError> {
    addr.send(SubmitAction {
        identity: identity.to_string(),
        action,
    })
    .await
    .unwrap()
}

#[actix_rt::test]
async fn controller_driven_round_applies_defaults_and_reveals() {
    let h = spawn_session(
        SessionConfig::for_tests(3, 1),
        &["alice", "bob", "carol"],
        HashMap::new(),
    );
    h.addr.send(Begin).await.unwrap().unwrap();
    assert_eq!(snapshot(&h.addr).await.phase, Phase::Announcement);

    advance(&h.addr).await; // -> Communication
    assert_eq!(snapshot(&h.addr).await.phase, Phase::Communication);

    advance(&h.addr).await; // -> Action
    assert_eq!(snapshot(&h.addr).await.phase, Phase::Action);

    submit(&h.addr, "alice", GameAction::Cooperate).await.unwrap();
    submit(&h.addr, "bob", GameAction::Defect).await.unwrap();

    advance(&h.addr).await; // deadline override -> Revelation
    let snap = snapshot(&h.addr).await;
    assert_eq!(snap.phase, Phase::Revelation);
    let outcome = snap.last_outcome.expect("outcome revealed");
    assert_eq!(outcome.actions.len(), 3);
    // carol never submitted and had budget: defaulted to opt-out.
    assert_eq!(outcome.actions[2].1, GameAction::OptOut);
    let payoff_of = |seat: u8| {
        outcome
            .payoffs
            .iter()
            .find(|(s, _)| *s == seat)
            .map(|(_, p)| *p)
            .unwrap()
    };
    assert!(payoff_of(1) > payoff_of(0));
    assert_eq!(payoff_of(2), 0.5);

    advance(&h.addr).await; // final round -> Ended
    let snap = snapshot(&h.addr).await;
    assert_eq!(snap.phase, Phase::Ended);

    // Archive caught up under the transition guard.
    let records = h.store.round_records(h.session_id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].round, 1);
    actix_rt::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.store.status(h.session_id), Some(SessionStatus::Completed));
}

#[actix_rt::test]
async fn timers_advance_phases_without_any_input() {
    let h = spawn_session(
        SessionConfig::for_tests(2, 1),
        &["alice", "bob"],
        HashMap::new(),
    );
    h.addr.send(Begin).await.unwrap().unwrap();

    // announcement 40 + communication 40 + action 60 + revelation 40.
    actix_rt::time::sleep(Duration::from_millis(320)).await;
    let snap = snapshot(&h.addr).await;
    assert_eq!(snap.phase, Phase::Ended);

    let records = h.store.round_records(h.session_id);
    assert_eq!(records.len(), 1);
    // Nobody submitted: both seats defaulted to opt-out on their budget.
    for (_, action) in &records[0].outcome.actions {
        assert_eq!(*action, GameAction::OptOut);
    }
}

#[actix_rt::test]
async fn submissions_are_phase_gated() {
    let h = spawn_session(
        SessionConfig::for_tests(2, 1),
        &["alice", "bob"],
        HashMap::new(),
    );
    h.addr.send(Begin).await.unwrap().unwrap();

    // Announcement accepts no participant input.
    let err = submit(&h.addr, "alice", GameAction::Cooperate)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PHASE_VIOLATION");

    // The rejection reached only the sender and changed nothing.
    let snap = snapshot(&h.addr).await;
    assert_eq!(snap.phase, Phase::Announcement);
    assert!(snap.header.seating.iter().all(|s| !s.submitted));
}

#[actix_rt::test]
async fn chat_is_rejected_during_action_and_kept_during_communication() {
    let h = spawn_session(
        SessionConfig::for_tests(2, 1),
        &["alice", "bob"],
        HashMap::new(),
    );
    h.addr.send(Begin).await.unwrap().unwrap();
    advance(&h.addr).await; // Communication

    h.addr
        .send(SendChat {
            identity: "alice".to_string(),
            to: ChatRecipient::All,
            content: "shall we cooperate?".to_string(),
        })
        .await
        .unwrap()
        .unwrap();

    advance(&h.addr).await; // Action
    let err = h
        .addr
        .send(SendChat {
            identity: "alice".to_string(),
            to: ChatRecipient::Seat(1),
            content: "too late".to_string(),
        })
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code(), "PHASE_VIOLATION");

    // Only the accepted message was archived.
    actix_rt::time::sleep(Duration::from_millis(20)).await;
    let chats = h.store.chat_records(h.session_id);
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].content, "shall we cooperate?");
}

#[actix_rt::test]
async fn opt_out_is_rejected_once_budget_is_gone() {
    let mut cfg = SessionConfig::for_tests(2, 1);
    cfg.refusal_budget = 0;
    let h = spawn_session(cfg, &["alice", "bob"], HashMap::new());
    h.addr.send(Begin).await.unwrap().unwrap();
    advance(&h.addr).await;
    advance(&h.addr).await; // Action

    let err = submit(&h.addr, "alice", GameAction::OptOut)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "REFUSAL_BUDGET_EXHAUSTED");
    // Not coerced: the seat is still free to act.
    submit(&h.addr, "alice", GameAction::Defect).await.unwrap();
}

#[actix_rt::test]
async fn action_phase_completes_early_when_everyone_submits() {
    let h = spawn_session(
        SessionConfig::for_tests(2, 2),
        &["alice", "bob"],
        HashMap::new(),
    );
    h.addr.send(Begin).await.unwrap().unwrap();
    advance(&h.addr).await;
    advance(&h.addr).await; // Action, deadline 60ms away

    submit(&h.addr, "alice", GameAction::Cooperate).await.unwrap();
    submit(&h.addr, "bob", GameAction::Cooperate).await.unwrap();

    // Well before the action deadline the phase has already moved on.
    let snap = snapshot(&h.addr).await;
    assert_eq!(snap.phase, Phase::Revelation);
    assert_eq!(snap.last_outcome.unwrap().cooperation_rate, 1.0);
}

#[actix_rt::test]
async fn reconnection_restores_seat_score_and_submission_state() {
    let h = spawn_session(
        SessionConfig::for_tests(2, 2),
        &["alice", "bob"],
        HashMap::new(),
    );
    h.addr.send(Begin).await.unwrap().unwrap();

    let conn1 = Uuid::new_v4();
    h.addr
        .send(Attach {
            identity: "alice".to_string(),
            conn_id: conn1,
        })
        .await
        .unwrap()
        .unwrap();

    advance(&h.addr).await;
    advance(&h.addr).await; // Action
    submit(&h.addr, "alice", GameAction::Cooperate).await.unwrap();

    h.addr
        .send(Detach {
            identity: "alice".to_string(),
            conn_id: conn1,
        })
        .await
        .unwrap();
    let snap = snapshot(&h.addr).await;
    let alice = &snap.header.seating[0];
    assert!(!alice.connected);
    // Disconnect cleared only the connection flag.
    assert!(alice.submitted);

    let (_, snap) = h
        .addr
        .send(Attach {
            identity: "alice".to_string(),
            conn_id: Uuid::new_v4(),
        })
        .await
        .unwrap()
        .unwrap();
    let alice = &snap.header.seating[0];
    assert!(alice.connected);
    assert_eq!(alice.seat, 0);
    assert!(alice.submitted);
}

#[actix_rt::test]
async fn controller_authority_is_server_derived() {
    let h = spawn_session(
        SessionConfig::for_tests(2, 1),
        &["alice", "bob"],
        HashMap::new(),
    );
    h.addr.send(Begin).await.unwrap().unwrap();

    // A seated participant claiming controller powers is refused.
    let err = h
        .addr
        .send(ControllerOp {
            identity: "alice".to_string(),
            op: ControlOp::Terminate,
        })
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));
    assert_eq!(snapshot(&h.addr).await.phase, Phase::Announcement);

    // An unknown identity cannot submit either.
    let err = submit(&h.addr, "mallory", GameAction::Defect)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_SEATED");
}

#[actix_rt::test]
async fn phase_entry_holds_below_connected_human_threshold() {
    let mut cfg = SessionConfig::for_tests(2, 1);
    cfg.min_connected_humans = 1;
    let h = spawn_session(cfg, &["alice", "bob"], HashMap::new());
    h.addr.send(Begin).await.unwrap().unwrap();

    // Nobody connected: announcement entered but held, no deadline.
    let snap = snapshot(&h.addr).await;
    assert_eq!(snap.phase, Phase::Announcement);
    assert_eq!(snap.deadline_ms, None);

    // Still held well past the configured announcement duration.
    actix_rt::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(snapshot(&h.addr).await.phase, Phase::Announcement);

    // A connecting human satisfies the precondition and releases the hold.
    h.addr
        .send(Attach {
            identity: "alice".to_string(),
            conn_id: Uuid::new_v4(),
        })
        .await
        .unwrap()
        .unwrap();
    let snap = snapshot(&h.addr).await;
    assert!(snap.deadline_ms.is_some());

    actix_rt::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(snapshot(&h.addr).await.phase, Phase::Communication);
}

#[actix_rt::test]
async fn terminate_ends_session_and_invalidates_credentials() {
    let h = spawn_session(
        SessionConfig::for_tests(2, 3),
        &["alice", "bob"],
        HashMap::new(),
    );
    let conn = Uuid::new_v4();
    let credential = h.connections.issue(h.session_id, "alice".to_string(), conn);
    h.addr.send(Begin).await.unwrap().unwrap();

    h.addr
        .send(ControllerOp {
            identity: CONTROLLER.to_string(),
            op: ControlOp::Terminate,
        })
        .await
        .unwrap()
        .unwrap();

    let snap = snapshot(&h.addr).await;
    assert_eq!(snap.phase, Phase::Ended);

    // Credentials scoped to the session die with it.
    h.connections.release(conn);
    assert!(h
        .connections
        .resume(&credential.token, Uuid::new_v4())
        .is_err());

    // Mutations after disposal are rejected.
    let err = submit(&h.addr, "alice", GameAction::Defect)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PHASE_VIOLATION");
}

#[actix_rt::test]
async fn provider_seats_submit_through_the_serialized_path() {
    let mut providers: HashMap<u8, Arc<dyn ActionProvider>> = HashMap::new();
    providers.insert(
        1,
        Arc::new(ScriptedProvider::new(vec![GameAction::Defect], vec![])),
    );
    let h = spawn_session(SessionConfig::for_tests(2, 1), &["alice"], providers);
    h.addr.send(Begin).await.unwrap().unwrap();
    advance(&h.addr).await;
    advance(&h.addr).await; // Action: provider kicked at entry

    submit(&h.addr, "alice", GameAction::Cooperate).await.unwrap();
    // The deferred provider decision arrives and completes the phase.
    actix_rt::time::sleep(Duration::from_millis(30)).await;

    let snap = snapshot(&h.addr).await;
    assert!(matches!(snap.phase, Phase::Revelation | Phase::Ended));
    let outcome = snap.last_outcome.unwrap();
    assert_eq!(outcome.actions[1].1, GameAction::Defect);
}
