use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use uuid::Uuid;

use crate::config::{AutomatedSeatSpec, SessionConfig};
use crate::error::AppError;
use crate::services::waiting_room::{
    GetRoomStatus, Join, Leave, StartSession, WaitingRoomActor,
};
use crate::state::AppState;
use crate::ws::protocol::RequestedRole;

fn spawn_room(cfg: SessionConfig) -> (Arc<AppState>, Uuid, Addr<WaitingRoomActor>) {
    let (app, _store) = AppState::for_tests();
    let room_id = Uuid::new_v4();
    let addr = WaitingRoomActor::new(
        room_id,
        "exp-1".to_string(),
        cfg,
        app.clone(),
        Duration::from_millis(50),
    )
    .start();
    app.rooms.insert(room_id, addr.clone());
    (app, room_id, addr)
}

async fn join(
    addr: &Addr<WaitingRoomActor>,
    identity: &str,
    role: RequestedRole,
) -> Result<Option<u8>, AppError> {
    addr.send(Join {
        identity: identity.to_string(),
        role,
        conn_id: Uuid::new_v4(),
    })
    .await
    .unwrap()
    .map(|accepted| accepted.seat)
}

#[actix_rt::test]
async fn seats_are_claimed_lowest_index_first() {
    let (_app, _room_id, addr) = spawn_room(SessionConfig::for_tests(3, 1));

    assert_eq!(join(&addr, "alice", RequestedRole::Player).await.unwrap(), Some(0));
    assert_eq!(join(&addr, "bob", RequestedRole::Player).await.unwrap(), Some(1));

    let status = addr.send(GetRoomStatus).await.unwrap();
    assert_eq!(status.claimed_seats, 2);
    assert!(!status.ready);

    assert_eq!(join(&addr, "carol", RequestedRole::Player).await.unwrap(), Some(2));
    let status = addr.send(GetRoomStatus).await.unwrap();
    assert!(status.ready);
}

#[actix_rt::test]
async fn full_room_rejects_with_capacity_error() {
    let (_app, _room_id, addr) = spawn_room(SessionConfig::for_tests(2, 1));
    join(&addr, "alice", RequestedRole::Player).await.unwrap();
    join(&addr, "bob", RequestedRole::Player).await.unwrap();

    let err = join(&addr, "carol", RequestedRole::Player).await.unwrap_err();
    assert_eq!(err.code(), "ROOM_FULL");
}

#[actix_rt::test]
async fn rejoin_keeps_the_same_seat() {
    let (_app, _room_id, addr) = spawn_room(SessionConfig::for_tests(3, 1));
    assert_eq!(join(&addr, "alice", RequestedRole::Player).await.unwrap(), Some(0));
    assert_eq!(join(&addr, "alice", RequestedRole::Player).await.unwrap(), Some(0));

    let status = addr.send(GetRoomStatus).await.unwrap();
    assert_eq!(status.claimed_seats, 1);
}

#[actix_rt::test]
async fn only_one_controller_is_registered() {
    let (_app, _room_id, addr) = spawn_room(SessionConfig::for_tests(2, 1));
    assert_eq!(
        join(&addr, "ctrl", RequestedRole::Controller).await.unwrap(),
        None
    );
    let err = join(&addr, "usurper", RequestedRole::Controller)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONTROLLER_TAKEN");
}

#[actix_rt::test]
async fn start_before_ready_is_rejected_and_room_unchanged() {
    let (app, room_id, addr) = spawn_room(SessionConfig::for_tests(2, 1));
    join(&addr, "ctrl", RequestedRole::Controller).await.unwrap();
    join(&addr, "alice", RequestedRole::Player).await.unwrap();

    let err = addr
        .send(StartSession {
            identity: "ctrl".to_string(),
        })
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code(), "NOT_READY");

    // No session was created and the room still accepts joins.
    assert!(app.sessions.get(&room_id).is_none());
    join(&addr, "bob", RequestedRole::Player).await.unwrap();
}

#[actix_rt::test]
async fn start_is_controller_only() {
    let (_app, _room_id, addr) = spawn_room(SessionConfig::for_tests(1, 1));
    join(&addr, "ctrl", RequestedRole::Controller).await.unwrap();

    let err = addr
        .send(StartSession {
            identity: "alice".to_string(),
        })
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));
}

#[actix_rt::test]
async fn start_when_ready_hands_off_to_a_session() {
    let (app, room_id, addr) = spawn_room(SessionConfig::for_tests(2, 1));
    join(&addr, "ctrl", RequestedRole::Controller).await.unwrap();
    join(&addr, "alice", RequestedRole::Player).await.unwrap();
    join(&addr, "bob", RequestedRole::Player).await.unwrap();

    let session_id = addr
        .send(StartSession {
            identity: "ctrl".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session_id, room_id);
    assert!(app.sessions.get(&session_id).is_some());

    // The room disposes itself after in-flight notifications deliver.
    actix_rt::time::sleep(Duration::from_millis(300)).await;
    assert!(app.rooms.get(&room_id).is_none());
}

#[actix_rt::test]
async fn leave_frees_the_seat_and_recomputes_readiness() {
    let (_app, _room_id, addr) = spawn_room(SessionConfig::for_tests(2, 1));
    join(&addr, "alice", RequestedRole::Player).await.unwrap();
    join(&addr, "bob", RequestedRole::Player).await.unwrap();
    assert!(addr.send(GetRoomStatus).await.unwrap().ready);

    addr.send(Leave {
        identity: "alice".to_string(),
    })
    .await
    .unwrap();

    let status = addr.send(GetRoomStatus).await.unwrap();
    assert_eq!(status.claimed_seats, 1);
    assert!(!status.ready);

    // The freed seat is the lowest index again.
    assert_eq!(join(&addr, "carol", RequestedRole::Player).await.unwrap(), Some(0));
}

#[actix_rt::test]
async fn controller_leave_closes_the_room_after_grace() {
    let (app, room_id, addr) = spawn_room(SessionConfig::for_tests(2, 1));
    join(&addr, "ctrl", RequestedRole::Controller).await.unwrap();
    join(&addr, "alice", RequestedRole::Player).await.unwrap();

    addr.send(Leave {
        identity: "ctrl".to_string(),
    })
    .await
    .unwrap();

    // Still present during the grace period.
    assert!(app.rooms.get(&room_id).is_some());
    actix_rt::time::sleep(Duration::from_millis(150)).await;
    assert!(app.rooms.get(&room_id).is_none());
}

#[actix_rt::test]
async fn automated_seats_are_preclaimed() {
    let mut cfg = SessionConfig::for_tests(3, 1);
    cfg.automated_seats = vec![AutomatedSeatSpec {
        provider: "random".into(),
        seed: Some(1),
        script: vec![],
        chat_script: vec![],
    }];
    let (_app, _room_id, addr) = spawn_room(cfg);

    let status = addr.send(GetRoomStatus).await.unwrap();
    assert_eq!(status.claimed_seats, 1);

    // Humans fill the remaining seats starting at the next free index.
    assert_eq!(join(&addr, "alice", RequestedRole::Player).await.unwrap(), Some(1));
    assert_eq!(join(&addr, "bob", RequestedRole::Player).await.unwrap(), Some(2));
    assert!(addr.send(GetRoomStatus).await.unwrap().ready);
}
