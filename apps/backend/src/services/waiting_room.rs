//! Waiting-Room Orchestrator: pre-game admission, seat assignment,
//! readiness detection, and handoff to a session.
//!
//! One actor per room; the room id becomes the session id at handoff so
//! credentials issued at join stay valid across the boundary. Seats are
//! claimed on a first-available basis with a deterministic tie-break by
//! ascending seat index. Automated seats from the experiment
//! configuration are pre-claimed before any human joins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AutomatedSeatSpec, SessionConfig};
use crate::domain::errors::{ConflictKind, DomainError, NotFoundKind};
use crate::domain::state::{ParticipantId, ParticipantKind, Seat};
use crate::error::AppError;
use crate::providers::{create_provider, ActionProvider};
use crate::services::connections::Credential;
use crate::services::session::{Begin, SessionActor};
use crate::state::AppState;
use crate::storage::SessionStatus;
use crate::ws::protocol::{RequestedRole, ServerMsg};

/// Delay before disposal after the controller leaves.
pub const CLOSE_GRACE: Duration = Duration::from_secs(5);
/// Delay before disposal after handoff, letting in-flight notifications
/// deliver.
const HANDOFF_LINGER: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
struct Occupant {
    id: ParticipantId,
    kind: ParticipantKind,
    spec: Option<AutomatedSeatSpec>,
}

pub struct WaitingRoomActor {
    room_id: Uuid,
    experiment_id: String,
    cfg: SessionConfig,
    app: Arc<AppState>,
    seats: Vec<Option<Occupant>>,
    controller: Option<ParticipantId>,
    started: bool,
    closing: bool,
    close_grace: Duration,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Message)]
#[rtype(result = "Result<JoinAccepted, AppError>")]
pub struct Join {
    pub identity: ParticipantId,
    pub role: RequestedRole,
    pub conn_id: Uuid,
}

pub struct JoinAccepted {
    pub room_id: Uuid,
    pub seat: Option<Seat>,
    pub role: RequestedRole,
    pub credential: Credential,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Leave {
    pub identity: ParticipantId,
}

#[derive(Message)]
#[rtype(result = "Result<Uuid, AppError>")]
pub struct StartSession {
    pub identity: ParticipantId,
}

#[derive(Message)]
#[rtype(result = "RoomStatus")]
pub struct GetRoomStatus;

#[derive(MessageResponse)]
pub struct RoomStatus {
    pub claimed_seats: usize,
    pub required_seats: usize,
    pub ready: bool,
    pub controller_present: bool,
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

impl WaitingRoomActor {
    pub fn new(
        room_id: Uuid,
        experiment_id: String,
        cfg: SessionConfig,
        app: Arc<AppState>,
        close_grace: Duration,
    ) -> Self {
        let mut seats: Vec<Option<Occupant>> = vec![None; usize::from(cfg.seats)];
        for (i, spec) in cfg
            .automated_seats
            .iter()
            .take(usize::from(cfg.seats))
            .enumerate()
        {
            let kind = if spec.provider == "scripted" {
                ParticipantKind::Scripted
            } else {
                ParticipantKind::Automated
            };
            seats[i] = Some(Occupant {
                id: format!("{}#{i}", spec.provider),
                kind,
                spec: Some(spec.clone()),
            });
        }
        Self {
            room_id,
            experiment_id,
            cfg,
            app,
            seats,
            controller: None,
            started: false,
            closing: false,
            close_grace,
        }
    }

    fn claimed_seats(&self) -> usize {
        self.seats.iter().filter(|s| s.is_some()).count()
    }

    /// Readiness is a derived boolean, recomputed after every join/leave.
    fn ready(&self) -> bool {
        self.claimed_seats() >= usize::from(self.cfg.seats)
    }

    fn status(&self) -> RoomStatus {
        RoomStatus {
            claimed_seats: self.claimed_seats(),
            required_seats: usize::from(self.cfg.seats),
            ready: self.ready(),
            controller_present: self.controller.is_some(),
        }
    }

    /// Publish the derived room state; becoming ready is observable here
    /// as `ready: true`. No automatic session start.
    fn broadcast_update(&self) {
        self.app.hub.publish(
            self.room_id,
            ServerMsg::RoomUpdate {
                room_id: self.room_id,
                claimed_seats: self.claimed_seats(),
                required_seats: usize::from(self.cfg.seats),
                ready: self.ready(),
                controller_present: self.controller.is_some(),
            },
        );
    }

    fn join_player(&mut self, identity: &str) -> Result<Seat, DomainError> {
        // Rejoin is idempotent: the identity keeps its seat.
        if let Some(seat) = self.seat_of(identity) {
            return Ok(seat);
        }
        let free = self
            .seats
            .iter()
            .position(|s| s.is_none())
            .ok_or_else(|| {
                DomainError::conflict(ConflictKind::RoomFull, "all player seats are claimed")
            })?;
        self.seats[free] = Some(Occupant {
            id: identity.to_string(),
            kind: ParticipantKind::Human,
            spec: None,
        });
        Ok(free as Seat)
    }

    fn seat_of(&self, identity: &str) -> Option<Seat> {
        self.seats
            .iter()
            .position(|s| s.as_ref().is_some_and(|o| o.id == identity))
            .map(|i| i as Seat)
    }
}

impl Actor for WaitingRoomActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!(
            room_id = %self.room_id,
            experiment_id = %self.experiment_id,
            seats = self.cfg.seats,
            "waiting room opened"
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.app.rooms.remove(&self.room_id);
        if !self.started {
            // Room disposed without a session: credentials issued at join
            // are scoped to this id and die with it.
            self.app.connections.invalidate_session(self.room_id);
            self.app.hub.drop_topic(self.room_id);
        }
        info!(room_id = %self.room_id, "waiting room disposed");
    }
}

impl Handler<Join> for WaitingRoomActor {
    type Result = Result<JoinAccepted, AppError>;

    fn handle(&mut self, msg: Join, _ctx: &mut Self::Context) -> Self::Result {
        if self.closing {
            return Err(
                DomainError::not_found(NotFoundKind::Room, "waiting room is closing").into(),
            );
        }
        if self.started {
            return Err(DomainError::conflict(
                ConflictKind::AlreadyStarted,
                "session already started from this room",
            )
            .into());
        }

        let seat = match msg.role {
            RequestedRole::Controller => {
                if let Some(existing) = self.controller.as_deref() {
                    if existing != msg.identity {
                        return Err(DomainError::conflict(
                            ConflictKind::ControllerTaken,
                            "a controller is already registered",
                        )
                        .into());
                    }
                } else {
                    self.controller = Some(msg.identity.clone());
                }
                None
            }
            RequestedRole::Player => Some(self.join_player(&msg.identity)?),
        };

        let credential = self
            .app
            .connections
            .issue(self.room_id, msg.identity.clone(), msg.conn_id);

        info!(
            room_id = %self.room_id,
            identity = %msg.identity,
            role = ?msg.role,
            seat = ?seat,
            "joined waiting room"
        );
        self.broadcast_update();

        Ok(JoinAccepted {
            room_id: self.room_id,
            seat,
            role: msg.role,
            credential,
        })
    }
}

impl Handler<Leave> for WaitingRoomActor {
    type Result = ();

    fn handle(&mut self, msg: Leave, ctx: &mut Self::Context) -> Self::Result {
        if self.started || self.closing {
            return;
        }

        if self.controller.as_deref() == Some(msg.identity.as_str()) {
            self.controller = None;
            self.closing = true;
            info!(room_id = %self.room_id, "controller left, closing room");
            self.app.hub.publish(
                self.room_id,
                ServerMsg::RoomClosed {
                    room_id: self.room_id,
                    reason: "controller left".to_string(),
                },
            );
            ctx.run_later(self.close_grace, |_actor, ctx| ctx.stop());
            return;
        }

        if let Some(seat) = self.seat_of(&msg.identity) {
            self.seats[usize::from(seat)] = None;
            self.app
                .connections
                .invalidate_participant(self.room_id, &msg.identity);
            info!(
                room_id = %self.room_id,
                identity = %msg.identity,
                seat,
                "left waiting room, seat freed"
            );
            self.broadcast_update();
        }
    }
}

impl Handler<StartSession> for WaitingRoomActor {
    type Result = Result<Uuid, AppError>;

    fn handle(&mut self, msg: StartSession, ctx: &mut Self::Context) -> Self::Result {
        // Accepted only from the controller identity, and only when ready.
        if self.controller.as_deref() != Some(msg.identity.as_str()) {
            warn!(
                room_id = %self.room_id,
                identity = %msg.identity,
                "start_session rejected: not the controller"
            );
            return Err(DomainError::authorization("controller authority required").into());
        }
        if self.started {
            return Err(
                DomainError::conflict(ConflictKind::AlreadyStarted, "already started").into(),
            );
        }
        if !self.ready() {
            return Err(DomainError::conflict(
                ConflictKind::NotReady,
                format!(
                    "{} of {} seats claimed",
                    self.claimed_seats(),
                    self.cfg.seats
                ),
            )
            .into());
        }

        let mut seated: Vec<(ParticipantId, ParticipantKind)> = Vec::new();
        let mut providers: HashMap<Seat, Arc<dyn ActionProvider>> = HashMap::new();
        for (i, slot) in self.seats.iter().enumerate() {
            let occupant = slot.as_ref().ok_or_else(|| {
                AppError::invariant(format!("ready room with unclaimed seat {i}"))
            })?;
            seated.push((occupant.id.clone(), occupant.kind));
            if let Some(spec) = &occupant.spec {
                let provider = create_provider(spec).ok_or_else(|| {
                    AppError::config(format!("unknown provider {}", spec.provider))
                })?;
                providers.insert(i as Seat, provider);
            }
        }

        let session = SessionActor::new(
            self.room_id,
            self.cfg.clone(),
            seated,
            msg.identity.clone(),
            providers,
            self.app.hub.clone(),
            self.app.store.clone(),
            self.app.connections.clone(),
        )
        .start();
        self.app.sessions.insert(self.room_id, session.clone());
        session.do_send(Begin);
        self.started = true;

        info!(
            room_id = %self.room_id,
            experiment_id = %self.experiment_id,
            "session started from waiting room"
        );
        self.app.hub.publish(
            self.room_id,
            ServerMsg::SessionStarted {
                session_id: self.room_id,
            },
        );

        // Dispose after in-flight notifications deliver.
        ctx.run_later(HANDOFF_LINGER, |_actor, ctx| ctx.stop());

        Ok(self.room_id)
    }
}

impl Handler<GetRoomStatus> for WaitingRoomActor {
    type Result = RoomStatus;

    fn handle(&mut self, _msg: GetRoomStatus, _ctx: &mut Self::Context) -> Self::Result {
        self.status()
    }
}

/// Load the experiment configuration and open a waiting room for it.
pub async fn open_room(app: &Arc<AppState>, experiment_id: &str) -> Result<Uuid, AppError> {
    let cfg = app.store.load_config(experiment_id).await.map_err(|err| {
        AppError::not_found("EXPERIMENT_NOT_FOUND", format!("load_config failed: {err}"))
    })?;
    cfg.validate()?;
    for spec in &cfg.automated_seats {
        if create_provider(spec).is_none() {
            return Err(AppError::config(format!(
                "unknown provider {} in experiment {experiment_id}",
                spec.provider
            )));
        }
    }

    let room_id = Uuid::new_v4();
    let actor = WaitingRoomActor::new(
        room_id,
        experiment_id.to_string(),
        cfg,
        app.clone(),
        CLOSE_GRACE,
    )
    .start();
    app.rooms.insert(room_id, actor);

    let store = app.store.clone();
    actix::spawn(async move {
        if let Err(err) = store.update_status(room_id, SessionStatus::Lobby).await {
            warn!(room_id = %room_id, error = %err, "status archive failed");
        }
    });

    Ok(room_id)
}
