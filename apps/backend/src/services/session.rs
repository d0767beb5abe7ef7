//! Session state machine - the authoritative owner of one game instance.
//!
//! Each session is an actor: the mailbox is the single serialized mutation
//! path, so the state needs no internal locks. The phase timer is a
//! cancellable `SpawnHandle`; it is cancelled on every transition, and a
//! reentrancy guard spans each whole transition (including awaited
//! archival work). Transition requests arriving while one is in flight
//! are queued and coalesced per kind, most recent retained.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use actix::prelude::*;
use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::domain::chat::{self, ChatRecipient, ChatRecord};
use crate::domain::errors::{ConflictKind, DomainError, NotFoundKind};
use crate::domain::payoff;
use crate::domain::rounds::{self, RoundRecord};
use crate::domain::snapshot::{self, EndReason, SessionSnapshot, StateDelta};
use crate::domain::state::{
    GameAction, Participant, ParticipantId, ParticipantKind, Phase, Seat, SessionState,
};
use crate::error::AppError;
use crate::providers::{ActionProvider, ProviderContext};
use crate::services::connections::ConnectionManager;
use crate::storage::{ArchiveStore, SessionStatus};
use crate::ws::hub::SessionHub;
use crate::ws::protocol::{self, ServerMsg};

type Tail = LocalBoxFuture<'static, ()>;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Start the first round. Sent once by the waiting room at handoff.
#[derive(Message)]
#[rtype(result = "Result<(), AppError>")]
pub struct Begin;

/// Bind a transport to a seated participant (or the controller) and get
/// the initial full snapshot.
#[derive(Message)]
#[rtype(result = "Result<(u64, SessionSnapshot), AppError>")]
pub struct Attach {
    pub identity: ParticipantId,
    pub conn_id: Uuid,
}

/// Transport dropped. Clears the connection flag once the last transport
/// for the identity is gone; seat, score, and pending state are retained.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Detach {
    pub identity: ParticipantId,
    pub conn_id: Uuid,
}

#[derive(Message)]
#[rtype(result = "Result<(), AppError>")]
pub struct SubmitAction {
    pub identity: ParticipantId,
    pub action: GameAction,
}

#[derive(Message)]
#[rtype(result = "Result<(), AppError>")]
pub struct SendChat {
    pub identity: ParticipantId,
    pub to: ChatRecipient,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    /// Force the current phase to advance (or release a held phase).
    ForceAdvance,
    /// End the session early.
    Terminate,
}

#[derive(Message)]
#[rtype(result = "Result<(), AppError>")]
pub struct ControllerOp {
    pub identity: ParticipantId,
    pub op: ControlOp,
}

#[derive(Message)]
#[rtype(result = "Result<(u64, SessionSnapshot), AppError>")]
pub struct GetSnapshot;

/// Deferred provider decision re-entering the serialized path.
#[derive(Message)]
#[rtype(result = "()")]
struct ProviderDecided {
    seat: Seat,
    round: u32,
    action: GameAction,
}

/// Deferred provider chat re-entering the serialized path.
#[derive(Message)]
#[rtype(result = "()")]
struct ProviderChats {
    seat: Seat,
    round: u32,
    messages: Vec<crate::providers::OutgoingChat>,
}

/// Chat archive write confirmed; the record becomes eligible for eviction.
#[derive(Message)]
#[rtype(result = "()")]
struct ChatArchived {
    record: ChatRecord,
}

// ---------------------------------------------------------------------------
// Transition machinery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransitionRequest {
    /// First `Announcement` out of `Waiting`.
    Start,
    /// The armed phase timer fired.
    Deadline { epoch: u64 },
    /// All required actions submitted (`Action` phase only).
    EarlyComplete,
    /// Controller override.
    ForceAdvance,
    Terminate { reason: EndReason },
}

/// Coalesced pending requests: only the most recent request of a given
/// kind is retained.
#[derive(Default)]
struct PendingTransitions {
    start: bool,
    deadline: Option<u64>,
    early: bool,
    advance: bool,
    terminate: Option<EndReason>,
}

impl PendingTransitions {
    fn queue(&mut self, req: TransitionRequest) {
        match req {
            TransitionRequest::Start => self.start = true,
            TransitionRequest::Deadline { epoch } => self.deadline = Some(epoch),
            TransitionRequest::EarlyComplete => self.early = true,
            TransitionRequest::ForceAdvance => self.advance = true,
            TransitionRequest::Terminate { reason } => self.terminate = Some(reason),
        }
    }

    fn take_next(&mut self) -> Option<TransitionRequest> {
        if let Some(reason) = self.terminate.take() {
            return Some(TransitionRequest::Terminate { reason });
        }
        if self.start {
            self.start = false;
            return Some(TransitionRequest::Start);
        }
        if let Some(epoch) = self.deadline.take() {
            return Some(TransitionRequest::Deadline { epoch });
        }
        if self.early {
            self.early = false;
            return Some(TransitionRequest::EarlyComplete);
        }
        if self.advance {
            self.advance = false;
            return Some(TransitionRequest::ForceAdvance);
        }
        None
    }
}

struct PhaseTimer {
    handle: SpawnHandle,
    epoch: u64,
}

enum Step {
    Enter(Phase),
    Reveal,
    End(EndReason),
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

pub struct SessionActor {
    session_id: Uuid,
    cfg: SessionConfig,
    state: SessionState,
    seed: u64,

    hub: Arc<SessionHub>,
    store: Arc<dyn ArchiveStore>,
    connections: Arc<ConnectionManager>,
    providers: HashMap<Seat, Arc<dyn ActionProvider>>,

    /// Live transports per identity (controller included).
    conns: HashMap<ParticipantId, HashSet<Uuid>>,

    timer: Option<PhaseTimer>,
    timer_epoch: u64,
    deadline: Option<OffsetDateTime>,
    /// Entry precondition failed; timer not armed, full duration preserved.
    held: bool,

    transition_in_flight: bool,
    pending: PendingTransitions,
}

impl SessionActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Uuid,
        cfg: SessionConfig,
        seated: Vec<(ParticipantId, ParticipantKind)>,
        controller: ParticipantId,
        providers: HashMap<Seat, Arc<dyn ActionProvider>>,
        hub: Arc<SessionHub>,
        store: Arc<dyn ArchiveStore>,
        connections: Arc<ConnectionManager>,
    ) -> Self {
        let participants = seated
            .into_iter()
            .enumerate()
            .map(|(seat, (id, kind))| {
                Participant::new(id, seat as Seat, kind, cfg.refusal_budget)
            })
            .collect();

        let seed = cfg.rng_seed.unwrap_or_else(|| {
            let bytes = session_id.as_bytes();
            u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])
        });

        let state = SessionState::new(
            session_id,
            cfg.total_rounds,
            participants,
            controller,
            cfg.chat_history_cap,
        );

        Self {
            session_id,
            cfg,
            state,
            seed,
            hub,
            store,
            connections,
            providers,
            conns: HashMap::new(),
            timer: None,
            timer_epoch: 0,
            deadline: None,
            held: false,
            transition_in_flight: false,
            pending: PendingTransitions::default(),
        }
    }

    fn deadline_ms(&self) -> Option<i64> {
        self.deadline
            .map(|d| (d.unix_timestamp_nanos() / 1_000_000) as i64)
    }

    fn broadcast_delta(&mut self, delta: StateDelta) {
        self.state.version += 1;
        self.hub
            .publish(self.session_id, protocol::delta_msg(self.state.version, delta));
    }

    fn publish_snapshot(&self) {
        self.hub.publish(
            self.session_id,
            ServerMsg::StateSnapshot {
                version: self.state.version,
                snapshot: snapshot::snapshot(&self.state, self.deadline_ms()),
            },
        );
    }

    // -- timer ------------------------------------------------------------

    fn cancel_timer(&mut self, ctx: &mut Context<Self>) {
        if let Some(timer) = self.timer.take() {
            ctx.cancel_future(timer.handle);
        }
    }

    /// Arm the single phase timer for the stored deadline. A second live
    /// timer is an invariant violation, fatal to the session.
    fn arm_timer(&mut self, ctx: &mut Context<Self>) -> Result<(), DomainError> {
        if self.timer.is_some() {
            return Err(DomainError::invariant(
                "attempted to arm a second live phase timer",
            ));
        }
        let Some(deadline) = self.deadline else {
            return Ok(());
        };
        let remaining = std::time::Duration::try_from(deadline - OffsetDateTime::now_utc())
            .unwrap_or(std::time::Duration::ZERO);

        self.timer_epoch += 1;
        let epoch = self.timer_epoch;
        let handle = ctx.run_later(remaining, move |actor, ctx| {
            actor.request_transition(TransitionRequest::Deadline { epoch }, ctx);
        });
        self.timer = Some(PhaseTimer { handle, epoch });
        Ok(())
    }

    // -- transition engine ------------------------------------------------

    fn request_transition(&mut self, req: TransitionRequest, ctx: &mut Context<Self>) {
        self.pending.queue(req);
        self.pump(ctx);
    }

    fn pump(&mut self, ctx: &mut Context<Self>) {
        if self.transition_in_flight {
            return;
        }
        loop {
            let Some(req) = self.pending.take_next() else {
                return;
            };
            if !self.is_applicable(&req) {
                debug!(session_id = %self.session_id, ?req, "dropping stale transition request");
                continue;
            }
            self.run_transition(req, ctx);
            return;
        }
    }

    /// Stale requests (a deadline from a superseded timer, early-complete
    /// after the phase already moved on) are dropped, not applied.
    fn is_applicable(&self, req: &TransitionRequest) -> bool {
        match req {
            TransitionRequest::Start => self.state.phase == Phase::Waiting,
            TransitionRequest::Deadline { epoch } => {
                !self.held && self.timer.as_ref().is_some_and(|t| t.epoch == *epoch)
            }
            TransitionRequest::EarlyComplete => {
                self.state.phase == Phase::Action && self.state.all_actions_submitted()
            }
            TransitionRequest::ForceAdvance => matches!(
                self.state.phase,
                Phase::Announcement | Phase::Communication | Phase::Action | Phase::Revelation
            ),
            TransitionRequest::Terminate { .. } => self.state.phase != Phase::Ended,
        }
    }

    fn run_transition(&mut self, req: TransitionRequest, ctx: &mut Context<Self>) {
        self.transition_in_flight = true;
        self.cancel_timer(ctx);

        let step = match req {
            TransitionRequest::Terminate { reason } => Step::End(reason),
            TransitionRequest::Start => {
                self.state.current_round = 1;
                Step::Enter(Phase::Announcement)
            }
            _ => match self.state.phase {
                Phase::Announcement => Step::Enter(Phase::Communication),
                Phase::Communication => Step::Enter(Phase::Action),
                Phase::Action => Step::Reveal,
                Phase::Revelation => {
                    if self.state.current_round > self.state.total_rounds {
                        Step::End(EndReason::Completed)
                    } else {
                        Step::Enter(Phase::Announcement)
                    }
                }
                Phase::Waiting | Phase::Ended => {
                    self.transition_in_flight = false;
                    return;
                }
            },
        };

        let tail = match self.execute(step) {
            Ok(tail) => tail,
            Err(err) => {
                self.fail_session(err, ctx);
                return;
            }
        };

        match tail {
            Some(fut) => {
                // The guard stays up for the whole asynchronous tail.
                ctx.spawn(fut.into_actor(self).map(|_, actor, ctx| {
                    actor.finish_transition(ctx);
                }));
            }
            None => self.finish_transition(ctx),
        }
    }

    fn finish_transition(&mut self, ctx: &mut Context<Self>) {
        self.transition_in_flight = false;

        if !self.held && !matches!(self.state.phase, Phase::Waiting | Phase::Ended) {
            if let Err(err) = self.arm_timer(ctx) {
                self.fail_session(err, ctx);
                return;
            }
            self.kick_phase_work(ctx);
        }

        self.pump(ctx);
    }

    /// Synchronous part of a transition. Returns the awaited tail (archive
    /// writes) executed under the reentrancy guard.
    fn execute(&mut self, step: Step) -> Result<Option<Tail>, DomainError> {
        match step {
            Step::Enter(phase) => {
                self.enter_phase(phase)?;
                Ok(None)
            }
            Step::Reveal => {
                let record = self.reveal_round()?;
                let store = self.store.clone();
                let session_id = self.session_id;
                Ok(Some(
                    async move {
                        if let Err(err) = store.save_round_record(session_id, &record).await {
                            warn!(
                                session_id = %session_id,
                                round = record.round,
                                error = %err,
                                "round archive failed"
                            );
                        }
                    }
                    .boxed_local(),
                ))
            }
            Step::End(reason) => Ok(Some(self.end_session(reason))),
        }
    }

    fn enter_phase(&mut self, phase: Phase) -> Result<(), DomainError> {
        self.state.check_record_invariant()?;
        self.state.phase = phase;

        let mut schedule_payload = None;
        if phase == Phase::Announcement {
            let schedule = payoff::generate(
                self.state.current_round,
                &self.state.round_records,
                &self.cfg.payoff,
                self.state.seats(),
                self.seed,
            );
            schedule_payload = Some(schedule.clone());
            self.state.schedule = Some(schedule);
        }

        info!(
            session_id = %self.session_id,
            round = self.state.current_round,
            phase = ?phase,
            "phase entered"
        );

        // Precondition re-checked at every phase entry, not only at start.
        let connected = self.state.connected_humans();
        if connected < self.cfg.min_connected_humans {
            self.held = true;
            self.deadline = None;
            self.broadcast_delta(StateDelta::PhaseChanged {
                phase,
                round: self.state.current_round,
                deadline_ms: None,
                schedule: schedule_payload,
            });
            self.broadcast_delta(StateDelta::PhaseHeld {
                phase,
                connected_humans: connected,
                required: self.cfg.min_connected_humans,
            });
            warn!(
                session_id = %self.session_id,
                phase = ?phase,
                connected,
                required = self.cfg.min_connected_humans,
                "phase held below connected-human threshold"
            );
            return Ok(());
        }

        self.held = false;
        let duration = self.cfg.phase_duration(phase);
        let deadline = OffsetDateTime::now_utc()
            + time::Duration::try_from(duration).unwrap_or(time::Duration::ZERO);
        self.deadline = Some(deadline);
        self.broadcast_delta(StateDelta::PhaseChanged {
            phase,
            round: self.state.current_round,
            deadline_ms: self.deadline_ms(),
            schedule: schedule_payload,
        });
        Ok(())
    }

    /// Revelation entry: deadline defaults, payoff application, the
    /// round's `RoundRecord`, and the outcome broadcast.
    fn reveal_round(&mut self) -> Result<RoundRecord, DomainError> {
        let round = self.state.current_round;
        let schedule = self
            .state
            .schedule
            .clone()
            .ok_or_else(|| DomainError::invariant("revelation without a published schedule"))?;

        let defaulted = rounds::apply_deadline_defaults(&mut self.state.participants);
        if !defaulted.is_empty() {
            debug!(
                session_id = %self.session_id,
                round,
                seats = ?defaulted,
                "deadline defaults applied"
            );
        }

        let outcome = rounds::resolve_round(round, &mut self.state.participants, &schedule)?;
        let record = RoundRecord {
            round,
            schedule,
            outcome: outcome.clone(),
            revealed_at: OffsetDateTime::now_utc(),
        };

        self.state.round_records.push(record.clone());
        self.state.current_round += 1;
        self.state.phase = Phase::Revelation;

        let duration = self.cfg.phase_duration(Phase::Revelation);
        self.deadline = Some(
            OffsetDateTime::now_utc()
                + time::Duration::try_from(duration).unwrap_or(time::Duration::ZERO),
        );
        self.broadcast_delta(StateDelta::PhaseChanged {
            phase: Phase::Revelation,
            round,
            deadline_ms: self.deadline_ms(),
            schedule: None,
        });
        self.broadcast_delta(StateDelta::RoundRevealed { outcome });

        info!(session_id = %self.session_id, round, "round revealed");
        Ok(record)
    }

    fn mean_cooperation_rate(&self) -> f64 {
        let rates = self.state.cooperation_rates();
        if rates.is_empty() {
            0.0
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        }
    }

    fn end_session(&mut self, reason: EndReason) -> Tail {
        self.state.phase = Phase::Ended;
        self.state.schedule = None;
        self.deadline = None;
        self.held = false;

        info!(session_id = %self.session_id, ?reason, "session ended");

        self.broadcast_delta(StateDelta::SessionEnded {
            reason,
            final_scores: self.state.final_scores(),
            mean_cooperation_rate: self.mean_cooperation_rate(),
        });
        // Flush a terminal snapshot so late observers see the final state
        // rather than silence.
        self.publish_snapshot();

        self.connections.invalidate_session(self.session_id);

        let status = match reason {
            EndReason::Completed | EndReason::Terminated => SessionStatus::Completed,
            EndReason::Error => SessionStatus::Failed,
        };
        let store = self.store.clone();
        let session_id = self.session_id;
        async move {
            if let Err(err) = store.update_status(session_id, status).await {
                warn!(session_id = %session_id, error = %err, "status archive failed");
            }
        }
        .boxed_local()
    }

    /// Fatal invariant violation: force the session into a safe disposal
    /// path rather than leaving it inconsistent.
    fn fail_session(&mut self, err: DomainError, ctx: &mut Context<Self>) {
        error!(session_id = %self.session_id, error = %err, "fatal session error");
        self.cancel_timer(ctx);
        self.pending = PendingTransitions::default();
        let tail = self.end_session(EndReason::Error);
        self.transition_in_flight = false;
        ctx.spawn(tail.into_actor(self));
    }

    // -- per-phase deferred work ------------------------------------------

    fn provider_context(&self, seat: Seat) -> Option<ProviderContext> {
        let participant = self.state.participant(seat)?;
        let schedule = self.state.schedule.clone()?;
        Some(ProviderContext {
            seat,
            seats: self.state.seats(),
            round: self.state.current_round,
            schedule,
            refusal_budget: participant.refusal_budget,
            history: self
                .state
                .round_records
                .iter()
                .map(|r| r.outcome.clone())
                .collect(),
        })
    }

    /// Invoke providers as deferred work; completions re-enter the
    /// serialized path as messages. A provider missing the deadline is
    /// treated identically to a non-responsive human.
    fn kick_phase_work(&mut self, ctx: &mut Context<Self>) {
        let phase = self.state.phase;
        if !matches!(phase, Phase::Communication | Phase::Action) {
            return;
        }
        let round = self.state.current_round;
        let budget = self.cfg.phase_duration(phase);
        let addr = ctx.address();

        for (seat, provider) in &self.providers {
            let seat = *seat;
            let Some(provider_ctx) = self.provider_context(seat) else {
                continue;
            };
            let provider = provider.clone();
            let addr = addr.clone();

            match phase {
                Phase::Action => {
                    actix::spawn(async move {
                        match tokio::time::timeout(budget, provider.request_action(&provider_ctx))
                            .await
                        {
                            Ok(Ok(action)) => addr.do_send(ProviderDecided { seat, round, action }),
                            Ok(Err(err)) => {
                                warn!(seat, round, error = %err, "provider action failed")
                            }
                            Err(_) => warn!(seat, round, "provider action timed out"),
                        }
                    });
                }
                Phase::Communication => {
                    actix::spawn(async move {
                        match tokio::time::timeout(budget, provider.request_messages(&provider_ctx))
                            .await
                        {
                            Ok(Ok(messages)) if !messages.is_empty() => {
                                addr.do_send(ProviderChats {
                                    seat,
                                    round,
                                    messages,
                                })
                            }
                            Ok(Ok(_)) => {}
                            Ok(Err(err)) => {
                                warn!(seat, round, error = %err, "provider chat failed")
                            }
                            Err(_) => warn!(seat, round, "provider chat timed out"),
                        }
                    });
                }
                _ => {}
            }
        }
    }

    // -- mutations ---------------------------------------------------------

    fn submit_for_seat(
        &mut self,
        seat: Seat,
        action: GameAction,
        ctx: &mut Context<Self>,
    ) -> Result<(), DomainError> {
        self.state.require_phase(Phase::Action, "action submission")?;
        let participant = self.state.participant_mut(seat).ok_or_else(|| {
            DomainError::not_found(NotFoundKind::Participant, format!("no seat {seat}"))
        })?;
        rounds::validate_submission(participant, action)?;

        participant.pending_action = Some(action);
        participant.submitted = true;
        self.broadcast_delta(StateDelta::ActionSubmitted { seat });

        if self.state.all_actions_submitted() {
            debug!(session_id = %self.session_id, "all actions in, completing phase early");
            self.request_transition(TransitionRequest::EarlyComplete, ctx);
        }
        Ok(())
    }

    fn chat_for_seat(
        &mut self,
        seat: Seat,
        to: ChatRecipient,
        content: String,
        ctx: &mut Context<Self>,
    ) -> Result<(), DomainError> {
        let delivery = chat::route(self.state.phase, seat, to, self.state.seats())?;
        let record = ChatRecord {
            sender: seat,
            recipient: to,
            content,
            round: self.state.current_round,
            at: OffsetDateTime::now_utc(),
        };
        self.state.chat.push(record.clone());

        let wire = ServerMsg::Chat {
            sender: seat,
            to: match to {
                ChatRecipient::All => None,
                ChatRecipient::Seat(s) => Some(s),
            },
            content: record.content.clone(),
            round: record.round,
        };

        let mut identities: Vec<ParticipantId> = Vec::new();
        for target in &delivery.seats {
            if let Some(p) = self.state.participant(*target) {
                identities.push(p.id.clone());
            }
        }
        if delivery.to_controller {
            identities.push(self.state.controller.clone());
        }
        // Sender sees their own message too.
        if let Some(p) = self.state.participant(seat) {
            identities.push(p.id.clone());
        }
        for identity in identities {
            if let Some(conns) = self.conns.get(&identity) {
                for conn_id in conns {
                    self.hub.send_to(self.session_id, *conn_id, wire.clone());
                }
            }
        }

        // Best-effort archive; success unlocks eviction for this record.
        let store = self.store.clone();
        let session_id = self.session_id;
        let addr = ctx.address();
        actix::spawn(async move {
            match store.save_chat_record(session_id, &record).await {
                Ok(()) => addr.do_send(ChatArchived { record }),
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "chat archive failed")
                }
            }
        });
        Ok(())
    }

    /// Release a held phase: the preserved duration is armed from now.
    fn resume_held(&mut self, ctx: &mut Context<Self>) {
        if !self.held {
            return;
        }
        self.held = false;
        let phase = self.state.phase;
        let duration = self.cfg.phase_duration(phase);
        self.deadline = Some(
            OffsetDateTime::now_utc()
                + time::Duration::try_from(duration).unwrap_or(time::Duration::ZERO),
        );
        info!(session_id = %self.session_id, phase = ?phase, "held phase resumed");
        self.broadcast_delta(StateDelta::PhaseChanged {
            phase,
            round: self.state.current_round,
            deadline_ms: self.deadline_ms(),
            schedule: None,
        });
        if let Err(err) = self.arm_timer(ctx) {
            self.fail_session(err, ctx);
            return;
        }
        self.kick_phase_work(ctx);
    }

    fn snapshot_reply(&self) -> (u64, SessionSnapshot) {
        (
            self.state.version,
            snapshot::snapshot(&self.state, self.deadline_ms()),
        )
    }
}

impl Actor for SessionActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!(
            session_id = %self.session_id,
            seats = self.state.seats(),
            rounds = self.state.total_rounds,
            "session actor started"
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.connections.invalidate_session(self.session_id);
        info!(session_id = %self.session_id, "session actor stopped");
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

impl Handler<Begin> for SessionActor {
    type Result = Result<(), AppError>;

    fn handle(&mut self, _msg: Begin, ctx: &mut Self::Context) -> Self::Result {
        if self.state.phase != Phase::Waiting {
            return Err(DomainError::conflict(
                ConflictKind::AlreadyStarted,
                "session already started",
            )
            .into());
        }

        let store = self.store.clone();
        let session_id = self.session_id;
        actix::spawn(async move {
            if let Err(err) = store.update_status(session_id, SessionStatus::Running).await {
                warn!(session_id = %session_id, error = %err, "status archive failed");
            }
        });

        self.request_transition(TransitionRequest::Start, ctx);
        Ok(())
    }
}

impl Handler<Attach> for SessionActor {
    type Result = Result<(u64, SessionSnapshot), AppError>;

    fn handle(&mut self, msg: Attach, ctx: &mut Self::Context) -> Self::Result {
        if let Some(seat) = self.state.seat_of(&msg.identity) {
            let was_connected = self
                .state
                .participant(seat)
                .map(|p| p.connected)
                .unwrap_or(false);
            if let Some(p) = self.state.participant_mut(seat) {
                p.connected = true;
            }
            if !was_connected {
                self.broadcast_delta(StateDelta::ConnectionChanged {
                    seat,
                    connected: true,
                });
            }
        } else if !self.state.is_controller(&msg.identity) {
            return Err(DomainError::authorization(format!(
                "identity {} is neither seated nor the controller",
                msg.identity
            ))
            .into());
        }

        self.conns
            .entry(msg.identity)
            .or_default()
            .insert(msg.conn_id);

        if self.held && self.state.connected_humans() >= self.cfg.min_connected_humans {
            self.resume_held(ctx);
        }

        Ok(self.snapshot_reply())
    }
}

impl Handler<Detach> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: Detach, _ctx: &mut Self::Context) -> Self::Result {
        let gone = match self.conns.get_mut(&msg.identity) {
            Some(conns) => {
                conns.remove(&msg.conn_id);
                conns.is_empty()
            }
            None => false,
        };
        if !gone {
            return;
        }
        self.conns.remove(&msg.identity);

        if let Some(seat) = self.state.seat_of(&msg.identity) {
            if let Some(p) = self.state.participant_mut(seat) {
                p.connected = false;
            }
            self.broadcast_delta(StateDelta::ConnectionChanged {
                seat,
                connected: false,
            });
            info!(
                session_id = %self.session_id,
                seat,
                "participant disconnected; seat and state retained"
            );
        }
    }
}

impl Handler<SubmitAction> for SessionActor {
    type Result = Result<(), AppError>;

    fn handle(&mut self, msg: SubmitAction, ctx: &mut Self::Context) -> Self::Result {
        let seat = self.state.require_seat(&msg.identity)?;
        self.submit_for_seat(seat, msg.action, ctx)?;
        Ok(())
    }
}

impl Handler<SendChat> for SessionActor {
    type Result = Result<(), AppError>;

    fn handle(&mut self, msg: SendChat, ctx: &mut Self::Context) -> Self::Result {
        let seat = self.state.require_seat(&msg.identity)?;
        self.chat_for_seat(seat, msg.to, msg.content, ctx)?;
        Ok(())
    }
}

impl Handler<ControllerOp> for SessionActor {
    type Result = Result<(), AppError>;

    fn handle(&mut self, msg: ControllerOp, ctx: &mut Self::Context) -> Self::Result {
        // Authorization derives from the mapping fixed at session
        // creation, never from client-supplied role claims.
        if !self.state.is_controller(&msg.identity) {
            warn!(
                session_id = %self.session_id,
                identity = %msg.identity,
                op = ?msg.op,
                "controller operation rejected"
            );
            return Err(DomainError::authorization("controller authority required").into());
        }
        match msg.op {
            ControlOp::ForceAdvance => {
                if self.held {
                    self.resume_held(ctx);
                } else {
                    self.request_transition(TransitionRequest::ForceAdvance, ctx);
                }
            }
            ControlOp::Terminate => {
                self.request_transition(
                    TransitionRequest::Terminate {
                        reason: EndReason::Terminated,
                    },
                    ctx,
                );
            }
        }
        Ok(())
    }
}

impl Handler<GetSnapshot> for SessionActor {
    type Result = Result<(u64, SessionSnapshot), AppError>;

    fn handle(&mut self, _msg: GetSnapshot, _ctx: &mut Self::Context) -> Self::Result {
        Ok(self.snapshot_reply())
    }
}

impl Handler<ProviderDecided> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: ProviderDecided, ctx: &mut Self::Context) -> Self::Result {
        if self.state.phase != Phase::Action || self.state.current_round != msg.round {
            debug!(
                session_id = %self.session_id,
                seat = msg.seat,
                "dropping provider decision for a finished phase"
            );
            return;
        }
        if let Err(err) = self.submit_for_seat(msg.seat, msg.action, ctx) {
            warn!(
                session_id = %self.session_id,
                seat = msg.seat,
                error = %err,
                "provider submission rejected"
            );
        }
    }
}

impl Handler<ProviderChats> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: ProviderChats, ctx: &mut Self::Context) -> Self::Result {
        if self.state.phase != Phase::Communication || self.state.current_round != msg.round {
            return;
        }
        for outgoing in msg.messages {
            if let Err(err) = self.chat_for_seat(msg.seat, outgoing.to, outgoing.content, ctx) {
                warn!(
                    session_id = %self.session_id,
                    seat = msg.seat,
                    error = %err,
                    "provider chat rejected"
                );
            }
        }
    }
}

impl Handler<ChatArchived> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: ChatArchived, _ctx: &mut Self::Context) -> Self::Result {
        self.state.chat.mark_archived(&msg.record);
    }
}
