//! Websocket transport actor.
//!
//! One actor per connection. Parses inbound commands, dispatches them to
//! the waiting-room or session actor, and forwards hub broadcasts to the
//! client. Rejections are typed errors returned to this connection only;
//! they never mutate state and never touch phase timers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web_actors::ws;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::chat::ChatRecipient;
use crate::error::AppError;
use crate::services::session::{Attach, ControlOp, ControllerOp, Detach, SendChat, SubmitAction};
use crate::services::waiting_room::{self, Join, Leave, StartSession};
use crate::state::AppState;
use crate::ws::hub::Outbound;
use crate::ws::protocol::{
    error_msg, ClientMsg, ErrorCode, ServerMsg, PROTOCOL_VERSION,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(40);

pub struct WsConn {
    conn_id: Uuid,
    app: Arc<AppState>,

    identity: Option<String>,
    room: Option<Uuid>,
    session: Option<Uuid>,

    last_heartbeat: Instant,
    hello_done: bool,
}

impl WsConn {
    pub fn new(conn_id: Uuid, app: Arc<AppState>) -> Self {
        Self {
            conn_id,
            app,
            identity: None,
            room: None,
            session: None,
            last_heartbeat: Instant::now(),
            hello_done: false,
        }
    }

    fn send_json(ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMsg) {
        match serde_json::to_string(msg) {
            Ok(payload) => ctx.text(payload),
            Err(err) => warn!(error = %err, "[WS] failed to serialize outbound message"),
        }
    }

    fn send_error(ctx: &mut ws::WebsocketContext<Self>, err: &AppError) {
        Self::send_json(ctx, &error_msg(err));
    }

    fn send_error_and_close(
        &self,
        ctx: &mut ws::WebsocketContext<Self>,
        code: ErrorCode,
        message: impl Into<String>,
    ) {
        Self::send_json(
            ctx,
            &ServerMsg::Error {
                code,
                message: message.into(),
            },
        );
        ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Error)));
        ctx.stop();
    }

    fn start_heartbeat(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |actor, ctx| {
            if Instant::now().duration_since(actor.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(conn_id = %actor.conn_id, "[WS] heartbeat timed out");
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Normal)));
                ctx.stop();
                return;
            }
            ctx.ping(b"keepalive");
        });
    }

    /// Resume an existing seat from a reconnection credential presented on
    /// the handshake.
    fn resume_session(
        &mut self,
        token: &str,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let credential = match self.app.connections.resume(token, self.conn_id) {
            Ok(credential) => credential,
            Err(err) => {
                Self::send_error(ctx, &AppError::from(err));
                return;
            }
        };

        let Some(session) = self
            .app
            .sessions
            .get(&credential.session_id)
            .map(|s| s.clone())
        else {
            Self::send_error(
                ctx,
                &AppError::not_found("SESSION_NOT_FOUND", "session is no longer live".into()),
            );
            return;
        };

        let identity = credential.participant.clone();
        self.identity = Some(identity.clone());
        self.session = Some(credential.session_id);
        self.hello_done = true;
        self.app.hub.subscribe(
            credential.session_id,
            self.conn_id,
            ctx.address().recipient::<Outbound>(),
        );
        Self::send_json(
            ctx,
            &ServerMsg::HelloAck {
                protocol: PROTOCOL_VERSION,
                identity: Some(identity.clone()),
            },
        );

        let conn_id = self.conn_id;
        ctx.spawn(
            session
                .send(Attach { identity, conn_id })
                .into_actor(self)
                .map(|res, _actor, ctx| match res {
                    Ok(Ok((version, snapshot))) => {
                        Self::send_json(ctx, &ServerMsg::StateSnapshot { version, snapshot });
                    }
                    Ok(Err(err)) => Self::send_error(ctx, &err),
                    Err(err) => {
                        warn!(error = %err, "[WS] attach mailbox error");
                        ctx.stop();
                    }
                }),
        );
    }

    /// Attach to a session once `session_started` arrives on the room
    /// topic; the initial full snapshot follows from the session.
    fn attach_started_session(
        &mut self,
        session_id: Uuid,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        let Some(session) = self.app.sessions.get(&session_id).map(|s| s.clone()) else {
            return;
        };
        self.session = Some(session_id);
        self.app.hub.subscribe(
            session_id,
            self.conn_id,
            ctx.address().recipient::<Outbound>(),
        );

        let conn_id = self.conn_id;
        ctx.spawn(
            session
                .send(Attach { identity, conn_id })
                .into_actor(self)
                .map(|res, _actor, ctx| match res {
                    Ok(Ok((version, snapshot))) => {
                        Self::send_json(ctx, &ServerMsg::StateSnapshot { version, snapshot });
                    }
                    Ok(Err(err)) => Self::send_error(ctx, &err),
                    Err(err) => warn!(error = %err, "[WS] attach mailbox error"),
                }),
        );
    }

    fn handle_command(&mut self, cmd: ClientMsg, ctx: &mut ws::WebsocketContext<Self>) {
        match cmd {
            ClientMsg::Hello {
                protocol,
                identity,
                credential,
            } => {
                if protocol != PROTOCOL_VERSION {
                    self.send_error_and_close(
                        ctx,
                        ErrorCode::BadProtocol,
                        "Unsupported protocol version",
                    );
                    return;
                }
                if let Some(token) = credential {
                    self.resume_session(&token, ctx);
                    return;
                }
                let Some(identity) = identity else {
                    self.send_error_and_close(
                        ctx,
                        ErrorCode::BadRequest,
                        "Identity or credential required",
                    );
                    return;
                };
                self.identity = Some(identity.clone());
                self.hello_done = true;
                Self::send_json(
                    ctx,
                    &ServerMsg::HelloAck {
                        protocol: PROTOCOL_VERSION,
                        identity: Some(identity),
                    },
                );
            }

            ClientMsg::OpenRoom { experiment_id } => {
                if !self.hello_done {
                    Self::send_error(
                        ctx,
                        &AppError::bad_request("HELLO_REQUIRED", "Must send hello first".into()),
                    );
                    return;
                }
                let app = self.app.clone();
                ctx.spawn(
                    async move { waiting_room::open_room(&app, &experiment_id).await }
                        .into_actor(self)
                        .map(|res, _actor, ctx| match res {
                            Ok(room_id) => {
                                Self::send_json(ctx, &ServerMsg::RoomOpened { room_id })
                            }
                            Err(err) => Self::send_error(ctx, &err),
                        }),
                );
            }

            ClientMsg::JoinRoom { room_id, role } => {
                let Some(identity) = self.identity.clone() else {
                    Self::send_error(
                        ctx,
                        &AppError::bad_request("HELLO_REQUIRED", "Must send hello first".into()),
                    );
                    return;
                };
                let Some(room) = self.app.rooms.get(&room_id).map(|r| r.clone()) else {
                    Self::send_error(
                        ctx,
                        &AppError::not_found("ROOM_NOT_FOUND", "no such waiting room".into()),
                    );
                    return;
                };

                // Subscribe before joining so the readiness update from
                // our own join is not missed.
                self.app.hub.subscribe(
                    room_id,
                    self.conn_id,
                    ctx.address().recipient::<Outbound>(),
                );
                let conn_id = self.conn_id;
                ctx.spawn(
                    room.send(Join {
                        identity,
                        role,
                        conn_id,
                    })
                    .into_actor(self)
                    .map(move |res, actor, ctx| match res {
                        Ok(Ok(accepted)) => {
                            actor.room = Some(room_id);
                            Self::send_json(
                                ctx,
                                &ServerMsg::JoinedRoom {
                                    room_id: accepted.room_id,
                                    seat: accepted.seat,
                                    role: accepted.role,
                                    credential: accepted.credential.token,
                                },
                            );
                        }
                        Ok(Err(err)) => {
                            actor.app.hub.unsubscribe(room_id, conn_id);
                            Self::send_error(ctx, &err);
                        }
                        Err(err) => {
                            warn!(error = %err, "[WS] join mailbox error");
                            actor.app.hub.unsubscribe(room_id, conn_id);
                            ctx.stop();
                        }
                    }),
                );
            }

            ClientMsg::StartSession => {
                let (Some(identity), Some(room_id)) = (self.identity.clone(), self.room) else {
                    Self::send_error(
                        ctx,
                        &AppError::bad_request("NO_ROOM", "Join a waiting room first".into()),
                    );
                    return;
                };
                let Some(room) = self.app.rooms.get(&room_id).map(|r| r.clone()) else {
                    Self::send_error(
                        ctx,
                        &AppError::not_found("ROOM_NOT_FOUND", "waiting room is gone".into()),
                    );
                    return;
                };
                ctx.spawn(room.send(StartSession { identity }).into_actor(self).map(
                    |res, _actor, ctx| match res {
                        // session_started arrives via the room topic.
                        Ok(Ok(_session_id)) => {}
                        Ok(Err(err)) => Self::send_error(ctx, &err),
                        Err(err) => warn!(error = %err, "[WS] start mailbox error"),
                    },
                ));
            }

            ClientMsg::OverridePhase => self.controller_op(ControlOp::ForceAdvance, ctx),

            ClientMsg::TerminateSession => self.controller_op(ControlOp::Terminate, ctx),

            ClientMsg::SubmitAction { action } => {
                let (Some(identity), Some(session)) = (self.identity.clone(), self.session_addr())
                else {
                    Self::send_error(
                        ctx,
                        &AppError::bad_request("NO_SESSION", "No live session".into()),
                    );
                    return;
                };
                ctx.spawn(session.send(SubmitAction { identity, action }).into_actor(self).map(
                    |res, _actor, ctx| match res {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => Self::send_error(ctx, &err),
                        Err(err) => warn!(error = %err, "[WS] submit mailbox error"),
                    },
                ));
            }

            ClientMsg::SendChat { to, content } => {
                let (Some(identity), Some(session)) = (self.identity.clone(), self.session_addr())
                else {
                    Self::send_error(
                        ctx,
                        &AppError::bad_request("NO_SESSION", "No live session".into()),
                    );
                    return;
                };
                let to = match to {
                    Some(seat) => ChatRecipient::Seat(seat),
                    None => ChatRecipient::All,
                };
                ctx.spawn(
                    session
                        .send(SendChat {
                            identity,
                            to,
                            content,
                        })
                        .into_actor(self)
                        .map(|res, _actor, ctx| match res {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => Self::send_error(ctx, &err),
                            Err(err) => warn!(error = %err, "[WS] chat mailbox error"),
                        }),
                );
            }
        }
    }

    fn controller_op(&mut self, op: ControlOp, ctx: &mut ws::WebsocketContext<Self>) {
        let (Some(identity), Some(session)) = (self.identity.clone(), self.session_addr()) else {
            Self::send_error(
                ctx,
                &AppError::bad_request("NO_SESSION", "No live session".into()),
            );
            return;
        };
        ctx.spawn(session.send(ControllerOp { identity, op }).into_actor(self).map(
            |res, _actor, ctx| match res {
                Ok(Ok(())) => {}
                Ok(Err(err)) => Self::send_error(ctx, &err),
                Err(err) => warn!(error = %err, "[WS] controller op mailbox error"),
            },
        ));
    }

    fn session_addr(&self) -> Option<Addr<crate::services::session::SessionActor>> {
        self.session
            .and_then(|id| self.app.sessions.get(&id).map(|s| s.clone()))
    }
}

impl Actor for WsConn {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(conn_id = %self.conn_id, "[WS] connection started");
        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.app.hub.unsubscribe_all(self.conn_id);
        self.app.connections.release(self.conn_id);

        if let Some(identity) = self.identity.clone() {
            if let Some(session) = self.session_addr() {
                session.do_send(Detach {
                    identity,
                    conn_id: self.conn_id,
                });
            } else if let Some(room_id) = self.room {
                // Pre-session transport drop is a waiting-room leave.
                if let Some(room) = self.app.rooms.get(&room_id) {
                    room.do_send(Leave { identity });
                }
            }
        }
        info!(conn_id = %self.conn_id, "[WS] connection stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsConn {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(cmd) => self.handle_command(cmd, ctx),
                    Err(_) => Self::send_error(
                        ctx,
                        &AppError::bad_request("MALFORMED", "Malformed JSON command".into()),
                    ),
                }
            }
            Ok(ws::Message::Binary(_)) => {
                self.last_heartbeat = Instant::now();
                Self::send_error(
                    ctx,
                    &AppError::bad_request("MALFORMED", "Binary not supported".into()),
                );
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {
                self.last_heartbeat = Instant::now();
            }
            Err(err) => {
                warn!(conn_id = %self.conn_id, error = %err, "[WS] protocol error");
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Error)));
                ctx.stop();
            }
        }
    }
}

impl Handler<Outbound> for WsConn {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) -> Self::Result {
        if let ServerMsg::SessionStarted { session_id } = &msg.0 {
            let session_id = *session_id;
            Self::send_json(ctx, &msg.0);
            if self.session.is_none() {
                self.attach_started_session(session_id, ctx);
            }
            return;
        }
        Self::send_json(ctx, &msg.0);
    }
}
