use crate::error::AppError;
use crate::state::AppState;
use crate::websocket::message_types::{ChatMessage, WsInboundEvent};
use crate::websocket::{ConnectionHandle, ConnectionId};
use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Frame fanned out to this connection via its registry channel.
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct OutboundFrame(String);

/// The registry dropped this connection's sender: it was deregistered or
/// evicted, so the session has nothing left to forward.
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct RegistryClosed;

/// One WebSocket session for `username`, opened on the conversation with
/// `peer`.
///
/// The session owns nothing shared: registration state lives in the registry,
/// inbound events are handed in submission order to a per-connection worker
/// task, and routed frames arrive through the registry channel.
struct WsSession {
    username: String,
    peer: String,
    conn_id: ConnectionId,
    state: AppState,
    hb: Instant,
    inbound: UnboundedSender<WsInboundEvent>,
}

impl WsSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(username = %act.username, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            username = %self.username,
            peer = %self.peer,
            "WebSocket session started"
        );
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(username = %self.username, "WebSocket session stopped");

        // Cleanup: remove this connection from the registry. The registry
        // clears presence when the last connection goes.
        let state = self.state.clone();
        let username = self.username.clone();
        let conn_id = self.conn_id;

        actix::spawn(async move {
            state.registry.deregister(&username, conn_id).await;
            if state.config.broadcast_user_list {
                if let Err(e) = state.router.broadcast_user_list().await {
                    tracing::error!(error = %e, "user list broadcast failed");
                }
            }
        });
    }
}

impl Handler<OutboundFrame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<RegistryClosed> for WsSession {
    type Result = ();

    fn handle(&mut self, _msg: RegistryClosed, ctx: &mut Self::Context) {
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<WsInboundEvent>(&text) {
                Ok(evt) => {
                    // The worker task processes events strictly in arrival
                    // order; spawning per event here would let two messages
                    // to the same receiver race each other.
                    if self.inbound.send(evt).is_err() {
                        tracing::error!(username = %self.username, "inbound worker gone; closing session");
                        ctx.stop();
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse client frame; dropping");
                }
            },
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("binary WebSocket frames not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(?reason, "WebSocket close frame received");
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// Bridge routed frames from the registry channel into the session actor.
fn spawn_outbound_forwarder(addr: Addr<WsSession>, mut rx: UnboundedReceiver<String>) {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            addr.do_send(OutboundFrame(frame));
        }
        addr.do_send(RegistryClosed);
    });
}

/// Process inbound client events for one connection, in submission order.
///
/// Messages are persisted through the store collaborator before being routed,
/// and sender/receiver always come from the connection path.
fn spawn_inbound_worker(
    state: AppState,
    username: String,
    peer: String,
    mut rx: UnboundedReceiver<WsInboundEvent>,
) {
    tokio::spawn(async move {
        while let Some(evt) = rx.recv().await {
            match evt {
                WsInboundEvent::Chat {
                    message,
                    content_type,
                } => {
                    let msg = ChatMessage {
                        sender: username.clone(),
                        receiver: peer.clone(),
                        message,
                        content_type,
                        timestamp: chrono::Utc::now().to_rfc3339(),
                    };

                    if let Err(e) = state.store.persist(&msg).await {
                        tracing::error!(error = %e, "message persist failed; not routing");
                        continue;
                    }

                    match state.router.deliver(&msg).await {
                        Ok(outcome) => {
                            tracing::debug!(
                                ?outcome,
                                sender = %msg.sender,
                                receiver = %msg.receiver,
                                "message routed"
                            );
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "delivery failed");
                        }
                    }
                }
                WsInboundEvent::SetActiveChat { partner } => {
                    state
                        .presence
                        .set_active_chat(&username, partner.as_deref())
                        .await;
                }
            }
        }
    });
}

/// WebSocket upgrade for one side of a two-party conversation.
///
/// The path username is the verified identity supplied by the auth
/// collaborator upstream; this route trusts it. On connect the connection is
/// registered and the sender's active chat is set to the path receiver,
/// mirroring "opening the conversation view".
#[get("/ws/{sender}/{receiver}")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, Error> {
    let (sender, receiver) = path.into_inner();
    if sender.is_empty() || receiver.is_empty() || sender == receiver {
        return Err(AppError::BadRequest(
            "sender and receiver must be distinct non-empty usernames".into(),
        )
        .into());
    }

    let state = state.get_ref().clone();

    // Registry-facing handle: frames routed to this user land in frame_rx.
    let (frame_tx, frame_rx) = unbounded_channel();
    let handle = ConnectionHandle::new(frame_tx);
    let conn_id = handle.id();

    state.registry.register(&sender, handle).await;
    state
        .presence
        .set_active_chat(&sender, Some(&receiver))
        .await;
    if state.config.broadcast_user_list {
        if let Err(e) = state.router.broadcast_user_list().await {
            tracing::error!(error = %e, "user list broadcast failed");
        }
    }

    let (inbound_tx, inbound_rx) = unbounded_channel();

    let session = WsSession {
        username: sender.clone(),
        peer: receiver.clone(),
        conn_id,
        state: state.clone(),
        hb: Instant::now(),
        inbound: inbound_tx,
    };

    let (addr, resp) = match ws::WsResponseBuilder::new(session, &req, stream).start_with_addr() {
        Ok(pair) => pair,
        Err(e) => {
            // The connect broadcast above already announced this user;
            // revoke the registration and the announcement together.
            state.registry.deregister(&sender, conn_id).await;
            if state.config.broadcast_user_list {
                if let Err(err) = state.router.broadcast_user_list().await {
                    tracing::error!(error = %err, "user list broadcast failed");
                }
            }
            return Err(e);
        }
    };

    spawn_outbound_forwarder(addr, frame_rx);
    spawn_inbound_worker(state, sender, receiver, inbound_rx);

    Ok(resp)
}
