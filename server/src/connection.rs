use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Running, StreamHandler};
use actix_web::http::header;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use actix_web_actors::ws::{CloseCode, CloseReason};
use serde::Deserialize;

use system::{Codec, ConnectionId, Frame, IdentifiableCommand, IdentifiableEvent, SystemError};

use crate::connection_tx_storage::ConnectionTx;
use crate::server::ServerTx;

#[derive(Debug)]
pub enum ConnectionCommand {
    Connect {
        tx: ConnectionTx,
        credential: Option<String>,
    },
    Disconnect {
        from: ConnectionId,
    },
    IdentifiableCommand {
        from: ConnectionId,
        command: IdentifiableCommand,
    },
}

#[derive(Debug)]
pub enum ConnectionEvent {
    Connected {
        connection_id: ConnectionId,
    },
    IdentifiableEvent(IdentifiableEvent),
    Disconnected {
        connection_id: ConnectionId,
        reason: SystemError,
    },
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Capacity of each connection's egress channel.
    pub buffer: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self { buffer: 64 }
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct ConnectionActorMessage(ConnectionEvent);

enum ConnectionState {
    Idle,
    Connected(ConnectionId),
}

struct ConnectionActor {
    state: ConnectionState,
    srv_tx: ServerTx,
    credential: Option<String>,
    codec: Codec,
    buffer: usize,
}

impl ConnectionActor {
    fn send_to_server(&self, command: ConnectionCommand, ctx: &mut ws::WebsocketContext<Self>) {
        if let Err(e) = self.srv_tx.try_send(command.into()) {
            log::error!("Server is unavailable, closing connection: {}", e);
            ctx.close(Some(CloseReason {
                code: CloseCode::Again,
                description: None,
            }));
            ctx.stop();
        }
    }

    fn ingress(&mut self, frame: Frame, ctx: &mut ws::WebsocketContext<Self>) {
        let from = match self.state {
            ConnectionState::Connected(from) => from,
            ConnectionState::Idle => {
                log::debug!("Ingress before handshake completed, dropped");
                return;
            }
        };
        match self.codec.decode::<IdentifiableCommand>(&frame) {
            Ok(command) => {
                log::debug!("Ingress {:?}", command);
                self.send_to_server(ConnectionCommand::IdentifiableCommand { from, command }, ctx);
            }
            Err(e) => log::warn!("Dropping undecodable frame from connection {}: {}", from, e),
        }
    }
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<ConnectionEvent>(self.buffer);

        let credential = self.credential.take();
        self.send_to_server(ConnectionCommand::Connect { tx, credential }, ctx);

        let addr = ctx.address().recipient();

        tokio::spawn(async move {
            log::debug!("connection egress task - started");
            while let Some(msg) = rx.recv().await {
                addr.do_send(ConnectionActorMessage(msg));
            }
            log::debug!("connection egress task - terminated");
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if let ConnectionState::Connected(from) = self.state {
            self.state = ConnectionState::Idle;
            report_disconnect(&self.srv_tx, from);
        }

        Running::Stop
    }
}

/// Tells the server the connection is gone. Waits for queue space instead of
/// giving up, so the membership is always cleaned up.
fn report_disconnect(srv_tx: &ServerTx, from: ConnectionId) {
    let srv_tx = srv_tx.clone();
    tokio::spawn(async move {
        if srv_tx
            .send(ConnectionCommand::Disconnect { from }.into())
            .await
            .is_err()
        {
            log::debug!("Server stopped before disconnect of connection {}", from);
        }
    });
}

/// Ingress
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Text(text)) => self.ingress(Frame::Text(text.to_string()), ctx),
            Ok(ws::Message::Binary(bin)) => {
                log::debug!("Ingress size: {}", bin.len());
                self.ingress(Frame::Binary(bin.to_vec()), ctx)
            }
            Ok(ws::Message::Close(reason)) => {
                if let ConnectionState::Connected(from) = self.state {
                    self.state = ConnectionState::Idle;
                    report_disconnect(&self.srv_tx, from);
                }
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Pong(_)) | Ok(ws::Message::Nop) => (),
            Ok(ws::Message::Continuation(_)) => {
                log::warn!("Fragmented frames are not supported, closing");
                ctx.close(Some(CloseCode::Unsupported.into()));
                ctx.stop();
            }
            Err(e) => {
                log::warn!("Websocket protocol error: {}", e);
                ctx.stop();
            }
        }
    }
}

/// Egress
impl Handler<ConnectionActorMessage> for ConnectionActor {
    type Result = ();

    fn handle(
        &mut self,
        msg: ConnectionActorMessage,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Self::Result {
        let connection_event = msg.0;
        log::debug!("Egress {:?}", connection_event);
        match connection_event {
            ConnectionEvent::Connected { connection_id } => {
                self.state = ConnectionState::Connected(connection_id);
            }
            ConnectionEvent::Disconnected { reason, .. } => {
                self.state = ConnectionState::Idle;
                let code = if reason.is_fatal() {
                    CloseCode::Policy
                } else {
                    CloseCode::Normal
                };
                ctx.close(Some(CloseReason {
                    code,
                    description: Some(reason.to_string()),
                }));
                ctx.stop();
            }
            ConnectionEvent::IdentifiableEvent(event) => match self.codec.encode(&event) {
                Ok(Frame::Text(text)) => ctx.text(text),
                Ok(Frame::Binary(bin)) => ctx.binary(bin),
                Err(e) => log::error!("Failed to encode egress event: {}", e),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    token: Option<String>,
    format: Option<Codec>,
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<HandshakeQuery>,
    srv_tx: web::Data<ServerTx>,
    settings: web::Data<ConnectionSettings>,
) -> Result<HttpResponse, Error> {
    let HandshakeQuery { token, format } = query.into_inner();
    ws::start(
        ConnectionActor {
            srv_tx: srv_tx.get_ref().clone(),
            state: ConnectionState::Idle,
            credential: token.or_else(|| bearer_token(&req)),
            codec: format.unwrap_or_default(),
            buffer: settings.buffer,
        },
        &req,
        stream,
    )
}
