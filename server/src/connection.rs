use std::future::Future;
use std::sync::Arc;

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Running, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use actix_web_actors::ws::{CloseCode, CloseReason};

use system::{ServerMessage, SessionId};
use tokio::sync::mpsc;

use crate::broadcast::OUTBOUND_BUFFER;
use crate::server::Server;

#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A serialized `ServerMessage`.
    Frame(Arc<str>),
    /// The session was evicted; close the socket.
    Close,
}

#[derive(Message)]
#[rtype(result = "()")]
struct ConnectionActorMessage(ConnectionEvent);

/// Hands queued events to `deliver` until it refuses one or the queue ends.
/// Once the server drops the session's sender, a `Close` is delivered even if
/// the queue was too full to carry one.
pub async fn forward_events<F, Fut>(mut rx: mpsc::Receiver<ConnectionEvent>, mut deliver: F)
where
    F: FnMut(ConnectionEvent) -> Fut,
    Fut: Future<Output = bool>,
{
    while let Some(event) = rx.recv().await {
        let close = matches!(event, ConnectionEvent::Close);
        if !deliver(event).await || close {
            return;
        }
    }
    deliver(ConnectionEvent::Close).await;
}

enum ConnectionState {
    Idle,
    Connected(SessionId),
}

struct ConnectionActor {
    state: ConnectionState,
    server: Arc<Server>,
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, rx) = mpsc::channel::<ConnectionEvent>(OUTBOUND_BUFFER);

        let session = self.server.connect(tx);
        self.state = ConnectionState::Connected(session.user_id);

        let addr = ctx.address().recipient();

        actix::spawn(async move {
            log::debug!("connection green thread - started");
            forward_events(rx, |event| {
                let addr = addr.clone();
                async move { addr.send(ConnectionActorMessage(event)).await.is_ok() }
            })
            .await;
            log::debug!("connection green thread - terminated");
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if let ConnectionState::Connected(id) = self.state {
            self.server.disconnect(&id);
        }

        Running::Stop
    }
}

/// Ingress
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let from = match self.state {
            ConnectionState::Connected(id) => id,
            ConnectionState::Idle => return,
        };

        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.server.touch(&from);
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.server.touch(&from);
            }
            Ok(ws::Message::Text(text)) => {
                log::debug!("Ingress {}: {}", from, text);
                self.server.handle_frame(&from, &text);
            }
            Ok(ws::Message::Binary(bin)) => {
                log::debug!("Ingress size: {}", bin.len());
                self.server.touch(&from);
                self.server.send_to(
                    &from,
                    &ServerMessage::error("binary frames are not supported"),
                );
            }
            Ok(ws::Message::Close(reason)) => {
                self.server.disconnect(&from);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => (),
            Err(err) => {
                log::warn!("Protocol error on session {}: {}", from, err);
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
        match msg.0 {
            ConnectionEvent::Frame(frame) => {
                log::debug!("Egress {}", frame);
                ctx.text(frame.to_string());
            }
            ConnectionEvent::Close => {
                ctx.close(Some(CloseReason {
                    code: CloseCode::Away,
                    description: Some("session expired".into()),
                }));
                ctx.stop();
            }
        }
    }
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    server: web::Data<Server>,
) -> Result<HttpResponse, Error> {
    ws::start(
        ConnectionActor {
            state: ConnectionState::Idle,
            server: server.into_inner(),
        },
        &req,
        stream,
    )
}
