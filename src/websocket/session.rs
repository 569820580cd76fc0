//! Per-connection WebSocket actors.
//!
//! [`WsSession`] is the logical task behind one registered connection handle: it forwards frames
//! pushed onto the handle to the socket, routes inbound frames through the [`MessageRouter`],
//! and keeps the connection alive with ping/pong. [`RejectedSession`] exists
//! only to close an unauthenticated upgrade with a policy-violation code.

use actix::{Actor, ActorContext, ActorFutureExt, AsyncContext, StreamHandler, WrapFuture};
use actix_web_actors::ws;
use event_schema::{ClientFrame, ServerFrame};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::WebSocketConfig;
use crate::models::Identity;
use crate::services::MessageRouter;
use crate::websocket::{ConnectionRegistry, HandleId};

pub struct WsSession {
    identity: Identity,
    handle_id: HandleId,
    // Taken once in `started`
    outbound: Option<UnboundedReceiver<String>>,
    registry: ConnectionRegistry,
    router: MessageRouter,
    config: WebSocketConfig,
    hb: Instant,
}

impl WsSession {
    pub fn new(
        identity: Identity,
        handle_id: HandleId,
        outbound: UnboundedReceiver<String>,
        registry: ConnectionRegistry,
        router: MessageRouter,
        config: WebSocketConfig,
    ) -> Self {
        Self {
            identity,
            handle_id,
            outbound: Some(outbound),
            registry,
            router,
            config,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.config.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.hb) > act.config.client_timeout {
                tracing::warn!(
                    user_id = %act.identity.id,
                    handle_id = %act.handle_id,
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_error(ctx: &mut ws::WebsocketContext<Self>, reason: &str) {
        match ServerFrame::error(reason).encode() {
            Ok(text) => ctx.text(text),
            Err(e) => tracing::error!(error = %e, "failed to encode error frame"),
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let frame = match ClientFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(user_id = %self.identity.id, error = %e, "malformed frame");
                Self::send_error(ctx, "invalid message format");
                return;
            }
        };

        let router = self.router.clone();
        let identity = self.identity.clone();

        // `wait` holds further frames from this socket until the send completes, so one
        // connection's messages are persisted in the order they were sent
        ctx.wait(
            async move { router.route(&identity, frame).await }
                .into_actor(self)
                .map(|result, act, ctx| {
                    if let Err(e) = result {
                        tracing::debug!(
                            user_id = %act.identity.id,
                            error = %e,
                            "send rejected"
                        );
                        Self::send_error(ctx, &e.frame_reason());
                    }
                }),
        );
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.identity.id,
            handle_id = %self.handle_id,
            "WebSocket session started"
        );

        self.hb(ctx);

        if let Some(outbound) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(outbound));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.identity.id,
            handle_id = %self.handle_id,
            "WebSocket session stopped"
        );

        let registry = self.registry.clone();
        let handle_id = self.handle_id;
        actix::spawn(async move {
            registry.unregister(handle_id).await;
        });
    }
}

// Frames fanned out to this handle by the router
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, frame: String, ctx: &mut Self::Context) {
        ctx.text(frame);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
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
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                Self::send_error(ctx, "binary frames are not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(user_id = %self.identity.id, ?reason, "close frame received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(user_id = %self.identity.id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Upgrades and immediately closes with 1008 (policy violation).
pub struct RejectedSession {
    reason: &'static str,
}

impl RejectedSession {
    pub fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

impl Actor for RejectedSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Policy,
            description: Some(self.reason.to_string()),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RejectedSession {
    fn handle(&mut self, _msg: Result<ws::Message, ws::ProtocolError>, _ctx: &mut Self::Context) {}
}
