use actix_web::{get, http::header::AUTHORIZATION, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::Identity;
use crate::state::AppState;
use crate::websocket::session::{RejectedSession, WsSession};
use crate::websocket::ConnectionHandle;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

// Query parameter first, then the Authorization header
fn extract_token(params: &WsParams, req: &HttpRequest) -> Option<String> {
    params.token.clone().or_else(|| {
        req.headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string())
    })
}

/// `None` means the credential is absent, invalid, or names an unknown identity.
async fn authenticate(
    state: &AppState,
    token: Option<String>,
) -> Result<Option<Identity>, AppError> {
    let Some(token) = token else {
        return Ok(None);
    };
    match state.authenticator.validate(&token).await {
        Ok(identity) => Ok(Some(identity)),
        Err(AppError::Unauthorized) => Ok(None),
        Err(e) => Err(e),
    }
}

#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let token = extract_token(&query, &req);

    let Some(identity) = authenticate(&state, token).await? else {
        tracing::warn!(peer = ?req.peer_addr(), "WebSocket connection rejected: invalid credentials");
        return ws::start(RejectedSession::new("invalid credentials"), &req, stream);
    };

    let (handle, outbound) = ConnectionHandle::channel(identity.id);
    let handle_id = handle.id();
    state.registry.register(handle).await;

    let session = WsSession::new(
        identity,
        handle_id,
        outbound,
        state.registry.clone(),
        state.router.clone(),
        state.config.websocket.clone(),
    );

    match ws::start(session, &req, stream) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            // The actor never started, so its own cleanup will not run
            state.registry.unregister(handle_id).await;
            Err(e)
        }
    }
}
