//! Bearer authentication for HTTP handlers.

use actix_web::{dev::Payload, http::header::AUTHORIZATION, web, Error, FromRequest, HttpRequest};
use std::future::Future;
use std::pin::Pin;

use crate::error::AppError;
use crate::models::Identity;
use crate::state::AppState;

/// The caller, resolved from `Authorization: Bearer <token>` through the directory.
///
/// Taking this as a handler argument is what makes the handler authenticated.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl FromRequest for AuthUser {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        Box::pin(async move {
            let state = state.ok_or(AppError::Internal)?;
            let identity = state
                .authenticator
                .validate_header(header.as_deref())
                .await?;
            Ok(AuthUser(identity))
        })
    }
}
