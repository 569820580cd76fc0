//! Credential Validator: bearer token to [`Identity`].
//!
//! The token proves who the caller is; the directory decides whether that account still exists
//! and what role it holds. Validation has no side effects.

use crypto_core::JwtKeys;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::Identity;
use crate::services::user_directory::UserDirectory;

#[derive(Clone)]
pub struct Authenticator {
    keys: JwtKeys,
    directory: Arc<dyn UserDirectory>,
}

impl Authenticator {
    pub fn new(keys: JwtKeys, directory: Arc<dyn UserDirectory>) -> Self {
        Self { keys, directory }
    }

    /// Resolve a raw token (no "Bearer " prefix).
    ///
    /// Every credential problem collapses to [`AppError::Unauthorized`]; directory outages
    /// propagate as-is so they are not mistaken for bad credentials.
    pub async fn validate(&self, token: &str) -> AppResult<Identity> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Unauthorized);
        }

        let claims = self.keys.validate_token(token).map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            AppError::Unauthorized
        })?;
        let user_id = claims.user_id().map_err(|_| AppError::Unauthorized)?;

        match self.directory.find_user(user_id).await? {
            Some(identity) => Ok(identity),
            None => {
                tracing::debug!(%user_id, "token subject not in directory");
                Err(AppError::Unauthorized)
            }
        }
    }

    /// Validate the value of an `Authorization` header.
    pub async fn validate_header(&self, header: Option<&str>) -> AppResult<Identity> {
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;
        self.validate(token).await
    }
}
