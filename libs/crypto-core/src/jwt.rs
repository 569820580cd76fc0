//! JWT validation for the chat service
//!
//! Bearer credentials are HS256 tokens signed with the application's shared secret
//! (`JWT_SECRET`). The same secret is used by the signup/login flow that issues them.
//!
//! ## Design
//!
//! - **HS256 ONLY**: the validation is pinned to a single algorithm, so a token signed with
//!   anything else (including `none`) is rejected
//! - **No global keys**: keys live in a [`JwtKeys`] value owned by the caller and handed to
//!   each connection at spawn time
//! - **Side-effect free**: validation never touches storage
//!
//! ## Usage
//!
//! ```rust
//! use crypto_core::jwt::JwtKeys;
//! use uuid::Uuid;
//!
//! let keys = JwtKeys::from_secret("dev-secret").unwrap();
//! let token = keys.generate_access_token(Uuid::new_v4(), "a@example.com", "user").unwrap();
//! let claims = keys.validate_token(&token).unwrap();
//! assert_eq!(claims.role, "user");
//! ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

const ACCESS_TOKEN_EXPIRY_HOURS: i64 = 24;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Token is malformed, expired, or its signature does not verify.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("JWT secret must not be empty")]
    EmptySecret,

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

/// JWT claims carried by every bearer credential
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub email: String,
    /// "admin" or "user"; informational, the directory is authoritative
    pub role: String,
}

impl Claims {
    /// Parse the subject as a user id.
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub)
            .map_err(|e| JwtError::InvalidCredential(format!("invalid subject: {e}")))
    }
}

// ============================================================================
// Key Storage
// ============================================================================

/// Signing and verification keys derived from the shared secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys").finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Result<Self, JwtError> {
        if secret.trim().is_empty() {
            return Err(JwtError::EmptySecret);
        }

        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = true;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    // ========================================================================
    // Token Validation
    // ========================================================================

    /// Validate and decode a bearer token (without the "Bearer " prefix).
    ///
    /// ## Errors
    ///
    /// [`JwtError::InvalidCredential`] if the token is malformed, expired, or was not signed
    /// with this secret.
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| JwtError::InvalidCredential(e.to_string()))
    }

    // ========================================================================
    // Token Generation
    // ========================================================================

    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: &str,
    ) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(ACCESS_TOKEN_EXPIRY_HOURS)).timestamp(),
            email: email.to_string(),
            role: role.to_string(),
        };
        self.encode_claims(&claims)
    }

    /// Sign arbitrary claims. Used by the login flow and by tests that need expired tokens.
    pub fn encode_claims(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(JWT_ALGORITHM), claims, &self.encoding)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-do-not-use-in-production";

    #[test]
    fn test_generate_access_token() {
        let keys = JwtKeys::from_secret(TEST_SECRET).unwrap();
        let token = keys
            .generate_access_token(Uuid::new_v4(), "test@example.com", "user")
            .unwrap();
        assert_eq!(token.matches('.').count(), 2); // JWT has 3 parts
    }

    #[test]
    fn test_validate_valid_token() {
        let keys = JwtKeys::from_secret(TEST_SECRET).unwrap();
        let user_id = Uuid::new_v4();
        let token = keys
            .generate_access_token(user_id, "test@example.com", "admin")
            .unwrap();

        let claims = keys.validate_token(&token).unwrap();
        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            JwtKeys::from_secret("  "),
            Err(JwtError::EmptySecret)
        ));
    }

    #[test]
    fn test_non_uuid_subject() {
        let claims = Claims {
            sub: "not-a-uuid".into(),
            iat: 0,
            exp: 0,
            email: String::new(),
            role: "user".into(),
        };
        assert!(claims.user_id().is_err());
    }
}
