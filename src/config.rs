use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Empty host puts the mailer in no-op mode (log only).
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub use_starttls: bool,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub encryption_key: String,
    pub websocket: WebSocketConfig,
    pub smtp: SmtpConfig,
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    fn required(&self, key: &'static str) -> Result<String, AppError> {
        match (self.0)(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(AppError::Config(format!("{key} missing"))),
        }
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. `DATABASE_URL`, `JWT_SECRET` and
    /// `ENCRYPTION_KEY` are required.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let vars = Vars(lookup);

        let port = vars.parse_or("PORT", 5000);
        let database_url = vars.required("DATABASE_URL")?;
        let jwt_secret = vars.required("JWT_SECRET")?;
        let encryption_key = vars.required("ENCRYPTION_KEY")?;

        let websocket = WebSocketConfig {
            heartbeat_interval: Duration::from_secs(vars.parse_or(
                "WS_HEARTBEAT_INTERVAL_SECS",
                5,
            )),
            client_timeout: Duration::from_secs(vars.parse_or("WS_CLIENT_TIMEOUT_SECS", 30)),
        };
        if websocket.client_timeout <= websocket.heartbeat_interval {
            return Err(AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must exceed WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        let smtp = SmtpConfig {
            host: vars.optional("SMTP_HOST").unwrap_or_default(),
            port: vars.parse_or("SMTP_PORT", 587),
            username: vars.optional("SMTP_USERNAME"),
            password: vars.optional("SMTP_PASSWORD"),
            from: vars
                .optional("SMTP_FROM")
                .unwrap_or_else(|| "Taskboard <no-reply@taskboard.local>".into()),
            use_starttls: vars
                .optional("SMTP_STARTTLS")
                .map(|v| !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        };

        Ok(Self {
            port,
            database_url,
            jwt_secret,
            encryption_key,
            websocket,
            smtp,
        })
    }

    /// Settings for tests that wire their own stores; the database URL is never dialed.
    pub fn test_defaults() -> Self {
        Self {
            port: 0,
            database_url: "postgres://localhost/taskboard_test".into(),
            jwt_secret: "test-jwt-secret".into(),
            encryption_key: "test-encryption-key".into(),
            websocket: WebSocketConfig::default(),
            smtp: SmtpConfig {
                host: String::new(),
                port: 587,
                username: None,
                password: None,
                from: "Taskboard <no-reply@taskboard.local>".into(),
                use_starttls: true,
            },
        }
    }
}
