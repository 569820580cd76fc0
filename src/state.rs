use crypto_core::{JwtKeys, MessageCipher};
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::services::postgres::{PgConversationStore, PgTaskStore, PgUserDirectory};
use crate::services::{
    Authenticator, ConversationService, ConversationStore, EmailService, MessageRouter,
    TaskNotifier, TaskService, TaskStore, UserDirectory,
};
use crate::websocket::ConnectionRegistry;

/// Persistence collaborators the service is wired against.
#[derive(Clone)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub users: Arc<dyn UserDirectory>,
    pub tasks: Arc<dyn TaskStore>,
}

impl Stores {
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        let pool = db::init_pool(&config.database_url).await?;
        Ok(Self {
            conversations: Arc::new(PgConversationStore::new(pool.clone())),
            users: Arc::new(PgUserDirectory::new(pool.clone())),
            tasks: Arc::new(PgTaskStore::new(pool)),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: ConnectionRegistry,
    pub authenticator: Authenticator,
    pub router: MessageRouter,
    pub conversations: ConversationService,
    pub tasks: TaskService,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        stores: Stores,
        notifier: Arc<dyn TaskNotifier>,
    ) -> Result<Self, AppError> {
        let keys = JwtKeys::from_secret(&config.jwt_secret)
            .map_err(|e| AppError::Config(format!("JWT_SECRET: {e}")))?;
        let cipher = Arc::new(
            MessageCipher::from_secret(&config.encryption_key)
                .map_err(|e| AppError::Config(format!("ENCRYPTION_KEY: {e}")))?,
        );
        let registry = ConnectionRegistry::new();

        Ok(Self {
            authenticator: Authenticator::new(keys, stores.users.clone()),
            router: MessageRouter::new(
                stores.conversations.clone(),
                cipher.clone(),
                registry.clone(),
            ),
            conversations: ConversationService::new(
                stores.conversations,
                stores.users.clone(),
                cipher,
            ),
            tasks: TaskService::new(stores.tasks, stores.users, notifier),
            registry,
            config,
        })
    }

    /// Wire the production service: Postgres stores and the SMTP notifier.
    pub async fn from_config(config: Arc<Config>) -> Result<Self, AppError> {
        let stores = Stores::connect(&config).await?;
        let notifier = Arc::new(EmailService::new(&config.smtp)?);
        if notifier.is_enabled() {
            tracing::info!(host = %config.smtp.host, "task update mail enabled");
        } else {
            tracing::warn!("SMTP_HOST not set; task update mail is logged only");
        }
        Self::new(config, stores, notifier)
    }
}
