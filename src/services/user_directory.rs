//! Read-only lookup of accounts created by the signup flow.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Identity, Role};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<Identity>>;

    /// The deployment's admin account. There is at most one.
    async fn find_admin(&self) -> AppResult<Option<Identity>>;
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<Uuid, Identity>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, identity: Identity) {
        self.users.write().await.insert(identity.id, identity);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<Identity>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn find_admin(&self) -> AppResult<Option<Identity>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.role == Role::Admin)
            .cloned())
    }
}
