use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Identity, Role, Task, TaskUpdate};
use crate::services::notification::TaskNotifier;
use crate::services::task_store::TaskStore;
use crate::services::user_directory::UserDirectory;

/// Task updates by users, followed by an email to the admin.
#[derive(Clone)]
pub struct TaskService {
    tasks: Arc<dyn TaskStore>,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn TaskNotifier>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn TaskNotifier>,
    ) -> Self {
        Self {
            tasks,
            directory,
            notifier,
        }
    }

    pub async fn update(
        &self,
        caller: &Identity,
        task_id: Uuid,
        update: TaskUpdate,
    ) -> AppResult<Task> {
        if caller.role != Role::User {
            return Err(AppError::Forbidden);
        }

        let task = self
            .tasks
            .update(task_id, update, caller.id)
            .await?
            .ok_or(AppError::NotFound("task"))?;

        // The update stands even if the admin cannot be told about it
        match self.directory.find_admin().await {
            Ok(Some(admin)) => {
                if let Err(e) = self.notifier.task_updated(&admin.email, &task).await {
                    tracing::warn!(task_id = %task.id, error = %e, "task notification failed");
                }
            }
            Ok(None) => tracing::debug!(task_id = %task.id, "no admin to notify"),
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "admin lookup failed")
            }
        }

        Ok(task)
    }
}
