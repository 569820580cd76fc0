use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Task, TaskUpdate};

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Apply `update` and record who made it. `None` if the task does not exist.
    async fn update(
        &self,
        task_id: Uuid,
        update: TaskUpdate,
        updated_by: Uuid,
    ) -> AppResult<Option<Task>>;
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: Task) {
        self.tasks.write().await.insert(task.id, task);
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn update(
        &self,
        task_id: Uuid,
        update: TaskUpdate,
        updated_by: Uuid,
    ) -> AppResult<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks.get_mut(&task_id).map(|task| {
            task.apply(update, updated_by);
            task.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;
    use chrono::Utc;

    fn task() -> Task {
        Task {
            id: Uuid::new_v4(),
            title: "Write report".into(),
            description: None,
            status: TaskStatus::Todo,
            due_date: None,
            last_updated_by: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn update_applies_only_present_fields() {
        let store = InMemoryTaskStore::new();
        let original = task();
        store.insert(original.clone()).await;
        let editor = Uuid::new_v4();

        let updated = store
            .update(
                original.id,
                TaskUpdate {
                    status: Some(TaskStatus::Done),
                    ..Default::default()
                },
                editor,
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.title, original.title);
        assert_eq!(updated.last_updated_by, Some(editor));
    }

    #[tokio::test]
    async fn update_unknown_task_is_none() {
        let store = InMemoryTaskStore::new();
        let result = store
            .update(Uuid::new_v4(), TaskUpdate::default(), Uuid::new_v4())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
