//! Task-update notification to the admin.

use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::error::{AppError, AppResult};
use crate::models::Task;

#[async_trait]
pub trait TaskNotifier: Send + Sync {
    async fn task_updated(&self, admin_email: &str, task: &Task) -> AppResult<()>;
}

/// SMTP mailer, or a no-op that only logs when no SMTP host is configured.
#[derive(Clone)]
pub struct EmailService {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> AppResult<Self> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| AppError::Config(format!("invalid SMTP_FROM address: {e}")))?;

        let transport = if config.host.trim().is_empty() {
            warn!("SMTP host not configured; task notifications will only be logged");
            None
        } else {
            let builder = if config.use_starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            }
            .map_err(|e| AppError::Config(format!("failed to configure SMTP transport: {e}")))?
            .port(config.port);

            let builder = if let (Some(username), Some(password)) =
                (&config.username, &config.password)
            {
                builder.credentials(Credentials::new(username.to_string(), password.to_string()))
            } else {
                builder
            };

            Some(Arc::new(builder.build()))
        };

        Ok(Self { transport, from })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    async fn send_mail(&self, recipient: &str, subject: &str, body: String) -> AppResult<()> {
        let Some(transport) = &self.transport else {
            info!(subject, recipient, "mailer in no-op mode; skipping send");
            return Ok(());
        };

        let to = recipient
            .parse::<Mailbox>()
            .map_err(|e| AppError::Notification(format!("invalid recipient address: {e}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Notification(format!("failed to build email: {e}")))?;

        transport
            .send(email)
            .await
            .map_err(|e| AppError::Notification(format!("failed to send email: {e}")))?;
        info!(subject, "email sent");
        Ok(())
    }
}

fn task_updated_body(task: &Task) -> String {
    let mut body = format!(
        "The task \"{}\" was updated.\n\nStatus: {}\n",
        task.title,
        task.status.as_str()
    );
    if let Some(description) = &task.description {
        body.push_str(&format!("Description: {description}\n"));
    }
    if let Some(due) = task.due_date {
        body.push_str(&format!("Due: {}\n", due.format("%Y-%m-%d")));
    }
    body
}

#[async_trait]
impl TaskNotifier for EmailService {
    async fn task_updated(&self, admin_email: &str, task: &Task) -> AppResult<()> {
        let subject = format!("Task updated: {}", task.title);
        self.send_mail(admin_email, &subject, task_updated_body(task))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::TaskStatus;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn task() -> Task {
        Task {
            id: Uuid::new_v4(),
            title: "Quarterly report".into(),
            description: Some("numbers for Q3".into()),
            status: TaskStatus::InProgress,
            due_date: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single(),
            last_updated_by: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn body_lists_task_fields() {
        let body = task_updated_body(&task());
        assert!(body.contains("Quarterly report"));
        assert!(body.contains("in-progress"));
        assert!(body.contains("numbers for Q3"));
        assert!(body.contains("2026-03-01"));
    }

    #[tokio::test]
    async fn no_op_mode_without_host() {
        let service = EmailService::new(&Config::test_defaults().smtp).unwrap();
        assert!(!service.is_enabled());
        service
            .task_updated("admin@example.com", &task())
            .await
            .unwrap();
    }

    #[test]
    fn invalid_from_address_rejected() {
        let mut smtp = Config::test_defaults().smtp;
        smtp.from = "not an address".into();
        assert!(matches!(EmailService::new(&smtp), Err(AppError::Config(_))));
    }
}
