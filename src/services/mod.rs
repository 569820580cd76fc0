pub mod conversation_service;
pub mod conversation_store;
pub mod credentials;
pub mod message_router;
pub mod notification;
pub mod postgres;
pub mod task_service;
pub mod task_store;
pub mod user_directory;

pub use conversation_service::ConversationService;
pub use conversation_store::{ConversationStore, InMemoryConversationStore};
pub use credentials::Authenticator;
pub use message_router::{DeliveryReport, MessageRouter};
pub use notification::{EmailService, TaskNotifier};
pub use task_service::TaskService;
pub use task_store::{InMemoryTaskStore, TaskStore};
pub use user_directory::{InMemoryUserDirectory, UserDirectory};
