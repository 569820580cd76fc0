pub mod conversation;
pub mod identity;
pub mod message;
pub mod task;

pub use conversation::{Conversation, ParticipantPair};
pub use identity::{Identity, Role};
pub use message::Message;
pub use task::{Task, TaskStatus, TaskUpdate};
