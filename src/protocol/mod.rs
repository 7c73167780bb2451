//! Message protocol shared by all agents.

pub mod types;

pub use types::{Content, Message, MessageType, Priority, SYSTEM_NAME};
