//! Conclave library root.

pub mod agent;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod system;
pub mod task;

pub use agent::{Agent, AgentCore, AgentKind};
pub use config::{load_settings, Settings};
pub use coordinator::{Coordinator, ProjectPhase};
pub use dispatch::{DeliveryReport, Dispatcher};
pub use error::{Error, Result};
pub use protocol::{Content, Message, MessageType, Priority};
pub use system::{System, SystemStatus};
pub use task::{Task, TaskStatus};
