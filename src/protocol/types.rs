//! Message types for agent communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Reserved receiver name handled by the system facade, never by an agent.
pub const SYSTEM_NAME: &str = "system";

/// Message type classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Lifecycle instruction (start_project, shutdown)
    Command,
    /// Request expecting a response
    Request,
    /// Response to a request
    Response,
    /// Fire-and-forget status broadcast
    Notification,
    /// Handshake carrying an agent's capabilities
    Introduction,
    /// Task progress report from a worker
    StatusUpdate,
    /// Task handed to a worker by the coordinator
    TaskAssignment,
}

/// Message priority levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Scheduling weight: high outranks medium outranks low.
    pub fn weight(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Message content: an action name plus arbitrary structured data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub action: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub priority: Priority,
}

impl Content {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            data: Map::new(),
            priority: Priority::default(),
        }
    }

    /// Attach a data field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Read a string field from the data map.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// A single unit of agent communication.
///
/// Messages are immutable once dispatched; the dispatcher fills `id` and
/// `timestamp` on submission when the sender left them unassigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID (ULID), empty until assigned.
    #[serde(default)]
    pub id: String,
    /// Sender agent name, or "system".
    pub sender: String,
    /// Receiver agent name, or "system".
    pub receiver: String,
    /// Message type
    pub message_type: MessageType,
    /// Action + data payload
    pub content: Content,
    /// Creation time, assigned on submission if absent.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a new message with a fresh id and timestamp.
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        message_type: MessageType,
        content: Content,
    ) -> Self {
        Self {
            id: generate_id(),
            sender: sender.into(),
            receiver: receiver.into(),
            message_type,
            content,
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a response addressed back to this message's sender.
    ///
    /// A response is always a new message; the original is never edited.
    pub fn reply(&self, sender: impl Into<String>, content: Content) -> Self {
        Self::new(sender, self.sender.clone(), MessageType::Response, content)
    }

    /// Check that every required field is present.
    pub fn validate(&self) -> Result<()> {
        if self.sender.trim().is_empty() {
            return Err(Error::MalformedMessage("missing sender".to_string()));
        }
        if self.receiver.trim().is_empty() {
            return Err(Error::MalformedMessage("missing receiver".to_string()));
        }
        if self.content.action.trim().is_empty() {
            return Err(Error::MalformedMessage(
                "missing content action".to_string(),
            ));
        }
        Ok(())
    }

    /// Fill in id and timestamp if the sender left them unassigned.
    pub fn ensure_identity(&mut self) {
        if self.id.is_empty() {
            self.id = generate_id();
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
    }

    /// Whether this message is addressed to the system facade.
    pub fn is_for_system(&self) -> bool {
        self.receiver == SYSTEM_NAME
    }
}

fn generate_id() -> String {
    ulid::Ulid::new().to_string()
}
