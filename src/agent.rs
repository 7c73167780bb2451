//! Agents: shared mailbox/task/knowledge state plus per-kind behavior.
//!
//! `AgentCore` carries the state every agent has; `Role` is the closed set of
//! specializations. A role handles the `(message_type, action)` pairs it
//! claims and returns `None` for everything else, which falls back to the
//! shared acknowledgement so message handling is total.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::protocol::{Content, Message, MessageType, Priority};
use crate::task::{Task, TaskStatus};

/// The fixed set of agent kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Coordinator,
    Developer,
    Reviewer,
    Optimizer,
    Monitor,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Coordinator => "coordinator",
            AgentKind::Developer => "developer",
            AgentKind::Reviewer => "reviewer",
            AgentKind::Optimizer => "optimizer",
            AgentKind::Monitor => "monitor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "coordinator" => Some(AgentKind::Coordinator),
            "developer" => Some(AgentKind::Developer),
            "reviewer" => Some(AgentKind::Reviewer),
            "optimizer" => Some(AgentKind::Optimizer),
            "monitor" => Some(AgentKind::Monitor),
            _ => None,
        }
    }

    /// The fixed capability list carried in introduction handshakes.
    pub fn capabilities(self) -> &'static [&'static str] {
        match self {
            AgentKind::Coordinator => &[
                "project_planning",
                "task_assignment",
                "progress_tracking",
                "resource_management",
                "risk_management",
            ],
            AgentKind::Developer => &[
                "code_development",
                "feature_implementation",
                "api_integration",
                "data_management",
            ],
            AgentKind::Reviewer => &[
                "code_review",
                "defect_identification",
                "performance_optimization",
                "quality_assessment",
            ],
            AgentKind::Optimizer => &[
                "artifact_analysis",
                "artifact_optimization",
                "content_generation",
                "ranking_strategy",
            ],
            AgentKind::Monitor => &[
                "activity_monitoring",
                "anomaly_scanning",
                "threat_detection",
                "incident_reporting",
            ],
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of an agent's externally visible state.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub name: String,
    pub kind: AgentKind,
    pub state: String,
    pub tasks: usize,
    pub pending_tasks: usize,
    pub messages: usize,
}

/// State shared by every agent kind.
pub struct AgentCore {
    /// Opaque unique token.
    pub id: String,
    /// Routing key, unique within a system instance.
    pub name: String,
    pub kind: AgentKind,
    /// Free-form status string.
    pub state: String,
    /// Own task list, insertion order.
    pub tasks: Vec<Task>,
    /// Mailbox history of received messages.
    pub history: Vec<Message>,
    /// Agent-local memory.
    pub knowledge: HashMap<String, Value>,
    /// Messages constructed by `send`, awaiting pickup by the facade.
    outbox: Vec<Message>,
}

impl AgentCore {
    pub fn new(name: impl Into<String>, kind: AgentKind) -> Self {
        let name = name.into();
        tracing::info!("Agent {} of kind {} created", name, kind);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            kind,
            state: "initialized".to_string(),
            tasks: Vec::new(),
            history: Vec::new(),
            knowledge: HashMap::new(),
            outbox: Vec::new(),
        }
    }

    /// Construct and record a message. Routing is the dispatcher's job; the
    /// facade drains the outbox and submits on the agent's behalf.
    pub fn send(
        &mut self,
        receiver: impl Into<String>,
        message_type: MessageType,
        content: Content,
    ) -> Message {
        let message = Message::new(self.name.clone(), receiver, message_type, content);
        tracing::debug!(
            "{} queued {:?}/{} for {}",
            self.name,
            message.message_type,
            message.content.action,
            message.receiver
        );
        self.outbox.push(message.clone());
        message
    }

    /// Drain messages recorded by `send`.
    pub fn take_outbox(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbox)
    }

    /// Add a task to the agent's own list.
    pub fn add_task(&mut self, task: Task) -> Task {
        tracing::info!("{}: task added: {}", self.name, task.description);
        self.tasks.push(task.clone());
        task
    }

    /// Update a task's status by id. Linear scan; unknown ids report
    /// `TaskNotFound` so callers can branch without panicking.
    pub fn update_task_status(&mut self, task_id: &str, status: TaskStatus) -> Result<Task> {
        match self.tasks.iter_mut().find(|t| t.id == task_id) {
            Some(task) => {
                task.set_status(status);
                tracing::info!("{}: task {} updated to {}", self.name, task_id, status);
                Ok(task.clone())
            }
            None => {
                tracing::warn!("{}: task {} not found", self.name, task_id);
                Err(Error::TaskNotFound(task_id.to_string()))
            }
        }
    }

    pub fn update_knowledge(&mut self, key: impl Into<String>, value: Value) {
        self.knowledge.insert(key.into(), value);
    }

    pub fn get_knowledge(&self, key: &str) -> Option<&Value> {
        self.knowledge.get(key)
    }

    /// Weighted-sum decision over options. Each criterion contributes
    /// `option[key] * weight` when the key is present and numeric; the
    /// highest-scoring option wins, first occurrence on ties.
    pub fn decide(&self, options: &[Value], criteria: &HashMap<String, f64>) -> Option<Value> {
        if options.is_empty() {
            return None;
        }
        if criteria.is_empty() {
            return Some(options[0].clone());
        }

        let mut best_index = 0;
        let mut best_score = f64::NEG_INFINITY;

        for (index, option) in options.iter().enumerate() {
            let mut score = 0.0;
            for (criterion, weight) in criteria {
                if let Some(value) = option.get(criterion).and_then(Value::as_f64) {
                    score += value * weight;
                }
            }
            if score > best_score {
                best_score = score;
                best_index = index;
            }
        }

        Some(options[best_index].clone())
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            state: self.state.clone(),
            tasks: self.tasks.len(),
            pending_tasks: self
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Pending)
                .count(),
            messages: self.history.len(),
        }
    }
}

/// Shared acknowledgement: the fallback response for any
/// `(message_type, action)` pair a role does not claim.
fn acknowledge(core: &AgentCore, message: &Message) -> Message {
    message.reply(
        core.name.clone(),
        Content::new("acknowledge")
            .with("original_message_id", message.id.clone())
            .with_priority(message.content.priority),
    )
}

/// Monitoring state for the monitor role.
#[derive(Default)]
pub struct MonitorState {
    pub active: bool,
}

/// The closed set of agent specializations.
pub enum Role {
    Coordinator(Box<Coordinator>),
    Developer,
    Reviewer,
    Optimizer,
    Monitor(MonitorState),
}

impl Role {
    fn for_kind(kind: AgentKind, project_name: &str) -> Self {
        match kind {
            AgentKind::Coordinator => Role::Coordinator(Box::new(Coordinator::new(project_name))),
            AgentKind::Developer => Role::Developer,
            AgentKind::Reviewer => Role::Reviewer,
            AgentKind::Optimizer => Role::Optimizer,
            AgentKind::Monitor => Role::Monitor(MonitorState::default()),
        }
    }

    /// Handle a message the role recognizes; `None` falls back to the
    /// shared acknowledgement.
    fn handle(&mut self, core: &mut AgentCore, message: &Message) -> Option<Message> {
        match self {
            Role::Coordinator(coordinator) => coordinator.handle(core, message),
            Role::Monitor(_) | Role::Developer | Role::Reviewer | Role::Optimizer => {
                handle_worker(core, message)
            }
        }
    }
}

/// Message handling shared by all worker roles.
fn handle_worker(core: &mut AgentCore, message: &Message) -> Option<Message> {
    match (message.message_type, message.content.action.as_str()) {
        (MessageType::TaskAssignment, "assign_task") => {
            let task = task_from_data(&message.content);
            let task_id = task.id.clone();
            core.add_task(task);
            core.state = "assigned".to_string();
            Some(message.reply(
                core.name.clone(),
                Content::new("task_accepted").with("task_id", task_id),
            ))
        }
        (MessageType::Command, "shutdown") => {
            core.state = "stopped".to_string();
            tracing::info!("{} shutting down", core.name);
            Some(message.reply(
                core.name.clone(),
                Content::new("shutdown_acknowledged"),
            ))
        }
        (MessageType::Introduction, "introduce") => {
            // Remember the peer's advertised capabilities.
            core.update_knowledge(
                format!("peer.{}", message.sender),
                Value::Object(message.content.data.clone()),
            );
            None
        }
        _ => None,
    }
}

/// Rebuild a task from an assignment message's data map, tolerating
/// missing fields.
fn task_from_data(content: &Content) -> Task {
    let description = content.get_str("description").unwrap_or("unnamed task");
    let priority = content
        .get_str("priority")
        .and_then(|p| serde_json::from_value(Value::String(p.to_string())).ok())
        .unwrap_or(Priority::Medium);

    let mut task = Task::new(description, priority);
    if let Some(id) = content.get_str("task_id") {
        task.id = id.to_string();
    }
    task.set_status(TaskStatus::Assigned);
    task
}

/// A named, typed participant: shared core composed with one role.
pub struct Agent {
    pub core: AgentCore,
    role: Role,
}

impl Agent {
    pub fn new(name: impl Into<String>, kind: AgentKind, project_name: &str) -> Self {
        Self {
            core: AgentCore::new(name, kind),
            role: Role::for_kind(kind, project_name),
        }
    }

    /// Process a received message.
    ///
    /// Fails fast with an error payload when the message is addressed to
    /// someone else; otherwise records it and produces a response (the
    /// role's, or the shared acknowledgement).
    pub fn receive(&mut self, message: &Message) -> std::result::Result<Message, String> {
        if message.receiver != self.core.name {
            tracing::warn!(
                "{} received message intended for {}",
                self.core.name,
                message.receiver
            );
            return Err(format!(
                "message {} not intended for {}",
                message.id, self.core.name
            ));
        }

        self.core.history.push(message.clone());
        tracing::debug!(
            "{} received {:?}/{} from {}",
            self.core.name,
            message.message_type,
            message.content.action,
            message.sender
        );

        let response = self
            .role
            .handle(&mut self.core, message)
            .unwrap_or_else(|| acknowledge(&self.core, message));
        Ok(response)
    }

    /// Access the coordinator role, if this agent has it.
    pub fn coordinator(&self) -> Option<&Coordinator> {
        match &self.role {
            Role::Coordinator(c) => Some(c),
            _ => None,
        }
    }

    /// Mutable access to the coordinator role plus the shared core.
    ///
    /// Split borrow so coordinator operations can append tasks and record
    /// outgoing messages on the same agent.
    pub fn coordinator_mut(&mut self) -> Option<(&mut Coordinator, &mut AgentCore)> {
        match &mut self.role {
            Role::Coordinator(c) => Some((c.as_mut(), &mut self.core)),
            _ => None,
        }
    }

    /// Start monitoring if this agent supports it. Returns whether it does.
    pub fn start_monitoring(&mut self) -> bool {
        match &mut self.role {
            Role::Monitor(state) => {
                state.active = true;
                tracing::info!("{}: monitoring started", self.core.name);
                true
            }
            _ => false,
        }
    }

    /// Stop monitoring if this agent supports it. Returns whether it does.
    pub fn stop_monitoring(&mut self) -> bool {
        match &mut self.role {
            Role::Monitor(state) => {
                state.active = false;
                tracing::info!("{}: monitoring stopped", self.core.name);
                true
            }
            _ => false,
        }
    }

    pub fn is_monitoring(&self) -> bool {
        matches!(&self.role, Role::Monitor(state) if state.active)
    }
}
