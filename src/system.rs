//! The system facade: owns the dispatcher and the agents, wires the
//! introduction handshakes, and exposes the start/stop lifecycle and
//! status queries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::agent::{Agent, AgentKind, AgentSnapshot};
use crate::config::Settings;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::protocol::{Content, Message, MessageType, SYSTEM_NAME};

/// Canonical construction order for the fixed agent kinds. The coordinator
/// comes first so introductions and scheduling wiring see it registered.
const KIND_ORDER: &[AgentKind] = &[
    AgentKind::Coordinator,
    AgentKind::Developer,
    AgentKind::Reviewer,
    AgentKind::Optimizer,
    AgentKind::Monitor,
];

/// Outward-facing status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub status: String,
    pub agents: HashMap<String, AgentSnapshot>,
    pub pending_messages: usize,
    pub generated_at: DateTime<Utc>,
}

/// The agent system: dispatcher plus the configured set of agents.
pub struct System {
    settings: Settings,
    dispatcher: Dispatcher,
    agents: HashMap<String, Arc<Mutex<Agent>>>,
    /// Agent names in construction order.
    order: Vec<String>,
    coordinator_name: Option<String>,
    status: String,
    /// Messages addressed to the reserved "system" receiver.
    system_inbox: Vec<Message>,
}

impl System {
    /// Build the system from settings: one agent per enabled kind, each
    /// registered with the dispatcher. Monitoring-capable agents start
    /// monitoring immediately.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        tracing::info!("Initializing agent system for {}", settings.project.name);

        let mut dispatcher = Dispatcher::new(
            settings.system.max_queue_size,
            settings.system.delivery_max_attempts,
        );
        let mut agents: HashMap<String, Arc<Mutex<Agent>>> = HashMap::new();
        let mut order = Vec::new();
        let mut coordinator_name = None;

        for kind_key in settings.agents.keys() {
            if AgentKind::parse(kind_key).is_none() {
                tracing::warn!("Ignoring unknown agent kind in settings: {}", kind_key);
            }
        }

        for &kind in KIND_ORDER {
            let Some(agent_config) = settings.agents.get(kind.as_str()) else {
                continue;
            };
            if !agent_config.enabled {
                tracing::info!("Agent kind {} disabled in settings", kind);
                continue;
            }

            let name = agent_config.name.clone();
            let mut agent = Agent::new(name.clone(), kind, &settings.project.name);
            if kind == AgentKind::Coordinator {
                coordinator_name = Some(name.clone());
                if let Some((role, _core)) = agent.coordinator_mut() {
                    role.deadline = settings.project.deadline;
                }
            }
            if agent.start_monitoring() {
                tracing::info!("Monitoring started on {}", name);
            }

            let agent = Arc::new(Mutex::new(agent));
            let callback_agent = Arc::clone(&agent);
            let registered = dispatcher.register(
                name.clone(),
                kind.as_str(),
                Box::new(move |message| {
                    let mut agent = callback_agent
                        .lock()
                        .map_err(|_| "agent mutex poisoned".to_string())?;
                    agent.receive(message).map(Some)
                }),
            );
            if !registered {
                return Err(Error::DuplicateRegistration(name));
            }

            agents.insert(name.clone(), agent);
            order.push(name);
        }

        tracing::info!("Agent system initialized with {} agents", order.len());
        Ok(Self {
            settings,
            dispatcher,
            agents,
            order,
            coordinator_name,
            status: "initialized".to_string(),
            system_inbox: Vec::new(),
        })
    }

    /// Start the system: wire coordinator management and introductions, then
    /// send the start command to the coordinator.
    pub fn start(&mut self) -> Result<()> {
        tracing::info!("Starting agent system");
        self.status = "running".to_string();

        self.register_workers_with_coordinator();
        self.send_introductions()?;

        if let Some(coordinator) = self.coordinator_name.clone() {
            let message = Message::new(
                SYSTEM_NAME,
                coordinator,
                MessageType::Command,
                Content::new("start_project")
                    .with("project_name", self.settings.project.name.clone())
                    .with("started_at", Utc::now().to_rfc3339()),
            );
            self.dispatcher.submit(message)?;
        }

        self.pump();
        tracing::info!("Agent system started");
        Ok(())
    }

    /// Stop the system: shutdown command to every agent, then tear down
    /// monitoring on any agent exposing it.
    pub fn stop(&mut self) -> Result<()> {
        tracing::info!("Stopping agent system");

        for name in self.order.clone() {
            let message = Message::new(
                SYSTEM_NAME,
                name,
                MessageType::Command,
                Content::new("shutdown")
                    .with("reason", "system shutdown")
                    .with("shutdown_at", Utc::now().to_rfc3339()),
            );
            self.dispatcher.submit(message)?;
        }
        self.pump();

        for agent in self.agents.values() {
            let mut agent = agent.lock().map_err(|_| poisoned())?;
            if agent.stop_monitoring() {
                tracing::info!("Monitoring stopped on {}", agent.core.name);
            }
        }

        self.status = "stopped".to_string();
        tracing::info!("Agent system stopped");
        Ok(())
    }

    /// Run one message-processing pass: drain agent outboxes into the
    /// dispatcher, deliver, handle system-addressed messages, and re-enter
    /// substantive responses. Returns the number of deliveries made.
    pub fn pump(&mut self) -> usize {
        for name in &self.order {
            let outbox = match self.agents[name].lock() {
                Ok(mut agent) => agent.core.take_outbox(),
                Err(_) => {
                    tracing::error!("Agent {} mutex poisoned, skipping outbox", name);
                    continue;
                }
            };
            for message in outbox {
                if let Err(e) = self.dispatcher.submit(message) {
                    tracing::error!("Dropping malformed outbox message from {}: {}", name, e);
                }
            }
        }

        let report = self.dispatcher.deliver_pending();

        for message in report.system {
            self.handle_system_message(message);
        }

        for response in report.responses {
            // Plain acknowledgements are recorded by the sender already;
            // re-entering them would bounce between two base agents forever.
            if response.content.action == "acknowledge" {
                tracing::debug!(
                    "Acknowledgement from {} for {}",
                    response.sender,
                    response.receiver
                );
                continue;
            }
            if response.is_for_system() {
                self.handle_system_message(response);
                continue;
            }
            if let Err(e) = self.dispatcher.submit(response) {
                tracing::error!("Dropping malformed response: {}", e);
            }
        }

        report.delivered
    }

    /// Deliver until the queue settles or `max_passes` is reached. Messages
    /// retained for an unregistered receiver do not count as progress.
    pub fn pump_until_settled(&mut self, max_passes: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_passes {
            let delivered = self.pump();
            total += delivered;
            if delivered == 0 {
                break;
            }
        }
        total
    }

    fn handle_system_message(&mut self, message: Message) {
        tracing::info!(
            "System message from {}: {:?}/{}",
            message.sender,
            message.message_type,
            message.content.action
        );
        self.system_inbox.push(message);
    }

    fn register_workers_with_coordinator(&mut self) {
        let Some(coordinator_name) = self.coordinator_name.clone() else {
            tracing::warn!("No coordinator configured; scheduling is disabled");
            return;
        };

        let workers: Vec<(String, String)> = self
            .order
            .iter()
            .filter(|name| **name != coordinator_name)
            .filter_map(|name| {
                self.dispatcher
                    .kind_of(name)
                    .map(|kind| (name.clone(), kind.to_string()))
            })
            .collect();

        let Ok(mut coordinator) = self.agents[&coordinator_name].lock() else {
            tracing::error!("Coordinator mutex poisoned");
            return;
        };
        let Some((coordinator_role, _core)) = coordinator.coordinator_mut() else {
            return;
        };
        for (name, kind) in workers {
            coordinator_role.register_agent(name, kind);
        }
    }

    /// Introduction handshakes: coordinator to every other agent, then each
    /// ordered worker pair, every message carrying the sender's kind and
    /// capability list.
    fn send_introductions(&mut self) -> Result<()> {
        let mut pairs: Vec<(String, String)> = Vec::new();

        if let Some(coordinator) = &self.coordinator_name {
            for name in &self.order {
                if name != coordinator {
                    pairs.push((coordinator.clone(), name.clone()));
                }
            }
        }

        let workers: Vec<&String> = self
            .order
            .iter()
            .filter(|name| Some(*name) != self.coordinator_name.as_ref())
            .collect();
        for i in 0..workers.len() {
            for j in (i + 1)..workers.len() {
                pairs.push((workers[i].clone(), workers[j].clone()));
            }
        }

        for (sender, receiver) in pairs {
            let kind = self
                .agents
                .get(&sender)
                .and_then(|a| a.lock().ok().map(|a| a.core.kind))
                .ok_or_else(|| Error::AgentNotRegistered(sender.clone()))?;

            let message = Message::new(
                sender,
                receiver,
                MessageType::Introduction,
                Content::new("introduce")
                    .with("agent_type", kind.as_str())
                    .with(
                        "capabilities",
                        Value::Array(
                            kind.capabilities()
                                .iter()
                                .map(|c| Value::String((*c).to_string()))
                                .collect(),
                        ),
                    ),
            );
            self.dispatcher.submit(message)?;
        }

        Ok(())
    }

    /// Outward status snapshot.
    pub fn status(&self) -> SystemStatus {
        let mut agents = HashMap::new();
        for (name, agent) in &self.agents {
            if let Ok(agent) = agent.lock() {
                agents.insert(name.clone(), agent.core.snapshot());
            }
        }

        SystemStatus {
            status: self.status.clone(),
            agents,
            pending_messages: self.dispatcher.pending_len(),
            generated_at: Utc::now(),
        }
    }

    /// Submit a message into the system on behalf of an external caller.
    pub fn submit(&mut self, message: Message) -> Result<String> {
        self.dispatcher.submit(message)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn agent(&self, name: &str) -> Option<Arc<Mutex<Agent>>> {
        self.agents.get(name).cloned()
    }

    pub fn coordinator_name(&self) -> Option<&str> {
        self.coordinator_name.as_deref()
    }

    pub fn agent_names(&self) -> &[String] {
        &self.order
    }

    pub fn system_inbox(&self) -> &[Message] {
        &self.system_inbox
    }

    pub fn processing_interval_ms(&self) -> u64 {
        self.settings.system.message_processing_interval_ms
    }
}

fn poisoned() -> Error {
    Error::Other("agent mutex poisoned".to_string())
}
