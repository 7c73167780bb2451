//! Coordinator scheduling: task assignment, dependency resolution, and
//! progress tracking across managed agents.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::agent::AgentCore;
use crate::error::{Error, Result};
use crate::protocol::{Content, Message, MessageType, Priority};
use crate::task::{is_eligible, Task, TaskStatus};

/// Project lifecycle phases.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPhase {
    Planning,
    Development,
    Testing,
    Deployment,
}

impl ProjectPhase {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planning" => Some(ProjectPhase::Planning),
            "development" => Some(ProjectPhase::Development),
            "testing" => Some(ProjectPhase::Testing),
            "deployment" => Some(ProjectPhase::Deployment),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectPhase::Planning => "planning",
            ProjectPhase::Development => "development",
            ProjectPhase::Testing => "testing",
            ProjectPhase::Deployment => "deployment",
        }
    }
}

impl std::fmt::Display for ProjectPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The coordinator's denormalized status mirror for one managed agent.
///
/// This is a view: the referenced agent's own task list is never touched,
/// only this record, kept consistent by status-update messages.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRecord {
    pub kind: String,
    pub status: String,
    pub current_task_id: Option<String>,
    pub completed_task_ids: Vec<String>,
    pub registered_at: DateTime<Utc>,
}

/// Project status snapshot derived from the coordinator's task list.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub project_name: String,
    pub phase: ProjectPhase,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub progress: String,
    pub progress_percentage: f64,
    pub agents: usize,
    pub agent_statuses: HashMap<String, String>,
}

/// Extended report: status plus per-status task counts and per-agent
/// productivity.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    #[serde(flatten)]
    pub status: ProjectStatus,
    pub task_statuses: HashMap<String, usize>,
    pub agent_productivity: HashMap<String, AgentProductivity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentProductivity {
    pub completed_tasks: usize,
    pub current_status: String,
    pub current_task: Option<String>,
}

/// Scheduling state for the coordinator role.
///
/// The coordinator's own task list lives on its `AgentCore`; this struct
/// holds everything else: the managed-agent mirror and project phase/status.
pub struct Coordinator {
    pub project_name: String,
    pub phase: ProjectPhase,
    pub project_status: String,
    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    managed_agents: HashMap<String, AgentRecord>,
    /// Registration order, for deterministic notification fan-out.
    order: Vec<String>,
}

impl Coordinator {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            phase: ProjectPhase::Planning,
            project_status: "active".to_string(),
            started_at: Utc::now(),
            deadline: None,
            managed_agents: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register an agent under coordinator management. One-shot: a second
    /// registration for the same name fails and changes nothing.
    pub fn register_agent(&mut self, name: impl Into<String>, kind: impl Into<String>) -> bool {
        let name = name.into();
        if self.managed_agents.contains_key(&name) {
            tracing::warn!("Agent {} already registered with coordinator", name);
            return false;
        }

        self.managed_agents.insert(
            name.clone(),
            AgentRecord {
                kind: kind.into(),
                status: "idle".to_string(),
                current_task_id: None,
                completed_task_ids: Vec::new(),
                registered_at: Utc::now(),
            },
        );
        self.order.push(name.clone());
        tracing::info!("Coordinator registered agent: {}", name);
        true
    }

    pub fn managed_agent(&self, name: &str) -> Option<&AgentRecord> {
        self.managed_agents.get(name)
    }

    pub fn managed_agent_names(&self) -> &[String] {
        &self.order
    }

    /// Create a new task and assign it to a managed agent, refusing when a
    /// listed dependency is not completed yet.
    pub fn assign_task(
        &mut self,
        core: &mut AgentCore,
        agent_name: &str,
        description: &str,
        priority: Priority,
        deadline: Option<DateTime<Utc>>,
        dependencies: Vec<String>,
    ) -> Result<Task> {
        let unmet: Vec<String> = dependencies
            .iter()
            .filter(|dep_id| {
                !core
                    .tasks
                    .iter()
                    .any(|t| &t.id == *dep_id && t.status == TaskStatus::Completed)
            })
            .cloned()
            .collect();
        if !unmet.is_empty() {
            tracing::warn!(
                "Refusing to assign '{}' to {}: dependencies not completed: {:?}",
                description,
                agent_name,
                unmet
            );
            return Err(Error::DependenciesUnmet(unmet));
        }

        self.assign_task_unchecked(core, agent_name, description, priority, deadline, dependencies)
    }

    /// Create and assign a task without checking dependency eligibility.
    ///
    /// The escape hatch for operators that need to jump the queue; normal
    /// callers use `assign_task`.
    pub fn force_assign_task(
        &mut self,
        core: &mut AgentCore,
        agent_name: &str,
        description: &str,
        priority: Priority,
        deadline: Option<DateTime<Utc>>,
        dependencies: Vec<String>,
    ) -> Result<Task> {
        self.assign_task_unchecked(core, agent_name, description, priority, deadline, dependencies)
    }

    fn assign_task_unchecked(
        &mut self,
        core: &mut AgentCore,
        agent_name: &str,
        description: &str,
        priority: Priority,
        deadline: Option<DateTime<Utc>>,
        dependencies: Vec<String>,
    ) -> Result<Task> {
        if !self.managed_agents.contains_key(agent_name) {
            tracing::error!("Cannot assign task: agent {} not registered", agent_name);
            return Err(Error::AgentNotRegistered(agent_name.to_string()));
        }

        let mut task = Task::new(description, priority).with_dependencies(dependencies);
        if let Some(deadline) = deadline {
            task = task.with_deadline(deadline);
        }
        task.assignee = Some(agent_name.to_string());
        task.set_status(TaskStatus::Assigned);

        core.tasks.push(task.clone());
        self.mark_assigned(agent_name, &task.id);
        self.emit_assignment(core, agent_name, &task);

        tracing::info!("Task {} assigned to {}: {}", task.id, agent_name, description);
        Ok(task)
    }

    /// Assign an already-tracked pending task to an agent
    /// (pending -> assigned). Used by the pull-scheduling path, where
    /// eligibility was established by `get_next_tasks`.
    pub fn assign_existing(
        &mut self,
        core: &mut AgentCore,
        agent_name: &str,
        task_id: &str,
    ) -> Result<Task> {
        if !self.managed_agents.contains_key(agent_name) {
            return Err(Error::AgentNotRegistered(agent_name.to_string()));
        }

        let task = match core.tasks.iter_mut().find(|t| t.id == task_id) {
            Some(task) => {
                task.assignee = Some(agent_name.to_string());
                task.set_status(TaskStatus::Assigned);
                task.clone()
            }
            None => return Err(Error::TaskNotFound(task_id.to_string())),
        };

        self.mark_assigned(agent_name, &task.id);
        self.emit_assignment(core, agent_name, &task);
        Ok(task)
    }

    fn mark_assigned(&mut self, agent_name: &str, task_id: &str) {
        if let Some(record) = self.managed_agents.get_mut(agent_name) {
            record.status = "assigned".to_string();
            record.current_task_id = Some(task_id.to_string());
        }
    }

    fn emit_assignment(&self, core: &mut AgentCore, agent_name: &str, task: &Task) {
        core.send(
            agent_name,
            MessageType::TaskAssignment,
            Content::new("assign_task")
                .with("task_id", task.id.clone())
                .with("description", task.description.clone())
                .with(
                    "priority",
                    serde_json::to_value(task.priority).unwrap_or(Value::Null),
                )
                .with(
                    "dependencies",
                    Value::Array(
                        task.dependencies
                            .iter()
                            .map(|d| Value::String(d.clone()))
                            .collect(),
                    ),
                )
                .with_priority(task.priority),
        );
    }

    /// Select up to `count` eligible tasks: pending, all dependencies
    /// completed, ordered by priority weight descending. The sort is stable,
    /// so equal priorities keep their creation order.
    pub fn get_next_tasks(&self, core: &AgentCore, count: usize) -> Vec<Task> {
        let mut eligible: Vec<Task> = core
            .tasks
            .iter()
            .filter(|t| is_eligible(t, &core.tasks))
            .cloned()
            .collect();

        eligible.sort_by(|a, b| b.priority.weight().cmp(&a.priority.weight()));
        eligible.truncate(count);
        eligible
    }

    /// Update a managed agent's status mirror, promoting the referenced task
    /// when the agent goes idle and marking it blocked when the agent blocks.
    pub fn update_agent_status(
        &mut self,
        core: &mut AgentCore,
        agent_name: &str,
        status: &str,
        task_id: Option<&str>,
    ) -> bool {
        let Some(record) = self.managed_agents.get_mut(agent_name) else {
            tracing::error!("Cannot update status: agent {} not registered", agent_name);
            return false;
        };

        let old_status = std::mem::replace(&mut record.status, status.to_string());

        if let Some(task_id) = task_id {
            if let Some(task) = core.tasks.iter_mut().find(|t| t.id == task_id) {
                match status {
                    "idle" if task.status != TaskStatus::Completed => {
                        task.set_status(TaskStatus::Completed);
                        if record.current_task_id.as_deref() == Some(task_id) {
                            record.current_task_id = None;
                            record.completed_task_ids.push(task_id.to_string());
                        }
                    }
                    "working" => {
                        task.set_status(TaskStatus::InProgress);
                    }
                    "blocked" => {
                        task.set_status(TaskStatus::Blocked);
                    }
                    _ => {}
                }
            }
        }

        tracing::info!(
            "Agent {} status updated: {} -> {}",
            agent_name,
            old_status,
            status
        );
        true
    }

    /// Derived project status. Progress is completed/total, zero when the
    /// task list is empty.
    pub fn get_project_status(&self, core: &AgentCore) -> ProjectStatus {
        let total = core.tasks.len();
        let completed = core
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();

        let progress_percentage = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        ProjectStatus {
            project_name: self.project_name.clone(),
            phase: self.phase,
            status: self.project_status.clone(),
            started_at: self.started_at,
            deadline: self.deadline,
            progress: format!("{}/{} tasks completed", completed, total),
            progress_percentage,
            agents: self.managed_agents.len(),
            agent_statuses: self
                .managed_agents
                .iter()
                .map(|(name, record)| (name.clone(), record.status.clone()))
                .collect(),
        }
    }

    /// Change the project phase. Values outside the fixed set fail without
    /// mutating anything; on success every managed agent is notified.
    pub fn update_project_phase(&mut self, core: &mut AgentCore, phase: &str) -> bool {
        let Some(new_phase) = ProjectPhase::parse(phase) else {
            tracing::error!("Invalid project phase: {}", phase);
            return false;
        };

        let old_phase = self.phase;
        self.phase = new_phase;

        for agent_name in &self.order {
            core.send(
                agent_name,
                MessageType::Notification,
                Content::new("project_phase_changed")
                    .with("old_phase", old_phase.as_str())
                    .with("new_phase", new_phase.as_str())
                    .with("timestamp", Utc::now().to_rfc3339()),
            );
        }

        tracing::info!("Project phase updated: {} -> {}", old_phase, new_phase);
        true
    }

    /// Full report: status plus task-status counts and per-agent
    /// productivity.
    pub fn generate_report(&self, core: &AgentCore) -> ProjectReport {
        let mut task_statuses = HashMap::new();
        for status in [
            TaskStatus::Pending,
            TaskStatus::Assigned,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Blocked,
            TaskStatus::Failed,
        ] {
            task_statuses.insert(
                status.to_string(),
                core.tasks.iter().filter(|t| t.status == status).count(),
            );
        }

        let agent_productivity = self
            .managed_agents
            .iter()
            .map(|(name, record)| {
                (
                    name.clone(),
                    AgentProductivity {
                        completed_tasks: record.completed_task_ids.len(),
                        current_status: record.status.clone(),
                        current_task: record.current_task_id.clone(),
                    },
                )
            })
            .collect();

        ProjectReport {
            status: self.get_project_status(core),
            task_statuses,
            agent_productivity,
        }
    }

    /// Pure diagnostic: find a dependency cycle in the task list, if one
    /// exists. Never called automatically; cycles are a configuration error
    /// that shows up as permanently ineligible tasks.
    pub fn find_dependency_cycle(&self, core: &AgentCore) -> Option<Vec<String>> {
        let graph: HashMap<&str, &[String]> = core
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.dependencies.as_slice()))
            .collect();

        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        let mut path = Vec::new();

        for id in graph.keys() {
            if dfs_cycle(id, &graph, &mut visited, &mut stack, &mut path) {
                return Some(path);
            }
        }
        None
    }

    /// Handle a message the coordinator recognizes; `None` falls back to the
    /// shared acknowledgement.
    pub fn handle(&mut self, core: &mut AgentCore, message: &Message) -> Option<Message> {
        let sender = message.sender.as_str();
        let action = message.content.action.as_str();

        let response_data: Value = match (message.message_type, action) {
            (MessageType::StatusUpdate, "task_started") => {
                let task_id = message.content.get_str("task_id")?.to_string();
                self.update_agent_status(core, sender, "working", Some(&task_id));
                json!({"status": "acknowledged"})
            }
            (MessageType::StatusUpdate, "task_completed") => {
                let task_id = message.content.get_str("task_id")?.to_string();
                self.update_agent_status(core, sender, "idle", Some(&task_id));
                json!({"status": "acknowledged"})
            }
            (MessageType::StatusUpdate, "task_blocked") => {
                let task_id = message.content.get_str("task_id")?.to_string();
                self.update_agent_status(core, sender, "blocked", Some(&task_id));
                json!({"status": "acknowledged", "next_steps": "investigating blockers"})
            }
            (MessageType::Request, "get_next_task") => {
                match self.get_next_tasks(core, 1).first() {
                    Some(task) => {
                        let task_id = task.id.clone();
                        match self.assign_existing(core, sender, &task_id) {
                            Ok(task) => json!({
                                "task_assigned": true,
                                "task": serde_json::to_value(&task).unwrap_or(Value::Null),
                            }),
                            Err(e) => json!({
                                "task_assigned": false,
                                "reason": e.to_string(),
                            }),
                        }
                    }
                    None => json!({
                        "task_assigned": false,
                        "reason": "no available tasks",
                    }),
                }
            }
            (MessageType::Request, "get_project_status") => {
                serde_json::to_value(self.get_project_status(core)).unwrap_or(Value::Null)
            }
            (MessageType::Command, "start_project") => {
                self.project_status = "active".to_string();
                core.state = "working".to_string();
                tracing::info!("Project {} started", self.project_name);
                json!({"status": "started", "project_name": self.project_name})
            }
            (MessageType::Command, "shutdown") => {
                self.project_status = "stopped".to_string();
                core.state = "stopped".to_string();
                tracing::info!("Coordinator {} shutting down", core.name);
                json!({"status": "stopped"})
            }
            _ => return None,
        };

        let mut content = Content::new(format!("{}_response", action))
            .with_priority(message.content.priority);
        if let Value::Object(map) = response_data {
            content.data = map;
        }
        Some(message.reply(core.name.clone(), content))
    }
}

fn dfs_cycle(
    node: &str,
    graph: &HashMap<&str, &[String]>,
    visited: &mut HashSet<String>,
    stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> bool {
    if stack.contains(node) {
        path.push(node.to_string());
        return true;
    }
    if visited.contains(node) {
        return false;
    }

    visited.insert(node.to_string());
    stack.insert(node.to_string());
    path.push(node.to_string());

    if let Some(deps) = graph.get(node) {
        for dep in deps.iter() {
            if dfs_cycle(dep, graph, visited, stack, path) {
                return true;
            }
        }
    }

    stack.remove(node);
    path.pop();
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentKind;

    fn setup() -> (Coordinator, AgentCore) {
        let mut coordinator = Coordinator::new("demo");
        let core = AgentCore::new("lead", AgentKind::Coordinator);
        coordinator.register_agent("dev", "developer");
        coordinator.register_agent("rev", "reviewer");
        (coordinator, core)
    }

    fn add_pending(core: &mut AgentCore, description: &str, priority: Priority) -> String {
        let task = Task::new(description, priority);
        let id = task.id.clone();
        core.tasks.push(task);
        id
    }

    fn add_pending_with_deps(
        core: &mut AgentCore,
        description: &str,
        priority: Priority,
        deps: Vec<String>,
    ) -> String {
        let task = Task::new(description, priority).with_dependencies(deps);
        let id = task.id.clone();
        core.tasks.push(task);
        id
    }

    #[test]
    fn duplicate_agent_registration_fails() {
        let (mut coordinator, _core) = setup();
        assert!(!coordinator.register_agent("dev", "developer"));
        assert_eq!(coordinator.managed_agent_names().len(), 2);
    }

    #[test]
    fn priority_ordering_with_dependencies() {
        let (mut coordinator, mut core) = setup();

        let t1 = add_pending(&mut core, "low no deps", Priority::Low);
        let t2 = add_pending(&mut core, "high no deps", Priority::High);
        let t3 = add_pending_with_deps(
            &mut core,
            "medium dep on high",
            Priority::Medium,
            vec![t2.clone()],
        );

        // Before any completion: T3 is ineligible, T2 outranks T1.
        let next: Vec<String> = coordinator
            .get_next_tasks(&core, 3)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(next, vec![t2.clone(), t1.clone()]);

        core.update_task_status(&t2, TaskStatus::Completed).unwrap();

        let next: Vec<String> = coordinator
            .get_next_tasks(&core, 3)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(next, vec![t3, t1]);
    }

    #[test]
    fn equal_priorities_keep_creation_order() {
        let (coordinator, mut core) = setup();
        let a = add_pending(&mut core, "first", Priority::Medium);
        let b = add_pending(&mut core, "second", Priority::Medium);

        let next: Vec<String> = coordinator
            .get_next_tasks(&core, 2)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(next, vec![a, b]);
    }

    #[test]
    fn assignment_status_round_trip() {
        let (mut coordinator, mut core) = setup();

        let task = coordinator
            .assign_task(&mut core, "dev", "build the thing", Priority::High, None, vec![])
            .unwrap();

        let record = coordinator.managed_agent("dev").unwrap();
        assert_eq!(record.status, "assigned");
        assert_eq!(record.current_task_id.as_deref(), Some(task.id.as_str()));

        assert!(coordinator.update_agent_status(&mut core, "dev", "idle", Some(&task.id)));

        let record = coordinator.managed_agent("dev").unwrap();
        assert_eq!(record.status, "idle");
        assert!(record.current_task_id.is_none());
        assert_eq!(record.completed_task_ids, vec![task.id.clone()]);
        assert_eq!(
            core.tasks.iter().find(|t| t.id == task.id).unwrap().status,
            TaskStatus::Completed
        );
    }

    #[test]
    fn blocked_status_keeps_current_task() {
        let (mut coordinator, mut core) = setup();
        let task = coordinator
            .assign_task(&mut core, "dev", "stuck work", Priority::Medium, None, vec![])
            .unwrap();

        assert!(coordinator.update_agent_status(&mut core, "dev", "blocked", Some(&task.id)));

        let record = coordinator.managed_agent("dev").unwrap();
        assert_eq!(record.status, "blocked");
        assert_eq!(record.current_task_id.as_deref(), Some(task.id.as_str()));
        assert!(record.completed_task_ids.is_empty());
        assert_eq!(
            core.tasks.iter().find(|t| t.id == task.id).unwrap().status,
            TaskStatus::Blocked
        );
    }

    #[test]
    fn assignment_to_unknown_agent_fails() {
        let (mut coordinator, mut core) = setup();
        let result =
            coordinator.assign_task(&mut core, "ghost", "nothing", Priority::Low, None, vec![]);
        assert!(matches!(result, Err(Error::AgentNotRegistered(_))));
        assert!(core.tasks.is_empty());
    }

    #[test]
    fn checked_assignment_refuses_unmet_dependencies() {
        let (mut coordinator, mut core) = setup();
        let dep = add_pending(&mut core, "prerequisite", Priority::Medium);

        let result = coordinator.assign_task(
            &mut core,
            "dev",
            "dependent work",
            Priority::High,
            None,
            vec![dep.clone()],
        );
        assert!(matches!(result, Err(Error::DependenciesUnmet(_))));

        // Force-assign bypasses the check.
        let task = coordinator
            .force_assign_task(&mut core, "dev", "dependent work", Priority::High, None, vec![dep])
            .unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
    }

    #[test]
    fn assignment_emits_task_assignment_message() {
        let (mut coordinator, mut core) = setup();
        coordinator
            .assign_task(&mut core, "dev", "wire codec", Priority::High, None, vec![])
            .unwrap();

        let outbox = core.take_outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].receiver, "dev");
        assert_eq!(outbox[0].message_type, MessageType::TaskAssignment);
        assert_eq!(outbox[0].content.action, "assign_task");
        assert_eq!(outbox[0].content.priority, Priority::High);
    }

    #[test]
    fn progress_computation() {
        let (mut coordinator, mut core) = setup();

        let status = coordinator.get_project_status(&core);
        assert_eq!(status.progress_percentage, 0.0);

        let t1 = coordinator
            .assign_task(&mut core, "dev", "one", Priority::Medium, None, vec![])
            .unwrap();
        coordinator
            .assign_task(&mut core, "rev", "two", Priority::Medium, None, vec![])
            .unwrap();

        coordinator.update_agent_status(&mut core, "dev", "idle", Some(&t1.id));

        let status = coordinator.get_project_status(&core);
        assert_eq!(status.progress_percentage, 50.0);
        assert_eq!(status.progress, "1/2 tasks completed");
    }

    #[test]
    fn status_update_messages_drive_the_task_state_machine() {
        let (mut coordinator, mut core) = setup();
        let task = coordinator
            .assign_task(&mut core, "dev", "stateful work", Priority::Medium, None, vec![])
            .unwrap();
        core.take_outbox();

        let started = Message::new(
            "dev",
            "lead",
            MessageType::StatusUpdate,
            Content::new("task_started").with("task_id", task.id.clone()),
        );
        let response = coordinator.handle(&mut core, &started).unwrap();
        assert_eq!(response.content.action, "task_started_response");
        assert_eq!(
            core.tasks.iter().find(|t| t.id == task.id).unwrap().status,
            TaskStatus::InProgress
        );

        let completed = Message::new(
            "dev",
            "lead",
            MessageType::StatusUpdate,
            Content::new("task_completed").with("task_id", task.id.clone()),
        );
        coordinator.handle(&mut core, &completed).unwrap();
        assert_eq!(
            core.tasks.iter().find(|t| t.id == task.id).unwrap().status,
            TaskStatus::Completed
        );
        assert_eq!(coordinator.managed_agent("dev").unwrap().status, "idle");
    }

    #[test]
    fn get_next_task_request_assigns_the_best_eligible_task() {
        let (mut coordinator, mut core) = setup();
        add_pending(&mut core, "low", Priority::Low);
        let high = add_pending(&mut core, "high", Priority::High);

        let request = Message::new(
            "dev",
            "lead",
            MessageType::Request,
            Content::new("get_next_task"),
        );
        let response = coordinator.handle(&mut core, &request).unwrap();

        assert_eq!(response.content.action, "get_next_task_response");
        assert_eq!(response.content.data["task_assigned"], json!(true));
        assert_eq!(response.content.data["task"]["id"], json!(high));
        assert_eq!(
            core.tasks.iter().find(|t| t.id == high).unwrap().status,
            TaskStatus::Assigned
        );

        // The assignment message went out through the outbox.
        let outbox = core.take_outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].receiver, "dev");
    }

    #[test]
    fn get_next_task_with_nothing_available() {
        let (mut coordinator, mut core) = setup();
        let request = Message::new(
            "dev",
            "lead",
            MessageType::Request,
            Content::new("get_next_task"),
        );
        let response = coordinator.handle(&mut core, &request).unwrap();
        assert_eq!(response.content.data["task_assigned"], json!(false));
    }

    #[test]
    fn unrecognized_messages_fall_back_to_none() {
        let (mut coordinator, mut core) = setup();
        let message = Message::new(
            "dev",
            "lead",
            MessageType::Request,
            Content::new("paint_the_shed"),
        );
        assert!(coordinator.handle(&mut core, &message).is_none());
    }

    #[test]
    fn phase_change_notifies_every_managed_agent() {
        let (mut coordinator, mut core) = setup();

        assert!(coordinator.update_project_phase(&mut core, "development"));
        assert_eq!(coordinator.phase, ProjectPhase::Development);

        let outbox = core.take_outbox();
        assert_eq!(outbox.len(), 2);
        let receivers: Vec<&str> = outbox.iter().map(|m| m.receiver.as_str()).collect();
        assert_eq!(receivers, vec!["dev", "rev"]);
        for message in &outbox {
            assert_eq!(message.content.action, "project_phase_changed");
            assert_eq!(message.content.get_str("old_phase"), Some("planning"));
            assert_eq!(message.content.get_str("new_phase"), Some("development"));
        }
    }

    #[test]
    fn invalid_phase_fails_without_mutation() {
        let (mut coordinator, mut core) = setup();
        assert!(!coordinator.update_project_phase(&mut core, "maintenance"));
        assert_eq!(coordinator.phase, ProjectPhase::Planning);
        assert!(core.take_outbox().is_empty());
    }

    #[test]
    fn report_totals_match_task_list() {
        let (mut coordinator, mut core) = setup();
        let t1 = coordinator
            .assign_task(&mut core, "dev", "one", Priority::Medium, None, vec![])
            .unwrap();
        coordinator
            .assign_task(&mut core, "rev", "two", Priority::Low, None, vec![])
            .unwrap();
        coordinator.update_agent_status(&mut core, "dev", "idle", Some(&t1.id));

        let report = coordinator.generate_report(&core);
        let total: usize = report.task_statuses.values().sum();
        assert_eq!(total, core.tasks.len());
        assert_eq!(report.task_statuses["completed"], 1);
        assert_eq!(report.agent_productivity["dev"].completed_tasks, 1);
        assert_eq!(report.agent_productivity["rev"].current_status, "assigned");
    }

    #[test]
    fn dependency_cycle_diagnostic() {
        let (coordinator, mut core) = setup();

        let mut a = Task::new("a", Priority::Medium);
        let mut b = Task::new("b", Priority::Medium);
        a.dependencies = vec![b.id.clone()];
        b.dependencies = vec![a.id.clone()];
        core.tasks.push(a);
        core.tasks.push(b);

        assert!(coordinator.find_dependency_cycle(&core).is_some());

        core.tasks.clear();
        let c = Task::new("c", Priority::Medium);
        let d = Task::new("d", Priority::Medium).with_dependencies(vec![c.id.clone()]);
        core.tasks.push(c);
        core.tasks.push(d);
        assert!(coordinator.find_dependency_cycle(&core).is_none());
    }
}
