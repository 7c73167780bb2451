//! Task schema shared by agents and the coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::Priority;

/// Task lifecycle status.
///
/// Normal flow is pending -> assigned -> in_progress -> completed; blocked and
/// failed are terminal until an operator resets them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Blocked,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A unit of work tracked by an agent or the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID (ULID).
    pub id: String,
    pub description: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    /// Task ids that must be completed before this task is eligible.
    /// Fixed at creation.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Agent the task is assigned to, if any.
    pub assignee: Option<String>,
}

impl Task {
    /// Create a pending task with no dependencies.
    pub fn new(description: impl Into<String>, priority: Priority) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string(),
            description: description.into(),
            priority,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            deadline: None,
            dependencies: Vec::new(),
            assignee: None,
        }
    }

    /// Set the deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the dependency list.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Transition to a new status, stamping the update time.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Whether a task is eligible for assignment: pending, with every
/// dependency completed in the surrounding task list.
pub fn is_eligible(task: &Task, all_tasks: &[Task]) -> bool {
    if task.status != TaskStatus::Pending {
        return false;
    }

    task.dependencies.iter().all(|dep_id| {
        all_tasks
            .iter()
            .any(|t| &t.id == dep_id && t.status == TaskStatus::Completed)
    })
}
