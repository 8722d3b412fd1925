//! Collaboration tasks
//!
//! A task records one multi-agent fan-out: the cleaned message, the
//! targets in mention order, and each target's reply (or labeled error
//! text). A task is complete exactly when every target has reported.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a collaboration task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet dispatched
    Pending,
    /// Fan-out running
    InProgress,
    /// Every target has reported
    Complete,
}

/// One fan-out/fan-in collaboration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationTask {
    /// Unique task id
    pub id: Uuid,
    /// The cleaned message sent to every target
    pub message: String,
    /// Target agent ids, deduplicated, in mention order
    pub target_ids: Vec<String>,
    /// Collected replies keyed by agent id
    pub responses: HashMap<String, String>,
    /// Current lifecycle state
    pub status: TaskStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl CollaborationTask {
    /// Create a pending task for the given targets
    ///
    /// Duplicate target ids are dropped, first occurrence wins.
    #[must_use]
    pub fn new(message: impl Into<String>, target_ids: Vec<String>) -> Self {
        let mut deduped = Vec::with_capacity(target_ids.len());
        for id in target_ids {
            if !deduped.contains(&id) {
                deduped.push(id);
            }
        }
        Self {
            id: Uuid::new_v4(),
            message: message.into(),
            target_ids: deduped,
            responses: HashMap::new(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Mark the fan-out as dispatched
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
    }

    /// Record a target's reply
    ///
    /// Ignores agents that are not targets of this task, keeping the
    /// response-keys-subset-of-targets invariant.
    pub fn record_response(&mut self, agent_id: &str, response: impl Into<String>) {
        if self.target_ids.iter().any(|id| id == agent_id) {
            self.responses.insert(agent_id.to_string(), response.into());
        }
    }

    /// Whether every target has reported
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.target_ids
            .iter()
            .all(|id| self.responses.contains_key(id))
    }

    /// Transition to `Complete` if every target has reported
    ///
    /// Returns true on the transition.
    pub fn try_complete(&mut self) -> bool {
        if self.status != TaskStatus::Complete && self.is_complete() {
            self.status = TaskStatus::Complete;
            return true;
        }
        false
    }
}
