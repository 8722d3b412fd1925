//! Combined transcript formatting

use crate::roster::Roster;
use crate::task::CollaborationTask;

/// Merge a completed task's replies into one transcript
///
/// Sections follow the task's target order, not completion order, so
/// the same fan-out always renders the same transcript:
///
/// ```text
/// [Backend - Backend Developer]
/// API spec text
///
/// ---
///
/// [Frontend - Frontend Designer]
/// UI plan text
/// ```
///
/// Targets without a recorded reply are skipped.
#[must_use]
pub fn format_combined(task: &CollaborationTask, roster: &Roster) -> String {
    let mut sections = Vec::with_capacity(task.target_ids.len());
    for id in &task.target_ids {
        let Some(response) = task.responses.get(id) else {
            continue;
        };
        let (name, role) = match roster.get(id) {
            Some(agent) => (agent.name.as_str(), agent.role.as_str()),
            None => (id.as_str(), "unknown"),
        };
        sections.push(format!("[{name} - {role}]\n{response}"));
    }
    sections.join("\n\n---\n\n")
}
