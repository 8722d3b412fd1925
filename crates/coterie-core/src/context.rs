//! System prompt augmentation
//!
//! Two blocks get appended to an agent's base system prompt before a
//! send: team awareness (always) and, for collaborative sends, a
//! collaboration block naming the other agents addressed by the same
//! message.

use crate::roster::{Agent, Roster};

/// Build the always-on team awareness block for an agent
///
/// Lists every teammate's name and role, restates the agent's own
/// assignment (role, model, tools), and notes that teammates can be
/// addressed by mentioning their name.
#[must_use]
pub fn build_team_awareness(current: &Agent, roster: &Roster) -> String {
    let mut lines = Vec::new();
    lines.push("## Your Team".to_string());
    for agent in roster.iter() {
        if agent.id == current.id {
            lines.push(format!("- {} ({}) — you", agent.name, agent.role));
        } else {
            lines.push(format!("- {} ({})", agent.name, agent.role));
        }
    }
    lines.push(String::new());
    lines.push(format!("You are {}, the {}.", current.name, current.role));
    lines.push(format!("Model: {}", current.model));
    if !current.tools.is_empty() {
        lines.push(format!("Allowed tools: {}", current.tools.join(", ")));
    }
    lines.push(
        "When work belongs to a teammate, say so and name them rather than guessing."
            .to_string(),
    );
    lines.join("\n")
}

/// Build the collaboration block for a multi-agent task
///
/// Teammates are the mentioned agents other than the current one.
/// Returns an empty string when the agent is working alone.
#[must_use]
pub fn build_collaboration_context(
    current: &Agent,
    roster: &Roster,
    mentioned_ids: &[String],
) -> String {
    let teammates: Vec<&Agent> = mentioned_ids
        .iter()
        .filter(|id| id.as_str() != current.id)
        .filter_map(|id| roster.get(id))
        .collect();

    if teammates.is_empty() {
        return String::new();
    }

    let mut lines = Vec::new();
    lines.push("## Collaborative Task".to_string());
    lines.push(
        "This request was sent to several agents at once. Your teammates on it:".to_string(),
    );
    for teammate in &teammates {
        lines.push(format!("- {} ({})", teammate.name, teammate.role));
    }
    lines.push(String::new());
    lines.push(format!(
        "Answer only for your part as the {}. Keep it concise; the replies are combined into one transcript.",
        current.role
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::AgentDefinition;

    fn roster() -> Roster {
        Roster::from_definitions(vec![
            definition("1", "Backend", "Backend Developer"),
            definition("2", "Frontend", "Frontend Designer"),
            definition("3", "Researcher", "Researcher"),
        ])
    }

    fn definition(id: &str, name: &str, role: &str) -> AgentDefinition {
        AgentDefinition {
            id: id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            system_prompt: String::new(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            tools: vec!["Read".to_string(), "Grep".to_string()],
            skills: vec![],
            backend: None,
        }
    }

    #[test]
    fn test_team_awareness_lists_everyone() {
        let roster = roster();
        let current = roster.get("1").unwrap();
        let block = build_team_awareness(current, &roster);

        assert!(block.contains("Backend (Backend Developer) — you"));
        assert!(block.contains("Frontend (Frontend Designer)"));
        assert!(block.contains("Researcher (Researcher)"));
        assert!(block.contains("Model: claude-sonnet-4-5-20250929"));
        assert!(block.contains("Allowed tools: Read, Grep"));
    }

    #[test]
    fn test_collaboration_context_excludes_self() {
        let roster = roster();
        let current = roster.get("1").unwrap();
        let mentioned = vec!["1".to_string(), "2".to_string()];
        let block = build_collaboration_context(current, &roster, &mentioned);

        assert!(block.contains("Frontend (Frontend Designer)"));
        assert!(!block.contains("Backend (Backend Developer)"));
        assert!(block.contains("Backend Developer"));
    }

    #[test]
    fn test_collaboration_context_empty_when_alone() {
        let roster = roster();
        let current = roster.get("1").unwrap();
        let block = build_collaboration_context(current, &roster, &["1".to_string()]);
        assert!(block.is_empty());
    }
}
