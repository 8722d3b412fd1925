//! Agent roster
//!
//! Agents are configured personas with their own system prompt, model,
//! tool permissions, and conversation history. The roster owns them in
//! a stable order; only the coordinator mutates `status` and
//! `messages`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a conversation turn in an agent's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// User turn
    User,
    /// Assistant turn
    Assistant,
}

/// One turn in an agent's conversation history
///
/// Immutable once appended, except that a streaming reply fills the
/// content of the same message slot in place, preserving its id and
/// timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message id
    pub id: Uuid,
    /// Turn role
    pub role: ChatRole,
    /// Text content
    pub content: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a user turn
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant turn
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Agent availability as shown in the dock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Ready for input
    #[default]
    Idle,
    /// A backend dispatch is running
    Working,
    /// A send was accepted, dispatch not yet started
    Thinking,
}

/// External agent definition, as supplied by the roster loader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Unique agent identifier
    pub id: String,
    /// Display name (matched by mentions and by roster refresh)
    pub name: String,
    /// Role label (e.g. "Backend Developer")
    pub role: String,
    /// Base system instructions
    pub system_prompt: String,
    /// Assigned model identifier
    pub model: String,
    /// Permitted tool names
    #[serde(default)]
    pub tools: Vec<String>,
    /// Skill names
    #[serde(default)]
    pub skills: Vec<String>,
    /// Preferred transport backend name (coordinator default when absent)
    #[serde(default)]
    pub backend: Option<String>,
}

/// A configured agent persona with its conversation state
#[derive(Debug, Clone)]
pub struct Agent {
    /// Unique agent identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Role label
    pub role: String,
    /// Base system instructions
    pub system_prompt: String,
    /// Assigned model identifier
    pub model: String,
    /// Permitted tool names
    pub tools: Vec<String>,
    /// Skill names
    pub skills: Vec<String>,
    /// Preferred transport backend name
    pub backend: Option<String>,
    /// Current availability; driven exclusively by the coordinator
    pub status: AgentStatus,
    /// Conversation history, append-only and monotonic by creation time
    pub messages: Vec<ChatMessage>,
}

impl Agent {
    /// Build an agent from an external definition
    #[must_use]
    pub fn from_definition(def: AgentDefinition) -> Self {
        Self {
            id: def.id,
            name: def.name,
            role: def.role,
            system_prompt: def.system_prompt,
            model: def.model,
            tools: def.tools,
            skills: def.skills,
            backend: def.backend,
            status: AgentStatus::Idle,
            messages: Vec::new(),
        }
    }

    /// Adopt new configuration fields, keeping id, history, and status
    pub fn apply_definition(&mut self, def: AgentDefinition) {
        self.name = def.name;
        self.role = def.role;
        self.system_prompt = def.system_prompt;
        self.model = def.model;
        self.tools = def.tools;
        self.skills = def.skills;
        self.backend = def.backend;
    }

    /// Find a message by id for in-place streaming updates
    pub fn find_message_mut(&mut self, id: Uuid) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

/// Ordered collection of agents keyed by id
///
/// Iteration order is the order agents were first added ("roster
/// order"), which anchors mention resolution and transcript ordering.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    agents: HashMap<String, Agent>,
    order: Vec<String>,
}

impl Roster {
    /// Create an empty roster
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from loader definitions
    #[must_use]
    pub fn from_definitions(defs: Vec<AgentDefinition>) -> Self {
        let mut roster = Self::new();
        for def in defs {
            roster.insert(Agent::from_definition(def));
        }
        roster
    }

    /// Add or replace an agent
    pub fn insert(&mut self, agent: Agent) {
        if !self.agents.contains_key(&agent.id) {
            self.order.push(agent.id.clone());
        }
        self.agents.insert(agent.id.clone(), agent);
    }

    /// Get an agent by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Get a mutable agent by id
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// Check whether an agent id exists
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Iterate agents in roster order
    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.order.iter().filter_map(|id| self.agents.get(id))
    }

    /// Agent ids in roster order
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of agents
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the roster is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Apply a full roster refresh from the loader
    ///
    /// Definitions are matched to existing agents by display name:
    /// matched agents keep their id, message history, and status while
    /// adopting the new configuration; unmatched definitions become new
    /// agents. Agents absent from the refresh are retained so an
    /// in-flight conversation is never dropped.
    pub fn refresh(&mut self, defs: Vec<AgentDefinition>) {
        for def in defs {
            let existing_id = self
                .iter()
                .find(|agent| agent.name == def.name)
                .map(|agent| agent.id.clone());

            match existing_id {
                Some(id) => {
                    if let Some(agent) = self.agents.get_mut(&id) {
                        agent.apply_definition(def);
                    }
                }
                None => self.insert(Agent::from_definition(def)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(id: &str, name: &str, role: &str) -> AgentDefinition {
        AgentDefinition {
            id: id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            system_prompt: format!("You are the {role}."),
            model: "claude-sonnet-4-5-20250929".to_string(),
            tools: vec![],
            skills: vec![],
            backend: None,
        }
    }

    #[test]
    fn test_roster_order_is_insertion_order() {
        let roster = Roster::from_definitions(vec![
            definition("1", "Backend", "Backend Developer"),
            definition("2", "Frontend", "Frontend Designer"),
            definition("3", "Researcher", "Researcher"),
        ]);

        let ids = roster.ids();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn test_refresh_preserves_history_and_status() {
        let mut roster = Roster::from_definitions(vec![definition("1", "Backend", "Backend Developer")]);
        {
            let agent = roster.get_mut("1").unwrap();
            agent.messages.push(ChatMessage::user("hello"));
            agent.status = AgentStatus::Thinking;
        }

        let mut updated = definition("ignored-new-id", "Backend", "Backend Developer");
        updated.system_prompt = "New prompt".to_string();
        updated.model = "claude-haiku-4-5-20251001".to_string();
        roster.refresh(vec![updated]);

        let agent = roster.get("1").unwrap();
        assert_eq!(agent.id, "1");
        assert_eq!(agent.messages.len(), 1);
        assert_eq!(agent.status, AgentStatus::Thinking);
        assert_eq!(agent.system_prompt, "New prompt");
        assert_eq!(agent.model, "claude-haiku-4-5-20251001");
    }

    #[test]
    fn test_refresh_appends_new_agents_and_keeps_missing_ones() {
        let mut roster = Roster::from_definitions(vec![definition("1", "Backend", "Backend Developer")]);
        roster.refresh(vec![definition("2", "Frontend", "Frontend Designer")]);

        assert!(roster.contains("1"));
        assert!(roster.contains("2"));
        assert_eq!(roster.ids(), vec!["1", "2"]);
    }

    #[test]
    fn test_find_message_mut_updates_in_place() {
        let mut agent = Agent::from_definition(definition("1", "Backend", "Backend Developer"));
        let placeholder = ChatMessage::assistant("");
        let id = placeholder.id;
        let timestamp = placeholder.timestamp;
        agent.messages.push(placeholder);

        agent.find_message_mut(id).unwrap().content.push_str("done");

        let msg = &agent.messages[0];
        assert_eq!(msg.content, "done");
        assert_eq!(msg.id, id);
        assert_eq!(msg.timestamp, timestamp);
    }

    #[test]
    fn test_message_history_is_monotonic() {
        let first = ChatMessage::user("a");
        let second = ChatMessage::assistant("b");
        assert!(first.timestamp <= second.timestamp);
    }
}
