//! Collaboration coordinator
//!
//! Single writer over the roster and task list. Plain sends go to one
//! agent; collaborative sends fan out to every mentioned agent
//! concurrently and funnel the replies back through one mpsc channel,
//! so task and roster writes stay serialized in `&mut self`.
//!
//! Transport failures never propagate out of the coordinator: they are
//! rendered into the agent's history as labeled assistant turns and the
//! agent's status always returns to `Idle`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use coterie_llm::{AgentBackend, BackendEvent, Error as TransportError, Message, SendRequest};

use crate::config::CoordinatorConfig;
use crate::context::{build_collaboration_context, build_team_awareness};
use crate::formatter::format_combined;
use crate::mentions::parse_mentions;
use crate::roster::{Agent, AgentDefinition, AgentStatus, ChatMessage, ChatRole, Roster};
use crate::task::CollaborationTask;

/// Assistant text shown when an agent has no usable transport
const NO_TRANSPORT_ADVISORY: &str =
    "No transport is configured for this agent. Register a backend with the coordinator to enable replies.";

/// Prefix marking the shared user turn of a collaboration
const COLLAB_TAG: &str = "[Collab]";

/// Inputs snapshotted from an agent before a dispatch
struct DispatchPlan {
    system: String,
    model: String,
    tools: Vec<String>,
    history: Vec<Message>,
    backend: Option<Arc<dyn AgentBackend>>,
}

/// Render a transport error as a chat-visible line
fn error_chat_line(err: &TransportError) -> String {
    match err {
        TransportError::CliLaunch(_) | TransportError::CliExit { .. } => {
            format!("CLI Error: {err}")
        }
        TransportError::Api(_)
        | TransportError::Network(_)
        | TransportError::InvalidResponse(_)
        | TransportError::Stream(_)
        | TransportError::RateLimit => format!("API Error: {err}"),
        _ => format!("Error: {err}"),
    }
}

/// Coordinator owning the roster, task list, and backend registry
pub struct CollaborationCoordinator {
    roster: Roster,
    tasks: Vec<CollaborationTask>,
    backends: HashMap<String, Arc<dyn AgentBackend>>,
    config: CoordinatorConfig,
    cancel_token: CancellationToken,
}

impl CollaborationCoordinator {
    /// Create a coordinator over a roster
    #[must_use]
    pub fn new(roster: Roster, config: CoordinatorConfig) -> Self {
        Self {
            roster,
            tasks: Vec::new(),
            backends: HashMap::new(),
            config,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Register a transport backend under its own name
    pub fn register_backend(&mut self, backend: Arc<dyn AgentBackend>) {
        let name = backend.name().to_string();
        debug!(backend = %name, "Registering backend");
        self.backends.insert(name, backend);
    }

    /// The roster
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// All collaboration tasks, oldest first
    #[must_use]
    pub fn tasks(&self) -> &[CollaborationTask] {
        &self.tasks
    }

    /// Look up a collaboration task by id
    #[must_use]
    pub fn task(&self, id: Uuid) -> Option<&CollaborationTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Token cancelling every in-flight dispatch
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Cancel all in-flight dispatches and arm a fresh token
    pub fn cancel(&mut self) {
        self.cancel_token.cancel();
        self.cancel_token = CancellationToken::new();
    }

    /// Apply a roster refresh (see [`Roster::refresh`])
    pub fn refresh_roster(&mut self, defs: Vec<AgentDefinition>) {
        self.roster.refresh(defs);
    }

    /// Pick a transport for an agent: assigned backend, then the
    /// configured default, then any other registered backend, skipping
    /// any that report themselves unavailable
    async fn resolve_backend(&self, agent: &Agent) -> Option<Arc<dyn AgentBackend>> {
        if let Some(name) = agent.backend.as_deref() {
            if let Some(backend) = self.backends.get(name) {
                if backend.is_available().await {
                    return Some(backend.clone());
                }
                warn!(
                    agent_id = %agent.id,
                    backend = %name,
                    "Assigned backend unavailable, falling back"
                );
            } else {
                warn!(
                    agent_id = %agent.id,
                    backend = %name,
                    "Assigned backend not registered, falling back"
                );
            }
        }
        if let Some(backend) = self.backends.get(&self.config.default_backend) {
            if backend.is_available().await {
                return Some(backend.clone());
            }
        }
        let mut names: Vec<&String> = self.backends.keys().collect();
        names.sort();
        for name in names {
            if let Some(backend) = self.backends.get(name) {
                if backend.is_available().await {
                    return Some(backend.clone());
                }
            }
        }
        None
    }

    /// Snapshot everything a dispatch needs from an agent
    async fn plan_dispatch(&self, agent_id: &str, collaborators: Option<&[String]>) -> Option<DispatchPlan> {
        let agent = self.roster.get(agent_id)?;

        let mut system = agent.system_prompt.clone();
        if !system.is_empty() {
            system.push_str("\n\n");
        }
        system.push_str(&build_team_awareness(agent, &self.roster));
        if let Some(mentioned) = collaborators {
            let collab = build_collaboration_context(agent, &self.roster, mentioned);
            if !collab.is_empty() {
                system.push_str("\n\n");
                system.push_str(&collab);
            }
        }

        let history = agent
            .messages
            .iter()
            .map(|msg| match msg.role {
                ChatRole::User => Message::user(msg.content.clone()),
                ChatRole::Assistant => Message::assistant(msg.content.clone()),
            })
            .collect();

        Some(DispatchPlan {
            system,
            model: agent.model.clone(),
            tools: agent.tools.clone(),
            history,
            backend: self.resolve_backend(agent).await,
        })
    }

    fn append_message(&mut self, agent_id: &str, message: ChatMessage) {
        if let Some(agent) = self.roster.get_mut(agent_id) {
            agent.messages.push(message);
        }
    }

    fn set_status(&mut self, agent_id: &str, status: AgentStatus) {
        if let Some(agent) = self.roster.get_mut(agent_id) {
            agent.status = status;
        }
    }

    /// Send a direct message to one agent
    ///
    /// Appends the user turn, dispatches to the agent's backend, and
    /// appends the reply. Streaming deltas fill a placeholder assistant
    /// message in place; the finished reply overwrites it. Failures
    /// become labeled assistant turns. Unknown agent ids are a no-op.
    pub async fn send_message(&mut self, agent_id: &str, content: &str) {
        let Some(plan) = self.plan_dispatch(agent_id, None).await else {
            debug!(agent_id = %agent_id, "Ignoring message for unknown agent");
            return;
        };

        self.append_message(agent_id, ChatMessage::user(content));
        self.set_status(agent_id, AgentStatus::Thinking);

        let Some(backend) = plan.backend else {
            warn!(agent_id = %agent_id, "No backend available");
            self.append_message(agent_id, ChatMessage::assistant(NO_TRANSPORT_ADVISORY));
            self.set_status(agent_id, AgentStatus::Idle);
            return;
        };

        // Streaming deltas land in this placeholder; its id and
        // timestamp survive the final overwrite
        let placeholder = ChatMessage::assistant("");
        let placeholder_id = placeholder.id;
        self.append_message(agent_id, placeholder);
        self.set_status(agent_id, AgentStatus::Working);

        info!(
            agent_id = %agent_id,
            backend = %backend.name(),
            "Dispatching message"
        );

        let timeout = Duration::from_secs(self.config.call_timeout_seconds);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let req = SendRequest {
            agent_id,
            prompt: content,
            system: &plan.system,
            model: Some(&plan.model),
            allowed_tools: &plan.tools,
            history: &plan.history,
            progress: Some(tx),
        };

        let cancel = self.cancel_token.clone();
        let send_fut = tokio::time::timeout(timeout, backend.send(req));
        tokio::pin!(send_fut);

        let mut rx_open = true;
        // None = cancelled, Some(Err) = timed out, Some(Ok(..)) = backend outcome
        let outcome = loop {
            tokio::select! {
                result = &mut send_fut => break Some(result),
                () = cancel.cancelled() => break None,
                event = rx.recv(), if rx_open => match event {
                    Some(BackendEvent::TextDelta(chunk)) => {
                        if let Some(msg) = self
                            .roster
                            .get_mut(agent_id)
                            .and_then(|agent| agent.find_message_mut(placeholder_id))
                        {
                            msg.content.push_str(&chunk);
                        }
                    }
                    Some(_) => {}
                    None => rx_open = false,
                },
            }
        };

        let final_text = match outcome {
            Some(Ok(Ok(text))) => text,
            Some(Ok(Err(err))) => {
                warn!(agent_id = %agent_id, error = %err, "Dispatch failed");
                error_chat_line(&err)
            }
            Some(Err(_)) => {
                warn!(agent_id = %agent_id, timeout_s = timeout.as_secs(), "Dispatch timed out");
                format!("Error: timed out after {}s", timeout.as_secs())
            }
            None => {
                info!(agent_id = %agent_id, "Dispatch cancelled");
                "Error: request cancelled".to_string()
            }
        };

        if let Some(msg) = self
            .roster
            .get_mut(agent_id)
            .and_then(|agent| agent.find_message_mut(placeholder_id))
        {
            msg.content = final_text;
        }
        self.set_status(agent_id, AgentStatus::Idle);
    }

    /// Route raw user text to every mentioned agent
    ///
    /// No mentions is a no-op; a single mention degrades to
    /// [`send_message`](Self::send_message). Multiple mentions create a
    /// [`CollaborationTask`], fan out concurrently, and on completion
    /// append the combined transcript to every target's history.
    /// Returns the task id when a task was created.
    pub async fn send_collaborative_message(&mut self, content: &str) -> Option<Uuid> {
        let mention = parse_mentions(content, &self.roster);

        match mention.agent_ids.len() {
            0 => {
                debug!("Message has no agent mentions, ignoring");
                return None;
            }
            1 => {
                let agent_id = mention.agent_ids[0].clone();
                self.send_message(&agent_id, &mention.clean_text).await;
                return None;
            }
            _ => {}
        }

        let task = CollaborationTask::new(mention.clean_text.clone(), mention.agent_ids.clone());
        let task_id = task.id;
        info!(
            task_id = %task_id,
            targets = task.target_ids.len(),
            "Starting collaboration"
        );
        self.tasks.push(task);
        if let Some(task) = self.tasks.last_mut() {
            task.start();
        }

        let timeout = Duration::from_secs(self.config.call_timeout_seconds);
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, String)>();

        for agent_id in mention.agent_ids.clone() {
            let Some(plan) = self.plan_dispatch(&agent_id, Some(&mention.agent_ids)).await else {
                continue;
            };
            self.set_status(&agent_id, AgentStatus::Working);

            let Some(backend) = plan.backend else {
                warn!(agent_id = %agent_id, "No backend available");
                let _ = tx.send((agent_id, NO_TRANSPORT_ADVISORY.to_string()));
                continue;
            };

            let prompt = mention.clean_text.clone();
            let cancel = self.cancel_token.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let req = SendRequest {
                    agent_id: &agent_id,
                    prompt: &prompt,
                    system: &plan.system,
                    model: Some(&plan.model),
                    allowed_tools: &plan.tools,
                    history: &plan.history,
                    progress: None,
                };
                let outcome = tokio::select! {
                    result = tokio::time::timeout(timeout, backend.send(req)) => match result {
                        Ok(Ok(text)) => text,
                        Ok(Err(err)) => {
                            warn!(agent_id = %agent_id, error = %err, "Collaboration dispatch failed");
                            error_chat_line(&err)
                        }
                        Err(_) => {
                            warn!(agent_id = %agent_id, timeout_s = timeout.as_secs(), "Collaboration dispatch timed out");
                            format!("Error: timed out after {}s", timeout.as_secs())
                        }
                    },
                    () = cancel.cancelled() => "Error: request cancelled".to_string(),
                };
                let _ = tx.send((agent_id, outcome));
            });
        }
        drop(tx);

        // Single collecting loop: all task and status writes go through
        // here, in arrival order
        while let Some((agent_id, response)) = rx.recv().await {
            self.set_status(&agent_id, AgentStatus::Idle);
            if let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) {
                task.record_response(&agent_id, response);
            }
        }

        let completed = self
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .is_some_and(CollaborationTask::try_complete);

        if completed {
            let combined = self
                .tasks
                .iter()
                .find(|t| t.id == task_id)
                .map(|task| format_combined(task, &self.roster))
                .unwrap_or_default();
            let shared_prompt = format!("{COLLAB_TAG} {}", mention.clean_text);

            info!(task_id = %task_id, "Collaboration complete");
            for agent_id in &mention.agent_ids {
                self.append_message(agent_id, ChatMessage::user(shared_prompt.clone()));
                self.append_message(agent_id, ChatMessage::assistant(combined.clone()));
            }
        }

        self.prune_tasks();
        Some(task_id)
    }

    /// Evict the oldest completed tasks beyond the retention limit
    fn prune_tasks(&mut self) {
        let completed = self
            .tasks
            .iter()
            .filter(|t| t.status == crate::task::TaskStatus::Complete)
            .count();
        let mut excess = completed.saturating_sub(self.config.task_retention);
        if excess == 0 {
            return;
        }
        self.tasks.retain(|t| {
            if excess > 0 && t.status == crate::task::TaskStatus::Complete {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }
}
