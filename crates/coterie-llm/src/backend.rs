//! Agent backend contract
//!
//! Uniform transport interface consumed by the collaboration
//! coordinator. Both the subprocess and the streaming API backend
//! present the same `send` contract upward: a prompt plus a system
//! instruction in, the assistant's full reply text out, with optional
//! progress events along the way.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::message::Message;

/// Progress event emitted by a backend while a send is in flight
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// A chunk of assistant text arrived
    TextDelta(String),
    /// The backend reported a tool in use (name)
    ToolUse(String),
    /// The reply is finalized
    Done,
}

/// One send operation handed to a backend
///
/// Borrows its inputs from the caller; backends that need ownership
/// (e.g. for a spawned reader) clone what they keep.
#[derive(Debug, Clone)]
pub struct SendRequest<'a> {
    /// Identifier of the agent this send is attributed to; backends key
    /// any per-agent continuity state (CLI sessions) by this value so
    /// concurrent sends for different agents never interleave
    pub agent_id: &'a str,
    /// The user prompt (already cleaned of mention tokens)
    pub prompt: &'a str,
    /// Full system instruction for this turn
    pub system: &'a str,
    /// Model override, backend default when `None`
    pub model: Option<&'a str>,
    /// Tools the agent is permitted to use (empty = backend default)
    pub allowed_tools: &'a [String],
    /// Prior turns, oldest first (used by API transports; the CLI
    /// transport carries continuity through its own session id)
    pub history: &'a [Message],
    /// Optional progress channel for incremental text and tool notices
    pub progress: Option<mpsc::UnboundedSender<BackendEvent>>,
}

impl<'a> SendRequest<'a> {
    /// Create a request with just a prompt and system instruction
    #[must_use]
    pub fn new(agent_id: &'a str, prompt: &'a str, system: &'a str) -> Self {
        Self {
            agent_id,
            prompt,
            system,
            model: None,
            allowed_tools: &[],
            history: &[],
            progress: None,
        }
    }

    /// Emit a progress event if a channel is attached
    pub fn emit(&self, event: BackendEvent) {
        if let Some(progress) = &self.progress {
            let _ = progress.send(event);
        }
    }
}

/// Transport backend trait
///
/// Implementations must be safe to invoke concurrently for distinct
/// agents; any shared state is keyed by `agent_id`.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Backend name, used for registry lookup
    fn name(&self) -> &str;

    /// Check whether the backend can currently serve requests
    async fn is_available(&self) -> bool;

    /// Send a prompt and return the assistant's full reply text
    async fn send(&self, req: SendRequest<'_>) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_request_defaults() {
        let req = SendRequest::new("agent-1", "hello", "be brief");
        assert_eq!(req.agent_id, "agent-1");
        assert!(req.model.is_none());
        assert!(req.allowed_tools.is_empty());
        assert!(req.history.is_empty());
    }

    #[tokio::test]
    async fn test_emit_delivers_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut req = SendRequest::new("agent-1", "hello", "");
        req.progress = Some(tx);

        req.emit(BackendEvent::TextDelta("chunk".to_string()));
        req.emit(BackendEvent::Done);

        match rx.recv().await {
            Some(BackendEvent::TextDelta(text)) => assert_eq!(text, "chunk"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(rx.recv().await, Some(BackendEvent::Done)));
    }

    #[test]
    fn test_emit_without_channel_is_noop() {
        let req = SendRequest::new("agent-1", "hello", "");
        req.emit(BackendEvent::Done);
    }
}
