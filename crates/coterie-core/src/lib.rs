//! Coterie Core - Multi-Agent Collaboration Coordinator
//!
//! This crate owns the conversational state and routing logic for a
//! small roster of agent personas:
//!
//! ```text
//! @backend @frontend design an API and build the UI
//! ```
//!
//! Raw user text goes through the mention parser; a single match is an
//! ordinary chat turn, several matches become a collaboration task that
//! fans out concurrently to each agent's transport backend and merges
//! the replies into one deterministic transcript.
//!
//! Transports (`claude` CLI subprocess, streaming Anthropic API) live
//! in `coterie-llm` behind the `AgentBackend` trait.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod coordinator;
pub mod formatter;
pub mod mentions;
pub mod roster;
pub mod task;

pub use config::CoordinatorConfig;
pub use coordinator::CollaborationCoordinator;
pub use mentions::{parse_mentions, MentionMatch};
pub use roster::{Agent, AgentDefinition, AgentStatus, ChatMessage, ChatRole, Roster};
pub use task::{CollaborationTask, TaskStatus};

// Re-export the transport contract for hosts wiring up backends
pub use coterie_llm::{AgentBackend, BackendEvent, CredentialProvider, SendRequest};
