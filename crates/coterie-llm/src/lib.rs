//! Coterie LLM - Agent Transport Backends
//!
//! This crate provides the transport layer for Coterie agents:
//! - Backend: the uniform `send a prompt, get a reply` contract
//! - Claude CLI: subprocess backend driving the `claude` command-line
//!   tool and parsing its newline-delimited JSON event stream
//! - Anthropic: streaming Messages API backend (SSE delta decode)
//! - Credentials: injected credential provider abstraction

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anthropic;
pub mod backend;
pub mod claude_cli;
pub mod credentials;
pub mod error;
pub mod message;
pub mod util;

pub use backend::{AgentBackend, BackendEvent, SendRequest};
pub use credentials::{CredentialProvider, EnvCredentialProvider, MemoryCredentialProvider};
pub use error::{Error, Result};
pub use message::{Message, MessageRole};

// Re-export backend implementations
pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use claude_cli::{ClaudeCliBackend, ClaudeCliConfig};
