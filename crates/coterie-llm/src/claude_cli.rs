//! Claude CLI subprocess backend
//!
//! Drives the local `claude` command-line tool in print mode with
//! `--output-format stream-json` and parses its newline-delimited JSON
//! event stream: assistant text deltas accumulate into the reply,
//! tool-use blocks surface as progress notices, and the final `result`
//! event carries the authoritative reply text.
//!
//! Conversation continuity is kept per agent via the CLI's session id
//! (`--resume`), so concurrent sends for different agents never share
//! state.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::backend::{AgentBackend, BackendEvent, SendRequest};
use crate::error::{Error, Result};
use crate::util::truncate_safe;

/// Maximum stderr bytes carried in a `CliExit` error
const STDERR_LIMIT: usize = 500;

/// Claude CLI backend configuration
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    /// Command to execute
    pub command: String,
    /// Extra arguments appended to every invocation
    pub extra_args: Vec<String>,
    /// Environment variables (values support `${VAR}` expansion)
    pub env: HashMap<String, String>,
    /// Per-call timeout in seconds
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    300
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            extra_args: Vec::new(),
            env: HashMap::new(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl ClaudeCliConfig {
    /// Create a config for a specific executable
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = timeout.as_secs();
        self
    }
}

/// One parsed line of the CLI's stream-json output
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliEvent {
    /// Session established (session id for `--resume`)
    SessionInit(String),
    /// Assistant text block
    AssistantText(String),
    /// Tool invocation notice (tool name)
    ToolUse(String),
    /// Final result text
    ResultText(String),
    /// Anything else (ignored)
    Other,
}

/// Parse one stream-json line into an event
pub(crate) fn parse_stream_line(line: &str) -> Vec<CliEvent> {
    let Ok(json) = serde_json::from_str::<Value>(line) else {
        return vec![CliEvent::Other];
    };

    match json.get("type").and_then(Value::as_str) {
        Some("system") => {
            if json.get("subtype").and_then(Value::as_str) == Some("init") {
                if let Some(session) = json.get("session_id").and_then(Value::as_str) {
                    return vec![CliEvent::SessionInit(session.to_string())];
                }
            }
            vec![CliEvent::Other]
        }
        Some("assistant") => {
            let blocks = json
                .pointer("/message/content")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let mut events = Vec::new();
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            events.push(CliEvent::AssistantText(text.to_string()));
                        }
                    }
                    Some("tool_use") => {
                        if let Some(name) = block.get("name").and_then(Value::as_str) {
                            events.push(CliEvent::ToolUse(name.to_string()));
                        }
                    }
                    _ => {}
                }
            }
            events
        }
        Some("result") => {
            if let Some(result) = json.get("result").and_then(Value::as_str) {
                vec![CliEvent::ResultText(result.to_string())]
            } else {
                vec![CliEvent::Other]
            }
        }
        _ => vec![CliEvent::Other],
    }
}

/// Expand `${VAR}` references in an env value
fn expand_env_value(value: &str) -> String {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).unwrap_or_default()
    } else {
        value.to_string()
    }
}

/// Subprocess backend for the Claude CLI
pub struct ClaudeCliBackend {
    config: ClaudeCliConfig,
    /// Agent id -> CLI session id for conversation continuity
    sessions: DashMap<String, String>,
}

impl ClaudeCliBackend {
    /// Create a new backend
    #[must_use]
    pub fn new(config: ClaudeCliConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    /// Forget the stored CLI session for an agent
    pub fn reset_session(&self, agent_id: &str) {
        self.sessions.remove(agent_id);
    }

    fn build_command(&self, req: &SendRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.arg("--print")
            .arg("--verbose")
            .args(["--output-format", "stream-json"]);

        if !req.system.is_empty() {
            cmd.args(["--append-system-prompt", req.system]);
        }
        if let Some(model) = req.model {
            cmd.args(["--model", model]);
        }
        if !req.allowed_tools.is_empty() {
            cmd.args(["--allowedTools", &req.allowed_tools.join(",")]);
        }
        if let Some(session) = self.sessions.get(req.agent_id) {
            cmd.args(["--resume", session.value()]);
        }
        cmd.args(&self.config.extra_args);
        cmd.arg(req.prompt);

        for (key, value) in &self.config.env {
            cmd.env(key, expand_env_value(value));
        }
        // Keep the spawned CLI out of any surrounding agent session
        cmd.env_remove("CLAUDECODE");
        cmd.env_remove("CLAUDE_CODE_ENTRYPOINT");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait::async_trait]
impl AgentBackend for ClaudeCliBackend {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn is_available(&self) -> bool {
        Command::new("which")
            .arg(&self.config.command)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<String> {
        let mut cmd = self.build_command(&req);

        debug!(
            agent_id = %req.agent_id,
            command = %self.config.command,
            "Spawning Claude CLI"
        );

        let mut child = cmd.spawn().map_err(|e| Error::CliLaunch(e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::CliLaunch("stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::CliLaunch("stderr not captured".to_string()))?;

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let run = async {
            let mut accumulated = String::new();
            let mut final_text: Option<String> = None;

            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                for event in parse_stream_line(&line) {
                    match event {
                        CliEvent::SessionInit(session) => {
                            self.sessions.insert(req.agent_id.to_string(), session);
                        }
                        CliEvent::AssistantText(text) => {
                            req.emit(BackendEvent::TextDelta(text.clone()));
                            accumulated.push_str(&text);
                        }
                        CliEvent::ToolUse(name) => {
                            debug!(agent_id = %req.agent_id, tool = %name, "CLI tool in use");
                            req.emit(BackendEvent::ToolUse(name));
                        }
                        CliEvent::ResultText(result) => {
                            final_text = Some(result);
                        }
                        CliEvent::Other => {}
                    }
                }
            }

            let status = child
                .wait()
                .await
                .map_err(|e| Error::CliLaunch(e.to_string()))?;

            let mut stderr_buf = Vec::new();
            let _ = stderr.read_to_end(&mut stderr_buf).await;
            let stderr_text = String::from_utf8_lossy(&stderr_buf).trim().to_string();

            let text = final_text.unwrap_or(accumulated);
            Ok::<_, Error>((text, status, stderr_text))
        };

        let (text, status, stderr_text) = match tokio::time::timeout(timeout, run).await {
            Ok(result) => result?,
            // Early return drops the child; kill_on_drop reaps it
            Err(_) => return Err(Error::Timeout(timeout.as_millis() as u64)),
        };

        if status.success() {
            req.emit(BackendEvent::Done);
            return Ok(text);
        }

        if !text.is_empty() {
            // Non-zero exit with usable partial output is degraded success
            warn!(
                agent_id = %req.agent_id,
                code = status.code().unwrap_or(-1),
                "Claude CLI exited non-zero with partial output; returning it"
            );
            req.emit(BackendEvent::Done);
            return Ok(text);
        }

        Err(Error::CliExit {
            code: status.code().unwrap_or(-1),
            stderr: truncate_safe(&stderr_text, STDERR_LIMIT).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_init() {
        let line = r#"{"type":"system","subtype":"init","session_id":"sess-42"}"#;
        assert_eq!(
            parse_stream_line(line),
            vec![CliEvent::SessionInit("sess-42".to_string())]
        );
    }

    #[test]
    fn test_parse_assistant_text_and_tool_use() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"text","text":"working on it"},
            {"type":"tool_use","name":"Read","id":"t1","input":{}}
        ]}}"#;
        let events = parse_stream_line(line);
        assert_eq!(
            events,
            vec![
                CliEvent::AssistantText("working on it".to_string()),
                CliEvent::ToolUse("Read".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_result_line() {
        let line = r#"{"type":"result","subtype":"success","result":"final answer"}"#;
        assert_eq!(
            parse_stream_line(line),
            vec![CliEvent::ResultText("final answer".to_string())]
        );
    }

    #[test]
    fn test_parse_garbage_line() {
        assert_eq!(parse_stream_line("not json at all"), vec![CliEvent::Other]);
        assert_eq!(parse_stream_line(r#"{"type":"unknown"}"#), vec![CliEvent::Other]);
    }

    #[test]
    fn test_expand_env_value() {
        std::env::set_var("COTERIE_TEST_VAR", "expanded");
        assert_eq!(expand_env_value("${COTERIE_TEST_VAR}"), "expanded");
        assert_eq!(expand_env_value("literal"), "literal");
        assert_eq!(expand_env_value("${COTERIE_TEST_MISSING}"), "");
    }

    #[test]
    fn test_config_defaults() {
        let config = ClaudeCliConfig::default();
        assert_eq!(config.command, "claude");
        assert_eq!(config.timeout_seconds, 300);
    }

    #[test]
    fn test_session_reset() {
        let backend = ClaudeCliBackend::new(ClaudeCliConfig::default());
        backend.sessions.insert("a1".to_string(), "sess".to_string());
        backend.reset_session("a1");
        assert!(backend.sessions.get("a1").is_none());
    }
}
