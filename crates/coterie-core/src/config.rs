//! Coordinator configuration

use serde::{Deserialize, Serialize};

/// Runtime knobs for the collaboration coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Backend used by agents with no explicit backend assignment
    #[serde(default = "default_backend")]
    pub default_backend: String,

    /// Per-dispatch timeout in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,

    /// Completed collaboration tasks kept in memory
    #[serde(default = "default_task_retention")]
    pub task_retention: usize,
}

fn default_backend() -> String {
    "claude-cli".to_string()
}

fn default_call_timeout() -> u64 {
    300
}

fn default_task_retention() -> usize {
    50
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_backend: default_backend(),
            call_timeout_seconds: default_call_timeout(),
            task_retention: default_task_retention(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.default_backend, "claude-cli");
        assert_eq!(config.call_timeout_seconds, 300);
        assert_eq!(config.task_retention, 50);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"call_timeout_seconds": 60}"#).unwrap();
        assert_eq!(config.call_timeout_seconds, 60);
        assert_eq!(config.default_backend, "claude-cli");
        assert_eq!(config.task_retention, 50);
    }
}
