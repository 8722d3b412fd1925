//! Credential provider abstraction
//!
//! The transports never reach into global state for secrets. A
//! `CredentialProvider` is injected at construction, so the backing
//! store (OS keychain, env vars, an in-memory double for tests) is the
//! host's choice.

use std::collections::HashMap;
use std::sync::RwLock;

/// Opaque key-value secret storage consumed by backends
///
/// Backends only need two answers: is a credential configured, and what
/// is its value.
pub trait CredentialProvider: Send + Sync {
    /// Fetch a credential by key, `None` if absent or empty
    fn get(&self, key: &str) -> Option<String>;

    /// Check whether a credential is configured
    fn is_configured(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Credential provider backed by process environment variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentialProvider;

impl CredentialProvider for EnvCredentialProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// In-memory credential provider (for tests and ephemeral sessions)
#[derive(Debug, Default)]
pub struct MemoryCredentialProvider {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialProvider {
    /// Create an empty provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a credential
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.into(), value.into());
        }
    }
}

impl CredentialProvider for MemoryCredentialProvider {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .ok()
            .and_then(|values| values.get(key).cloned())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_provider_roundtrip() {
        let provider = MemoryCredentialProvider::new();
        assert!(!provider.is_configured("API_KEY"));

        provider.set("API_KEY", "secret-123");
        assert!(provider.is_configured("API_KEY"));
        assert_eq!(provider.get("API_KEY"), Some("secret-123".to_string()));
    }

    #[test]
    fn test_empty_value_is_not_configured() {
        let provider = MemoryCredentialProvider::new();
        provider.set("API_KEY", "");
        assert!(!provider.is_configured("API_KEY"));
    }
}
