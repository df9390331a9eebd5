//! Session limits and timeouts

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds for one pipeline session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Candidates a refine loop may produce before giving up
    pub max_attempts: u32,
    /// Clarifying rounds before scope gathering gives up
    pub max_scope_rounds: u32,
    /// Planning passes before the session gives up
    pub max_iterations: u32,
    pub generator_timeout_ms: u64,
    pub human_timeout_ms: u64,
    pub tool_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_scope_rounds: 5,
            max_iterations: 20,
            generator_timeout_ms: 120_000,
            human_timeout_ms: 600_000,
            tool_timeout_ms: 300_000,
        }
    }
}

impl SessionConfig {
    pub fn generator_timeout(&self) -> Duration {
        Duration::from_millis(self.generator_timeout_ms)
    }

    pub fn human_timeout(&self) -> Duration {
        Duration::from_millis(self.human_timeout_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.max_iterations, 20);
        assert_eq!(config.generator_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: SessionConfig = serde_yaml::from_str("max_attempts: 2\ntool_timeout_ms: 50\n").unwrap();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.tool_timeout(), Duration::from_millis(50));
        assert_eq!(config.max_scope_rounds, 5);
    }
}
