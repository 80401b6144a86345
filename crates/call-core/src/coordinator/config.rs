//! Coordinator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the call session coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long an inbound ring waits for a decision before it is
    /// auto-declined
    pub ring_timeout: Duration,
    /// Grace period after a call ends before the session resets to idle,
    /// giving the embedder time to render the end-of-call state
    pub settle_delay: Duration,
    /// Tag attached to log records from this coordinator
    pub label: String,
    /// Capacity of the outbound event broadcast channel
    pub event_buffer: usize,
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self {
            ring_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            label: format!("tutorcall-call-core/{}", env!("CARGO_PKG_VERSION")),
            event_buffer: 64,
        }
    }

    /// Set the auto-decline window for inbound rings
    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout = timeout;
        self
    }

    /// Set the post-call settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the logging label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_windows() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.ring_timeout, Duration::from_secs(30));
        assert_eq!(config.settle_delay, Duration::from_secs(2));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = CoordinatorConfig::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let back: CoordinatorConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.ring_timeout, config.ring_timeout);
        assert_eq!(back.settle_delay, config.settle_delay);
        assert_eq!(back.label, config.label);
    }

    #[test]
    fn builder_methods_override() {
        let config = CoordinatorConfig::new()
            .with_ring_timeout(Duration::from_millis(100))
            .with_settle_delay(Duration::from_millis(20))
            .with_label("test");
        assert_eq!(config.ring_timeout, Duration::from_millis(100));
        assert_eq!(config.settle_delay, Duration::from_millis(20));
        assert_eq!(config.label, "test");
    }
}
