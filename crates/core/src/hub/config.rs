//! Hub configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the event fan-out hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Per-subscriber delivery queue capacity.
    /// When full, the subscriber's oldest buffered event is dropped and an
    /// overflow marker is delivered once the subscriber catches up.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,

    /// Per-topic replay buffer capacity.
    /// Subscribers reconnecting with a `since` sequence can replay missed
    /// events as long as the buffer still holds them.
    #[serde(default = "default_replay_capacity")]
    pub replay_capacity: usize,
}

fn default_subscriber_capacity() -> usize {
    256
}

fn default_replay_capacity() -> usize {
    512
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
            replay_capacity: default_replay_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.subscriber_capacity, 256);
        assert_eq!(config.replay_capacity, 512);
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            subscriber_capacity = 16
        "#;
        let config: HubConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.subscriber_capacity, 16);
        assert_eq!(config.replay_capacity, 512);
    }
}
