//! Fan-out settings from the `infrastructure` section of
//! `matchday-config.yaml`.

use serde::Deserialize;

/// Broker channel and buffering for a [`ClusterFanoutAdapter`].
///
/// [`ClusterFanoutAdapter`]: crate::adapter::ClusterFanoutAdapter
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FanoutConfig {
    /// Broker channel every hub publishes to and subscribes on.
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Broadcasts queued for mirroring before new ones are dropped.
    #[serde(default = "default_publish_buffer")]
    pub publish_buffer: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            publish_buffer: default_publish_buffer(),
        }
    }
}

fn default_channel() -> String {
    String::from("matchday:broadcast")
}

const fn default_publish_buffer() -> usize {
    1_024
}
