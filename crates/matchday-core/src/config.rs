//! Typed simulation settings.
//!
//! The `simulation` section of `matchday-config.yaml` deserializes into
//! [`SimulationConfig`]. Every field has a default matching the reference
//! behavior, so an empty section is valid.

use std::time::Duration;

use serde::Deserialize;

/// Errors raised when settings are out of range.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A value is outside its allowed range.
    #[error("invalid simulation config: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

/// Match simulation parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Probability that an event fires in a given minute.
    #[serde(default = "default_event_probability")]
    pub event_probability: f64,

    /// Probability that a shot becomes a goal.
    #[serde(default = "default_goal_probability")]
    pub goal_probability: f64,

    /// Probability that a foul draws a booking.
    #[serde(default = "default_card_probability")]
    pub card_probability: f64,

    /// Lower bound of the per-minute strength band.
    #[serde(default = "default_strength_floor")]
    pub strength_floor: f64,

    /// Upper bound of the per-minute strength band.
    #[serde(default = "default_strength_ceiling")]
    pub strength_ceiling: f64,

    /// Completed passes shared between both teams per minute.
    #[serde(default = "default_passes_per_minute")]
    pub passes_per_minute: u32,

    /// Wall-clock pause between minutes in paced mode, in milliseconds.
    #[serde(default = "default_minute_interval_ms")]
    pub minute_interval_ms: u64,

    /// Capacity of the per-match outbound update queue.
    #[serde(default = "default_update_buffer")]
    pub update_buffer: usize,

    /// Fixed RNG seed; `None` seeds every match from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            event_probability: default_event_probability(),
            goal_probability: default_goal_probability(),
            card_probability: default_card_probability(),
            strength_floor: default_strength_floor(),
            strength_ceiling: default_strength_ceiling(),
            passes_per_minute: default_passes_per_minute(),
            minute_interval_ms: default_minute_interval_ms(),
            update_buffer: default_update_buffer(),
            seed: None,
        }
    }
}

const fn default_event_probability() -> f64 {
    0.3
}
const fn default_goal_probability() -> f64 {
    0.15
}
const fn default_card_probability() -> f64 {
    0.1
}
const fn default_strength_floor() -> f64 {
    0.5
}
const fn default_strength_ceiling() -> f64 {
    1.0
}
const fn default_passes_per_minute() -> u32 {
    10
}
const fn default_minute_interval_ms() -> u64 {
    1_000
}
const fn default_update_buffer() -> usize {
    128
}

impl SimulationConfig {
    /// Pause between minutes in paced mode.
    pub const fn minute_interval(&self) -> Duration {
        Duration::from_millis(self.minute_interval_ms)
    }

    /// Check that probabilities and the strength band are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, p) in [
            ("event_probability", self.event_probability),
            ("goal_probability", self.goal_probability),
            ("card_probability", self.card_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid {
                    reason: format!("{name} must be within 0.0..=1.0, got {p}"),
                });
            }
        }
        if self.strength_floor <= 0.0 || self.strength_floor > self.strength_ceiling {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "strength band must satisfy 0 < floor <= ceiling, got {}..{}",
                    self.strength_floor, self.strength_ceiling
                ),
            });
        }
        if self.update_buffer == 0 {
            return Err(ConfigError::Invalid {
                reason: "update_buffer must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}
