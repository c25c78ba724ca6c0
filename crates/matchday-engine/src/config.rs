//! Engine configuration.
//!
//! Mirrors the structure of `matchday-config.yaml`. Every section is
//! optional and every field has a default, so a missing file runs a
//! single-node engine on port 3000 with an in-process broker. Connection
//! settings can be overridden from the environment (see
//! [`InfrastructureConfig::apply_env_overrides`]).

use std::path::Path;

use matchday_core::config::SimulationConfig;
use matchday_fanout::FanoutConfig;
use matchday_hub::{HubConfig, ServerConfig};
use matchday_resilience::ResilienceConfig;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid environment variable {name}: {reason}")]
    Env {
        /// Variable name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The simulation section is out of range.
    #[error(transparent)]
    Simulation(#[from] matchday_core::config::ConfigError),

    /// A required setting is missing.
    #[error("missing setting: {0}")]
    Missing(&'static str),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MatchdayConfig {
    /// Event probabilities, strength band and pacing.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Retry and circuit breaker defaults for outbound calls.
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Socket admission and delivery.
    #[serde(default)]
    pub hub: HubConfig,

    /// Listener, node identity and broker.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,
}

impl MatchdayConfig {
    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string and apply environment overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults.
    ///
    /// Environment overrides apply in both cases.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override settings from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Override settings from `lookup`.
    ///
    /// - `REDIS_URL` -- broker URL; enables the Redis broker
    /// - `MATCHDAY_JWT_SECRET` -- bearer token secret
    /// - `MATCHDAY_PORT` -- listener port
    /// - `MATCHDAY_NODE_ID` -- node identity used to tag mirrored broadcasts
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("REDIS_URL") {
            self.infrastructure.redis_url = Some(url);
        }
        if let Some(secret) = lookup("MATCHDAY_JWT_SECRET") {
            self.hub.jwt_secret = secret;
        }
        if let Some(port) = lookup("MATCHDAY_PORT") {
            self.infrastructure.port = port.parse().map_err(|e| ConfigError::Env {
                name: "MATCHDAY_PORT",
                reason: format!("{e}"),
            })?;
        }
        if let Some(node_id) = lookup("MATCHDAY_NODE_ID") {
            self.infrastructure.node_id = node_id;
        }
        Ok(())
    }

    /// Check the settings the engine cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.simulation.validate()?;
        if self.hub.jwt_secret.is_empty() {
            return Err(ConfigError::Missing(
                "hub.jwt_secret (or MATCHDAY_JWT_SECRET)",
            ));
        }
        Ok(())
    }
}

/// Listener, node identity and broker settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP listener port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Identity of this process among its siblings. Empty means generate
    /// one at startup.
    #[serde(default)]
    pub node_id: String,

    /// Redis URL for cluster fan-out. `None` keeps broadcasts in-process.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Broker channel and buffering.
    #[serde(default)]
    pub fanout: FanoutConfig,

    /// Seed the in-memory match store with demo fixtures.
    #[serde(default = "default_demo_fixtures")]
    pub demo_fixtures: bool,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            node_id: String::new(),
            redis_url: None,
            fanout: FanoutConfig::default(),
            demo_fixtures: default_demo_fixtures(),
        }
    }
}

impl InfrastructureConfig {
    /// The configured node id, or a fresh one when none is set.
    pub fn resolved_node_id(&self) -> String {
        if self.node_id.is_empty() {
            format!("node-{}", uuid::Uuid::now_v7().simple())
        } else {
            self.node_id.clone()
        }
    }

    /// Listener address for [`matchday_hub::spawn_server`].
    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    3000
}

const fn default_demo_fixtures() -> bool {
    true
}
