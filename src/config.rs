//! Connection settings for the game server console.
//!
//! Settings come from a TOML file, the `RCON_HOST`, `RCON_PORT` and
//! `RCON_PASSWORD` environment variables, or both (the environment wins).
//!
//! ```toml
//! [rcon]
//! host = "203.0.113.7"
//! port = 28016
//! password = "hunter2"
//!
//! [delivery]
//! grace_period_ms = 1000
//! await_greeting = false
//!
//! [kits]
//! "Wood Bundle" = "give wood 10000"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::client::{AuthTrigger, DeliveryOptions};

pub const DEFAULT_PORT: u16 = 28016;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file")]
    Parse(#[from] toml::de::Error),
    #[error("no rcon host configured (set RCON_HOST or [rcon].host)")]
    MissingHost,
    #[error("invalid rcon port: {0}")]
    InvalidPort(String),
}

/// Where to deliver to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: String,
}

impl Default for Target {
    fn default() -> Self {
        Target {
            host: String::new(),
            port: DEFAULT_PORT,
            password: String::new(),
        }
    }
}

/// Timeouts, in milliseconds so they read naturally in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    pub connect_timeout_ms: u64,
    pub auth_timeout_ms: u64,
    pub grace_period_ms: u64,
    pub await_greeting: bool,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        let options = DeliveryOptions::default();
        DeliverySettings {
            connect_timeout_ms: options.connect_timeout.as_millis() as u64,
            auth_timeout_ms: options.auth_timeout.as_millis() as u64,
            grace_period_ms: options.grace_period.as_millis() as u64,
            await_greeting: false,
        }
    }
}

impl From<&DeliverySettings> for DeliveryOptions {
    fn from(settings: &DeliverySettings) -> Self {
        DeliveryOptions {
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            auth_timeout: Duration::from_millis(settings.auth_timeout_ms),
            grace_period: Duration::from_millis(settings.grace_period_ms),
            auth_trigger: if settings.await_greeting {
                AuthTrigger::AwaitGreeting
            } else {
                AuthTrigger::Immediate
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rcon: Target,
    pub delivery: DeliverySettings,
    /// Extra or overriding kit commands, keyed by kit name.
    pub kits: BTreeMap<String, String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Config {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path`, then let the environment override it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&text)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("RCON_HOST") {
            self.rcon.host = host;
        }
        if let Some(port) = var("RCON_PORT") {
            self.rcon.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }
        if let Some(password) = var("RCON_PASSWORD") {
            self.rcon.password = password;
        }
        Ok(())
    }

    /// Check that there is somewhere to deliver to.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rcon.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.rcon.port == 0 {
            return Err(ConfigError::InvalidPort(self.rcon.port.to_string()));
        }
        Ok(())
    }

    pub fn delivery_options(&self) -> DeliveryOptions {
        DeliveryOptions::from(&self.delivery)
    }
}
