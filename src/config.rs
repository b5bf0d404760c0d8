//! Runtime settings and constants
//!
//! Loads bot settings from optional config files and environment variables.
//! The access document (`config.json`) is handled separately by
//! [`crate::access_list`].

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default path of the persisted access document
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Decorative emote wrapped around public replies
pub const EMOTE: &str = "FerretLOL";

/// Maximum connection attempts per `open()` call
pub const CONNECT_MAX_RETRIES: usize = 4;
/// Initial backoff between connection attempts (milliseconds)
pub const CONNECT_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for the backoff between connection attempts (milliseconds)
pub const CONNECT_MAX_BACKOFF_MS: u64 = 8_000;

/// Bot settings loaded from config files and environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Websocket endpoint of the chat
    #[serde(default = "default_chat_url")]
    pub chat_url: String,

    /// Image lookup endpoint returning `{"url": "..."}`
    #[serde(default = "default_image_endpoint")]
    pub image_endpoint: String,

    /// URL posted by the source command
    #[serde(default = "default_source_url")]
    pub source_url: String,

    /// Identity allowed to trigger the liveness ping reply
    #[serde(default = "default_ping_trigger")]
    pub ping_trigger: String,

    /// Cooldown of the public channel
    #[serde(default = "default_public_cooldown_secs")]
    pub public_cooldown_secs: u64,

    /// Cooldown of private notices, per recipient
    #[serde(default = "default_private_cooldown_secs")]
    pub private_cooldown_secs: u64,

    /// Cooldown of private notices sent to admins
    #[serde(default = "default_admin_cooldown_secs")]
    pub admin_cooldown_secs: u64,

    /// Interval between liveness probes
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Timeout for a single image lookup
    #[serde(default = "default_image_api_timeout_secs")]
    pub image_api_timeout_secs: u64,

    /// Capacity of the inbound event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_chat_url() -> String {
    "wss://chat.destiny.gg/ws".to_string()
}

fn default_image_endpoint() -> String {
    "https://polecat.me/api/ferret".to_string()
}

fn default_source_url() -> String {
    "https://github.com/voloshink/FerretBot".to_string()
}

fn default_ping_trigger() -> String {
    "polecat".to_string()
}

const fn default_public_cooldown_secs() -> u64 {
    60
}

const fn default_private_cooldown_secs() -> u64 {
    30
}

const fn default_admin_cooldown_secs() -> u64 {
    5
}

const fn default_heartbeat_interval_secs() -> u64 {
    60
}

const fn default_image_api_timeout_secs() -> u64 {
    5
}

const fn default_event_buffer() -> usize {
    256
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chat_url: default_chat_url(),
            image_endpoint: default_image_endpoint(),
            source_url: default_source_url(),
            ping_trigger: default_ping_trigger(),
            public_cooldown_secs: default_public_cooldown_secs(),
            private_cooldown_secs: default_private_cooldown_secs(),
            admin_cooldown_secs: default_admin_cooldown_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            image_api_timeout_secs: default_image_api_timeout_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a source cannot be read or a value has the wrong type.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Cooldown of the public channel
    #[must_use]
    pub const fn public_cooldown(&self) -> Duration {
        Duration::from_secs(self.public_cooldown_secs)
    }

    /// Cooldown of per-recipient private notices
    #[must_use]
    pub const fn private_cooldown(&self) -> Duration {
        Duration::from_secs(self.private_cooldown_secs)
    }

    /// Cooldown of private notices to admins
    #[must_use]
    pub const fn admin_cooldown(&self) -> Duration {
        Duration::from_secs(self.admin_cooldown_secs)
    }

    /// Interval between liveness probes
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Timeout for a single image lookup
    #[must_use]
    pub const fn image_api_timeout(&self) -> Duration {
        Duration::from_secs(self.image_api_timeout_secs)
    }
}

/// Build the layered configuration source.
///
/// # Errors
///
/// Returns a `ConfigError` if one of the present sources is malformed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        // Eg. `FERRET__PUBLIC_COOLDOWN_SECS=30 ./ferret-bot`
        .add_source(Environment::with_prefix("FERRET").separator("__"))
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

/// Resolve the access document path from the process arguments.
///
/// The first argument after the program name wins; otherwise [`DEFAULT_CONFIG_FILE`].
#[must_use]
pub fn config_path_from_args<I>(args: I) -> String
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_defaults_without_sources() -> Result<(), Box<dyn std::error::Error>> {
        let settings = Settings::new()?;
        assert_eq!(settings.ping_trigger, "polecat");
        assert_eq!(settings.public_cooldown(), Duration::from_secs(60));
        assert_eq!(settings.private_cooldown(), Duration::from_secs(30));
        assert_eq!(settings.heartbeat_interval(), Duration::from_secs(60));
        Ok(())
    }

    #[test]
    fn test_prefixed_env_override() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("FERRET__ADMIN_COOLDOWN_SECS", "9");
        let settings = Settings::new();
        env::remove_var("FERRET__ADMIN_COOLDOWN_SECS");

        assert_eq!(settings?.admin_cooldown(), Duration::from_secs(9));
        Ok(())
    }

    #[test]
    fn test_config_path_from_args() {
        let none = vec!["ferret-bot".to_string()];
        assert_eq!(config_path_from_args(none), "config.json");

        let some = vec!["ferret-bot".to_string(), "/etc/ferret.json".to_string()];
        assert_eq!(config_path_from_args(some), "/etc/ferret.json");
    }
}
