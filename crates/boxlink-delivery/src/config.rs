//! # Delivery Configuration
//!
//! Configuration management for the delivery engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BOXLINK_SESSION_TOKEN=9f1c...                                      │
//! │     BOXLINK_WEBSOCKET_URL=wss://relay.example.com/bus                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/boxlink/boxlink.toml (Linux)                             │
//! │     ~/Library/Application Support/com.boxlink.boxlink/boxlink.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     generated session token, 1s debounce, codes 000/001                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [session]
//! token = "550e8400-e29b-41d4-a716-446655440000"
//!
//! [transport]
//! websocket_url = "wss://relay.example.com/bus"
//! reply_timeout_ms = 30000
//! longpolling_retry_after_ms = 60000
//! # delivery_timeout_ms = 120000
//!
//! [queue]
//! debounce_ms = 1000
//! recoverable_codes = ["000", "001"]
//! blackbox_box = 3
//! blackbox_device = "fiscal_data_module"
//!
//! [[boxes]]
//! id = 3
//! name = "Counter"
//! network_address = "192.168.1.40:8069"
//! identity = "iot-box-counter"
//! ```

use boxlink_core::validation::{
    validate_device_id, validate_identity, validate_network_address, validate_session_token,
};
use boxlink_core::{BoxId, RecoverableCodes, ResolvedBox};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DeliveryError, DeliveryResult};

// =============================================================================
// Session
// =============================================================================

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Session token; scopes the durable queue key (`pos_bb_queue_<token>`)
    /// and identifies this client to long-polling boxes.
    #[serde(default = "generate_token")]
    pub token: String,

    /// SQLite database path. `None` uses the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            token: generate_token(),
            database_path: None,
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Relay bus URL for the websocket transport. `None` disables it.
    #[serde(default)]
    pub websocket_url: Option<String>,

    /// Scheme used to reach boxes directly (`http` or `https`).
    #[serde(default = "default_longpolling_scheme")]
    pub longpolling_scheme: String,

    /// Timeout for opening a connection (relay or box).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// How long each transport waits for a reply once a message was sent.
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_ms: u64,

    /// Optional bound the orchestrator puts on top of the transports' own.
    /// Unset by default.
    #[serde(default)]
    pub delivery_timeout_ms: Option<u64>,

    /// How long long-polling is skipped after it failed to send.
    #[serde(default = "default_longpolling_retry_after")]
    pub longpolling_retry_after_ms: u64,

    /// Server-side hold time of one long-poll request.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
}

fn default_longpolling_scheme() -> String {
    "http".to_string()
}
fn default_connect_timeout() -> u64 {
    5_000
}
fn default_reply_timeout() -> u64 {
    30_000
}
fn default_longpolling_retry_after() -> u64 {
    60_000
}
fn default_poll_timeout() -> u64 {
    25_000
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings {
            websocket_url: None,
            longpolling_scheme: default_longpolling_scheme(),
            connect_timeout_ms: default_connect_timeout(),
            reply_timeout_ms: default_reply_timeout(),
            delivery_timeout_ms: None,
            longpolling_retry_after_ms: default_longpolling_retry_after(),
            poll_timeout_ms: default_poll_timeout(),
        }
    }
}

impl TransportSettings {
    /// Connection timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reply timeout as a Duration.
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Orchestrator-level bound, if configured.
    pub fn delivery_timeout(&self) -> Option<Duration> {
        self.delivery_timeout_ms.map(Duration::from_millis)
    }

    /// Long-polling skip window as a Duration.
    pub fn longpolling_retry_after(&self) -> Duration {
        Duration::from_millis(self.longpolling_retry_after_ms)
    }

    /// Long-poll hold time as a Duration.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

// =============================================================================
// Queue
// =============================================================================

/// Blackbox queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Quiet period before a debounced flush.
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Response-code prefixes that do not fail a flush.
    #[serde(default)]
    pub recoverable_codes: RecoverableCodes,

    /// Box hosting the fiscal blackbox.
    #[serde(default)]
    pub blackbox_box: Option<i64>,

    /// Device id of the blackbox on that box.
    #[serde(default)]
    pub blackbox_device: Option<String>,
}

fn default_debounce() -> u64 {
    1_000
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            debounce_ms: default_debounce(),
            recoverable_codes: RecoverableCodes::default(),
            blackbox_box: None,
            blackbox_device: None,
        }
    }
}

impl QueueSettings {
    /// Debounce period as a Duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Returns the blackbox target when both box and device are configured.
    pub fn blackbox_target(&self) -> Option<(BoxId, &str)> {
        match (self.blackbox_box, self.blackbox_device.as_deref()) {
            (Some(id), Some(device)) => Some((BoxId::new(id), device)),
            _ => None,
        }
    }
}

// =============================================================================
// Static Boxes
// =============================================================================

/// One `[[boxes]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxEntry {
    /// Box record id.
    pub id: i64,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// `host[:port]` the box answers on.
    pub network_address: String,

    /// Identity used by the websocket relay and WebRTC.
    pub identity: String,
}

impl BoxEntry {
    /// Converts the entry to a directory record.
    pub fn to_resolved(&self) -> ResolvedBox {
        ResolvedBox::new(
            BoxId::new(self.id),
            self.network_address.clone(),
            self.identity.clone(),
        )
    }
}

// =============================================================================
// Main Delivery Configuration
// =============================================================================

/// Complete delivery configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Session settings.
    #[serde(default)]
    pub session: SessionSettings,

    /// Transport settings.
    #[serde(default)]
    pub transport: TransportSettings,

    /// Blackbox queue settings.
    #[serde(default)]
    pub queue: QueueSettings,

    /// Statically known boxes.
    #[serde(default)]
    pub boxes: Vec<BoxEntry>,
}

impl DeliveryConfig {
    /// Creates a new config with defaults and a generated session token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (boxlink.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DeliveryResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading delivery config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load delivery config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> DeliveryResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DeliveryError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DeliveryError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| DeliveryError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Delivery config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DeliveryResult<()> {
        validate_session_token(&self.session.token)
            .map_err(|e| DeliveryError::InvalidConfig(e.to_string()))?;

        if let Some(ref url) = self.transport.websocket_url {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(DeliveryError::InvalidConfig(format!(
                    "websocket_url must start with ws:// or wss://, got: {}",
                    url
                )));
            }
            url::Url::parse(url)?;
        }

        if !matches!(self.transport.longpolling_scheme.as_str(), "http" | "https") {
            return Err(DeliveryError::InvalidConfig(format!(
                "longpolling_scheme must be http or https, got: {}",
                self.transport.longpolling_scheme
            )));
        }

        if self.transport.reply_timeout_ms == 0
            || self.transport.connect_timeout_ms == 0
            || self.transport.delivery_timeout_ms == Some(0)
        {
            return Err(DeliveryError::InvalidConfig(
                "timeouts must be greater than 0".into(),
            ));
        }

        if let Some(ref device) = self.queue.blackbox_device {
            validate_device_id(device).map_err(|e| DeliveryError::InvalidConfig(e.to_string()))?;
        }

        let mut seen = std::collections::HashSet::new();
        for entry in &self.boxes {
            if !seen.insert(entry.id) {
                return Err(DeliveryError::InvalidConfig(format!(
                    "box {} is listed twice",
                    entry.id
                )));
            }
            validate_network_address(&entry.network_address)
                .and_then(|_| validate_identity(&entry.identity))
                .map_err(|e| DeliveryError::InvalidConfig(format!("box {}: {}", entry.id, e)))?;
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("BOXLINK_SESSION_TOKEN") {
            debug!("Overriding session token from environment");
            self.session.token = token;
        }

        if let Ok(path) = std::env::var("BOXLINK_DATABASE_PATH") {
            self.session.database_path = Some(PathBuf::from(path));
        }

        if let Ok(url) = std::env::var("BOXLINK_WEBSOCKET_URL") {
            debug!(url = %url, "Overriding websocket URL from environment");
            self.transport.websocket_url = Some(url);
        }

        if let Ok(ms) = std::env::var("BOXLINK_REPLY_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.transport.reply_timeout_ms = ms;
            }
        }

        if let Ok(ms) = std::env::var("BOXLINK_LONGPOLLING_RETRY_AFTER_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                debug!(ms, "Overriding long-polling retry window from environment");
                self.transport.longpolling_retry_after_ms = ms;
            }
        }

        if let Ok(ms) = std::env::var("BOXLINK_DEBOUNCE_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.queue.debounce_ms = ms;
            }
        }

        if let Ok(codes) = std::env::var("BOXLINK_RECOVERABLE_CODES") {
            debug!(codes = %codes, "Overriding recoverable codes from environment");
            self.queue.recoverable_codes = parse_code_list(&codes);
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "boxlink", "boxlink")
            .map(|dirs| dirs.config_dir().join("boxlink.toml"))
    }

    /// Returns the configured database path, or the platform default.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.session.database_path.clone().or_else(|| {
            directories::ProjectDirs::from("com", "boxlink", "boxlink")
                .map(|dirs| dirs.data_dir().join("boxlink.db"))
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the session token.
    pub fn session_token(&self) -> &str {
        &self.session.token
    }

    /// Returns the websocket relay URL if configured.
    pub fn websocket_url(&self) -> Option<&str> {
        self.transport.websocket_url.as_deref()
    }

    /// Returns the static directory entries as resolved boxes.
    pub fn static_boxes(&self) -> Vec<ResolvedBox> {
        self.boxes.iter().map(BoxEntry::to_resolved).collect()
    }
}

/// Parses `"000, 001"` into a whitelist. Blank entries are skipped.
fn parse_code_list(raw: &str) -> RecoverableCodes {
    RecoverableCodes::new(
        raw.split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty()),
    )
}
