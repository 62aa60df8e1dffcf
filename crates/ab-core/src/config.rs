use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.auth-bridge/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load config from `~/.auth-bridge/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via
    /// type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bridge.validate()
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".auth-bridge")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Bridge settings
// ---------------------------------------------------------------------------

/// Settings for the trusted channel to the authentication authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// The single origin whose inbound messages are accepted. Compared by
    /// exact equality, so it must carry a scheme and no trailing slash.
    #[serde(default = "default_trusted_origin")]
    pub trusted_origin: String,
    /// URL the embedded bridge frame is loaded from.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    /// Root URL of the authority, used for the login redirect.
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    /// How long `init` waits for the readiness signal before giving up.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    /// Optional per-request deadline. `None` preserves the reference
    /// behavior where an unanswered request stays pending indefinitely.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Fallback `return` parameter for the login redirect when the caller
    /// does not supply one.
    #[serde(default = "default_return_url")]
    pub default_return_url: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            trusted_origin: default_trusted_origin(),
            bridge_url: default_bridge_url(),
            authority_url: default_authority_url(),
            ready_timeout_ms: default_ready_timeout_ms(),
            request_timeout_ms: None,
            default_return_url: default_return_url(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_origin("bridge.trusted_origin", &self.trusted_origin)?;
        if self.ready_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "bridge.ready_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "bridge.request_timeout_ms must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// An origin is `scheme://host[:port]` and nothing else; anything more
/// (path, query, trailing slash) would never match an inbound origin.
fn validate_origin(field: &str, origin: &str) -> Result<(), ConfigError> {
    let rest = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .ok_or_else(|| {
            ConfigError::Validation(format!("{field} must start with http:// or https://"))
        })?;
    if rest.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{field} must include a host"
        )));
    }
    if rest.contains(['/', '?', '#']) {
        return Err(ConfigError::Validation(format!(
            "{field} must be a bare origin without path, query, or trailing slash"
        )));
    }
    Ok(())
}

fn default_trusted_origin() -> String {
    "http://127.0.0.1:8420".into()
}
fn default_bridge_url() -> String {
    "http://127.0.0.1:8420/bridge".into()
}
fn default_authority_url() -> String {
    "http://127.0.0.1:8420".into()
}
fn default_ready_timeout_ms() -> u64 {
    5000
}
fn default_return_url() -> String {
    "http://127.0.0.1:3000/".into()
}

// ---------------------------------------------------------------------------
// Cache settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory the session entries are persisted under.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> String {
    "~/.auth-bridge/session".into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
