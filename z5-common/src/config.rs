//! Configuration management for z5bot.
//!
//! The bot reads a single JSON document, `config.json` in the working
//! directory unless another path is given on the command line.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (Z5BOT_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `Z5BOT_API_KEY` → api_key
//! - `Z5BOT_LOG_LEVEL` → observability.log_level
//! - `Z5BOT_REDIS_HOST` → redis.host
//! - `Z5BOT_REDIS_PASSWORD` → redis.password

use crate::error::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default configuration file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Expand `~` and environment variables in a configured path.
fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

// ============================================================================
// Transport / store selection
// ============================================================================

/// Which chat transport the bot talks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Telegram Bot API long polling
    #[default]
    Telegram,
    /// Local stdin/stdout session
    Cli,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "telegram" => Ok(Self::Telegram),
            "cli" => Ok(Self::Cli),
            other => Err(format!("unknown transport '{other}' (expected telegram or cli)")),
        }
    }
}

/// Where command logs are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogStoreKind {
    /// Redis lists (durable)
    #[default]
    Redis,
    /// Process memory (lost on restart)
    Memory,
}

// ============================================================================
// Stories
// ============================================================================

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryConfig {
    /// Display name, e.g. "Zork 1"
    pub name: String,
    /// Short routing code, e.g. "z1"
    pub abbrev: String,
    /// Path to the story file
    #[serde(alias = "path")]
    pub filename: String,
}

impl StoryConfig {
    /// Story file path with `~` and environment variables expanded.
    pub fn resolved_path(&self) -> PathBuf {
        expand_path(&self.filename)
    }
}

// ============================================================================
// Redis
// ============================================================================

/// Redis connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            password: None,
        }
    }
}

impl RedisConfig {
    /// Build a `redis://` connection URL, percent-encoding the password.
    pub fn url(&self) -> Result<String> {
        let base = format!("redis://{}:{}/{}", self.host, self.port, self.db);
        let mut url = url::Url::parse(&base)
            .map_err(|e| Error::Config(format!("invalid redis address {base}: {e}")))?;

        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|()| Error::Config("redis password cannot be set on this URL".into()))?;
        }

        Ok(url.to_string())
    }
}

fn default_redis_host() -> String {
    "localhost".into()
}

fn default_redis_port() -> u16 {
    6379
}

// ============================================================================
// Interpreter
// ============================================================================

/// How to launch the text-adventure interpreter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Interpreter executable (dfrotz)
    #[serde(default = "default_interpreter_binary")]
    pub binary: String,
    /// Extra arguments placed before the story path
    #[serde(default)]
    pub args: Vec<String>,
    /// Upper bound for a single send/read exchange
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Silence that marks the end of an output block
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            binary: default_interpreter_binary(),
            args: Vec::new(),
            read_timeout_ms: default_read_timeout_ms(),
            quiet_period_ms: default_quiet_period_ms(),
        }
    }
}

impl InterpreterConfig {
    /// Interpreter binary with `~` and environment variables expanded.
    pub fn resolved_binary(&self) -> PathBuf {
        expand_path(&self.binary)
    }
}

fn default_interpreter_binary() -> String {
    "tools/dfrotz".into()
}

fn default_read_timeout_ms() -> u64 {
    10_000
}

fn default_quiet_period_ms() -> u64 {
    300
}

// ============================================================================
// Broadcast
// ============================================================================

/// One-shot administrative broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Whether `/broadcast` does anything in this process lifetime
    #[serde(default)]
    pub enabled: bool,
    /// Text file holding the notice
    #[serde(default)]
    pub notice_file: Option<PathBuf>,
    /// Delay between two recipients
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            notice_file: None,
            pacing_ms: default_pacing_ms(),
        }
    }
}

fn default_pacing_ms() -> u64 {
    2_000
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".into()]
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Telegram bot token
    #[serde(default)]
    pub api_key: String,

    /// Telegram usernames or ids allowed to talk to the bot ("*" for everyone)
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    #[serde(default)]
    pub transport: TransportKind,

    /// Story catalog
    #[serde(default)]
    pub stories: Vec<StoryConfig>,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub log_store: LogStoreKind,

    #[serde(default)]
    pub interpreter: InterpreterConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from a specific path and apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        let mut config = Self::from_json(&content)
            .context(format!("Failed to parse config from {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a configuration document without touching the environment.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("Z5BOT_API_KEY") {
            self.api_key = key;
        }
        if let Ok(level) = std::env::var("Z5BOT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(host) = std::env::var("Z5BOT_REDIS_HOST") {
            self.redis.host = host;
        }
        if let Ok(password) = std::env::var("Z5BOT_REDIS_PASSWORD") {
            self.redis.password = Some(password);
        }
    }

    /// Enable the one-shot broadcast with the given notice file.
    pub fn enable_broadcast(&mut self, notice_file: PathBuf) {
        self.broadcast.notice_file = Some(notice_file);
        self.broadcast.enabled = true;
    }

    /// Reject configurations the bot cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.transport == TransportKind::Telegram && self.api_key.trim().is_empty() {
            return Err(Error::Config(
                "api_key is required for the telegram transport".into(),
            ));
        }

        if self.stories.is_empty() {
            return Err(Error::Config("at least one story must be configured".into()));
        }

        if self.interpreter.read_timeout_ms == 0 {
            return Err(Error::Config(
                "interpreter.read_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.broadcast.enabled && self.broadcast.notice_file.is_none() {
            return Err(Error::Config(
                "broadcast is enabled but no notice_file is set".into(),
            ));
        }

        Ok(())
    }
}
