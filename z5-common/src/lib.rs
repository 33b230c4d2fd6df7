//! Z5 Common - Shared configuration, errors and logging for z5bot.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types and context helpers
//! - Logging setup
//! - Small string utilities shared by the transport and bot crates

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub use config::{
    BroadcastConfig, Config, InterpreterConfig, LogStoreKind, ObservabilityConfig, RedisConfig,
    StoryConfig, TransportKind,
};
pub use error::{Error, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::logging::init_logging;
}
