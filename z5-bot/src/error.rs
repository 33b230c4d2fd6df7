//! Error taxonomy for the bot core.

use std::path::PathBuf;
use std::time::Duration;

/// Result type for bot operations.
pub type BotResult<T> = Result<T, BotError>;

/// Generic notice shown when a request fails for reasons the user cannot fix.
pub const GENERIC_FAILURE_NOTICE: &str = "Sorry, something went wrong. Please try again later.";

/// Errors raised while handling a conversation.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Invalid startup configuration; fatal.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown story code: {0}")]
    UnknownStoryCode(String),

    #[error("No story selected")]
    NoStorySelected,

    #[error("There is no progress to load")]
    NothingToLoad,

    #[error("There is no progress to clear")]
    NothingToClear,

    /// The interpreter could not be started, or could not be brought back
    /// to the logged state.
    #[error("Failed to spawn interpreter for {path}: {reason}")]
    Spawn { path: PathBuf, reason: String },

    #[error("Interpreter did not respond within {0:?}")]
    ProcessTimeout(Duration),

    /// The interpreter process died or its pipes broke.
    #[error("Interpreter process failed: {0}")]
    Process(String),

    #[error("Recipient unreachable: {0}")]
    UnreachableRecipient(String),

    #[error("Command log store error: {0}")]
    Store(String),
}

impl BotError {
    /// Failures that are recovered by respawning and replaying.
    pub const fn is_process_failure(&self) -> bool {
        matches!(self, Self::ProcessTimeout(_) | Self::Process(_))
    }

    /// Text shown to the user when this error ends a request.
    pub fn user_notice(&self) -> &'static str {
        match self {
            Self::NoStorySelected => "You have to select a game first.",
            Self::NothingToLoad => "There is no progress to load.",
            Self::NothingToClear => "There is no progress to clear.",
            _ => GENERIC_FAILURE_NOTICE,
        }
    }
}

impl From<redis::RedisError> for BotError {
    fn from(e: redis::RedisError) -> Self {
        Self::Store(e.to_string())
    }
}
