//! Chat transports for z5bot.
//!
//! This crate provides the channel adapters the bot talks through:
//! - Telegram (Bot API long polling)
//! - CLI (stdin/stdout, for local play)

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod cli;
pub mod message;
pub mod telegram;
pub mod traits;

pub use cli::{CliChannel, CLI_CONVERSATION_ID};
pub use message::{ChannelMessage, ChannelType, OutgoingMessage};
pub use telegram::{TelegramChannel, TELEGRAM_API_BASE};
pub use traits::{Channel, ChannelError, ChannelResult};
