//! Command routing.
//!
//! Every inbound message is classified by its leading token and handled
//! under its conversation's session lock. Handler failures end up as a
//! notice to the user and never escape `handle`.

use crate::broadcast::Broadcaster;
use crate::catalog::Catalog;
use crate::error::{BotError, BotResult};
use crate::replay::ReplayEngine;
use crate::session::{Session, SessionStore};
use std::sync::Arc;
use z5_channels::{Channel, ChannelMessage};
use z5_common::util::truncate_with_ellipsis;

const SELECT_PROMPT: &str = "Please use the /select command to select a game.";
const RETURN_KEY_HINT: &str = "(Note: You are able to use the return key by typing /enter.)";
const DIALOG_PREVIEW_CHARS: usize = 40;

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    /// `/select`, with the normalized code if one was given
    Select(Option<String>),
    Load,
    Clear,
    Enter,
    Ping,
    Broadcast,
    /// `/i`: a comment not meant for the game
    Ignore,
    /// Anything else goes to the interpreter
    Gameplay(String),
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim_start();
        let (token, rest) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        // Telegram appends @botname in group chats.
        let token = match token.split_once('@') {
            Some((command, _)) if command.starts_with('/') => command,
            _ => token,
        };

        match token {
            "/start" => Self::Start,
            "/select" => {
                let code = rest.split_whitespace().next().map(str::to_lowercase);
                Self::Select(code)
            }
            "/load" => Self::Load,
            "/clear" => Self::Clear,
            "/enter" => Self::Enter,
            "/ping" => Self::Ping,
            "/broadcast" => Self::Broadcast,
            "/i" => Self::Ignore,
            _ => Self::Gameplay(text.trim().replace(['\r', '\n'], " ")),
        }
    }
}

/// Routes messages to handlers and sends the replies.
pub struct CommandRouter {
    catalog: Arc<Catalog>,
    sessions: Arc<SessionStore>,
    engine: ReplayEngine,
    channel: Arc<dyn Channel>,
    broadcaster: Arc<Broadcaster>,
}

impl CommandRouter {
    pub fn new(
        catalog: Arc<Catalog>,
        sessions: Arc<SessionStore>,
        engine: ReplayEngine,
        channel: Arc<dyn Channel>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            catalog,
            sessions,
            engine,
            channel,
            broadcaster,
        }
    }

    /// Handle one message end to end.
    pub async fn handle(&self, msg: &ChannelMessage) {
        let command = Command::parse(&msg.text);

        match command {
            Command::Ignore => {}
            Command::Broadcast => self.broadcast().await,
            command => {
                let session = self.sessions.get_or_create(&msg.channel_id);
                let mut session = session.lock().await;

                if let Err(e) = self.dispatch(&mut session, command, msg).await {
                    match e {
                        BotError::NoStorySelected
                        | BotError::NothingToLoad
                        | BotError::NothingToClear => {
                            tracing::debug!(conversation_id = %msg.channel_id, "{e}");
                        }
                        _ => tracing::error!(
                            conversation_id = %msg.channel_id,
                            story = ?session.selected_story().map(|s| s.abbrev.clone()),
                            error = %e,
                            "Request failed"
                        ),
                    }
                    self.reply(msg, e.user_notice()).await;
                }
            }
        }
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        command: Command,
        msg: &ChannelMessage,
    ) -> BotResult<()> {
        match command {
            Command::Start => {
                let name = msg.sender_name.as_deref().unwrap_or("there");
                self.reply(msg, &format!("Welcome, {name}!\n{SELECT_PROMPT}"))
                    .await;
                Ok(())
            }
            Command::Select(code) => self.select(session, code.as_deref(), msg).await,
            Command::Load => self.load(session, msg).await,
            Command::Clear => self.clear(session, msg).await,
            Command::Enter => {
                if session.has_story() {
                    self.play(session, "", msg).await
                } else {
                    Ok(())
                }
            }
            Command::Ping => {
                self.reply(msg, "Pong!").await;
                Ok(())
            }
            Command::Gameplay(text) => self.gameplay(session, &text, msg).await,
            Command::Broadcast | Command::Ignore => Ok(()),
        }
    }

    async fn select(
        &self,
        session: &mut Session,
        code: Option<&str>,
        msg: &ChannelMessage,
    ) -> BotResult<()> {
        let Some(story) = code.and_then(|c| self.catalog.by_abbrev(c)) else {
            if let Some(code) = code {
                tracing::debug!(
                    conversation_id = %msg.channel_id,
                    "{}",
                    BotError::UnknownStoryCode(code.to_string())
                );
            }
            self.reply(msg, &self.catalog.selection_listing()).await;
            return Ok(());
        };

        session.select_story(story.clone()).await;
        session.terminate_process().await;

        self.reply(msg, &format!("Starting \"{}\"...", story.name))
            .await;
        self.reply(msg, "Your progress will be saved automatically.")
            .await;

        let has_progress = self.engine.log().exists(&msg.channel_id, &story).await?;
        let (mut process, opening) = self.engine.spawn_fresh(&story).await?;
        self.reply(msg, &opening).await;

        if has_progress {
            process.terminate().await;
            self.reply(
                msg,
                &format!(
                    "Some progress in {} already exists. Use /load to restore it or /clear to reset your recorded actions.",
                    story.name
                ),
            )
            .await;
        } else {
            session.attach_process(process).await;
        }

        tracing::info!(
            conversation_id = %msg.channel_id,
            story = %story.abbrev,
            has_progress,
            "Story selected"
        );
        Ok(())
    }

    async fn load(&self, session: &mut Session, msg: &ChannelMessage) -> BotResult<()> {
        let story = session.selected_story().ok_or(BotError::NoStorySelected)?;
        let count = self.engine.log().length(&msg.channel_id, &story).await?;
        if count == 0 {
            return Err(BotError::NothingToLoad);
        }

        self.reply(msg, &format!("Restoring {count} messages. Please wait."))
            .await;
        let output = self.engine.restore(session).await?;
        self.reply(msg, "Done.").await;
        self.reply(msg, &output).await;
        Ok(())
    }

    async fn clear(&self, session: &mut Session, msg: &ChannelMessage) -> BotResult<()> {
        let story = session.selected_story().ok_or(BotError::NoStorySelected)?;
        let count = self.engine.log().length(&msg.channel_id, &story).await?;
        if count == 0 {
            return Err(BotError::NothingToClear);
        }

        self.reply(msg, &format!("Deleting {count} messages. Please wait."))
            .await;
        self.engine.log().clear(&msg.channel_id, &story).await?;
        session.terminate_process().await;
        self.reply(msg, "Done.").await;
        Ok(())
    }

    async fn gameplay(&self, session: &mut Session, text: &str, msg: &ChannelMessage) -> BotResult<()> {
        match text.to_lowercase().as_str() {
            "load" => {
                self.reply(msg, "Please use /load.").await;
                Ok(())
            }
            "save" => {
                self.reply(
                    msg,
                    "Your progress is being saved automatically. But /load is available.",
                )
                .await;
                Ok(())
            }
            _ if !session.has_story() => {
                self.reply(msg, SELECT_PROMPT).await;
                Ok(())
            }
            _ => self.play(session, text, msg).await,
        }
    }

    async fn play(&self, session: &mut Session, command: &str, msg: &ChannelMessage) -> BotResult<()> {
        let output = self.engine.play(session, command).await?;
        self.reply(msg, &output).await;

        let lowered = output.to_lowercase();
        if lowered.contains(" return ") || lowered.contains(" enter ") {
            self.reply(msg, RETURN_KEY_HINT).await;
        }
        Ok(())
    }

    async fn broadcast(&self) {
        match self.broadcaster.run().await {
            Ok(Some(report)) => tracing::info!(
                delivered = report.delivered,
                failed = report.failed,
                "Broadcast delivered"
            ),
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Broadcast failed"),
        }
    }

    /// Send one reply and log the exchange. Empty text is not sent.
    async fn reply(&self, msg: &ChannelMessage, text: &str) {
        if text.is_empty() {
            return;
        }

        tracing::info!(
            conversation_id = %msg.channel_id,
            sender = %msg.display_name(),
            input = %truncate_with_ellipsis(&msg.text, DIALOG_PREVIEW_CHARS),
            output = %truncate_with_ellipsis(text, DIALOG_PREVIEW_CHARS),
            "dialog"
        );

        if let Err(e) = self.channel.send_text(&msg.channel_id, text).await {
            tracing::warn!(
                conversation_id = %msg.channel_id,
                error = %e,
                "Failed to deliver reply"
            );
        }
    }
}
