//! Rebuilding interpreter state from the command log.
//!
//! An interpreter has no inspectable state, so the only way back to a
//! conversation's position is to feed a fresh process every logged command
//! in order. Outputs of all but the last replayed command are discarded.

use crate::catalog::Story;
use crate::command_log::CommandLog;
use crate::error::{BotError, BotResult};
use crate::interpreter::{Interpreter, InterpreterSpawner};
use crate::session::Session;
use std::sync::Arc;

/// A freshly spawned process brought up to the logged state.
pub struct ColdStart {
    pub process: Box<dyn Interpreter>,
    /// Banner printed before any command
    pub opening: String,
    /// Number of commands fed during replay
    pub replayed: usize,
    /// Output of the last replayed command; `None` for an empty log
    pub last_output: Option<String>,
}

/// Drives interpreters through logged and live commands.
pub struct ReplayEngine {
    spawner: Arc<dyn InterpreterSpawner>,
    log: CommandLog,
}

impl ReplayEngine {
    pub fn new(spawner: Arc<dyn InterpreterSpawner>, log: CommandLog) -> Self {
        Self { spawner, log }
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    /// Spawn a process for `story` and read its opening block.
    pub async fn spawn_fresh(&self, story: &Story) -> BotResult<(Box<dyn Interpreter>, String)> {
        let mut process = self.spawner.spawn(story).await?;
        match process.read_block().await {
            Ok(opening) => Ok((process, opening)),
            Err(e) => {
                process.terminate().await;
                Err(escalate(story, e))
            }
        }
    }

    /// Spawn a process and replay the whole log for the pair.
    ///
    /// A failure while replaying is reported as a spawn failure; the
    /// half-replayed process is terminated.
    pub async fn cold_start(&self, conversation_id: &str, story: &Story) -> BotResult<ColdStart> {
        let commands = self.log.read_all(conversation_id, story).await?;
        let (mut process, opening) = self.spawn_fresh(story).await?;

        match replay(&mut *process, &commands).await {
            Ok(last_output) => {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    story = %story.abbrev,
                    replayed = commands.len(),
                    "Cold start complete"
                );
                Ok(ColdStart {
                    process,
                    opening,
                    replayed: commands.len(),
                    last_output,
                })
            }
            Err(e) => {
                process.terminate().await;
                Err(escalate(story, e))
            }
        }
    }

    /// Explicit load: cold-start the selected story and attach the process.
    ///
    /// Returns the output of the last logged command.
    pub async fn restore(&self, session: &mut Session) -> BotResult<String> {
        let story = session.selected_story().ok_or(BotError::NoStorySelected)?;
        let conversation_id = session.conversation_id().to_string();
        let cold = self.cold_start(&conversation_id, &story).await?;

        session.attach_process(cold.process).await;
        cold.last_output.ok_or(BotError::NothingToLoad)
    }

    /// Run one live gameplay command and return its output.
    ///
    /// The command is logged before it reaches the interpreter. If the
    /// interpreter fails, it is respawned once with a full replay, which
    /// includes the command just logged.
    pub async fn play(&self, session: &mut Session, command: &str) -> BotResult<String> {
        let story = session.selected_story().ok_or(BotError::NoStorySelected)?;
        let conversation_id = session.conversation_id().to_string();

        let mut process = match session.take_process() {
            Some(process) => process,
            None => {
                let cold = self.cold_start(&conversation_id, &story).await?;
                tracing::info!(
                    conversation_id = %conversation_id,
                    story = %story.abbrev,
                    replayed = cold.replayed,
                    "Interpreter respawned lazily"
                );
                cold.process
            }
        };

        if let Err(e) = self.log.append(&conversation_id, &story, command).await {
            session.attach_process(process).await;
            return Err(e);
        }

        match exchange(&mut *process, command).await {
            Ok(output) => {
                session.attach_process(process).await;
                Ok(output)
            }
            Err(e) if e.is_process_failure() => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    story = %story.abbrev,
                    error = %e,
                    "Interpreter failed, respawning with replay"
                );
                process.terminate().await;

                let cold = self.cold_start(&conversation_id, &story).await?;
                session.attach_process(cold.process).await;
                Ok(cold.last_output.unwrap_or_default())
            }
            Err(e) => {
                process.terminate().await;
                Err(e)
            }
        }
    }
}

async fn exchange(process: &mut dyn Interpreter, command: &str) -> BotResult<String> {
    process.send_line(command).await?;
    process.read_block().await
}

/// Feed every command, keeping only the last output.
async fn replay(process: &mut dyn Interpreter, commands: &[String]) -> BotResult<Option<String>> {
    let Some((last, earlier)) = commands.split_last() else {
        return Ok(None);
    };

    for command in earlier {
        exchange(process, command).await?;
    }

    exchange(process, last).await.map(Some)
}

fn escalate(story: &Story, error: BotError) -> BotError {
    if error.is_process_failure() {
        BotError::Spawn {
            path: story.path.clone(),
            reason: format!("interpreter failed during startup: {error}"),
        }
    } else {
        error
    }
}
