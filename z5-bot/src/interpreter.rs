//! Interpreter processes.
//!
//! The replay engine only sees the [`Interpreter`] and [`InterpreterSpawner`]
//! traits. [`DfrotzSpawner`] is the production implementation, driving a
//! `dfrotz` child over its stdin/stdout.

use crate::catalog::Story;
use crate::error::{BotError, BotResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;
use z5_common::InterpreterConfig;

/// A live interpreter: one line in, one block of text out.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Write one command line.
    async fn send_line(&mut self, text: &str) -> BotResult<()>;

    /// Read the next complete output block.
    async fn read_block(&mut self) -> BotResult<String>;

    /// Stop the process. Best-effort, never fails.
    async fn terminate(&mut self);
}

/// Starts interpreter processes for stories.
#[async_trait]
pub trait InterpreterSpawner: Send + Sync {
    async fn spawn(&self, story: &Story) -> BotResult<Box<dyn Interpreter>>;
}

/// Spawns `dfrotz` (or a compatible dumb-terminal interpreter).
#[derive(Debug, Clone)]
pub struct DfrotzSpawner {
    binary: PathBuf,
    args: Vec<String>,
    read_timeout: Duration,
    quiet_period: Duration,
}

impl DfrotzSpawner {
    pub fn new(binary: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
            read_timeout: Duration::from_secs(10),
            quiet_period: Duration::from_millis(300),
        }
    }

    pub fn from_config(config: &InterpreterConfig) -> Self {
        Self::new(config.resolved_binary(), config.args.clone()).with_timeouts(
            Duration::from_millis(config.read_timeout_ms),
            Duration::from_millis(config.quiet_period_ms),
        )
    }

    /// Override the read bound and the silence that ends an output block.
    pub fn with_timeouts(mut self, read_timeout: Duration, quiet_period: Duration) -> Self {
        self.read_timeout = read_timeout;
        self.quiet_period = quiet_period;
        self
    }
}

#[async_trait]
impl InterpreterSpawner for DfrotzSpawner {
    async fn spawn(&self, story: &Story) -> BotResult<Box<dyn Interpreter>> {
        if let Err(e) = tokio::fs::metadata(&story.path).await {
            return Err(BotError::Spawn {
                path: story.path.clone(),
                reason: format!("story file unavailable: {e}"),
            });
        }

        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .arg(&story.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BotError::Spawn {
                path: story.path.clone(),
                reason: format!("cannot start {}: {e}", self.binary.display()),
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(BotError::Spawn {
                path: story.path.clone(),
                reason: "interpreter pipes unavailable".to_string(),
            });
        };

        tracing::debug!(
            story = %story.abbrev,
            pid = ?child.id(),
            "Interpreter process started"
        );

        Ok(Box::new(DfrotzProcess {
            child,
            stdin,
            stdout,
            read_timeout: self.read_timeout,
            quiet_period: self.quiet_period,
        }))
    }
}

/// A running dfrotz child.
pub struct DfrotzProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    read_timeout: Duration,
    quiet_period: Duration,
}

#[async_trait]
impl Interpreter for DfrotzProcess {
    async fn send_line(&mut self, text: &str) -> BotResult<()> {
        let line = format!("{text}\r\n");
        let read_timeout = self.read_timeout;
        let stdin = &mut self.stdin;
        let write = async move {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        };

        match tokio::time::timeout(read_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BotError::Process(format!("write failed: {e}"))),
            Err(_) => Err(BotError::ProcessTimeout(read_timeout)),
        }
    }

    async fn read_block(&mut self) -> BotResult<String> {
        let deadline = Instant::now() + self.read_timeout;
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !buf.is_empty() && remaining.is_zero() {
                break;
            }
            let wait = if buf.is_empty() {
                remaining
            } else {
                self.quiet_period.min(remaining)
            };

            match tokio::time::timeout(wait, self.stdout.read(&mut chunk)).await {
                Ok(Ok(0)) if buf.is_empty() => {
                    return Err(BotError::Process("interpreter closed its output".into()));
                }
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(BotError::Process(format!("read failed: {e}"))),
                Err(_) if buf.is_empty() => {
                    return Err(BotError::ProcessTimeout(self.read_timeout));
                }
                // Quiet period elapsed: the block is complete.
                Err(_) => break,
            }
        }

        Ok(clean_output(&String::from_utf8_lossy(&buf)))
    }

    async fn terminate(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!("Interpreter already gone: {e}");
        }
    }
}

/// Strip dumb-terminal prompt noise from an output block.
pub fn clean_output(raw: &str) -> String {
    let text = raw.replace("> > ", "").replace("\n.\n", "\n\n");
    let text = text.trim_end();
    text.strip_suffix('>').unwrap_or(text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_output_strips_prompts() {
        assert_eq!(
            clean_output("West of House\nYou are standing in an open field.\n\n>"),
            "West of House\nYou are standing in an open field."
        );
        assert_eq!(clean_output("> > Taken.\n>"), "Taken.");
        assert_eq!(clean_output("Line one\n.\nLine two\n> "), "Line one\n\nLine two");
        assert_eq!(clean_output("  \n"), "");
    }

    #[tokio::test]
    async fn missing_story_file_is_spawn_error() {
        let spawner = DfrotzSpawner::new("dfrotz", vec![]);
        let story = Story::new("Zork 1", "z1", "/nonexistent/zork1.z5");

        let err = spawner.spawn(&story).await.err().unwrap();
        assert!(matches!(err, BotError::Spawn { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let asset = tempfile::NamedTempFile::new().unwrap();
        let spawner = DfrotzSpawner::new("/nonexistent/dfrotz", vec![]);
        let story = Story::new("Zork 1", "z1", asset.path());

        let err = spawner.spawn(&story).await.err().unwrap();
        assert!(matches!(err, BotError::Spawn { .. }));
    }

    #[cfg(unix)]
    fn echo_spawner(script: &str) -> DfrotzSpawner {
        DfrotzSpawner::new("sh", vec!["-c".into(), script.into(), "fake-dfrotz".into()])
            .with_timeouts(Duration::from_secs(5), Duration::from_millis(100))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn drives_a_line_oriented_child() {
        let asset = tempfile::NamedTempFile::new().unwrap();
        let story = Story::new("Echo", "echo", asset.path());
        let spawner = echo_spawner(
            "echo 'Welcome to Echo'; echo '>'; while read l; do echo \"You said $l\"; echo '>'; done",
        );

        let mut process = spawner.spawn(&story).await.unwrap();
        assert_eq!(process.read_block().await.unwrap(), "Welcome to Echo");

        process.send_line("look").await.unwrap();
        let reply = process.read_block().await.unwrap();
        assert!(reply.starts_with("You said look"), "{reply:?}");

        process.terminate().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exited_child_is_process_failure() {
        let asset = tempfile::NamedTempFile::new().unwrap();
        let story = Story::new("Dead", "dead", asset.path());

        let mut process = echo_spawner("exit 0").spawn(&story).await.unwrap();
        let err = process.read_block().await.unwrap_err();
        assert!(err.is_process_failure());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_child_times_out() {
        let asset = tempfile::NamedTempFile::new().unwrap();
        let story = Story::new("Mute", "mute", asset.path());
        let spawner = DfrotzSpawner::new(
            "sh",
            vec!["-c".into(), "echo hi; sleep 30".into(), "fake-dfrotz".into()],
        )
        .with_timeouts(Duration::from_millis(500), Duration::from_millis(100));

        let mut process = spawner.spawn(&story).await.unwrap();
        assert_eq!(process.read_block().await.unwrap(), "hi");

        let err = process.read_block().await.unwrap_err();
        assert!(matches!(err, BotError::ProcessTimeout(t) if t == Duration::from_millis(500)));
        assert!(err.is_process_failure());
        process.terminate().await;
    }
}
