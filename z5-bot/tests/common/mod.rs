//! Shared test doubles: a scripted interpreter and a recording transport.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use z5_bot::{
    BotError, BotResult, Broadcaster, Catalog, CommandLog, CommandRouter, Interpreter,
    InterpreterSpawner, MemoryLogStore, ReplayEngine, SessionStore, Story,
};
use z5_channels::{
    Channel, ChannelError, ChannelMessage, ChannelResult, ChannelType, OutgoingMessage,
};
use z5_common::BroadcastConfig;

pub const OPENING: &str = "Welcome to Fake Zork";

/// Output the fake game gives for the `turn`-th command.
///
/// Depends on the whole history length, so a process that missed or
/// repeated a command answers differently.
pub fn fake_output(turn: usize, command: &str) -> String {
    if command == "wait" {
        format!("[{turn}] Time passes. Press return to continue.")
    } else {
        format!("[{turn}] {command}")
    }
}

#[derive(Default)]
struct SpawnerState {
    alive: Vec<Arc<AtomicBool>>,
    stalled: Vec<Arc<AtomicBool>>,
    transcripts: Vec<Vec<String>>,
    terminated: usize,
    fail_spawns: bool,
}

/// Spawns scripted in-memory interpreters and records what they were fed.
#[derive(Default)]
pub struct FakeSpawner {
    state: Arc<Mutex<SpawnerState>>,
}

impl FakeSpawner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().alive.len()
    }

    /// Commands fed to the `index`-th spawned process.
    pub fn transcript(&self, index: usize) -> Vec<String> {
        self.state.lock().unwrap().transcripts[index].clone()
    }

    pub fn live_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .alive
            .iter()
            .filter(|a| a.load(Ordering::SeqCst))
            .count()
    }

    pub fn terminated(&self) -> usize {
        self.state.lock().unwrap().terminated
    }

    /// Simulate every interpreter dying behind the bot's back.
    pub fn kill_all(&self) {
        for alive in &self.state.lock().unwrap().alive {
            alive.store(false, Ordering::SeqCst);
        }
    }

    /// Make every running interpreter go silent: it accepts input but
    /// never answers.
    pub fn stall_all(&self) {
        for stalled in &self.state.lock().unwrap().stalled {
            stalled.store(true, Ordering::SeqCst);
        }
    }

    pub fn fail_spawns(&self, fail: bool) {
        self.state.lock().unwrap().fail_spawns = fail;
    }
}

#[async_trait]
impl InterpreterSpawner for FakeSpawner {
    async fn spawn(&self, story: &Story) -> BotResult<Box<dyn Interpreter>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_spawns {
            return Err(BotError::Spawn {
                path: story.path.clone(),
                reason: "story file unavailable".into(),
            });
        }

        let alive = Arc::new(AtomicBool::new(true));
        let index = state.alive.len();
        let stalled = Arc::new(AtomicBool::new(false));
        state.alive.push(alive.clone());
        state.stalled.push(stalled.clone());
        state.transcripts.push(Vec::new());

        Ok(Box::new(FakeProcess {
            index,
            alive,
            stalled,
            turns: 0,
            pending: Some(OPENING.to_string()),
            state: self.state.clone(),
        }))
    }
}

struct FakeProcess {
    index: usize,
    alive: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
    turns: usize,
    pending: Option<String>,
    state: Arc<Mutex<SpawnerState>>,
}

#[async_trait]
impl Interpreter for FakeProcess {
    async fn send_line(&mut self, text: &str) -> BotResult<()> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(BotError::Process("broken pipe".into()));
        }
        self.turns += 1;
        self.pending = Some(fake_output(self.turns, text));
        self.state.lock().unwrap().transcripts[self.index].push(text.to_string());
        Ok(())
    }

    async fn read_block(&mut self) -> BotResult<String> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(BotError::Process("interpreter closed its output".into()));
        }
        if self.stalled.load(Ordering::SeqCst) {
            return Err(BotError::ProcessTimeout(Duration::from_millis(50)));
        }
        self.pending
            .take()
            .ok_or_else(|| BotError::Process("nothing to read".into()))
    }

    async fn terminate(&mut self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.state.lock().unwrap().terminated += 1;
        }
    }
}

/// Transport that records every send.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
    unreachable: Mutex<HashSet<String>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_unreachable(&self, conversation_id: &str) {
        self.unreachable
            .lock()
            .unwrap()
            .insert(conversation_id.to_string());
    }

    /// Texts sent to `conversation_id` since the last call.
    pub fn take(&self, conversation_id: &str) -> Vec<String> {
        let mut sent = self.sent.lock().unwrap();
        let (mine, rest): (Vec<_>, Vec<_>) = sent
            .drain(..)
            .partition(|(conv, _)| conv == conversation_id);
        *sent = rest;
        mine.into_iter().map(|(_, text)| text).collect()
    }

    pub fn total_sent(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Telegram
    }

    async fn init(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        if self.unreachable.lock().unwrap().contains(&message.channel_id) {
            return Err(ChannelError::Unreachable("bot was blocked by the user".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((message.channel_id, message.text));
        Ok("1".into())
    }

    async fn listen(&self, _tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}

pub fn zork_catalog() -> Catalog {
    Catalog::from_stories(vec![
        Story::new("Zork 1", "z1", "stories/zork1.z5"),
        Story::new("Zork 2", "z2", "stories/zork2.z5"),
    ])
    .unwrap()
}

pub fn memory_log() -> CommandLog {
    CommandLog::new(Arc::new(MemoryLogStore::new()))
}

/// A router wired to fakes.
pub struct Harness {
    pub router: Arc<CommandRouter>,
    pub spawner: Arc<FakeSpawner>,
    pub channel: Arc<RecordingChannel>,
    pub log: CommandLog,
    pub sessions: Arc<SessionStore>,
    pub broadcaster: Arc<Broadcaster>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_broadcast(false, None)
    }

    pub fn with_broadcast(enabled: bool, notice_file: Option<PathBuf>) -> Self {
        let spawner = FakeSpawner::new();
        let channel = RecordingChannel::new();
        let log = memory_log();
        let sessions = Arc::new(SessionStore::new());

        let broadcast = BroadcastConfig {
            enabled,
            notice_file,
            pacing_ms: 0,
        };
        let broadcaster = Arc::new(Broadcaster::new(&broadcast, log.clone(), channel.clone()));

        let router = Arc::new(CommandRouter::new(
            Arc::new(zork_catalog()),
            sessions.clone(),
            ReplayEngine::new(spawner.clone(), log.clone()),
            channel.clone(),
            broadcaster.clone(),
        ));

        Self {
            router,
            spawner,
            channel,
            log,
            sessions,
            broadcaster,
        }
    }

    /// Deliver `text` from `conversation_id` and return the replies.
    pub async fn say(&self, conversation_id: &str, text: &str) -> Vec<String> {
        let msg = ChannelMessage::text(ChannelType::Telegram, conversation_id, "1001", text)
            .with_sender_name("Ada");
        self.router.handle(&msg).await;
        self.channel.take(conversation_id)
    }

    pub async fn log_for(&self, conversation_id: &str, abbrev: &str) -> Vec<String> {
        let story = zork_catalog().by_abbrev(abbrev).unwrap();
        self.log.read_all(conversation_id, &story).await.unwrap()
    }
}
