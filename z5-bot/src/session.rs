//! Per-conversation session state.
//!
//! Sessions are a cache: which story a conversation is playing and the live
//! interpreter for it. The command log is the durable record.

use crate::catalog::Story;
use crate::interpreter::Interpreter;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One conversation's selected story and interpreter.
pub struct Session {
    conversation_id: String,
    selected_story: Option<Arc<Story>>,
    process: Option<Box<dyn Interpreter>>,
}

impl Session {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            selected_story: None,
            process: None,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn has_story(&self) -> bool {
        self.selected_story.is_some()
    }

    pub fn selected_story(&self) -> Option<Arc<Story>> {
        self.selected_story.clone()
    }

    pub fn has_process(&self) -> bool {
        self.process.is_some()
    }

    /// Bind the session to `story`.
    ///
    /// Switching to a different story terminates the current interpreter.
    /// The command log is left untouched.
    pub async fn select_story(&mut self, story: Arc<Story>) {
        let changed = self
            .selected_story
            .as_ref()
            .map_or(true, |current| current.abbrev != story.abbrev);

        if changed {
            self.terminate_process().await;
            self.selected_story = Some(story);
        }
    }

    /// Stop and drop the interpreter, if any.
    pub async fn terminate_process(&mut self) {
        if let Some(mut process) = self.process.take() {
            tracing::debug!(
                conversation_id = %self.conversation_id,
                "Terminating interpreter"
            );
            process.terminate().await;
        }
    }

    /// Install `process`, replacing (and terminating) any previous one.
    pub async fn attach_process(&mut self, process: Box<dyn Interpreter>) {
        self.terminate_process().await;
        self.process = Some(process);
    }

    /// Detach the interpreter so it can be driven without borrowing the session.
    pub fn take_process(&mut self) -> Option<Box<dyn Interpreter>> {
        self.process.take()
    }
}

/// All sessions, keyed by conversation id, each behind its own lock.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session for `conversation_id`, created empty on first use.
    pub fn get_or_create(&self, conversation_id: &str) -> Arc<Mutex<Session>> {
        self.sessions
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(conversation_id))))
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Terminate every live interpreter.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut stopped = 0usize;
        for session in sessions {
            let mut session = session.lock().await;
            if session.has_process() {
                session.terminate_process().await;
                stopped += 1;
            }
        }

        tracing::info!(
            sessions = self.len(),
            stopped,
            "Session store shut down"
        );
    }
}
