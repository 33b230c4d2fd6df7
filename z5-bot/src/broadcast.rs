//! One-shot administrative broadcast.
//!
//! The notice goes to every conversation with a recorded log, at most once
//! per process lifetime, and only when broadcasting was enabled at startup.

use crate::command_log::CommandLog;
use crate::error::{BotError, BotResult};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use z5_channels::Channel;
use z5_common::BroadcastConfig;

/// Process-lifetime guard for the broadcast.
#[derive(Debug)]
pub struct BroadcastGate {
    enabled: bool,
    fired: AtomicBool,
}

impl BroadcastGate {
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled,
            fired: AtomicBool::new(false),
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Claim the single broadcast. Only one caller ever wins.
    pub fn try_claim(&self) -> bool {
        self.enabled
            && self
                .fired
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Give the claim back after a pass that never started sending.
    pub fn release(&self) {
        self.fired.store(false, Ordering::Release);
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Outcome of a broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Sends the notice file to every known conversation.
pub struct Broadcaster {
    gate: BroadcastGate,
    log: CommandLog,
    channel: Arc<dyn Channel>,
    notice_file: Option<PathBuf>,
    pacing: Duration,
}

impl Broadcaster {
    pub fn new(config: &BroadcastConfig, log: CommandLog, channel: Arc<dyn Channel>) -> Self {
        Self {
            gate: BroadcastGate::new(config.enabled),
            log,
            channel,
            notice_file: config.notice_file.clone(),
            pacing: Duration::from_millis(config.pacing_ms),
        }
    }

    pub fn gate(&self) -> &BroadcastGate {
        &self.gate
    }

    /// Run the broadcast if the gate allows it.
    ///
    /// Returns `None` when disabled or already fired. Individual delivery
    /// failures are logged and counted, never returned.
    pub async fn run(&self) -> BotResult<Option<BroadcastReport>> {
        if !self.gate.try_claim() {
            tracing::debug!(
                enabled = self.gate.is_enabled(),
                "Broadcast ignored"
            );
            return Ok(None);
        }

        let (notice, recipients) = match self.prepare().await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.gate.release();
                return Err(e);
            }
        };

        tracing::info!(recipients = recipients.len(), "Broadcasting notice");

        let mut report = BroadcastReport::default();
        for (i, conversation_id) in recipients.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            match self.channel.send_text(conversation_id, &notice).await {
                Ok(_) => report.delivered += 1,
                Err(e) => {
                    let err = BotError::UnreachableRecipient(e.to_string());
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        permanent = e.is_permanent(),
                        error = %err,
                        "Skipping broadcast recipient"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast finished"
        );
        Ok(Some(report))
    }

    async fn prepare(&self) -> BotResult<(String, BTreeSet<String>)> {
        let path = self
            .notice_file
            .as_ref()
            .ok_or_else(|| BotError::Configuration("no broadcast notice file".into()))?;

        let notice = tokio::fs::read_to_string(path).await.map_err(|e| {
            BotError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let notice = notice.trim().to_string();
        if notice.is_empty() {
            return Err(BotError::Configuration(format!(
                "broadcast notice {} is empty",
                path.display()
            )));
        }

        let recipients = self.log.conversations().await?;
        Ok((notice, recipients))
    }
}
