//! z5bot: play Z-machine text adventures through a chat transport.
//!
//! Each conversation gets its own interpreter process. Every command is
//! appended to a durable log first, so a conversation's game can be rebuilt
//! by replay after the interpreter (or the whole bot) restarts.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod broadcast;
pub mod catalog;
pub mod command_log;
pub mod dispatch;
pub mod error;
pub mod interpreter;
pub mod replay;
pub mod router;
pub mod session;

pub use broadcast::{BroadcastGate, BroadcastReport, Broadcaster};
pub use catalog::{Catalog, Story};
pub use command_log::{CommandLog, LogStore, MemoryLogStore, RedisLogStore};
pub use dispatch::spawn_processor;
pub use error::{BotError, BotResult};
pub use interpreter::{DfrotzSpawner, Interpreter, InterpreterSpawner};
pub use replay::{ColdStart, ReplayEngine};
pub use router::{Command, CommandRouter};
pub use session::{Session, SessionStore};

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;
use z5_channels::{Channel, CliChannel, TelegramChannel};
use z5_common::{Config, LogStoreKind, TransportKind};

/// Inbound queue depth between the transport and the dispatcher.
const INBOUND_QUEUE: usize = 256;

/// Build every component from `config` and serve until the transport ends
/// or Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let catalog = Arc::new(Catalog::load(&config.stories)?);
    tracing::info!(stories = catalog.len(), "Catalog loaded");

    let store: Arc<dyn LogStore> = match config.log_store {
        LogStoreKind::Redis => {
            let url = config.redis.url()?;
            let store = RedisLogStore::connect(&url)
                .await
                .with_context(|| {
                    format!(
                        "cannot connect to redis at {}:{}",
                        config.redis.host, config.redis.port
                    )
                })?;
            store.ping().await.context("redis did not answer PING")?;
            tracing::info!(
                host = %config.redis.host,
                port = config.redis.port,
                db = config.redis.db,
                "Connected to redis"
            );
            Arc::new(store)
        }
        LogStoreKind::Memory => {
            tracing::warn!("Using in-memory command log; progress is lost on exit");
            Arc::new(MemoryLogStore::new())
        }
    };
    let log = CommandLog::new(store);

    let spawner = Arc::new(DfrotzSpawner::from_config(&config.interpreter));
    let engine = ReplayEngine::new(spawner, log.clone());

    let channel: Arc<dyn Channel> = match config.transport {
        TransportKind::Telegram => {
            let mut telegram =
                TelegramChannel::new(config.api_key.clone(), config.allowed_users.clone());
            telegram.init().await.context("Telegram initialization failed")?;
            Arc::new(telegram)
        }
        TransportKind::Cli => Arc::new(CliChannel::new()),
    };

    if config.broadcast.enabled {
        tracing::info!("Broadcasting is available! Send /broadcast.");
    }
    let broadcaster = Arc::new(Broadcaster::new(&config.broadcast, log, channel.clone()));

    let sessions = Arc::new(SessionStore::new());
    let router = Arc::new(CommandRouter::new(
        catalog,
        sessions.clone(),
        engine,
        channel.clone(),
        broadcaster,
    ));

    let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
    let processor = spawn_processor(router, rx);

    let listener_channel = channel.clone();
    let mut listener = tokio::spawn(async move { listener_channel.listen(tx).await });
    let listener_abort = listener.abort_handle();

    tracing::info!(transport = %channel.name(), "z5bot is running");

    tokio::select! {
        result = &mut listener => match result {
            Ok(Ok(())) => tracing::info!("Transport finished"),
            Ok(Err(e)) => tracing::error!(error = %e, "Transport failed"),
            Err(e) => tracing::error!(error = %e, "Transport task crashed"),
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            listener_abort.abort();
        }
    }

    // The listener owned the only sender, so the dispatcher drains and stops.
    if let Err(e) = processor.await {
        tracing::error!(error = %e, "Dispatcher crashed");
    }

    sessions.shutdown().await;
    if let Err(e) = channel.shutdown().await {
        tracing::warn!(error = %e, "Transport shutdown failed");
    }

    tracing::info!("z5bot stopped");
    Ok(())
}
