//! Per-conversation message lanes.
//!
//! Messages of one conversation are handled strictly in arrival order on a
//! dedicated lane task; different conversations run in parallel.

use crate::router::CommandRouter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use z5_channels::ChannelMessage;

/// An idle lane exits after this long without messages.
const LANE_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

type Lanes = HashMap<String, mpsc::UnboundedSender<ChannelMessage>>;

/// Spawn the dispatcher. It runs until `rx` closes and every lane drained.
pub fn spawn_processor(
    router: Arc<CommandRouter>,
    mut rx: mpsc::Receiver<ChannelMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Dispatcher started");

        let mut lanes = Lanes::new();
        let mut workers = JoinSet::new();

        while let Some(message) = rx.recv().await {
            while let Some(finished) = workers.try_join_next() {
                if let Err(e) = finished {
                    tracing::error!(error = %e, "Conversation lane crashed");
                }
            }
            prune_closed(&mut lanes);

            let conversation_id = message.channel_id.clone();

            // A closed lane hands the message back; start a new one for it.
            let message = match lanes.get(&conversation_id) {
                Some(lane) => match lane.send(message) {
                    Ok(()) => continue,
                    Err(mpsc::error::SendError(message)) => message,
                },
                None => message,
            };

            let (lane, lane_rx) = mpsc::unbounded_channel();
            let _ = lane.send(message);
            workers.spawn(run_lane(router.clone(), conversation_id.clone(), lane_rx));
            lanes.insert(conversation_id, lane);
        }

        drop(lanes);
        while let Some(finished) = workers.join_next().await {
            if let Err(e) = finished {
                tracing::error!(error = %e, "Conversation lane crashed");
            }
        }

        tracing::info!("Dispatcher stopped");
    })
}

async fn run_lane(
    router: Arc<CommandRouter>,
    conversation_id: String,
    mut rx: mpsc::UnboundedReceiver<ChannelMessage>,
) {
    tracing::debug!(conversation_id = %conversation_id, "Lane opened");

    loop {
        match tokio::time::timeout(LANE_IDLE_TIMEOUT, rx.recv()).await {
            Ok(Some(message)) => router.handle(&message).await,
            Ok(None) => break,
            Err(_) => {
                // Refuse new messages, then finish whatever already queued.
                rx.close();
                while let Some(message) = rx.recv().await {
                    router.handle(&message).await;
                }
                break;
            }
        }
    }

    tracing::debug!(conversation_id = %conversation_id, "Lane closed");
}

/// Forget lanes whose task has exited.
fn prune_closed(lanes: &mut Lanes) {
    lanes.retain(|_, lane| !lane.is_closed());
}
