//! Outbound command bus: flows announce completed actions; the host decides
//! what to open or refresh. Nothing flows back in.

use serde::{Deserialize, Serialize};
use taskvox_core::TaskId;
use tokio::sync::broadcast;
use tracing::debug;

/// Signal emitted by a flow after a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowSignal {
    OpenCreatedTask { task_id: TaskId },
    TaskAccepted { task_id: TaskId },
}

/// Cloneable broadcast sender; every subscriber sees every signal.
#[derive(Debug, Clone)]
pub struct CommandBus {
    tx: broadcast::Sender<FlowSignal>,
}

impl CommandBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowSignal> {
        self.tx.subscribe()
    }

    /// Publish; a bus with no subscribers drops the signal.
    pub fn publish(&self, signal: FlowSignal) {
        match self.tx.send(signal) {
            Ok(receivers) => debug!(receivers, "flow signal published"),
            Err(broadcast::error::SendError(signal)) => {
                debug!(?signal, "flow signal dropped: no subscribers")
            }
        }
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new(16)
    }
}
