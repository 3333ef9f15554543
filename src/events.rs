//! Consensus-result event bus and the per-task event log (SPEC_FULL §12).
//!
//! `ConsensusEvent` is what the engine publishes when a proposal finishes,
//! one way or another, for a local party. The task-event log
//! (`proto::TaskEvent`) is the separate record echoed back to a task's
//! sender when one of its remote partners terminates early, grounded on
//! `evengine`/`GetTaskEventList` in the original scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::ids::{PartyId, ProposalId, TaskId};
use crate::state_machine::AbortReason;
use crate::types::{TaskEvent, TaskOrg};

#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusEvent {
    ProposalFinished {
        proposal_id: ProposalId,
        task_id: TaskId,
        party_id: PartyId,
    },
    ProposalAborted {
        proposal_id: ProposalId,
        task_id: TaskId,
        party_id: PartyId,
        reason: AbortReason,
    },
    ProposalDeadlineExceeded {
        proposal_id: ProposalId,
        task_id: TaskId,
        party_id: PartyId,
    },
    /// A `TaskResult` echoed back from a partner that terminated early
    /// (spec §12) arrived for a task this identity owns.
    TaskResultReceived {
        proposal_id: ProposalId,
        task_id: TaskId,
        owner: TaskOrg,
        events: Vec<TaskEvent>,
    },
}

/// Broadcasts consensus outcomes to anything watching the engine — a CLI
/// progress bar, a metrics exporter, an integration test. Implement this
/// to plug in your own fan-out (message queue, webhooks); the default
/// `BroadcastEventBus` uses Tokio's broadcast channel.
pub trait ConsensusEventBus: Clone + Send + Sync + 'static {
    type Receiver;

    fn subscribe(&self) -> Self::Receiver;
    fn publish(&self, event: ConsensusEvent);
}

#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<ConsensusEvent>,
}

impl BroadcastEventBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ConsensusEventBus for BroadcastEventBus {
    type Receiver = broadcast::Receiver<ConsensusEvent>;

    fn subscribe(&self) -> Self::Receiver {
        self.sender.subscribe()
    }

    fn publish(&self, event: ConsensusEvent) {
        let _ = self.sender.send(event);
    }
}

/// In-memory per-`(task_id, party_id)` event log, grounded on
/// `storeTaskEvent`/`resourcedb.go`'s task-result storage in the original
/// scheduler. The deadline/abort path appends to it before interrupting the
/// local task; a non-sender party drains it into the `TaskResult` echoed
/// back to the task's owner.
#[derive(Clone, Default)]
pub struct TaskEventLog {
    entries: Arc<Mutex<HashMap<(TaskId, PartyId), Vec<TaskEvent>>>>,
}

impl TaskEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, task_id: &TaskId, party_id: &PartyId, event: TaskEvent) {
        self.entries
            .lock()
            .entry((task_id.clone(), party_id.clone()))
            .or_default()
            .push(event);
    }

    /// Remove and return every event recorded for `(task_id, party_id)`.
    pub fn drain(&self, task_id: &TaskId, party_id: &PartyId) -> Vec<TaskEvent> {
        self.entries
            .lock()
            .remove(&(task_id.clone(), party_id.clone()))
            .unwrap_or_default()
    }
}
