//! Integration seams (spec §6): everything the engine needs from the host
//! process but does not implement itself — sending bytes to a remote node,
//! checking/reserving local resources, and handing a consensus-reached task
//! off to execution. Each trait has a simple in-memory double for tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::ConsensusError;
use crate::ids::{NodeId, PartyId, TaskId};
use crate::protos::consensus::v1 as proto;
use crate::types::{ConfirmTaskPeerInfo, TaskOrg};

/// Sends wire messages to a remote node. The engine calls one of these
/// methods per partner per phase; implementations decide how `TaskOrg` maps
/// onto an actual network address (libp2p peer id, gRPC endpoint, etc).
pub trait Transport: Clone + Send + Sync + 'static {
    fn send_prepare(
        &self,
        to: &TaskOrg,
        msg: proto::Prepare,
    ) -> impl Future<Output = Result<(), ConsensusError>> + Send;

    fn send_prepare_vote(
        &self,
        to: &TaskOrg,
        msg: proto::PrepareVote,
    ) -> impl Future<Output = Result<(), ConsensusError>> + Send;

    fn send_confirm(
        &self,
        to: &TaskOrg,
        msg: proto::Confirm,
    ) -> impl Future<Output = Result<(), ConsensusError>> + Send;

    fn send_confirm_vote(
        &self,
        to: &TaskOrg,
        msg: proto::ConfirmVote,
    ) -> impl Future<Output = Result<(), ConsensusError>> + Send;

    fn send_commit(
        &self,
        to: &TaskOrg,
        msg: proto::Commit,
    ) -> impl Future<Output = Result<(), ConsensusError>> + Send;

    fn send_task_result(
        &self,
        to: &TaskOrg,
        msg: proto::TaskResult,
    ) -> impl Future<Output = Result<(), ConsensusError>> + Send;
}

/// Local resource gate consulted before a party votes Yes on Prepare, and
/// released once a task finishes or is interrupted (spec §4.5 step 2,
/// §4.4's deadline path — grounded on `ReleaseLocalResourceWithTask` in the
/// original task scheduler).
pub trait ResourceManager: Clone + Send + Sync + 'static {
    fn try_reserve(
        &self,
        task_id: &TaskId,
        party_id: &PartyId,
    ) -> impl Future<Output = Result<bool, ConsensusError>> + Send;

    fn release(
        &self,
        task_id: &TaskId,
        party_id: &PartyId,
    ) -> impl Future<Output = Result<(), ConsensusError>> + Send;
}

/// Hands a task to the execution layer once consensus has been reached, or
/// tells it to stop if the proposal was interrupted mid-flight.
pub trait TaskDriver: Clone + Send + Sync + 'static {
    fn drive_task(
        &self,
        task_id: &TaskId,
        party_id: &PartyId,
        peers: ConfirmTaskPeerInfo,
    ) -> impl Future<Output = Result<(), ConsensusError>> + Send;

    fn interrupt_task(
        &self,
        task_id: &TaskId,
        party_id: &PartyId,
        reason: String,
    ) -> impl Future<Output = Result<(), ConsensusError>> + Send;
}

/// In-process transport for tests with more than one engine instance in
/// the same binary: each node registers an inbound channel keyed by its
/// `NodeId`, and sends deliver directly onto that channel.
#[derive(Clone, Default)]
pub struct ChannelTransport {
    routes: Arc<Mutex<HashMap<Vec<u8>, mpsc::UnboundedSender<InboundMessage>>>>,
}

#[derive(Debug)]
pub enum InboundMessage {
    Prepare(proto::Prepare),
    PrepareVote(proto::PrepareVote),
    Confirm(proto::Confirm),
    ConfirmVote(proto::ConfirmVote),
    Commit(proto::Commit),
    TaskResult(proto::TaskResult),
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node_id: NodeId) -> mpsc::UnboundedReceiver<InboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().insert(node_id.0, tx);
        rx
    }

    fn route(&self, to: &TaskOrg, msg: InboundMessage) -> Result<(), ConsensusError> {
        let routes = self.routes.lock();
        let tx = routes
            .get(&to.node_id.0)
            .ok_or_else(|| ConsensusError::PeerResolution(to.node_id.clone()))?;
        tx.send(msg)
            .map_err(|_| ConsensusError::PeerResolution(to.node_id.clone()))
    }
}

impl Transport for ChannelTransport {
    async fn send_prepare(&self, to: &TaskOrg, msg: proto::Prepare) -> Result<(), ConsensusError> {
        self.route(to, InboundMessage::Prepare(msg))
    }

    async fn send_prepare_vote(
        &self,
        to: &TaskOrg,
        msg: proto::PrepareVote,
    ) -> Result<(), ConsensusError> {
        self.route(to, InboundMessage::PrepareVote(msg))
    }

    async fn send_confirm(&self, to: &TaskOrg, msg: proto::Confirm) -> Result<(), ConsensusError> {
        self.route(to, InboundMessage::Confirm(msg))
    }

    async fn send_confirm_vote(
        &self,
        to: &TaskOrg,
        msg: proto::ConfirmVote,
    ) -> Result<(), ConsensusError> {
        self.route(to, InboundMessage::ConfirmVote(msg))
    }

    async fn send_commit(&self, to: &TaskOrg, msg: proto::Commit) -> Result<(), ConsensusError> {
        self.route(to, InboundMessage::Commit(msg))
    }

    async fn send_task_result(
        &self,
        to: &TaskOrg,
        msg: proto::TaskResult,
    ) -> Result<(), ConsensusError> {
        self.route(to, InboundMessage::TaskResult(msg))
    }
}

/// Always approves and never tracks capacity. Useful for tests that only
/// care about the voting protocol, not resource accounting.
#[derive(Clone, Default)]
pub struct AlwaysApproveResourceManager;

impl ResourceManager for AlwaysApproveResourceManager {
    async fn try_reserve(&self, _task_id: &TaskId, _party_id: &PartyId) -> Result<bool, ConsensusError> {
        Ok(true)
    }

    async fn release(&self, _task_id: &TaskId, _party_id: &PartyId) -> Result<(), ConsensusError> {
        Ok(())
    }
}

/// Records drive/interrupt calls instead of actually executing anything.
#[derive(Clone, Default)]
pub struct RecordingTaskDriver {
    driven: Arc<Mutex<Vec<(TaskId, PartyId, ConfirmTaskPeerInfo)>>>,
    interrupted: Arc<Mutex<Vec<(TaskId, PartyId, String)>>>,
}

impl RecordingTaskDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driven(&self) -> Vec<(TaskId, PartyId, ConfirmTaskPeerInfo)> {
        self.driven.lock().clone()
    }

    pub fn interrupted(&self) -> Vec<(TaskId, PartyId, String)> {
        self.interrupted.lock().clone()
    }
}

impl TaskDriver for RecordingTaskDriver {
    async fn drive_task(
        &self,
        task_id: &TaskId,
        party_id: &PartyId,
        peers: ConfirmTaskPeerInfo,
    ) -> Result<(), ConsensusError> {
        self.driven
            .lock()
            .push((task_id.clone(), party_id.clone(), peers));
        Ok(())
    }

    async fn interrupt_task(
        &self,
        task_id: &TaskId,
        party_id: &PartyId,
        reason: String,
    ) -> Result<(), ConsensusError> {
        self.interrupted
            .lock()
            .push((task_id.clone(), party_id.clone(), reason));
        Ok(())
    }
}
