//! Shared fixtures for the end-to-end consensus tests: a tiny two-process
//! simulation built on `ChannelTransport`, since the engine's own loopback
//! path only covers same-identity partners.

use std::sync::Arc;
use std::time::Duration;

use twopc_consensus::config::EpochConfig;
use twopc_consensus::engine::ConsensusEngine;
use twopc_consensus::error::ConsensusError;
use twopc_consensus::events::BroadcastEventBus;
use twopc_consensus::external::{AlwaysApproveResourceManager, ChannelTransport, InboundMessage, RecordingTaskDriver, ResourceManager, TaskDriver};
use twopc_consensus::ids::{IdentityId, NodeId, PartyId, TaskId};
use twopc_consensus::types::TaskOrg;
use twopc_consensus::wal::InMemoryWal;

pub type ApprovingEngine = ConsensusEngine<InMemoryWal, ChannelTransport, AlwaysApproveResourceManager, RecordingTaskDriver, BroadcastEventBus>;
pub type RefusingEngine = ConsensusEngine<InMemoryWal, ChannelTransport, AlwaysRefuseResourceManager, RecordingTaskDriver, BroadcastEventBus>;

pub fn org(identity: &str, party: &str, node: &str) -> TaskOrg {
    TaskOrg {
        identity_id: IdentityId(identity.as_bytes().to_vec()),
        party_id: PartyId(party.as_bytes().to_vec()),
        node_id: NodeId(node.as_bytes().to_vec()),
        node_name: node.to_string(),
    }
}

pub fn task_id(s: &str) -> TaskId {
    let mut buf = vec![0u8; twopc_consensus::ids::TASK_ID_WIRE_LEN];
    let bytes = s.as_bytes();
    let n = bytes.len().min(buf.len());
    buf[..n].copy_from_slice(&bytes[..n]);
    TaskId(buf)
}

/// Never reserves local capacity. Used to make a partner vote No on Prepare.
#[derive(Clone, Default)]
pub struct AlwaysRefuseResourceManager;

impl ResourceManager for AlwaysRefuseResourceManager {
    async fn try_reserve(&self, _task_id: &TaskId, _party_id: &PartyId) -> Result<bool, ConsensusError> {
        Ok(false)
    }

    async fn release(&self, _task_id: &TaskId, _party_id: &PartyId) -> Result<(), ConsensusError> {
        Ok(())
    }
}

pub async fn approving_engine(transport: ChannelTransport, config: EpochConfig) -> (Arc<ApprovingEngine>, RecordingTaskDriver) {
    let driver = RecordingTaskDriver::new();
    let engine = ConsensusEngine::open(
        InMemoryWal::new(),
        config,
        transport,
        AlwaysApproveResourceManager,
        driver.clone(),
        BroadcastEventBus::default(),
    )
    .await
    .expect("engine opens");
    (Arc::new(engine), driver)
}

pub async fn refusing_engine(transport: ChannelTransport, config: EpochConfig) -> (Arc<RefusingEngine>, RecordingTaskDriver) {
    let driver = RecordingTaskDriver::new();
    let engine = ConsensusEngine::open(
        InMemoryWal::new(),
        config,
        transport,
        AlwaysRefuseResourceManager,
        driver.clone(),
        BroadcastEventBus::default(),
    )
    .await
    .expect("engine opens");
    (Arc::new(engine), driver)
}

/// Drains one node's inbound channel forever, dispatching each message to
/// `engine` as if it had arrived over the wire for `local`.
pub fn spawn_pump<W, T, R, D, E>(
    engine: Arc<ConsensusEngine<W, T, R, D, E>>,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<InboundMessage>,
    local: TaskOrg,
) -> tokio::task::JoinHandle<()>
where
    W: twopc_consensus::wal::Wal,
    T: twopc_consensus::external::Transport,
    R: ResourceManager,
    D: TaskDriver,
    E: twopc_consensus::events::ConsensusEventBus,
{
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let _ = match msg {
                InboundMessage::Prepare(m) => engine.handle_prepare(m, local.clone()).await,
                InboundMessage::PrepareVote(m) => engine.handle_prepare_vote(m).await,
                InboundMessage::Confirm(m) => engine.handle_confirm(m, local.clone()).await,
                InboundMessage::ConfirmVote(m) => engine.handle_confirm_vote(m).await,
                InboundMessage::Commit(m) => engine.handle_commit(m, local.clone()).await,
                InboundMessage::TaskResult(m) => engine.handle_task_result(m).await,
            };
        }
    })
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
