//! Top-level entry point: wires the WAL, state store, monitor, and
//! coordinator together and runs recovery before accepting any calls
//! (spec §4.8). Mirrors the shape of the teacher's `ConsensusService` +
//! `ConsensusServiceAPI`, collapsed onto a single coordinator rather than
//! split across a service struct and an API trait.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::EpochConfig;
use crate::coordinator::Coordinator;
use crate::error::ConsensusError;
use crate::events::ConsensusEventBus;
use crate::external::{ResourceManager, TaskDriver, Transport};
use crate::ids::{ProposalId, TaskId};
use crate::monitor::Monitor;
use crate::protos::consensus::v1 as proto;
use crate::state_store::StateStore;
use crate::stats::EngineStats;
use crate::types::{Proposal, TaskOrg, TaskPartners};
use crate::wal::Wal;

pub struct ConsensusEngine<W: Wal, T: Transport, R: ResourceManager, D: TaskDriver, E: ConsensusEventBus> {
    coordinator: Arc<Coordinator<W, T, R, D, E>>,
    monitor_task: JoinHandle<()>,
}

impl<W: Wal, T: Transport, R: ResourceManager, D: TaskDriver, E: ConsensusEventBus> Drop for ConsensusEngine<W, T, R, D, E> {
    fn drop(&mut self) {
        self.monitor_task.abort();
    }
}

impl<W: Wal, T: Transport, R: ResourceManager, D: TaskDriver, E: ConsensusEventBus> ConsensusEngine<W, T, R, D, E> {
    /// Open the engine against an existing WAL: replays persisted state,
    /// re-arms the deadline monitor for everything still in flight, and
    /// starts the monitor's background driver task.
    pub async fn open(
        wal: W,
        epoch_config: EpochConfig,
        transport: T,
        resources: R,
        driver: D,
        events: E,
    ) -> Result<Self, ConsensusError> {
        epoch_config.validate()?;
        let state = StateStore::new(wal);
        let monitor = Monitor::new();
        crate::recovery::recover(&state, &epoch_config, &monitor).await?;

        let coordinator = Arc::new(Coordinator::new(
            state,
            epoch_config,
            transport,
            resources,
            driver,
            events,
            monitor.clone(),
        ));

        let driver_coordinator = coordinator.clone();
        let monitor_task = tokio::spawn(async move {
            monitor
                .run(move |key| {
                    let coordinator = driver_coordinator.clone();
                    async move { coordinator.on_deadline(key).await }
                })
                .await;
        });

        Ok(Self { coordinator, monitor_task })
    }

    pub async fn propose(
        &self,
        task_id: TaskId,
        sender_org: TaskOrg,
        partners: TaskPartners,
        task_payload: Vec<u8>,
        deadline_duration_ms: Option<u64>,
    ) -> Result<ProposalId, ConsensusError> {
        self.coordinator
            .propose(task_id, sender_org, partners, task_payload, deadline_duration_ms)
            .await
    }

    pub async fn handle_prepare(&self, msg: proto::Prepare, local_party: TaskOrg) -> Result<(), ConsensusError> {
        self.coordinator.on_prepare(msg, local_party).await
    }

    pub async fn handle_prepare_vote(&self, msg: proto::PrepareVote) -> Result<(), ConsensusError> {
        self.coordinator.on_prepare_vote(msg).await
    }

    pub async fn handle_confirm(&self, msg: proto::Confirm, local_party: TaskOrg) -> Result<(), ConsensusError> {
        self.coordinator.on_confirm(msg, local_party).await
    }

    pub async fn handle_confirm_vote(&self, msg: proto::ConfirmVote) -> Result<(), ConsensusError> {
        self.coordinator.on_confirm_vote(msg).await
    }

    pub async fn handle_commit(&self, msg: proto::Commit, local_party: TaskOrg) -> Result<(), ConsensusError> {
        self.coordinator.on_commit(msg, local_party).await
    }

    pub async fn handle_task_result(&self, msg: proto::TaskResult) -> Result<(), ConsensusError> {
        self.coordinator.on_task_result(msg).await
    }

    pub fn get_proposal(&self, id: ProposalId) -> Option<Proposal> {
        self.coordinator.state.get_proposal(id)
    }

    pub fn subscribe(&self) -> E::Receiver {
        self.coordinator.events.subscribe()
    }

    pub fn stats(&self) -> EngineStats {
        self.coordinator.stats()
    }
}
