//! Sender- and receiver-side orchestration (spec §4.5/§4.7): the only
//! place that ties the state store, vote tallying, the state machine, the
//! transport, and the deadline monitor together. `ConsensusEngine`
//! (`engine.rs`) is a thin handle around a `Coordinator`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EpochConfig;
use crate::error::ConsensusError;
use crate::events::{ConsensusEvent, ConsensusEventBus, TaskEventLog};
use crate::external::{ResourceManager, TaskDriver, Transport};
use crate::ids::{PartyId, ProposalId, TaskId};
use crate::message::{self, is_loopback};
use crate::monitor::{DeadlineKey, Monitor};
use crate::protos::consensus::v1 as proto;
use crate::state_machine::{self, AbortReason, Transition};
use crate::state_store::StateStore;
use crate::types::{
    ConfirmTaskPeerInfo, ConfirmVote, OrgProposalState, Period, PrepareVote, Proposal, ProposalTaskDir, TaskEvent,
    TaskOrg, TaskPartners, TaskRole, VoteOption,
};
use crate::vote::{self, Tally};
use crate::wal::Wal;

#[derive(Clone)]
pub struct Coordinator<W: Wal, T: Transport, R: ResourceManager, D: TaskDriver, E: ConsensusEventBus> {
    pub state: StateStore<W>,
    pub epoch_config: EpochConfig,
    pub transport: T,
    pub resources: R,
    pub driver: D,
    pub events: E,
    pub monitor: Arc<Monitor>,
    pub task_events: TaskEventLog,
}

impl<W: Wal, T: Transport, R: ResourceManager, D: TaskDriver, E: ConsensusEventBus> Coordinator<W, T, R, D, E> {
    pub fn new(
        state: StateStore<W>,
        epoch_config: EpochConfig,
        transport: T,
        resources: R,
        driver: D,
        events: E,
        monitor: Arc<Monitor>,
    ) -> Self {
        Self {
            state,
            epoch_config,
            transport,
            resources,
            driver,
            events,
            monitor,
            task_events: TaskEventLog::new(),
        }
    }

    /// Record a task event and, if `party_id` is not the task's own sender,
    /// echo the accumulated log back to the task's owner as a `TaskResult`
    /// (spec §12, grounded on `handleInvalidProposal`'s result-file echo).
    async fn store_and_echo(
        &self,
        kind: &str,
        content: String,
        proposal_id: ProposalId,
        sender_org: &TaskOrg,
        state: &OrgProposalState,
    ) {
        let now = crate::monitor::now_ms();
        self.task_events.record(
            &state.task_id,
            &state.task_org.party_id,
            TaskEvent {
                kind: kind.to_string(),
                identity_id: state.task_org.identity_id.clone(),
                task_id: state.task_id.clone(),
                content,
                created_at: now,
            },
        );
        if state.task_dir == ProposalTaskDir::Send {
            return;
        }
        let events = self.task_events.drain(&state.task_id, &state.task_org.party_id);
        let msg = message::build_task_result(proposal_id, &state.task_id, &state.task_org, &events, now);
        if is_loopback(&state.task_org.identity_id, sender_org) {
            return; // nothing remote to echo to; the sender is this same process
        }
        if let Err(e) = self.transport.send_task_result(sender_org, msg).await {
            warn!(error = %e, "failed to echo TaskResult to task owner");
        }
    }

    fn schedule_next_milestone(&self, proposal_id: ProposalId, state: &OrgProposalState) {
        let when = match state.period {
            Period::Prepare => state.prepare_expire(&self.epoch_config).min(state.deadline_expire()),
            Period::Confirm => state.confirm_expire(&self.epoch_config).min(state.deadline_expire()),
            Period::Commit => state.commit_expire(&self.epoch_config).min(state.deadline_expire()),
            Period::Finished => state.deadline_expire(),
        };
        self.monitor.schedule(
            DeadlineKey {
                proposal_id,
                party_id: state.task_org.party_id.clone(),
            },
            when,
        );
    }

    // --- sender side: §4.7 ------------------------------------------------

    /// Create a new proposal as the task's sender and fan `Prepare` out to
    /// every nominated partner (spec §4.7 steps 1-5).
    pub async fn propose(
        &self,
        task_id: TaskId,
        sender_org: TaskOrg,
        partners: TaskPartners,
        task_payload: Vec<u8>,
        deadline_duration_ms: Option<u64>,
    ) -> Result<ProposalId, ConsensusError> {
        task_id.validate()?;
        let now = crate::monitor::now_ms();
        let deadline_duration_ms = deadline_duration_ms.unwrap_or(self.epoch_config.default_deadline_ms);
        self.epoch_config.validate_deadline(deadline_duration_ms)?;

        let proposal_id = ProposalId::derive(&sender_org.identity_id, &sender_org.party_id, &task_id, now);
        let sender_state = OrgProposalState::new(
            task_id.clone(),
            TaskRole::Sender,
            sender_org.clone(),
            now,
            now,
            deadline_duration_ms,
        );

        let mut parties = std::collections::HashMap::new();
        parties.insert(sender_org.party_id.clone(), sender_state.clone());
        let proposal = Proposal {
            id: proposal_id,
            task_id: task_id.clone(),
            sender_org: sender_org.clone(),
            partners: partners.clone(),
            parties,
        };
        self.state.store_proposal(proposal.clone()).await?;
        self.schedule_next_milestone(proposal_id, &sender_state);

        for (role, partner) in partners.all() {
            let payload = task_payload.clone();
            if is_loopback(&sender_org.identity_id, partner) {
                self.handle_prepare_local(proposal_id, task_id.clone(), sender_org.clone(), now, now, deadline_duration_ms, role, partner.clone(), payload).await?;
            } else {
                let msg = message::build_prepare(&proposal, role, partner, payload);
                if let Err(e) = self.transport.send_prepare(partner, msg).await {
                    warn!(error = %e, partner = ?partner.party_id, "failed to deliver Prepare");
                }
            }
        }
        info!(proposal = %proposal_id, task = ?task_id, "proposal created, Prepare sent to all partners");
        Ok(proposal_id)
    }

    /// Inbound `Prepare` arriving over the wire for a local partner party.
    pub async fn on_prepare(&self, msg: proto::Prepare, local_party: TaskOrg) -> Result<(), ConsensusError> {
        let opt = msg.msg_option.as_ref().ok_or(ConsensusError::MissingPeerInfo)?;
        if opt.receiver_identity_id != local_party.identity_id.0 {
            return Err(ConsensusError::WrongReceiverIdentity);
        }
        let sender_org = opt.owner.as_ref().map(message::task_org_from_proto).ok_or(ConsensusError::MissingPeerInfo)?;
        let role = proto_task_role(opt.receiver_role)?;
        self.handle_prepare_local(
            ProposalId::try_from(opt.proposal_id.as_slice())?,
            TaskId(msg.task_id.clone()),
            sender_org,
            msg.start_at,
            msg.create_at,
            msg.deadline_duration_ms,
            role,
            local_party,
            msg.task_payload.clone(),
        )
        .await
    }

    /// Shared logic for both an in-process loopback `Prepare` delivery and
    /// a parsed inbound wire `Prepare`: record the partner's own state as
    /// `Recv`, decide Yes/No via the resource manager, and vote back.
    #[allow(clippy::too_many_arguments)]
    async fn handle_prepare_local(
        &self,
        proposal_id: ProposalId,
        task_id: TaskId,
        sender_org: TaskOrg,
        start_at: u64,
        create_at: u64,
        deadline_duration_ms: u64,
        role: TaskRole,
        local_party: TaskOrg,
        _task_payload: Vec<u8>,
    ) -> Result<(), ConsensusError> {
        task_id.validate()?;
        let state = OrgProposalState::new(task_id.clone(), role, local_party.clone(), start_at, create_at, deadline_duration_ms);
        let proposal = Proposal {
            id: proposal_id,
            task_id: task_id.clone(),
            sender_org: sender_org.clone(),
            partners: TaskPartners::default(),
            parties: std::collections::HashMap::from([(local_party.party_id.clone(), state.clone())]),
        };
        self.state.store_proposal(proposal).await?;
        self.schedule_next_milestone(proposal_id, &state);

        let approved = self.resources.try_reserve(&task_id, &local_party.party_id).await?;
        let vote_option = if approved { VoteOption::Yes } else { VoteOption::No };
        let peer_info = if approved {
            Some(crate::types::PeerInfo {
                id: local_party.node_id.clone(),
                ip: String::new(),
                port: 0,
                party_id: local_party.party_id.clone(),
            })
        } else {
            None
        };
        let vote = PrepareVote {
            proposal_id,
            sender_role: role,
            sender_party_id: local_party.party_id.clone(),
            receiver_role: TaskRole::Sender,
            receiver_party_id: sender_org.party_id.clone(),
            receiver_identity_id: sender_org.identity_id.clone(),
            vote_option,
            peer_info,
            signature: Vec::new(),
            timestamp: crate::monitor::now_ms(),
        };
        let proto_vote = message::build_prepare_vote(&vote, &local_party);
        if is_loopback(&local_party.identity_id, &sender_org) {
            self.on_prepare_vote(proto_vote).await
        } else {
            self.transport.send_prepare_vote(&sender_org, proto_vote).await
        }
    }

    /// Sender receives a partner's `PrepareVote`. Tallies and, once every
    /// role clears quorum (or a partner refuses, or Prepare times out),
    /// acts via `apply_prepare_transition`.
    pub async fn on_prepare_vote(&self, msg: proto::PrepareVote) -> Result<(), ConsensusError> {
        let vote = message::parse_prepare_vote(&msg)?;
        let proposal_id = vote.proposal_id;
        let proposal = self.state.get_proposal(proposal_id).ok_or(ConsensusError::UnknownProposal(proposal_id))?;
        vote::validate_partner(&proposal.partners, &vote.sender_party_id, vote.sender_role, &proposal.task_id)?;
        self.state.record_prepare_vote(proposal_id, vote)?;

        let votes = self.state.prepare_votes(proposal_id);
        let tally = vote::tally_prepare_votes(&proposal.partners, &votes);
        self.apply_prepare_transition(&proposal, tally, false).await
    }

    async fn apply_prepare_transition(&self, proposal: &Proposal, tally: Tally, at_deadline: bool) -> Result<(), ConsensusError> {
        let sender_party_id = &proposal.sender_org.party_id;
        let transition = state_machine::evaluate(&tally, &self.epoch_config.quorum, at_deadline);
        match transition {
            Transition::Wait => Ok(()),
            Transition::Abort(reason) => {
                self.abort_proposal(proposal.id, &proposal.task_id, sender_party_id, reason, &proposal.sender_org).await
            }
            Transition::Advance => {
                let votes = self.state.prepare_votes(proposal.id);
                let peers = vote::build_confirm_peer_info(&votes);
                self.state.set_confirm_peer_info(proposal.id, peers.clone());
                let updated = self
                    .state
                    .update_party_state(proposal.id, sender_party_id, |s| {
                        s.advance();
                    })
                    .await?;
                self.schedule_next_milestone(proposal.id, &updated);

                for (role, partner) in proposal.partners.all() {
                    let msg = message::build_confirm(proposal, role, partner, &peers);
                    if is_loopback(&proposal.sender_org.identity_id, partner) {
                        self.handle_confirm_local(proposal.id, proposal.sender_org.clone(), peers.clone(), updated.start_at, partner.clone()).await?;
                    } else if let Err(e) = self.transport.send_confirm(partner, msg).await {
                        warn!(error = %e, partner = ?partner.party_id, "failed to deliver Confirm");
                    }
                }
                info!(proposal = %proposal.id, "Prepare passed, Confirm sent");
                Ok(())
            }
        }
    }

    // --- confirm phase: §4.5/§4.4 -----------------------------------------

    pub async fn on_confirm(&self, msg: proto::Confirm, local_party: TaskOrg) -> Result<(), ConsensusError> {
        let opt = msg.msg_option.as_ref().ok_or(ConsensusError::MissingPeerInfo)?;
        if opt.receiver_identity_id != local_party.identity_id.0 {
            return Err(ConsensusError::WrongReceiverIdentity);
        }
        let (proposal_id, sender_org, peers, start_at) = message::parse_confirm(&msg)?;
        self.handle_confirm_local(proposal_id, sender_org, peers, start_at, local_party).await
    }

    async fn handle_confirm_local(
        &self,
        proposal_id: ProposalId,
        sender_org: TaskOrg,
        peers: ConfirmTaskPeerInfo,
        start_at: u64,
        local_party: TaskOrg,
    ) -> Result<(), ConsensusError> {
        self.state.set_confirm_peer_info(proposal_id, peers);
        let updated = self
            .state
            .update_party_state(proposal_id, &local_party.party_id, |s| {
                s.advance();
                s.start_at = start_at;
            })
            .await?;
        self.schedule_next_milestone(proposal_id, &updated);

        let vote = ConfirmVote {
            proposal_id,
            sender_role: updated.task_role,
            sender_party_id: local_party.party_id.clone(),
            receiver_role: TaskRole::Sender,
            receiver_party_id: sender_org.party_id.clone(),
            receiver_identity_id: sender_org.identity_id.clone(),
            vote_option: VoteOption::Yes,
            signature: Vec::new(),
            timestamp: crate::monitor::now_ms(),
        };
        let proto_vote = message::build_confirm_vote(&vote, &local_party);
        if is_loopback(&local_party.identity_id, &sender_org) {
            self.on_confirm_vote(proto_vote).await
        } else {
            self.transport.send_confirm_vote(&sender_org, proto_vote).await
        }
    }

    pub async fn on_confirm_vote(&self, msg: proto::ConfirmVote) -> Result<(), ConsensusError> {
        let vote = message::parse_confirm_vote(&msg)?;
        let proposal_id = vote.proposal_id;
        let proposal = self.state.get_proposal(proposal_id).ok_or(ConsensusError::UnknownProposal(proposal_id))?;
        vote::validate_partner(&proposal.partners, &vote.sender_party_id, vote.sender_role, &proposal.task_id)?;
        self.state.record_confirm_vote(proposal_id, vote)?;

        let votes = self.state.confirm_votes(proposal_id);
        let tally = vote::tally_confirm_votes(&proposal.partners, &votes);
        let transition = state_machine::evaluate(&tally, &self.epoch_config.quorum, false);
        match transition {
            Transition::Wait => Ok(()),
            Transition::Abort(reason) => {
                self.abort_proposal(proposal_id, &proposal.task_id, &proposal.sender_org.party_id, reason, &proposal.sender_org).await
            }
            Transition::Advance => self.send_commit(&proposal).await,
        }
    }

    /// Send `Commit` to every partner and arm this party's own commit-epoch
    /// deadline. The transition to `Period::Finished` — and `finish_party` —
    /// only happens once that deadline elapses in `on_deadline` (spec §3/§4.4:
    /// Commit is purely time-driven, there's no vote that ends it early).
    async fn send_commit(&self, proposal: &Proposal) -> Result<(), ConsensusError> {
        let sender_party_id = &proposal.sender_org.party_id;
        let updated = self
            .state
            .update_party_state(proposal.id, sender_party_id, |s| {
                s.advance();
            })
            .await?;
        self.schedule_next_milestone(proposal.id, &updated);

        for (_role, partner) in proposal.partners.all() {
            let msg = message::build_commit(proposal, TaskRole::Receiver, partner);
            if is_loopback(&proposal.sender_org.identity_id, partner) {
                self.handle_commit_local(proposal.id, partner.clone()).await?;
            } else if let Err(e) = self.transport.send_commit(partner, msg).await {
                warn!(error = %e, partner = ?partner.party_id, "failed to deliver Commit");
            }
        }
        Ok(())
    }

    pub async fn on_commit(&self, msg: proto::Commit, local_party: TaskOrg) -> Result<(), ConsensusError> {
        let opt = msg.msg_option.as_ref().ok_or(ConsensusError::MissingPeerInfo)?;
        if opt.receiver_identity_id != local_party.identity_id.0 {
            return Err(ConsensusError::WrongReceiverIdentity);
        }
        let proposal_id = ProposalId::try_from(opt.proposal_id.as_slice())?;
        self.handle_commit_local(proposal_id, local_party).await
    }

    /// Arm this party's commit-epoch deadline. `Period::Finished` and
    /// `finish_party` only happen once that deadline elapses (`on_deadline`).
    async fn handle_commit_local(&self, proposal_id: ProposalId, local_party: TaskOrg) -> Result<(), ConsensusError> {
        let updated = self
            .state
            .update_party_state(proposal_id, &local_party.party_id, |s| {
                s.advance();
            })
            .await?;
        self.schedule_next_milestone(proposal_id, &updated);
        Ok(())
    }

    async fn finish_party(&self, proposal_id: ProposalId, task_id: &TaskId, party_id: &PartyId, _partners: TaskPartners) -> Result<(), ConsensusError> {
        let peers = self.state.confirm_peer_info(proposal_id).unwrap_or_default();
        self.driver.drive_task(task_id, party_id, peers).await?;
        self.events.publish(ConsensusEvent::ProposalFinished {
            proposal_id,
            task_id: task_id.clone(),
            party_id: party_id.clone(),
        });
        self.state.remove_party(proposal_id, party_id).await?;
        Ok(())
    }

    /// Inbound `TaskResult` echoed back from a partner that terminated early
    /// (spec §12) — surfaced to whatever is watching `ConsensusEventBus`
    /// rather than silently dropped.
    pub async fn on_task_result(&self, msg: proto::TaskResult) -> Result<(), ConsensusError> {
        let (proposal_id, task_id, owner, events) = message::parse_task_result(&msg)?;
        self.events.publish(ConsensusEvent::TaskResultReceived {
            proposal_id,
            task_id,
            owner,
            events,
        });
        Ok(())
    }

    // --- abort / deadline handling: §4.4, grounded on handleInvalidProposal ----

    async fn abort_proposal(
        &self,
        proposal_id: ProposalId,
        task_id: &TaskId,
        party_id: &PartyId,
        reason: AbortReason,
        sender_org: &TaskOrg,
    ) -> Result<(), ConsensusError> {
        let state = self.state.get_party_state(proposal_id, party_id);
        self.resources.release(task_id, party_id).await?;
        // Sender and partner both report the interruption the same way: to
        // whatever is waiting locally on this party's outcome (the
        // scheduler for a Send-direction sender, the task owner over the
        // wire for a Recv-direction partner — `TaskDriver::interrupt_task`
        // abstracts over both, spec §4.4).
        if let Some(state) = &state {
            self.store_and_echo(&format!("{reason:?}"), format!("{reason:?}"), proposal_id, sender_org, state)
                .await;
        }
        self.driver.interrupt_task(task_id, party_id, format!("{reason:?}")).await?;
        self.events.publish(ConsensusEvent::ProposalAborted {
            proposal_id,
            task_id: task_id.clone(),
            party_id: party_id.clone(),
            reason,
        });
        self.state.remove_party(proposal_id, party_id).await?;
        Ok(())
    }

    /// Called by the monitor driver loop when a scheduled milestone
    /// elapses. Distinguishes the hard deadline from a regular epoch
    /// timeout, grounded on `refreshProposalState`/`handleInvalidProposal`.
    pub async fn on_deadline(&self, key: DeadlineKey) {
        let proposal_id = key.proposal_id;
        let party_id = key.party_id;
        let Some(state) = self.state.get_party_state(proposal_id, &party_id) else {
            return;
        };
        let now = crate::monitor::now_ms();
        if now >= state.deadline_expire() {
            debug!(proposal = %proposal_id, party = ?party_id, "deadline exceeded");
            if let Some(proposal) = self.state.get_proposal(proposal_id) {
                self.store_and_echo(
                    "DeadlineExceeded",
                    "deadline exceeded".to_string(),
                    proposal_id,
                    &proposal.sender_org,
                    &state,
                )
                .await;
            }
            let _ = self.resources.release(&state.task_id, &party_id).await;
            let _ = self.driver.interrupt_task(&state.task_id, &party_id, "deadline exceeded".to_string()).await;
            self.events.publish(ConsensusEvent::ProposalDeadlineExceeded {
                proposal_id,
                task_id: state.task_id.clone(),
                party_id: party_id.clone(),
            });
            let _ = self.state.remove_party(proposal_id, &party_id).await;
            return;
        }

        let Some(proposal) = self.state.get_proposal(proposal_id) else {
            return;
        };
        match state.period {
            Period::Prepare => {
                let votes = self.state.prepare_votes(proposal_id);
                let tally = vote::tally_prepare_votes(&proposal.partners, &votes);
                let _ = self.apply_prepare_transition(&proposal, tally, true).await;
            }
            Period::Confirm => {
                let votes = self.state.confirm_votes(proposal_id);
                let tally = vote::tally_confirm_votes(&proposal.partners, &votes);
                match state_machine::evaluate(&tally, &self.epoch_config.quorum, true) {
                    Transition::Advance => {
                        let _ = self.send_commit(&proposal).await;
                    }
                    Transition::Abort(reason) => {
                        let _ = self.abort_proposal(proposal_id, &proposal.task_id, &party_id, reason, &proposal.sender_org).await;
                    }
                    Transition::Wait => unreachable!("evaluate always decides at_deadline=true"),
                }
            }
            Period::Commit => {
                let _ = state_machine::commit_elapsed();
                match self
                    .state
                    .update_party_state(proposal_id, &party_id, |s| {
                        s.advance();
                    })
                    .await
                {
                    Ok(updated) => {
                        let _ = self
                            .finish_party(proposal_id, &updated.task_id, &party_id, proposal.partners.clone())
                            .await;
                    }
                    Err(e) => warn!(error = %e, "failed to advance party to Finished"),
                }
            }
            Period::Finished => {
                let _ = self.state.remove_party(proposal_id, &party_id).await;
            }
        }
    }
}

fn proto_task_role(value: i32) -> Result<TaskRole, ConsensusError> {
    match proto::TaskRole::try_from(value).unwrap_or(proto::TaskRole::Unspecified) {
        proto::TaskRole::Sender => Ok(TaskRole::Sender),
        proto::TaskRole::DataSupplier => Ok(TaskRole::DataSupplier),
        proto::TaskRole::PowerSupplier => Ok(TaskRole::PowerSupplier),
        proto::TaskRole::Receiver => Ok(TaskRole::Receiver),
        proto::TaskRole::Unspecified => Err(ConsensusError::Codec(prost::DecodeError::new("unspecified task role"))),
    }
}
