//! Core data model (spec §3): proposals, per-party org-state, votes, and
//! the confirm-phase peer-info aggregate.

use std::collections::HashMap;

use crate::ids::{IdentityId, NodeId, PartyId, ProposalId, TaskId};

/// The role a party plays for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskRole {
    Sender,
    DataSupplier,
    PowerSupplier,
    Receiver,
}

/// Whether a local party is the task's sender or a remote partner.
///
/// Drives the branch in §4.7 step 5 / §4.4's deadline path: the sender's
/// termination is reported to the scheduler, a partner's is echoed back to
/// the sender over the wire. See SPEC_FULL §12.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalTaskDir {
    Send,
    Recv,
}

impl From<TaskRole> for ProposalTaskDir {
    fn from(role: TaskRole) -> Self {
        match role {
            TaskRole::Sender => ProposalTaskDir::Send,
            _ => ProposalTaskDir::Recv,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOption {
    Yes,
    No,
    Abstain,
}

/// The four timed epochs of the per-party state machine (spec §3/§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Period {
    Prepare = 0,
    Confirm = 1,
    Commit = 2,
    Finished = 3,
}

impl Period {
    pub fn successor(self) -> Option<Period> {
        match self {
            Period::Prepare => Some(Period::Confirm),
            Period::Confirm => Some(Period::Commit),
            Period::Commit => Some(Period::Finished),
            Period::Finished => None,
        }
    }
}

/// `(ip, port, partyId)` tuple a party announces for task execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: NodeId,
    pub ip: String,
    pub port: u16,
    pub party_id: PartyId,
}

/// A party's full identity within a task: `(identityId, partyId, nodeId, nodeName)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOrg {
    pub identity_id: IdentityId,
    pub party_id: PartyId,
    pub node_id: NodeId,
    pub node_name: String,
}

/// Per-party lifecycle state for one proposal (spec §3).
#[derive(Debug, Clone)]
pub struct OrgProposalState {
    pub task_id: TaskId,
    pub task_role: TaskRole,
    pub task_dir: ProposalTaskDir,
    pub task_org: TaskOrg,
    pub period: Period,
    pub start_at: u64,
    pub create_at: u64,
    pub deadline_duration_ms: u64,
}

impl OrgProposalState {
    pub fn new(
        task_id: TaskId,
        task_role: TaskRole,
        task_org: TaskOrg,
        start_at: u64,
        create_at: u64,
        deadline_duration_ms: u64,
    ) -> Self {
        Self {
            task_id,
            task_dir: task_role.into(),
            task_role,
            task_org,
            period: Period::Prepare,
            start_at,
            create_at,
            deadline_duration_ms,
        }
    }

    pub fn prepare_expire(&self, cfg: &crate::config::EpochConfig) -> u64 {
        self.start_at + cfg.prepare_ms
    }

    pub fn confirm_expire(&self, cfg: &crate::config::EpochConfig) -> u64 {
        self.prepare_expire(cfg) + cfg.confirm_ms
    }

    pub fn commit_expire(&self, cfg: &crate::config::EpochConfig) -> u64 {
        self.confirm_expire(cfg) + cfg.commit_ms
    }

    pub fn deadline_expire(&self) -> u64 {
        self.start_at + self.deadline_duration_ms
    }

    /// Advance to the successor period. Returns `false` (and leaves the
    /// period unchanged) if already `Finished` — the only legal successor
    /// of `Finished` is deletion, never another period (spec §3 invariant 3).
    pub fn advance(&mut self) -> bool {
        match self.period.successor() {
            Some(next) => {
                self.period = next;
                true
            }
            None => false,
        }
    }
}

/// A vote cast during the Prepare phase.
#[derive(Debug, Clone)]
pub struct PrepareVote {
    pub proposal_id: ProposalId,
    pub sender_role: TaskRole,
    pub sender_party_id: PartyId,
    pub receiver_role: TaskRole,
    pub receiver_party_id: PartyId,
    pub receiver_identity_id: IdentityId,
    pub vote_option: VoteOption,
    /// `Some` iff `vote_option == Yes` (spec §3).
    pub peer_info: Option<PeerInfo>,
    pub signature: Vec<u8>,
    pub timestamp: u64,
}

/// A vote cast during the Confirm phase — identical shape minus `peer_info`.
#[derive(Debug, Clone)]
pub struct ConfirmVote {
    pub proposal_id: ProposalId,
    pub sender_role: TaskRole,
    pub sender_party_id: PartyId,
    pub receiver_role: TaskRole,
    pub receiver_party_id: PartyId,
    pub receiver_identity_id: IdentityId,
    pub vote_option: VoteOption,
    pub signature: Vec<u8>,
    pub timestamp: u64,
}

/// Per-proposal aggregate of peer-infos from all Yes-voting suppliers and
/// receivers, grouped by role (spec §3, built once after Prepare passes).
#[derive(Debug, Clone, Default)]
pub struct ConfirmTaskPeerInfo {
    pub data_suppliers: Vec<PeerInfo>,
    pub power_suppliers: Vec<PeerInfo>,
    pub receivers: Vec<PeerInfo>,
}

impl ConfirmTaskPeerInfo {
    pub fn all(&self) -> impl Iterator<Item = &PeerInfo> {
        self.data_suppliers
            .iter()
            .chain(self.power_suppliers.iter())
            .chain(self.receivers.iter())
    }
}

/// Back-index `(taskId, partyId) -> proposalId` used to locate the proposal
/// that owns a task party (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct ProposalTask {
    pub proposal_id: ProposalId,
    pub create_at: u64,
}

/// The set of partner parties nominated for one task, keyed by role. Used
/// by the vote aggregator to validate that a voter is a genuine partner
/// (spec §4.5 step 1) and by the coordinator to know who to address.
#[derive(Debug, Clone, Default)]
pub struct TaskPartners {
    pub data_suppliers: Vec<TaskOrg>,
    pub power_suppliers: Vec<TaskOrg>,
    pub receivers: Vec<TaskOrg>,
}

impl TaskPartners {
    pub fn expected_voters(&self) -> usize {
        self.data_suppliers.len() + self.power_suppliers.len() + self.receivers.len()
    }

    pub fn role_of(&self, identity_id: &IdentityId, party_id: &PartyId) -> Option<TaskRole> {
        let matches = |org: &TaskOrg| &org.identity_id == identity_id && &org.party_id == party_id;
        if self.data_suppliers.iter().any(matches) {
            Some(TaskRole::DataSupplier)
        } else if self.power_suppliers.iter().any(matches) {
            Some(TaskRole::PowerSupplier)
        } else if self.receivers.iter().any(matches) {
            Some(TaskRole::Receiver)
        } else {
            None
        }
    }

    pub fn all(&self) -> impl Iterator<Item = (TaskRole, &TaskOrg)> {
        self.data_suppliers
            .iter()
            .map(|o| (TaskRole::DataSupplier, o))
            .chain(
                self.power_suppliers
                    .iter()
                    .map(|o| (TaskRole::PowerSupplier, o)),
            )
            .chain(self.receivers.iter().map(|o| (TaskRole::Receiver, o)))
    }
}

/// One entry in a task's event log (spec §12), recorded on the deadline/abort
/// path before the local task is interrupted and, for a non-sender party,
/// echoed back to the task's owner as a `TaskResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub kind: String,
    pub identity_id: IdentityId,
    pub task_id: TaskId,
    pub content: String,
    pub created_at: u64,
}

/// A proposal as tracked in the in-memory state store: the task it governs
/// plus every party's lifecycle state. A proposal is empty iff `parties`
/// is empty; empty proposals are garbage-collected (spec §3).
#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: ProposalId,
    pub task_id: TaskId,
    pub sender_org: TaskOrg,
    pub partners: TaskPartners,
    pub parties: HashMap<PartyId, OrgProposalState>,
}

impl Proposal {
    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }
}
