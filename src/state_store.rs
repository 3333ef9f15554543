//! In-memory proposal/party state (spec §4.2), backed by a single coarse
//! lock over the nested proposal -> party maps plus the task-id back-index.
//! Every mutation re-derives the rows that changed and persists them to the
//! WAL *after* the lock is released, so writes never block other readers of
//! memory state, but never either leave memory ahead of disk for longer
//! than one await.
//!
//! Votes are kept in memory only. A crash loses in-flight prepare/confirm
//! votes; recovery (§4.8) re-arms the deadline for the proposal's current
//! period and lets the protocol re-solicit votes or time out, so there's
//! nothing durable to replay.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ConsensusError;
use crate::ids::{PartyId, ProposalId, TaskId};
use crate::message::{decode_party_state, decode_proposal_record, encode_party_state, encode_proposal_record};
use crate::types::{ConfirmTaskPeerInfo, ConfirmVote, OrgProposalState, PrepareVote, Proposal};
use crate::wal::{self, Wal};

/// Votes in arrival order, not keyed by party: `vote::build_confirm_peer_info`
/// needs to see votes in the order they were recorded, not in `TaskPartners`'
/// nomination order (spec §3/§4.5).
#[derive(Default)]
struct VoteBucket {
    prepare: Vec<PrepareVote>,
    confirm: Vec<ConfirmVote>,
}

#[derive(Default)]
struct Inner {
    proposals: HashMap<ProposalId, Proposal>,
    task_index: HashMap<(TaskId, PartyId), ProposalId>,
    votes: HashMap<ProposalId, VoteBucket>,
    confirm_peers: HashMap<ProposalId, ConfirmTaskPeerInfo>,
}

#[derive(Clone)]
pub struct StateStore<W: Wal> {
    wal: W,
    inner: Arc<Mutex<Inner>>,
}

impl<W: Wal> StateStore<W> {
    pub fn new(wal: W) -> Self {
        Self {
            wal,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn wal(&self) -> &W {
        &self.wal
    }

    /// Insert memory state for a brand-new proposal. Used both for the
    /// sender's own proposal creation (§4.7) and for a remote proposal's
    /// first `Prepare` arriving (§4.5). Returns an error if the proposal is
    /// already tracked, since re-creation would clobber in-flight votes.
    pub async fn store_proposal(&self, proposal: Proposal) -> Result<(), ConsensusError> {
        if self.inner.lock().proposals.contains_key(&proposal.id) {
            return Err(ConsensusError::ProposalAlreadyExists(proposal.id));
        }

        let proposal_row = encode_proposal_record(&proposal)?;
        let party_rows: Vec<(Vec<u8>, Vec<u8>)> = proposal
            .parties
            .values()
            .map(|state| Ok((wal::party_state_key(&proposal.id, &state.task_org.party_id), encode_party_state(state)?)))
            .collect::<Result<_, ConsensusError>>()?;
        let task_index_rows: Vec<Vec<u8>> = proposal
            .parties
            .keys()
            .map(|party_id| wal::task_index_key(&proposal.task_id, party_id))
            .collect::<Result<_, ConsensusError>>()?;

        self.wal.put(wal::proposal_key(&proposal.id), proposal_row).await?;
        for (key, value) in &party_rows {
            self.wal.put(key.clone(), value.clone()).await?;
        }
        for (key, party_id) in task_index_rows.iter().zip(proposal.parties.keys()) {
            self.wal
                .put(key.clone(), proposal.id.as_bytes().to_vec())
                .await?;
            let _ = party_id;
        }

        let mut guard = self.inner.lock();
        for party_id in proposal.parties.keys() {
            guard
                .task_index
                .insert((proposal.task_id.clone(), party_id.clone()), proposal.id);
        }
        guard.proposals.insert(proposal.id, proposal);
        Ok(())
    }

    pub fn get_proposal(&self, id: ProposalId) -> Option<Proposal> {
        self.inner.lock().proposals.get(&id).cloned()
    }

    pub fn get_party_state(&self, id: ProposalId, party: &PartyId) -> Option<OrgProposalState> {
        self.inner
            .lock()
            .proposals
            .get(&id)
            .and_then(|p| p.parties.get(party))
            .cloned()
    }

    pub fn lookup_proposal_by_task(&self, task_id: &TaskId, party: &PartyId) -> Option<ProposalId> {
        self.inner
            .lock()
            .task_index
            .get(&(task_id.clone(), party.clone()))
            .copied()
    }

    /// Mutate one party's state in place and persist the updated row.
    pub async fn update_party_state<F>(
        &self,
        id: ProposalId,
        party: &PartyId,
        mutate: F,
    ) -> Result<OrgProposalState, ConsensusError>
    where
        F: FnOnce(&mut OrgProposalState),
    {
        let updated = {
            let mut guard = self.inner.lock();
            let state = guard
                .proposals
                .get_mut(&id)
                .and_then(|p| p.parties.get_mut(party))
                .ok_or_else(|| ConsensusError::PartyNotFound(id, party.clone()))?;
            mutate(state);
            state.clone()
        };
        let row = encode_party_state(&updated)?;
        self.wal.put(wal::party_state_key(&id, party), row).await?;
        Ok(updated)
    }

    /// Remove one party's state. If the proposal becomes empty, the whole
    /// proposal row and its task-index entries are removed too (spec §3:
    /// an empty proposal is garbage).
    pub async fn remove_party(&self, id: ProposalId, party: &PartyId) -> Result<(), ConsensusError> {
        let (task_id, now_empty) = {
            let mut guard = self.inner.lock();
            let proposal = match guard.proposals.get_mut(&id) {
                Some(p) => p,
                None => return Ok(()),
            };
            proposal.parties.remove(party);
            let task_id = proposal.task_id.clone();
            guard.task_index.remove(&(task_id.clone(), party.clone()));
            let now_empty = guard.proposals.get(&id).map(|p| p.is_empty()).unwrap_or(false);
            if now_empty {
                guard.proposals.remove(&id);
                guard.votes.remove(&id);
                guard.confirm_peers.remove(&id);
            }
            (task_id, now_empty)
        };

        self.wal.delete(&wal::party_state_key(&id, party)).await?;
        self.wal.delete(&wal::task_index_key(&task_id, party)?).await?;
        if now_empty {
            self.wal.delete(&wal::proposal_key(&id)).await?;
        }
        Ok(())
    }

    pub fn record_prepare_vote(&self, id: ProposalId, vote: PrepareVote) -> Result<(), ConsensusError> {
        let mut guard = self.inner.lock();
        let bucket = guard.votes.entry(id).or_default();
        if bucket.prepare.iter().any(|v| v.sender_party_id == vote.sender_party_id) {
            return Err(ConsensusError::DuplicatePrepareVote(vote.sender_party_id));
        }
        bucket.prepare.push(vote);
        Ok(())
    }

    pub fn record_confirm_vote(&self, id: ProposalId, vote: ConfirmVote) -> Result<(), ConsensusError> {
        let mut guard = self.inner.lock();
        let bucket = guard.votes.entry(id).or_default();
        if bucket.confirm.iter().any(|v| v.sender_party_id == vote.sender_party_id) {
            return Err(ConsensusError::DuplicateConfirmVote(vote.sender_party_id));
        }
        bucket.confirm.push(vote);
        Ok(())
    }

    /// Votes in the order they were recorded (spec §3/§4.5 — peer-info lists
    /// built from these must preserve vote-arrival order, not nomination order).
    pub fn prepare_votes(&self, id: ProposalId) -> Vec<PrepareVote> {
        self.inner
            .lock()
            .votes
            .get(&id)
            .map(|b| b.prepare.clone())
            .unwrap_or_default()
    }

    pub fn confirm_votes(&self, id: ProposalId) -> Vec<ConfirmVote> {
        self.inner
            .lock()
            .votes
            .get(&id)
            .map(|b| b.confirm.clone())
            .unwrap_or_default()
    }

    pub fn set_confirm_peer_info(&self, id: ProposalId, peers: ConfirmTaskPeerInfo) {
        self.inner.lock().confirm_peers.insert(id, peers);
    }

    pub fn confirm_peer_info(&self, id: ProposalId) -> Option<ConfirmTaskPeerInfo> {
        self.inner.lock().confirm_peers.get(&id).cloned()
    }

    /// Reload every proposal/party row from the WAL into memory. Called
    /// once at startup by `recovery::recover` (spec §4.8).
    pub async fn load_from_wal(&self) -> Result<(), ConsensusError> {
        let proposal_rows = self.wal.scan_prefix(&[b'P']).await?;
        let mut proposals = HashMap::new();
        for (key, value) in proposal_rows {
            match decode_proposal_record(&value) {
                Ok(proposal) => {
                    proposals.insert(proposal.id, proposal);
                }
                Err(_) => return Err(ConsensusError::WalRowCorrupt(key)),
            }
        }

        let party_rows = self.wal.scan_prefix(&[b'S']).await?;
        for (key, value) in party_rows {
            if key.len() < 1 + 32 {
                return Err(ConsensusError::WalRowCorrupt(key));
            }
            let mut id_bytes = [0u8; 32];
            id_bytes.copy_from_slice(&key[1..33]);
            let proposal_id = ProposalId(id_bytes);
            let state = decode_party_state(&value).map_err(|_| ConsensusError::WalRowCorrupt(key.clone()))?;
            if let Some(proposal) = proposals.get_mut(&proposal_id) {
                proposal
                    .parties
                    .insert(state.task_org.party_id.clone(), state);
            }
        }

        let mut guard = self.inner.lock();
        for proposal in proposals.values() {
            for party_id in proposal.parties.keys() {
                guard
                    .task_index
                    .insert((proposal.task_id.clone(), party_id.clone()), proposal.id);
            }
        }
        guard.proposals = proposals;
        Ok(())
    }

    pub fn all_proposals(&self) -> Vec<Proposal> {
        self.inner.lock().proposals.values().cloned().collect()
    }
}
