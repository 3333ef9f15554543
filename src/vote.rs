//! Vote validation and tallying (spec §4.5).
//!
//! A vote is only ever counted once per `(proposalId, partyId)` — duplicate
//! rejection lives in `state_store::StateStore::record_*_vote`. This module
//! is the pure logic layer above that: checking a voter is a genuine
//! partner in the role it claims, and deciding whether the votes collected
//! so far clear the proposal's quorum.

use std::collections::HashMap;

use crate::config::QuorumPolicy;
use crate::error::ConsensusError;
use crate::ids::PartyId;
use crate::types::{
    ConfirmTaskPeerInfo, ConfirmVote, PrepareVote, TaskOrg, TaskPartners, TaskRole, VoteOption,
};

/// Verify a vote actually comes from a nominated partner acting in the
/// role it claims (spec §4.5 step 1).
pub fn validate_partner(
    partners: &TaskPartners,
    sender_party_id: &PartyId,
    claimed_role: TaskRole,
    task_id_for_err: &crate::ids::TaskId,
) -> Result<(), ConsensusError> {
    let identity_ok = partners.all().any(|(role, org)| {
        &org.party_id == sender_party_id && role == claimed_role
    });
    if identity_ok {
        Ok(())
    } else {
        Err(ConsensusError::NotAPartner(
            sender_party_id.clone(),
            task_id_for_err.clone(),
        ))
    }
}

/// Per-role vote tally: how many nominated partners voted Yes / No /
/// Abstain, out of how many were nominated.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleTally {
    pub nominated: usize,
    pub yes: usize,
    pub no: usize,
    pub abstain: usize,
}

impl RoleTally {
    pub fn meets(&self, threshold: f64) -> bool {
        if self.nominated == 0 {
            return true;
        }
        (self.yes as f64) / (self.nominated as f64) >= threshold
    }

    pub fn has_refusal(&self) -> bool {
        self.no > 0
    }

    pub fn all_voted(&self) -> bool {
        self.yes + self.no + self.abstain >= self.nominated
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Tally {
    pub data_supplier: RoleTally,
    pub power_supplier: RoleTally,
    pub receiver: RoleTally,
}

impl Tally {
    pub fn all_voted(&self) -> bool {
        self.data_supplier.all_voted() && self.power_supplier.all_voted() && self.receiver.all_voted()
    }

    pub fn has_any_refusal(&self) -> bool {
        self.data_supplier.has_refusal() || self.power_supplier.has_refusal() || self.receiver.has_refusal()
    }

    pub fn meets_quorum(&self, quorum: &QuorumPolicy) -> bool {
        self.data_supplier.meets(quorum.data_supplier)
            && self.power_supplier.meets(quorum.power_supplier)
            && self.receiver.meets(quorum.receiver)
    }
}

fn tally_role(partners: &[TaskOrg], votes: &HashMap<PartyId, VoteOption>) -> RoleTally {
    let mut tally = RoleTally {
        nominated: partners.len(),
        ..Default::default()
    };
    for partner in partners {
        match votes.get(&partner.party_id) {
            Some(VoteOption::Yes) => tally.yes += 1,
            Some(VoteOption::No) => tally.no += 1,
            Some(VoteOption::Abstain) => tally.abstain += 1,
            None => {}
        }
    }
    tally
}

pub fn tally_prepare_votes(partners: &TaskPartners, votes: &[PrepareVote]) -> Tally {
    let by_party: HashMap<PartyId, VoteOption> = votes
        .iter()
        .map(|v| (v.sender_party_id.clone(), v.vote_option))
        .collect();
    Tally {
        data_supplier: tally_role(&partners.data_suppliers, &by_party),
        power_supplier: tally_role(&partners.power_suppliers, &by_party),
        receiver: tally_role(&partners.receivers, &by_party),
    }
}

pub fn tally_confirm_votes(partners: &TaskPartners, votes: &[ConfirmVote]) -> Tally {
    let by_party: HashMap<PartyId, VoteOption> = votes
        .iter()
        .map(|v| (v.sender_party_id.clone(), v.vote_option))
        .collect();
    Tally {
        data_supplier: tally_role(&partners.data_suppliers, &by_party),
        power_supplier: tally_role(&partners.power_suppliers, &by_party),
        receiver: tally_role(&partners.receivers, &by_party),
    }
}

/// Build the peer-info aggregate from Yes-voting prepare votes, grouped by
/// role in vote-arrival order (spec §3 / §4.5 step 4, grounded on
/// `makeConfirmTaskPeerDesc` in the original scheduler). Votes are already
/// known to come from genuine nominated partners by the time they reach
/// here (`validate_partner` runs at vote-recording time), so this only
/// needs to sort by role, not re-validate against `partners`.
pub fn build_confirm_peer_info(votes: &[PrepareVote]) -> ConfirmTaskPeerInfo {
    let mut peers = ConfirmTaskPeerInfo::default();
    for vote in votes {
        if vote.vote_option != VoteOption::Yes {
            continue;
        }
        let Some(peer_info) = &vote.peer_info else { continue };
        match vote.sender_role {
            TaskRole::DataSupplier => peers.data_suppliers.push(peer_info.clone()),
            TaskRole::PowerSupplier => peers.power_suppliers.push(peer_info.clone()),
            TaskRole::Receiver => peers.receivers.push(peer_info.clone()),
            TaskRole::Sender => {}
        }
    }
    peers
}
