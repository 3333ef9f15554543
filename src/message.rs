//! Wire codec and WAL row codec (spec §4.1/§4.6): protobuf <-> domain type
//! conversions, per-phase message builders, and the fan-out helper used to
//! address every partner of a proposal in parallel.

use prost::Message;

use crate::error::ConsensusError;
use crate::ids::{IdentityId, NodeId, PartyId, ProposalId, TaskId};
use crate::protos::consensus::v1 as proto;
use crate::types::{
    ConfirmTaskPeerInfo, ConfirmVote, OrgProposalState, PeerInfo, Period, PrepareVote, Proposal,
    ProposalTaskDir, TaskEvent, TaskOrg, TaskPartners, TaskRole, VoteOption,
};

// --- enum conversions -------------------------------------------------

fn task_role_to_proto(role: TaskRole) -> proto::TaskRole {
    match role {
        TaskRole::Sender => proto::TaskRole::Sender,
        TaskRole::DataSupplier => proto::TaskRole::DataSupplier,
        TaskRole::PowerSupplier => proto::TaskRole::PowerSupplier,
        TaskRole::Receiver => proto::TaskRole::Receiver,
    }
}

fn task_role_from_i32(value: i32) -> Result<TaskRole, ConsensusError> {
    match proto::TaskRole::try_from(value).unwrap_or(proto::TaskRole::Unspecified) {
        proto::TaskRole::Sender => Ok(TaskRole::Sender),
        proto::TaskRole::DataSupplier => Ok(TaskRole::DataSupplier),
        proto::TaskRole::PowerSupplier => Ok(TaskRole::PowerSupplier),
        proto::TaskRole::Receiver => Ok(TaskRole::Receiver),
        proto::TaskRole::Unspecified => Err(ConsensusError::Codec(prost::DecodeError::new(
            "unspecified task role",
        ))),
    }
}

fn vote_option_to_proto(option: VoteOption) -> proto::VoteOption {
    match option {
        VoteOption::Yes => proto::VoteOption::Yes,
        VoteOption::No => proto::VoteOption::No,
        VoteOption::Abstain => proto::VoteOption::Abstain,
    }
}

fn vote_option_from_i32(value: i32) -> Result<VoteOption, ConsensusError> {
    match proto::VoteOption::try_from(value).unwrap_or(proto::VoteOption::Unspecified) {
        proto::VoteOption::Yes => Ok(VoteOption::Yes),
        proto::VoteOption::No => Ok(VoteOption::No),
        proto::VoteOption::Abstain => Ok(VoteOption::Abstain),
        proto::VoteOption::Unspecified => Err(ConsensusError::Codec(prost::DecodeError::new(
            "unspecified vote option",
        ))),
    }
}

fn period_to_u32(period: Period) -> u32 {
    period as u32
}

fn period_from_u32(value: u32) -> Result<Period, ConsensusError> {
    match value {
        0 => Ok(Period::Prepare),
        1 => Ok(Period::Confirm),
        2 => Ok(Period::Commit),
        3 => Ok(Period::Finished),
        _ => Err(ConsensusError::Codec(prost::DecodeError::new(
            "period out of range",
        ))),
    }
}

// --- struct conversions -------------------------------------------------

pub fn task_org_to_proto(org: &TaskOrg) -> proto::TaskOrganization {
    proto::TaskOrganization {
        identity_id: org.identity_id.0.clone(),
        party_id: org.party_id.0.clone(),
        node_id: org.node_id.0.clone(),
        node_name: org.node_name.clone().into_bytes(),
    }
}

pub fn task_org_from_proto(p: &proto::TaskOrganization) -> TaskOrg {
    TaskOrg {
        identity_id: IdentityId(p.identity_id.clone()),
        party_id: PartyId(p.party_id.clone()),
        node_id: NodeId(p.node_id.clone()),
        node_name: String::from_utf8_lossy(&p.node_name).into_owned(),
    }
}

pub fn peer_info_to_proto(peer: &PeerInfo) -> proto::PeerInfo {
    proto::PeerInfo {
        id: peer.id.0.clone(),
        ip: peer.ip.clone(),
        port: peer.port as u32,
        party_id: peer.party_id.0.clone(),
    }
}

pub fn peer_info_from_proto(p: &proto::PeerInfo) -> PeerInfo {
    PeerInfo {
        id: NodeId(p.id.clone()),
        ip: p.ip.clone(),
        port: p.port as u16,
        party_id: PartyId(p.party_id.clone()),
    }
}

fn confirm_peer_info_to_proto(peers: &ConfirmTaskPeerInfo) -> proto::ConfirmTaskPeerInfo {
    proto::ConfirmTaskPeerInfo {
        data_supplier_peer_info_list: peers.data_suppliers.iter().map(peer_info_to_proto).collect(),
        power_supplier_peer_info_list: peers.power_suppliers.iter().map(peer_info_to_proto).collect(),
        result_receiver_peer_info_list: peers.receivers.iter().map(peer_info_to_proto).collect(),
    }
}

fn confirm_peer_info_from_proto(p: &proto::ConfirmTaskPeerInfo) -> ConfirmTaskPeerInfo {
    ConfirmTaskPeerInfo {
        data_suppliers: p.data_supplier_peer_info_list.iter().map(peer_info_from_proto).collect(),
        power_suppliers: p.power_supplier_peer_info_list.iter().map(peer_info_from_proto).collect(),
        receivers: p.result_receiver_peer_info_list.iter().map(peer_info_from_proto).collect(),
    }
}

/// Build the common header every wire message carries.
pub fn build_msg_option(
    proposal_id: ProposalId,
    sender_role: TaskRole,
    sender_party_id: &PartyId,
    receiver_role: TaskRole,
    receiver_party_id: &PartyId,
    receiver_identity_id: &IdentityId,
    owner: &TaskOrg,
) -> proto::MsgOption {
    proto::MsgOption {
        proposal_id: proposal_id.as_bytes().to_vec(),
        sender_role: task_role_to_proto(sender_role) as i32,
        sender_party_id: sender_party_id.0.clone(),
        receiver_role: task_role_to_proto(receiver_role) as i32,
        receiver_party_id: receiver_party_id.0.clone(),
        owner: Some(task_org_to_proto(owner)),
        receiver_identity_id: receiver_identity_id.0.clone(),
    }
}

fn msg_option_parties(
    opt: &proto::MsgOption,
) -> Result<(ProposalId, TaskRole, PartyId, TaskRole, PartyId, IdentityId, TaskOrg), ConsensusError> {
    let proposal_id = ProposalId::try_from(opt.proposal_id.as_slice())?;
    let sender_role = task_role_from_i32(opt.sender_role)?;
    let receiver_role = task_role_from_i32(opt.receiver_role)?;
    let owner = opt
        .owner
        .as_ref()
        .map(task_org_from_proto)
        .ok_or(ConsensusError::MissingPeerInfo)?;
    Ok((
        proposal_id,
        sender_role,
        PartyId(opt.sender_party_id.clone()),
        receiver_role,
        PartyId(opt.receiver_party_id.clone()),
        IdentityId(opt.receiver_identity_id.clone()),
        owner,
    ))
}

pub fn build_prepare(
    proposal: &Proposal,
    receiver_role: TaskRole,
    receiver: &TaskOrg,
    task_payload: Vec<u8>,
) -> proto::Prepare {
    let sender_state = &proposal.parties[&proposal.sender_org.party_id];
    proto::Prepare {
        msg_option: Some(build_msg_option(
            proposal.id,
            TaskRole::Sender,
            &proposal.sender_org.party_id,
            receiver_role,
            &receiver.party_id,
            &receiver.identity_id,
            &proposal.sender_org,
        )),
        task_id: proposal.task_id.0.clone(),
        start_at: sender_state.start_at,
        create_at: sender_state.create_at,
        deadline_duration_ms: sender_state.deadline_duration_ms,
        task_payload,
    }
}

pub fn build_prepare_vote(vote: &PrepareVote, owner: &TaskOrg) -> proto::PrepareVote {
    proto::PrepareVote {
        msg_option: Some(build_msg_option(
            vote.proposal_id,
            vote.sender_role,
            &vote.sender_party_id,
            vote.receiver_role,
            &vote.receiver_party_id,
            &vote.receiver_identity_id,
            owner,
        )),
        vote_option: vote_option_to_proto(vote.vote_option) as i32,
        peer_info: vote.peer_info.as_ref().map(peer_info_to_proto),
        signature: vote.signature.clone(),
        timestamp: vote.timestamp,
    }
}

pub fn parse_prepare_vote(msg: &proto::PrepareVote) -> Result<PrepareVote, ConsensusError> {
    let opt = msg.msg_option.as_ref().ok_or(ConsensusError::MissingPeerInfo)?;
    let (proposal_id, sender_role, sender_party_id, receiver_role, receiver_party_id, receiver_identity_id, _owner) =
        msg_option_parties(opt)?;
    let vote_option = vote_option_from_i32(msg.vote_option)?;
    let peer_info = msg.peer_info.as_ref().map(peer_info_from_proto);
    if vote_option == VoteOption::Yes && peer_info.is_none() {
        return Err(ConsensusError::MissingPeerInfo);
    }
    Ok(PrepareVote {
        proposal_id,
        sender_role,
        sender_party_id,
        receiver_role,
        receiver_party_id,
        receiver_identity_id,
        vote_option,
        peer_info,
        signature: msg.signature.clone(),
        timestamp: msg.timestamp,
    })
}

pub fn build_confirm(
    proposal: &Proposal,
    receiver_role: TaskRole,
    receiver: &TaskOrg,
    peers: &ConfirmTaskPeerInfo,
) -> proto::Confirm {
    let sender_state = &proposal.parties[&proposal.sender_org.party_id];
    proto::Confirm {
        msg_option: Some(build_msg_option(
            proposal.id,
            TaskRole::Sender,
            &proposal.sender_org.party_id,
            receiver_role,
            &receiver.party_id,
            &receiver.identity_id,
            &proposal.sender_org,
        )),
        peers: Some(confirm_peer_info_to_proto(peers)),
        start_at: sender_state.start_at,
    }
}

pub fn parse_confirm(msg: &proto::Confirm) -> Result<(ProposalId, TaskOrg, ConfirmTaskPeerInfo, u64), ConsensusError> {
    let opt = msg.msg_option.as_ref().ok_or(ConsensusError::MissingPeerInfo)?;
    let (proposal_id, _sr, _sp, _rr, _rp, _ri, owner) = msg_option_parties(opt)?;
    let peers = msg
        .peers
        .as_ref()
        .map(confirm_peer_info_from_proto)
        .unwrap_or_default();
    Ok((proposal_id, owner, peers, msg.start_at))
}

pub fn build_confirm_vote(vote: &ConfirmVote, owner: &TaskOrg) -> proto::ConfirmVote {
    proto::ConfirmVote {
        msg_option: Some(build_msg_option(
            vote.proposal_id,
            vote.sender_role,
            &vote.sender_party_id,
            vote.receiver_role,
            &vote.receiver_party_id,
            &vote.receiver_identity_id,
            owner,
        )),
        vote_option: vote_option_to_proto(vote.vote_option) as i32,
        signature: vote.signature.clone(),
        timestamp: vote.timestamp,
    }
}

pub fn parse_confirm_vote(msg: &proto::ConfirmVote) -> Result<ConfirmVote, ConsensusError> {
    let opt = msg.msg_option.as_ref().ok_or(ConsensusError::MissingPeerInfo)?;
    let (proposal_id, sender_role, sender_party_id, receiver_role, receiver_party_id, receiver_identity_id, _owner) =
        msg_option_parties(opt)?;
    let vote_option = vote_option_from_i32(msg.vote_option)?;
    Ok(ConfirmVote {
        proposal_id,
        sender_role,
        sender_party_id,
        receiver_role,
        receiver_party_id,
        receiver_identity_id,
        vote_option,
        signature: msg.signature.clone(),
        timestamp: msg.timestamp,
    })
}

pub fn build_commit(proposal: &Proposal, receiver_role: TaskRole, receiver: &TaskOrg) -> proto::Commit {
    let sender_state = &proposal.parties[&proposal.sender_org.party_id];
    proto::Commit {
        msg_option: Some(build_msg_option(
            proposal.id,
            TaskRole::Sender,
            &proposal.sender_org.party_id,
            receiver_role,
            &receiver.party_id,
            &receiver.identity_id,
            &proposal.sender_org,
        )),
        start_at: sender_state.start_at,
    }
}

fn task_event_to_proto(event: &TaskEvent) -> proto::TaskEvent {
    proto::TaskEvent {
        kind: event.kind.clone(),
        identity_id: event.identity_id.0.clone(),
        task_id: event.task_id.0.clone(),
        content: event.content.clone(),
        created_at: event.created_at,
    }
}

pub fn build_task_result(
    proposal_id: ProposalId,
    task_id: &TaskId,
    owner: &TaskOrg,
    events: &[TaskEvent],
    now: u64,
) -> proto::TaskResult {
    proto::TaskResult {
        proposal_id: proposal_id.as_bytes().to_vec(),
        task_id: task_id.0.clone(),
        owner: Some(task_org_to_proto(owner)),
        events: events.iter().map(task_event_to_proto).collect(),
        created_at: now,
    }
}

fn task_event_from_proto(event: &proto::TaskEvent) -> TaskEvent {
    TaskEvent {
        kind: event.kind.clone(),
        identity_id: IdentityId(event.identity_id.clone()),
        task_id: TaskId(event.task_id.clone()),
        content: event.content.clone(),
        created_at: event.created_at,
    }
}

/// Decode an inbound `TaskResult` echo (spec §12) into the fields the
/// coordinator needs to surface it on the event bus.
pub fn parse_task_result(
    msg: &proto::TaskResult,
) -> Result<(ProposalId, TaskId, TaskOrg, Vec<TaskEvent>), ConsensusError> {
    let proposal_id = ProposalId::try_from(msg.proposal_id.as_slice())?;
    let task_id = TaskId(msg.task_id.clone());
    let owner = msg
        .owner
        .as_ref()
        .map(task_org_from_proto)
        .ok_or(ConsensusError::MissingPeerInfo)?;
    let events = msg.events.iter().map(task_event_from_proto).collect();
    Ok((proposal_id, task_id, owner, events))
}

// --- WAL row codecs -------------------------------------------------

pub fn encode_proposal_record(proposal: &Proposal) -> Result<Vec<u8>, ConsensusError> {
    let record = proto::ProposalRecord {
        proposal_id: proposal.id.as_bytes().to_vec(),
        task_id: proposal.task_id.0.clone(),
        sender_org: Some(task_org_to_proto(&proposal.sender_org)),
        data_suppliers: proposal.partners.data_suppliers.iter().map(task_org_to_proto).collect(),
        power_suppliers: proposal.partners.power_suppliers.iter().map(task_org_to_proto).collect(),
        receivers: proposal.partners.receivers.iter().map(task_org_to_proto).collect(),
    };
    Ok(record.encode_to_vec())
}

pub fn decode_proposal_record(bytes: &[u8]) -> Result<Proposal, ConsensusError> {
    let record = proto::ProposalRecord::decode(bytes)?;
    let id = ProposalId::try_from(record.proposal_id.as_slice())?;
    let sender_org = record
        .sender_org
        .as_ref()
        .map(task_org_from_proto)
        .ok_or(ConsensusError::MissingPeerInfo)?;
    let partners = TaskPartners {
        data_suppliers: record.data_suppliers.iter().map(task_org_from_proto).collect(),
        power_suppliers: record.power_suppliers.iter().map(task_org_from_proto).collect(),
        receivers: record.receivers.iter().map(task_org_from_proto).collect(),
    };
    let task_id = TaskId(record.task_id);
    task_id.validate()?;
    Ok(Proposal {
        id,
        task_id,
        sender_org,
        partners,
        parties: Default::default(),
    })
}

pub fn encode_party_state(state: &OrgProposalState) -> Result<Vec<u8>, ConsensusError> {
    let record = proto::PartyStateRecord {
        task_id: state.task_id.0.clone(),
        task_role: task_role_to_proto(state.task_role) as i32,
        is_send_dir: matches!(state.task_dir, ProposalTaskDir::Send),
        task_org: Some(task_org_to_proto(&state.task_org)),
        period: period_to_u32(state.period),
        start_at: state.start_at,
        create_at: state.create_at,
        deadline_duration_ms: state.deadline_duration_ms,
    };
    Ok(record.encode_to_vec())
}

pub fn decode_party_state(bytes: &[u8]) -> Result<OrgProposalState, ConsensusError> {
    let record = proto::PartyStateRecord::decode(bytes)?;
    let task_role = task_role_from_i32(record.task_role)?;
    let task_org = record
        .task_org
        .as_ref()
        .map(task_org_from_proto)
        .ok_or(ConsensusError::MissingPeerInfo)?;
    let task_id = TaskId(record.task_id);
    task_id.validate()?;
    Ok(OrgProposalState {
        task_id,
        task_role,
        task_dir: if record.is_send_dir {
            ProposalTaskDir::Send
        } else {
            ProposalTaskDir::Recv
        },
        task_org,
        period: period_from_u32(record.period)?,
        start_at: record.start_at,
        create_at: record.create_at,
        deadline_duration_ms: record.deadline_duration_ms,
    })
}

/// True when `target` shares the caller's identity — such partners are
/// delivered to in-process, never over the wire (spec §4.6).
pub fn is_loopback(local_identity: &IdentityId, target: &TaskOrg) -> bool {
    &target.identity_id == local_identity
}

