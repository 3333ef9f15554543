mod support;

use twopc_consensus::config::EpochConfig;
use twopc_consensus::error::ConsensusError;
use twopc_consensus::external::ChannelTransport;
use twopc_consensus::ids::NodeId;
use twopc_consensus::message::build_prepare_vote;
use twopc_consensus::types::{PeerInfo, PrepareVote, TaskPartners, TaskRole, VoteOption};

use support::{approving_engine, org, task_id};

/// The same partner casting a `PrepareVote` twice for one proposal is a
/// protocol violation, not a quorum event: the second vote must be rejected
/// rather than silently overwriting or double-counting the first.
#[tokio::test]
async fn second_vote_from_same_partner_is_rejected() {
    let transport = ChannelTransport::new();
    let sender_org = org("sender-co", "sender", "node-sender");
    let ds_org = org("ds-co", "ds", "node-ds");

    let (sender_engine, _sender_driver) = approving_engine(transport.clone(), EpochConfig::fast()).await;

    let partners = TaskPartners {
        data_suppliers: vec![ds_org.clone()],
        power_suppliers: vec![],
        receivers: vec![],
    };

    let proposal_id = sender_engine
        .propose(task_id("job-dup"), sender_org.clone(), partners, b"payload".to_vec(), None)
        .await
        .expect("propose succeeds");

    let vote = PrepareVote {
        proposal_id,
        sender_role: TaskRole::DataSupplier,
        sender_party_id: ds_org.party_id.clone(),
        receiver_role: TaskRole::Sender,
        receiver_party_id: sender_org.party_id.clone(),
        receiver_identity_id: sender_org.identity_id.clone(),
        vote_option: VoteOption::Yes,
        peer_info: Some(PeerInfo {
            id: ds_org.node_id.clone(),
            ip: String::new(),
            port: 0,
            party_id: ds_org.party_id.clone(),
        }),
        signature: Vec::new(),
        timestamp: twopc_consensus::monitor::now_ms(),
    };
    let proto_vote = build_prepare_vote(&vote, &ds_org);

    sender_engine
        .handle_prepare_vote(proto_vote.clone())
        .await
        .expect("first vote is accepted");

    let err = sender_engine
        .handle_prepare_vote(proto_vote)
        .await
        .expect_err("second vote from the same partner must be rejected");
    assert!(matches!(err, ConsensusError::DuplicatePrepareVote(p) if p == ds_org.party_id));
}
