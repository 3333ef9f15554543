mod support;

use twopc_consensus::config::EpochConfig;
use twopc_consensus::engine::ConsensusEngine;
use twopc_consensus::events::BroadcastEventBus;
use twopc_consensus::external::{AlwaysApproveResourceManager, ChannelTransport, RecordingTaskDriver};
use twopc_consensus::types::{Period, TaskPartners};
use twopc_consensus::wal::InMemoryWal;

use support::{org, task_id};

/// A proposal written before a restart must still be there, in the same
/// epoch, once a fresh engine opens against the same write-ahead log.
#[tokio::test]
async fn proposal_survives_restart_on_the_same_wal() {
    let wal = InMemoryWal::new();
    let transport = ChannelTransport::new();
    let sender_org = org("sender-co", "sender", "node-sender");
    let ds_org = org("ds-co", "ds", "node-ds");

    let engine1 = ConsensusEngine::open(
        wal.clone(),
        EpochConfig::strict(),
        transport.clone(),
        AlwaysApproveResourceManager,
        RecordingTaskDriver::new(),
        BroadcastEventBus::default(),
    )
    .await
    .expect("engine1 opens");

    let partners = TaskPartners {
        data_suppliers: vec![ds_org],
        power_suppliers: vec![],
        receivers: vec![],
    };
    let proposal_id = engine1
        .propose(task_id("job-recover"), sender_org.clone(), partners, b"payload".to_vec(), None)
        .await
        .expect("propose succeeds");

    // Simulate a crash: drop engine1 (aborting its monitor task) without a
    // graceful shutdown path, then reopen against the same durable rows.
    drop(engine1);

    let engine2 = ConsensusEngine::open(
        wal,
        EpochConfig::strict(),
        transport,
        AlwaysApproveResourceManager,
        RecordingTaskDriver::new(),
        BroadcastEventBus::default(),
    )
    .await
    .expect("engine2 recovers from the same wal");

    let recovered = engine2.get_proposal(proposal_id).expect("proposal recovered from the wal");
    assert_eq!(recovered.task_id, task_id("job-recover"));
    assert_eq!(recovered.sender_org, sender_org);

    let sender_state = recovered
        .parties
        .get(&recovered.sender_org.party_id)
        .expect("sender's own party state recovered");
    assert_eq!(sender_state.period, Period::Prepare);
}
