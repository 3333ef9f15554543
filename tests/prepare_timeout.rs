mod support;

use std::time::Duration;

use twopc_consensus::config::EpochConfig;
use twopc_consensus::external::ChannelTransport;
use twopc_consensus::types::TaskPartners;

use support::{approving_engine, org, task_id, wait_until};

/// A partner that never votes must still cause the sender to abort once the
/// prepare epoch's deadline passes, instead of waiting forever.
#[tokio::test]
async fn silent_partner_aborts_on_deadline() {
    let transport = ChannelTransport::new();
    let sender_org = org("sender-co", "sender", "node-sender");
    let ds_org = org("ds-co", "ds", "node-ds");

    let (sender_engine, sender_driver) = approving_engine(transport.clone(), EpochConfig::fast()).await;
    // Deliberately no ds engine, pump, or registered node: the Prepare sent
    // to ds_org's node is dropped on the floor, simulating an unreachable peer.

    let partners = TaskPartners {
        data_suppliers: vec![ds_org],
        power_suppliers: vec![],
        receivers: vec![],
    };

    sender_engine
        .propose(task_id("job-timeout"), sender_org, partners, b"payload".to_vec(), None)
        .await
        .expect("propose succeeds");

    let aborted = wait_until(Duration::from_secs(3), || !sender_driver.interrupted().is_empty()).await;
    assert!(aborted, "sender never aborted after its partner stayed silent through the deadline");

    let reasons = sender_driver.interrupted();
    assert_eq!(reasons.len(), 1);
    assert!(
        reasons[0].2.contains("QuorumNotReached") || reasons[0].2.contains("deadline"),
        "unexpected reason: {}",
        reasons[0].2
    );
}
