mod support;

use std::time::Duration;

use twopc_consensus::config::EpochConfig;
use twopc_consensus::external::ChannelTransport;
use twopc_consensus::ids::NodeId;
use twopc_consensus::types::TaskPartners;

use support::{approving_engine, org, refusing_engine, spawn_pump, task_id, wait_until};

/// A single partner refusing Prepare aborts the sender's own proposal
/// immediately, without waiting for the epoch to time out.
#[tokio::test]
async fn partner_refusal_aborts_sender_immediately() {
    let transport = ChannelTransport::new();

    let sender_org = org("sender-co", "sender", "node-sender");
    let ds_org = org("ds-co", "ds", "node-ds");

    let (sender_engine, sender_driver) = approving_engine(transport.clone(), EpochConfig::fast()).await;
    let (ds_engine, _ds_driver) = refusing_engine(transport.clone(), EpochConfig::fast()).await;

    let sender_rx = transport.register(NodeId(b"node-sender".to_vec()));
    let ds_rx = transport.register(NodeId(b"node-ds".to_vec()));
    let _sender_pump = spawn_pump(sender_engine.clone(), sender_rx, sender_org.clone());
    let _ds_pump = spawn_pump(ds_engine.clone(), ds_rx, ds_org.clone());

    let partners = TaskPartners {
        data_suppliers: vec![ds_org],
        power_suppliers: vec![],
        receivers: vec![],
    };

    let task = task_id("job-refused");
    sender_engine
        .propose(task, sender_org, partners, b"payload".to_vec(), None)
        .await
        .expect("propose succeeds");

    let aborted = wait_until(Duration::from_secs(3), || !sender_driver.interrupted().is_empty()).await;
    assert!(aborted, "sender was never told to interrupt after a partner refused");

    let reasons = sender_driver.interrupted();
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].2.contains("PartnerRefused"), "unexpected reason: {}", reasons[0].2);
    assert!(sender_driver.driven().is_empty());
}
