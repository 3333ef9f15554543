mod support;

use std::time::Duration;

use twopc_consensus::config::EpochConfig;
use twopc_consensus::external::ChannelTransport;
use twopc_consensus::ids::NodeId;
use twopc_consensus::types::TaskPartners;

use support::{approving_engine, org, spawn_pump, task_id, wait_until};

/// A sender proposes a task to one cross-identity data supplier (routed
/// through `ChannelTransport`) and one same-identity receiver (delivered
/// in-process via the loopback path). Both must reach `Finished`.
#[tokio::test]
async fn full_proposal_reaches_commit_for_every_partner() {
    let transport = ChannelTransport::new();

    let sender_org = org("sender-co", "sender", "node-sender");
    let ds_org = org("ds-co", "ds", "node-ds");
    let recv_org = org("sender-co", "recv", "node-recv"); // same identity as sender: loopback

    let (sender_engine, sender_driver) = approving_engine(transport.clone(), EpochConfig::fast()).await;
    let (ds_engine, ds_driver) = approving_engine(transport.clone(), EpochConfig::fast()).await;

    let sender_rx = transport.register(NodeId(b"node-sender".to_vec()));
    let ds_rx = transport.register(NodeId(b"node-ds".to_vec()));
    let _sender_pump = spawn_pump(sender_engine.clone(), sender_rx, sender_org.clone());
    let _ds_pump = spawn_pump(ds_engine.clone(), ds_rx, ds_org.clone());

    let partners = TaskPartners {
        data_suppliers: vec![ds_org.clone()],
        power_suppliers: vec![],
        receivers: vec![recv_org.clone()],
    };

    let task = task_id("job-1");
    sender_engine
        .propose(task.clone(), sender_org.clone(), partners, b"payload".to_vec(), None)
        .await
        .expect("propose succeeds");

    let reached = wait_until(Duration::from_secs(3), || {
        sender_driver.driven().len() >= 2 && ds_driver.driven().len() >= 1
    })
    .await;
    assert!(reached, "proposal did not reach Finished for every partner in time");

    let sender_finished: Vec<_> = sender_driver.driven().into_iter().map(|(_, party, _)| party).collect();
    assert!(sender_finished.iter().any(|p| p.0 == b"sender"));
    assert!(sender_finished.iter().any(|p| p.0 == b"recv"));

    let ds_finished = ds_driver.driven();
    assert_eq!(ds_finished.len(), 1);
    assert_eq!(ds_finished[0].1.0, b"ds");

    assert!(sender_driver.interrupted().is_empty());
    assert!(ds_driver.interrupted().is_empty());
}
