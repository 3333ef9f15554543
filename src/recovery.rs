//! Startup recovery (spec §4.8): reload every proposal/party row the WAL
//! still has and re-arm the monitor for each, computing `when` from the
//! persisted `period`, `start_at`, and `deadline_duration_ms` against the
//! current wall clock. No votes are replayed — they were never persisted
//! (see `state_store`) — so a recovered proposal simply resumes waiting
//! out whatever epoch it was in, or hits its deadline if that already
//! elapsed while the process was down.

use tracing::info;

use crate::config::EpochConfig;
use crate::error::ConsensusError;
use crate::monitor::{DeadlineKey, Monitor};
use crate::state_store::StateStore;
use crate::wal::Wal;

pub async fn recover<W: Wal>(
    state: &StateStore<W>,
    epoch_config: &EpochConfig,
    monitor: &Monitor,
) -> Result<usize, ConsensusError> {
    state.load_from_wal().await?;

    let mut rearmed = 0;
    for proposal in state.all_proposals() {
        for org_state in proposal.parties.values() {
            let when = match org_state.period {
                crate::types::Period::Prepare => {
                    org_state.prepare_expire(epoch_config).min(org_state.deadline_expire())
                }
                crate::types::Period::Confirm => {
                    org_state.confirm_expire(epoch_config).min(org_state.deadline_expire())
                }
                crate::types::Period::Commit => {
                    org_state.commit_expire(epoch_config).min(org_state.deadline_expire())
                }
                crate::types::Period::Finished => org_state.deadline_expire(),
            };
            monitor.schedule(
                DeadlineKey {
                    proposal_id: proposal.id,
                    party_id: org_state.task_org.party_id.clone(),
                },
                when,
            );
            rearmed += 1;
        }
    }
    info!(proposals = rearmed, "recovered proposal state from write-ahead log");
    Ok(rearmed)
}
