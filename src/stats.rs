//! Engine-wide statistics for monitoring/dashboards (SPEC_FULL §11).

use crate::coordinator::Coordinator;
use crate::events::ConsensusEventBus;
use crate::external::{ResourceManager, TaskDriver, Transport};
use crate::types::Period;
use crate::wal::Wal;

#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub total_proposals: usize,
    pub total_parties: usize,
    pub in_prepare: usize,
    pub in_confirm: usize,
    pub in_commit: usize,
    pub finished: usize,
    pub pending_deadlines: usize,
}

impl<W: Wal, T: Transport, R: ResourceManager, D: TaskDriver, E: ConsensusEventBus> Coordinator<W, T, R, D, E> {
    pub fn stats(&self) -> EngineStats {
        let proposals = self.state.all_proposals();
        let mut stats = EngineStats {
            total_proposals: proposals.len(),
            pending_deadlines: self.monitor.pending_count(),
            ..Default::default()
        };
        for proposal in &proposals {
            for party in proposal.parties.values() {
                stats.total_parties += 1;
                match party.period {
                    Period::Prepare => stats.in_prepare += 1,
                    Period::Confirm => stats.in_confirm += 1,
                    Period::Commit => stats.in_commit += 1,
                    Period::Finished => stats.finished += 1,
                }
            }
        }
        stats
    }
}
