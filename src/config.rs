//! Epoch timing configuration (spec §4.4/§9).
//!
//! `EpochConfig` supplies the three fixed per-epoch durations every proposal
//! is measured against (`prepare_ms`, `confirm_ms`, `commit_ms`) plus the
//! default per-proposal deadline when a caller doesn't supply one. It is
//! process-wide, injected into the state store and monitor at startup.

use crate::error::ConsensusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochConfig {
    pub prepare_ms: u64,
    pub confirm_ms: u64,
    pub commit_ms: u64,
    /// Default `deadline_duration_ms` used when a proposal doesn't specify
    /// its own. Must be >= `prepare_ms + confirm_ms + commit_ms`, otherwise
    /// the deadline could fire before the proposal could ever legitimately
    /// reach `Finished` (spec §9 open question, decided in DESIGN.md).
    pub default_deadline_ms: u64,
    pub quorum: QuorumPolicy,
}

/// Fraction of nominated partners in each role that must vote Yes for a
/// proposal to pass its current phase. `1.0` (the default) is strict 2PC:
/// every partner must agree. Lowering a role's threshold tolerates silent
/// or refusing partners in that role without failing the whole proposal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuorumPolicy {
    pub data_supplier: f64,
    pub power_supplier: f64,
    pub receiver: f64,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self {
            data_supplier: 1.0,
            power_supplier: 1.0,
            receiver: 1.0,
        }
    }
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            prepare_ms: 5_000,
            confirm_ms: 5_000,
            commit_ms: 5_000,
            default_deadline_ms: 30_000,
            quorum: QuorumPolicy::default(),
        }
    }
}

impl EpochConfig {
    pub fn validate(&self) -> Result<(), ConsensusError> {
        if self.prepare_ms == 0 || self.confirm_ms == 0 || self.commit_ms == 0 {
            return Err(ConsensusError::InvalidEpochConfig(
                "epoch durations must be greater than zero".to_string(),
            ));
        }
        let min_deadline = self.prepare_ms + self.confirm_ms + self.commit_ms;
        if self.default_deadline_ms < min_deadline {
            return Err(ConsensusError::InvalidEpochConfig(format!(
                "default_deadline_ms ({}) must be >= prepare_ms + confirm_ms + commit_ms ({})",
                self.default_deadline_ms, min_deadline
            )));
        }
        Ok(())
    }

    /// Validate a caller-supplied per-proposal deadline against this config's
    /// epoch durations (same rule as `validate`, applied per-proposal).
    pub fn validate_deadline(&self, deadline_ms: u64) -> Result<(), ConsensusError> {
        let min_deadline = self.prepare_ms + self.confirm_ms + self.commit_ms;
        if deadline_ms < min_deadline {
            return Err(ConsensusError::InvalidEpochConfig(format!(
                "deadline_duration_ms ({deadline_ms}) must be >= prepare_ms + confirm_ms + commit_ms ({min_deadline})"
            )));
        }
        Ok(())
    }

    pub fn builder() -> EpochConfigBuilder {
        EpochConfigBuilder::new()
    }

    /// Tight timings for local/test use: short epochs, quick failure.
    pub fn fast() -> Self {
        Self {
            prepare_ms: 500,
            confirm_ms: 500,
            commit_ms: 500,
            default_deadline_ms: 3_000,
            quorum: QuorumPolicy::default(),
        }
    }

    /// Generous timings for wide-area networks with slow partners.
    pub fn strict() -> Self {
        Self {
            prepare_ms: 15_000,
            confirm_ms: 15_000,
            commit_ms: 15_000,
            default_deadline_ms: 90_000,
            quorum: QuorumPolicy::default(),
        }
    }
}

pub struct EpochConfigBuilder {
    config: EpochConfig,
}

impl EpochConfigBuilder {
    pub(crate) fn new() -> Self {
        Self {
            config: EpochConfig::default(),
        }
    }

    pub fn prepare_ms(mut self, ms: u64) -> Self {
        self.config.prepare_ms = ms;
        self
    }

    pub fn confirm_ms(mut self, ms: u64) -> Self {
        self.config.confirm_ms = ms;
        self
    }

    pub fn commit_ms(mut self, ms: u64) -> Self {
        self.config.commit_ms = ms;
        self
    }

    pub fn default_deadline_ms(mut self, ms: u64) -> Self {
        self.config.default_deadline_ms = ms;
        self
    }

    pub fn quorum(mut self, quorum: QuorumPolicy) -> Self {
        self.config.quorum = quorum;
        self
    }

    pub fn fast_preset(mut self) -> Self {
        self.config = EpochConfig::fast();
        self
    }

    pub fn strict_preset(mut self) -> Self {
        self.config = EpochConfig::strict();
        self
    }

    pub fn build(self) -> Result<EpochConfig, ConsensusError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for EpochConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
