//! A two-phase-commit consensus engine for coordinating multi-party tasks.
//!
//! A task's sender proposes it to a set of partner organizations (data
//! suppliers, power suppliers, receivers). Every partner votes yes/no in a
//! `Prepare` round; once the sender's quorum policy is satisfied for every
//! role, the proposal moves to a `Confirm` round carrying the resolved peer
//! addresses, then to `Commit`, at which point each party hands its task off
//! to its local [`external::TaskDriver`]. Every round is bounded both by a
//! per-period timeout and by an overall hard deadline, tracked by a single
//! [`monitor::Monitor`] background task rather than a polling loop.
//!
//! # Getting started
//!
//! The main entry point is [`engine::ConsensusEngine`], built from a
//! [`wal::Wal`] implementation, an [`config::EpochConfig`], and
//! implementations of [`external::Transport`], [`external::ResourceManager`],
//! [`external::TaskDriver`], and [`events::ConsensusEventBus`]:
//!
//! ```rust,no_run
//! use twopc_consensus::{
//!     config::EpochConfig,
//!     engine::ConsensusEngine,
//!     events::BroadcastEventBus,
//!     external::{AlwaysApproveResourceManager, ChannelTransport, RecordingTaskDriver},
//!     wal::InMemoryWal,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = ConsensusEngine::open(
//!     InMemoryWal::default(),
//!     EpochConfig::default(),
//!     ChannelTransport::default(),
//!     AlwaysApproveResourceManager,
//!     RecordingTaskDriver::default(),
//!     BroadcastEventBus::default(),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | [`ConsensusEngine`](engine::ConsensusEngine), the public entry point |
//! | [`coordinator`] | [`Coordinator`](coordinator::Coordinator), the sender/receiver state machine driver |
//! | [`config`] | [`EpochConfig`](config::EpochConfig) and [`QuorumPolicy`](config::QuorumPolicy) |
//! | [`types`] | Proposal, party, vote, and peer types |
//! | [`ids`] | Newtype identifiers ([`ids::ProposalId`], [`ids::PartyId`], ...) |
//! | [`state_store`] | [`state_store::StateStore`], the in-memory + WAL-backed proposal store |
//! | [`wal`] | [`wal::Wal`] trait, [`wal::InMemoryWal`], and [`wal::SledWal`] |
//! | [`monitor`] | [`monitor::Monitor`], the unified period-timeout/deadline scheduler |
//! | [`vote`] | Vote tallying against [`config::QuorumPolicy`] |
//! | [`state_machine`] | Pure period-transition decisions ([`state_machine::Transition`]) |
//! | [`external`] | [`external::Transport`], [`external::ResourceManager`], [`external::TaskDriver`] traits |
//! | [`message`] | Protobuf <-> domain conversions and the wire/WAL codecs |
//! | [`events`] | [`events::ConsensusEventBus`] trait and [`events::BroadcastEventBus`] |
//! | [`recovery`] | Startup WAL replay |
//! | [`stats`] | [`stats::EngineStats`] snapshot |
//! | [`error`] | [`error::ConsensusError`] enum |

pub mod protos {
    pub mod consensus {
        pub mod v1 {
            include!(concat!(env!("OUT_DIR"), "/consensus.v1.rs"));
        }
    }
}

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;
pub mod external;
pub mod ids;
pub mod message;
pub mod monitor;
pub mod recovery;
pub mod state_machine;
pub mod state_store;
pub mod stats;
pub mod types;
pub mod vote;
pub mod wal;
