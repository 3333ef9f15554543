//! Error taxonomy for the consensus engine (spec §7).

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    // --- Validation: rejected before any state change, logged and dropped ---
    #[error("unknown proposal {0}")]
    UnknownProposal(crate::ids::ProposalId),
    #[error("party {0:?} is not a partner of task {1:?} in the claimed role")]
    NotAPartner(crate::ids::PartyId, crate::ids::TaskId),
    #[error("duplicate prepare vote from party {0:?}")]
    DuplicatePrepareVote(crate::ids::PartyId),
    #[error("duplicate confirm vote from party {0:?}")]
    DuplicateConfirmVote(crate::ids::PartyId),
    #[error("message receiver identity does not match local identity")]
    WrongReceiverIdentity,
    #[error("vote_option=Yes must carry peer_info")]
    MissingPeerInfo,

    // --- Configuration ---
    #[error("invalid epoch configuration: {0}")]
    InvalidEpochConfig(String),

    // --- Persistence (C1) ---
    #[error("write-ahead log put failed: {0}")]
    WalWrite(String),
    #[error("write-ahead log read failed: {0}")]
    WalRead(String),
    #[error("write-ahead log row for key {0:?} failed to decode and was dropped")]
    WalRowCorrupt(Vec<u8>),
    #[error("write-ahead log scan failed, recovery aborted: {0}")]
    RecoveryFatal(String),
    #[error("key has unexpected length: expected {expect}, actual {actual}")]
    MismatchedLength { expect: usize, actual: usize },

    // --- State store / lifecycle ---
    #[error("proposal {0} has no state for party {1:?}")]
    PartyNotFound(crate::ids::ProposalId, crate::ids::PartyId),
    #[error("proposal {0} already exists")]
    ProposalAlreadyExists(crate::ids::ProposalId),

    // --- Transport (C6) ---
    #[error("failed to resolve peer id for node {0:?}")]
    PeerResolution(crate::ids::NodeId),

    // --- Encoding ---
    #[error("protobuf decode failed: {0}")]
    Codec(#[from] prost::DecodeError),

    #[error("failed to get current time")]
    Clock(#[from] std::time::SystemTimeError),
}
