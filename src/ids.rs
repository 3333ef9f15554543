//! Identifier newtypes shared across the engine.
//!
//! `identityId`, `partyId`, `nodeId` are length-prefixed byte strings on the
//! wire (spec §6); `proposalId` is a fixed 32-byte hash. Wrapping them in
//! distinct types stops a `PartyId` and a `NodeId` from being swapped at a
//! call site by accident.

use std::fmt;

use sha2::{Digest, Sha256};

macro_rules! byte_id {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub Vec<u8>);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(&self.0))
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(v: Vec<u8>) -> Self {
                Self(v)
            }
        }

        impl From<&[u8]> for $name {
            fn from(v: &[u8]) -> Self {
                Self(v.to_vec())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

byte_id!(IdentityId);
byte_id!(PartyId);
byte_id!(NodeId);
byte_id!(TaskId);

/// 32-byte hash identifying a proposal, derived from
/// `(sender_identity, sender_party, task_id, creation_time)` (spec §3).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProposalId(pub [u8; 32]);

impl ProposalId {
    pub fn derive(
        sender_identity: &IdentityId,
        sender_party: &PartyId,
        task_id: &TaskId,
        creation_time_ms: u64,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&sender_identity.0);
        hasher.update(&sender_party.0);
        hasher.update(&task_id.0);
        hasher.update(creation_time_ms.to_be_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProposalId({})", hex::encode(self.0))
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<&[u8]> for ProposalId {
    type Error = crate::error::ConsensusError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != 32 {
            return Err(crate::error::ConsensusError::MismatchedLength {
                expect: 32,
                actual: value.len(),
            });
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(value);
        Ok(Self(out))
    }
}

/// Fixed byte length of the `taskId` field baked into the WAL key layout
/// (spec §9 — "protocol constants, document them and validate on load").
pub const TASK_ID_WIRE_LEN: usize = 71;

impl TaskId {
    /// Reject anything that isn't exactly `TASK_ID_WIRE_LEN` bytes. Called at
    /// every point a task id is accepted from a caller or the wire, before
    /// it's used to build a WAL key (spec §9).
    pub fn validate(&self) -> Result<(), crate::error::ConsensusError> {
        if self.0.len() != TASK_ID_WIRE_LEN {
            return Err(crate::error::ConsensusError::MismatchedLength {
                expect: TASK_ID_WIRE_LEN,
                actual: self.0.len(),
            });
        }
        Ok(())
    }
}

/// Minimal dependency-free hex encoder, used only for `Debug`/`Display`.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }
}
