//! Write-ahead log (spec §4.1): durable key-value store for proposal rows,
//! party-state rows, and the task-id -> proposal-id back-index. Keys are
//! built so that a single prefix scan recovers all rows belonging to one
//! entity, which is what `recovery` relies on at startup.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ConsensusError;
use crate::ids::{PartyId, ProposalId, TaskId, TASK_ID_WIRE_LEN};

const PROPOSAL_PREFIX: u8 = b'P';
const PARTY_STATE_PREFIX: u8 = b'S';
const TASK_INDEX_PREFIX: u8 = b'T';

/// Lay a task id out as the fixed wire length so task-index keys sort and
/// scan predictably. Rejects anything not already exactly that length
/// rather than padding or truncating, which would let two distinct long
/// task ids collide on the same key (spec §9).
fn task_id_key_bytes(task_id: &TaskId) -> Result<[u8; TASK_ID_WIRE_LEN], ConsensusError> {
    if task_id.0.len() != TASK_ID_WIRE_LEN {
        return Err(ConsensusError::MismatchedLength {
            expect: TASK_ID_WIRE_LEN,
            actual: task_id.0.len(),
        });
    }
    let mut buf = [0u8; TASK_ID_WIRE_LEN];
    buf.copy_from_slice(&task_id.0);
    Ok(buf)
}

pub fn proposal_key(id: &ProposalId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 32);
    key.push(PROPOSAL_PREFIX);
    key.extend_from_slice(id.as_bytes());
    key
}

pub fn party_state_prefix(id: &ProposalId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 32);
    key.push(PARTY_STATE_PREFIX);
    key.extend_from_slice(id.as_bytes());
    key
}

pub fn party_state_key(id: &ProposalId, party: &PartyId) -> Vec<u8> {
    let mut key = party_state_prefix(id);
    key.extend_from_slice(&party.0);
    key
}

pub fn task_index_prefix(task_id: &TaskId) -> Result<Vec<u8>, ConsensusError> {
    let mut key = Vec::with_capacity(1 + TASK_ID_WIRE_LEN);
    key.push(TASK_INDEX_PREFIX);
    key.extend_from_slice(&task_id_key_bytes(task_id)?);
    Ok(key)
}

pub fn task_index_key(task_id: &TaskId, party: &PartyId) -> Result<Vec<u8>, ConsensusError> {
    let mut key = task_index_prefix(task_id)?;
    key.extend_from_slice(&party.0);
    Ok(key)
}

/// Durable key-value store with prefix iteration. Implementors must make
/// `put`/`delete` crash-safe: a row is either fully written or absent, never
/// partially written (spec §4.1).
pub trait Wal: Clone + Send + Sync + 'static {
    fn put(
        &self,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> impl Future<Output = Result<(), ConsensusError>> + Send;

    fn delete(&self, key: &[u8]) -> impl Future<Output = Result<(), ConsensusError>> + Send;

    fn get(
        &self,
        key: &[u8],
    ) -> impl Future<Output = Result<Option<Vec<u8>>, ConsensusError>> + Send;

    /// All rows whose key starts with `prefix`, in key order.
    fn scan_prefix(
        &self,
        prefix: &[u8],
    ) -> impl Future<Output = Result<Vec<(Vec<u8>, Vec<u8>)>, ConsensusError>> + Send;
}

/// In-memory WAL. Nothing survives a restart; use only for tests or
/// single-process scenarios where recovery never needs to run for real.
#[derive(Clone, Default)]
pub struct InMemoryWal {
    rows: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryWal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Wal for InMemoryWal {
    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), ConsensusError> {
        self.rows.write().insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), ConsensusError> {
        self.rows.write().remove(key);
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ConsensusError> {
        Ok(self.rows.read().get(key).cloned())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ConsensusError> {
        let guard = self.rows.read();
        Ok(guard
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Sled-backed WAL. Every write is flushed through sled's own durability,
/// satisfying the crash-safety requirement. Sled's API is blocking, so each
/// call runs on tokio's blocking pool rather than stalling the executor.
#[derive(Clone)]
pub struct SledWal {
    db: sled::Db,
}

impl SledWal {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConsensusError> {
        let db = sled::open(path).map_err(|e| ConsensusError::WalWrite(e.to_string()))?;
        Ok(Self { db })
    }
}

impl Wal for SledWal {
    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), ConsensusError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            db.insert(key, value)
                .map_err(|e| ConsensusError::WalWrite(e.to_string()))?;
            db.flush()
                .map_err(|e| ConsensusError::WalWrite(e.to_string()))?;
            Ok::<_, ConsensusError>(())
        })
        .await
        .map_err(|e| ConsensusError::WalWrite(e.to_string()))??;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), ConsensusError> {
        let db = self.db.clone();
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || {
            db.remove(key)
                .map_err(|e| ConsensusError::WalWrite(e.to_string()))?;
            db.flush()
                .map_err(|e| ConsensusError::WalWrite(e.to_string()))?;
            Ok::<_, ConsensusError>(())
        })
        .await
        .map_err(|e| ConsensusError::WalWrite(e.to_string()))??;
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ConsensusError> {
        let db = self.db.clone();
        let key = key.to_vec();
        let value = tokio::task::spawn_blocking(move || db.get(key))
            .await
            .map_err(|e| ConsensusError::WalRead(e.to_string()))?
            .map_err(|e| ConsensusError::WalRead(e.to_string()))?;
        Ok(value.map(|v| v.to_vec()))
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ConsensusError> {
        let db = self.db.clone();
        let prefix = prefix.to_vec();
        tokio::task::spawn_blocking(move || {
            db.scan_prefix(&prefix)
                .map(|res| {
                    res.map(|(k, v)| (k.to_vec(), v.to_vec()))
                        .map_err(|e| ConsensusError::WalRead(e.to_string()))
                })
                .collect::<Result<Vec<_>, ConsensusError>>()
        })
        .await
        .map_err(|e| ConsensusError::WalRead(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_wal_scans_by_prefix() {
        let wal = InMemoryWal::new();
        wal.put(vec![b'P', 1], b"a".to_vec()).await.unwrap();
        wal.put(vec![b'P', 2], b"b".to_vec()).await.unwrap();
        wal.put(vec![b'S', 1], b"c".to_vec()).await.unwrap();

        let rows = wal.scan_prefix(&[b'P']).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, b"a");
        assert_eq!(rows[1].1, b"b");
    }

    #[tokio::test]
    async fn in_memory_wal_delete_removes_row() {
        let wal = InMemoryWal::new();
        wal.put(vec![1, 2, 3], b"v".to_vec()).await.unwrap();
        wal.delete(&[1, 2, 3]).await.unwrap();
        assert!(wal.get(&[1, 2, 3]).await.unwrap().is_none());
    }
}
