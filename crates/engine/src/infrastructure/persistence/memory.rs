//! In-memory repositories, used for `storage = "memory"` and in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chasm_domain::{CharacterName, EntityKind, NarrativeEntry, Seq, UnnumberedEntry};
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::infrastructure::ports::{
    Expect, NarrativeRepo, RecordKey, RecordWrite, RepoError, StoredRecord, WorldRepo, WriteOp,
};

/// World records behind one read-write lock, so a commit of several records
/// becomes visible in one step.
#[derive(Default)]
pub struct InMemoryWorldRepo {
    records: RwLock<BTreeMap<RecordKey, StoredRecord>>,
}

impl InMemoryWorldRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

fn expectation_holds(current: Option<&StoredRecord>, expect: Expect) -> bool {
    match expect {
        Expect::Any => true,
        Expect::Absent => current.is_none(),
        Expect::Revision(revision) => current.is_some_and(|r| r.revision == revision),
    }
}

#[async_trait]
impl WorldRepo for InMemoryWorldRepo {
    async fn load(&self, key: &RecordKey) -> Result<Option<StoredRecord>, RepoError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn commit(&self, writes: Vec<RecordWrite>) -> Result<(), RepoError> {
        let mut records = self.records.write().await;
        if let Some(stale) = writes
            .iter()
            .find(|w| !expectation_holds(records.get(&w.key), w.expect))
        {
            return Err(RepoError::stale(&stale.key));
        }

        for write in writes {
            match write.op {
                WriteOp::Put(json) => {
                    let revision = records.get(&write.key).map_or(1, |r| r.revision + 1);
                    records.insert(write.key, StoredRecord { json, revision });
                }
                WriteOp::Delete => {
                    records.remove(&write.key);
                }
                WriteOp::Touch => {
                    if let Some(record) = records.get_mut(&write.key) {
                        record.revision += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn scan(&self, kind: EntityKind) -> Result<Vec<StoredRecord>, RepoError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

/// Narrative entries per character.
#[derive(Default)]
pub struct InMemoryNarrativeRepo {
    logs: DashMap<CharacterName, Vec<NarrativeEntry>>,
}

impl InMemoryNarrativeRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NarrativeRepo for InMemoryNarrativeRepo {
    async fn append(&self, entry: UnnumberedEntry) -> Result<NarrativeEntry, RepoError> {
        // The entry guard holds the shard lock until the push is done.
        let mut log = self.logs.entry(entry.character.clone()).or_default();
        let seq = log.last().map_or(0, |e| e.seq) + 1;
        let entry = entry.numbered(seq);
        log.push(entry.clone());
        Ok(entry)
    }

    async fn last_seq(&self, character: &CharacterName) -> Result<Seq, RepoError> {
        Ok(self
            .logs
            .get(character)
            .and_then(|log| log.last().map(|e| e.seq))
            .unwrap_or(0))
    }

    async fn read(
        &self,
        character: &CharacterName,
        after: Seq,
        limit: usize,
    ) -> Result<Vec<NarrativeEntry>, RepoError> {
        Ok(self
            .logs
            .get(character)
            .map(|log| {
                log.iter()
                    .filter(|e| e.seq > after)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, character: &CharacterName) -> Result<u64, RepoError> {
        Ok(self
            .logs
            .get(character)
            .map(|log| log.len() as u64)
            .unwrap_or(0))
    }
}
