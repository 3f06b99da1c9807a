//! Storage ports for world records and narrative entries.

use async_trait::async_trait;
use chasm_domain::{
    CharacterName, EntityKey, EntityKind, NarrativeEntry, Seq, UnnumberedEntry,
};

use super::error::RepoError;

/// Address of one stored record: its kind plus the canonical key string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub kind: EntityKind,
    pub id: String,
}

impl From<&EntityKey> for RecordKey {
    fn from(key: &EntityKey) -> Self {
        Self {
            kind: key.kind(),
            id: key.id(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A stored record and its revision. Every committed change to the record,
/// including a touch, raises the revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub json: String,
    pub revision: u64,
}

/// State a write requires of its record at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Any,
    Absent,
    Revision(u64),
}

impl From<Option<u64>> for Expect {
    fn from(revision: Option<u64>) -> Self {
        revision.map_or(Self::Absent, Self::Revision)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(String),
    Delete,
    /// Check the expectation and raise the revision; the value is unchanged.
    Touch,
}

/// One conditional record write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordWrite {
    pub key: RecordKey,
    pub op: WriteOp,
    pub expect: Expect,
}

impl RecordWrite {
    pub fn put(key: RecordKey, json: String) -> Self {
        Self {
            key,
            op: WriteOp::Put(json),
            expect: Expect::Any,
        }
    }

    pub fn delete(key: RecordKey) -> Self {
        Self {
            key,
            op: WriteOp::Delete,
            expect: Expect::Any,
        }
    }

    pub fn touch(key: RecordKey) -> Self {
        Self {
            key,
            op: WriteOp::Touch,
            expect: Expect::Any,
        }
    }

    pub fn expecting(mut self, expect: Expect) -> Self {
        self.expect = expect;
        self
    }
}

/// Durable storage behind the world store. Values are opaque JSON documents.
///
/// Several processes may share one store; conditional commits are what keep
/// their writes from overwriting each other.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorldRepo: Send + Sync {
    async fn load(&self, key: &RecordKey) -> Result<Option<StoredRecord>, RepoError>;

    /// Apply every write or none of them. Fails with [`RepoError::Stale`]
    /// when any write's expectation does not hold.
    async fn commit(&self, writes: Vec<RecordWrite>) -> Result<(), RepoError>;

    /// All records of one kind, ordered by key.
    async fn scan(&self, kind: EntityKind) -> Result<Vec<StoredRecord>, RepoError>;
}

/// Durable storage behind the narrative log.
///
/// Storage numbers entries itself, so every writer sharing it gets a gap-free
/// sequence per character.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NarrativeRepo: Send + Sync {
    /// Store `entry` with the character's next sequence number.
    async fn append(&self, entry: UnnumberedEntry) -> Result<NarrativeEntry, RepoError>;

    /// Highest stored sequence number, 0 when the log is empty.
    async fn last_seq(&self, character: &CharacterName) -> Result<Seq, RepoError>;

    /// Up to `limit` entries with `seq > after`, in sequence order.
    async fn read(
        &self,
        character: &CharacterName,
        after: Seq,
        limit: usize,
    ) -> Result<Vec<NarrativeEntry>, RepoError>;

    async fn count(&self, character: &CharacterName) -> Result<u64, RepoError>;
}
