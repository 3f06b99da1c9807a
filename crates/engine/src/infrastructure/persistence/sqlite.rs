//! SQLite-backed world and narrative storage.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chasm_domain::{CharacterName, EntityKind, NarrativeEntry, Seq, UnnumberedEntry};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::infrastructure::ports::{
    Expect, NarrativeRepo, RecordKey, RecordWrite, RepoError, StoredRecord, WorldRepo, WriteOp,
};

/// Open (creating if needed) the database file and ensure the schema exists.
///
/// Several processes may open the same file; writers wait for each other up
/// to the busy timeout.
pub async fn connect(db_path: &str) -> Result<SqlitePool, RepoError> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path))
        .map_err(|e| RepoError::database("connect", e))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .map_err(|e| RepoError::database("connect", e))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS world_records (
            kind TEXT NOT NULL,
            key TEXT NOT NULL,
            json TEXT NOT NULL,
            revision INTEGER NOT NULL,
            PRIMARY KEY (kind, key)
        )
        "#,
    )
    .execute(&pool)
    .await
    .map_err(|e| RepoError::database("schema", e))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS narrative_entries (
            character TEXT NOT NULL,
            seq INTEGER NOT NULL,
            recorded_at TEXT NOT NULL,
            event TEXT NOT NULL,
            text TEXT NOT NULL,
            PRIMARY KEY (character, seq)
        )
        "#,
    )
    .execute(&pool)
    .await
    .map_err(|e| RepoError::database("schema", e))?;

    tracing::info!(path = %db_path, "SQLite storage ready");
    Ok(pool)
}

/// World records in the `world_records` table.
#[derive(Clone)]
pub struct SqliteWorldRepo {
    pool: SqlitePool,
}

impl SqliteWorldRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn revision_to_db(revision: u64) -> Result<i64, RepoError> {
    i64::try_from(revision)
        .map_err(|_| RepoError::constraint(format!("revision {revision} out of range")))
}

fn stored_record(row: &SqliteRow) -> StoredRecord {
    StoredRecord {
        json: row.get("json"),
        revision: u64::try_from(row.get::<i64, _>("revision")).unwrap_or(0),
    }
}

/// Run one write; `false` when its expectation does not hold.
///
/// Every statement here writes, so the first one in a transaction takes the
/// database write lock and later ones see the newest committed state.
async fn apply_write(conn: &mut SqliteConnection, write: &RecordWrite) -> Result<bool, RepoError> {
    let kind = write.key.kind.as_str();
    let key = write.key.id.as_str();
    let err = |e: sqlx::Error| RepoError::database("commit", e);

    let affected = match (&write.op, write.expect) {
        (WriteOp::Put(json), Expect::Any) => {
            sqlx::query(
                r#"
                INSERT INTO world_records (kind, key, json, revision)
                VALUES (?, ?, ?, 1)
                ON CONFLICT(kind, key) DO UPDATE
                SET json = excluded.json, revision = world_records.revision + 1
                "#,
            )
            .bind(kind)
            .bind(key)
            .bind(json)
            .execute(&mut *conn)
            .await
            .map_err(err)?;
            return Ok(true);
        }
        (WriteOp::Put(json), Expect::Absent) => sqlx::query(
            r#"
            INSERT INTO world_records (kind, key, json, revision)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(kind, key) DO NOTHING
            "#,
        )
        .bind(kind)
        .bind(key)
        .bind(json)
        .execute(&mut *conn)
        .await
        .map_err(err)?
        .rows_affected(),
        (WriteOp::Put(json), Expect::Revision(revision)) => sqlx::query(
            r#"
            UPDATE world_records SET json = ?, revision = revision + 1
            WHERE kind = ? AND key = ? AND revision = ?
            "#,
        )
        .bind(json)
        .bind(kind)
        .bind(key)
        .bind(revision_to_db(revision)?)
        .execute(&mut *conn)
        .await
        .map_err(err)?
        .rows_affected(),
        (WriteOp::Delete, Expect::Any) => {
            sqlx::query("DELETE FROM world_records WHERE kind = ? AND key = ?")
                .bind(kind)
                .bind(key)
                .execute(&mut *conn)
                .await
                .map_err(err)?;
            return Ok(true);
        }
        (WriteOp::Delete, Expect::Revision(revision)) => sqlx::query(
            "DELETE FROM world_records WHERE kind = ? AND key = ? AND revision = ?",
        )
        .bind(kind)
        .bind(key)
        .bind(revision_to_db(revision)?)
        .execute(&mut *conn)
        .await
        .map_err(err)?
        .rows_affected(),
        (WriteOp::Touch, Expect::Any) => return Ok(true),
        (WriteOp::Touch, Expect::Revision(revision)) => sqlx::query(
            r#"
            UPDATE world_records SET revision = revision + 1
            WHERE kind = ? AND key = ? AND revision = ?
            "#,
        )
        .bind(kind)
        .bind(key)
        .bind(revision_to_db(revision)?)
        .execute(&mut *conn)
        .await
        .map_err(err)?
        .rows_affected(),
        // Matches the row without changing it; holds when nothing matched.
        (WriteOp::Delete | WriteOp::Touch, Expect::Absent) => {
            let matched = sqlx::query(
                "UPDATE world_records SET revision = revision WHERE kind = ? AND key = ?",
            )
            .bind(kind)
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(err)?
            .rows_affected();
            return Ok(matched == 0);
        }
    };
    Ok(affected == 1)
}

#[async_trait]
impl WorldRepo for SqliteWorldRepo {
    async fn load(&self, key: &RecordKey) -> Result<Option<StoredRecord>, RepoError> {
        let row = sqlx::query(
            "SELECT json, revision FROM world_records WHERE kind = ? AND key = ?",
        )
        .bind(key.kind.as_str())
        .bind(&key.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("load", e))?;

        Ok(row.as_ref().map(stored_record))
    }

    async fn commit(&self, writes: Vec<RecordWrite>) -> Result<(), RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("commit", e))?;

        for write in &writes {
            if !apply_write(&mut tx, write).await? {
                // Dropping the transaction rolls back the writes before it.
                return Err(RepoError::stale(&write.key));
            }
        }

        tx.commit()
            .await
            .map_err(|e| RepoError::database("commit", e))
    }

    async fn scan(&self, kind: EntityKind) -> Result<Vec<StoredRecord>, RepoError> {
        let rows = sqlx::query(
            "SELECT json, revision FROM world_records WHERE kind = ? ORDER BY key",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("scan", e))?;

        Ok(rows.iter().map(stored_record).collect())
    }
}

/// Narrative entries in the `narrative_entries` table, one row per entry.
#[derive(Clone)]
pub struct SqliteNarrativeRepo {
    pool: SqlitePool,
}

impl SqliteNarrativeRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn seq_to_db(seq: Seq) -> Result<i64, RepoError> {
    i64::try_from(seq).map_err(|_| RepoError::constraint(format!("seq {seq} out of range")))
}

fn seq_from_db(seq: i64) -> Result<Seq, RepoError> {
    Seq::try_from(seq).map_err(|_| RepoError::constraint(format!("stored seq {seq} is negative")))
}

fn entry_from_row(character: &CharacterName, row: &SqliteRow) -> Result<NarrativeEntry, RepoError> {
    Ok(NarrativeEntry {
        character: character.clone(),
        seq: seq_from_db(row.get("seq"))?,
        recorded_at: row.get::<DateTime<Utc>, _>("recorded_at"),
        event: serde_json::from_str(row.get::<&str, _>("event"))
            .map_err(RepoError::serialization)?,
        text: row.get("text"),
    })
}

#[async_trait]
impl NarrativeRepo for SqliteNarrativeRepo {
    async fn append(&self, entry: UnnumberedEntry) -> Result<NarrativeEntry, RepoError> {
        let event = serde_json::to_string(&entry.event).map_err(RepoError::serialization)?;

        // One statement: the number is read and used under the write lock.
        let row = sqlx::query(
            r#"
            INSERT INTO narrative_entries (character, seq, recorded_at, event, text)
            SELECT ?, COALESCE(MAX(seq), 0) + 1, ?, ?, ?
            FROM narrative_entries WHERE character = ?
            RETURNING seq
            "#,
        )
        .bind(entry.character.as_str())
        .bind(entry.recorded_at)
        .bind(event)
        .bind(&entry.text)
        .bind(entry.character.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::database("narrative_append", e))?;

        let seq = seq_from_db(row.get("seq"))?;
        Ok(entry.numbered(seq))
    }

    async fn last_seq(&self, character: &CharacterName) -> Result<Seq, RepoError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(seq), 0) AS last FROM narrative_entries WHERE character = ?",
        )
        .bind(character.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::database("narrative_last_seq", e))?;

        seq_from_db(row.get("last"))
    }

    async fn read(
        &self,
        character: &CharacterName,
        after: Seq,
        limit: usize,
    ) -> Result<Vec<NarrativeEntry>, RepoError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT seq, recorded_at, event, text FROM narrative_entries
            WHERE character = ? AND seq > ?
            ORDER BY seq LIMIT ?
            "#,
        )
        .bind(character.as_str())
        .bind(seq_to_db(after)?)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("narrative_read", e))?;

        rows.iter().map(|row| entry_from_row(character, row)).collect()
    }

    async fn count(&self, character: &CharacterName) -> Result<u64, RepoError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM narrative_entries WHERE character = ?")
            .bind(character.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepoError::database("narrative_count", e))?;

        Ok(row.get::<i64, _>("n").max(0) as u64)
    }
}
