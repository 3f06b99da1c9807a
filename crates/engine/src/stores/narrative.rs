//! Append-only, per-character narrative log.

use std::sync::Arc;

use chasm_domain::{CharacterName, NarrativeEntry, NarrativeEvent, Seq, UnnumberedEntry};
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};

use super::error::StoreError;
use crate::infrastructure::ports::{ClockPort, NarrativeRepo};

/// Entries fetched from the repo per page when streaming.
const PAGE_SIZE: usize = 64;

/// Which part of a character's narrative to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrativeRange {
    All,
    /// The oldest `n` entries
    First(u64),
    /// The newest `n` entries, as of when reading starts
    Last(u64),
    /// Every entry from this sequence number on
    From(Seq),
    /// Entries between two sequence numbers, inclusive
    Between(Seq, Seq),
}

/// Narrative storage with per-character sequencing.
///
/// Storage numbers the entries, so logs in different processes sharing one
/// store append to the same gap-free sequence.
pub struct NarrativeLog {
    repo: Arc<dyn NarrativeRepo>,
    clock: Arc<dyn ClockPort>,
}

impl NarrativeLog {
    pub fn new(repo: Arc<dyn NarrativeRepo>, clock: Arc<dyn ClockPort>) -> Self {
        Self { repo, clock }
    }

    /// Append an entry with the next sequence number for `character`.
    ///
    /// Only storage failures are returned, and they are fatal.
    pub async fn append(
        &self,
        character: &CharacterName,
        event: NarrativeEvent,
        text: impl Into<String>,
    ) -> Result<NarrativeEntry, StoreError> {
        let entry = UnnumberedEntry {
            character: character.clone(),
            recorded_at: self.clock.now(),
            event,
            text: text.into(),
        };
        let entry = self.repo.append(entry).await.map_err(|e| {
            tracing::error!(character = %character, error = %e, "Narrative append failed");
            StoreError::storage("narrative_append", e)
        })?;

        tracing::debug!(character = %character, seq = entry.seq, event = entry.event.label(), "Narrative appended");
        Ok(entry)
    }

    /// Append with the event's own description as text.
    pub async fn record(
        &self,
        character: &CharacterName,
        event: NarrativeEvent,
    ) -> Result<NarrativeEntry, StoreError> {
        let text = event.describe();
        self.append(character, event, text).await
    }

    pub fn read(&self, character: &CharacterName, range: NarrativeRange) -> NarrativeQuery {
        NarrativeQuery {
            repo: self.repo.clone(),
            character: character.clone(),
            range,
            page_size: PAGE_SIZE,
        }
    }

    pub async fn count(&self, character: &CharacterName) -> Result<u64, StoreError> {
        self.repo
            .count(character)
            .await
            .map_err(|e| StoreError::storage("narrative_count", e))
    }
}

/// A lazily evaluated slice of one character's narrative.
///
/// Every call to [`NarrativeQuery::stream`] starts from the beginning of the
/// range again.
#[derive(Clone)]
pub struct NarrativeQuery {
    repo: Arc<dyn NarrativeRepo>,
    character: CharacterName,
    range: NarrativeRange,
    page_size: usize,
}

enum Paging {
    Start,
    Next { after: Seq, upto: Option<Seq> },
    Done,
}

impl NarrativeQuery {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn stream(&self) -> BoxStream<'static, Result<NarrativeEntry, StoreError>> {
        let query = self.clone();
        stream::try_unfold(Paging::Start, move |state| {
            let query = query.clone();
            async move { query.next_page(state).await }
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, StoreError>)))
        .try_flatten()
        .boxed()
    }

    /// The page after `state`, or `None` once the range is exhausted.
    async fn next_page(
        &self,
        state: Paging,
    ) -> Result<Option<(Vec<NarrativeEntry>, Paging)>, StoreError> {
        let (after, upto) = match state {
            Paging::Done => return Ok(None),
            Paging::Next { after, upto } => (after, upto),
            Paging::Start => match self.range {
                NarrativeRange::All => (0, None),
                NarrativeRange::First(n) => (0, Some(n)),
                NarrativeRange::From(seq) => (seq.saturating_sub(1), None),
                NarrativeRange::Between(from, to) => (from.saturating_sub(1), Some(to)),
                NarrativeRange::Last(n) => {
                    let last = self
                        .repo
                        .last_seq(&self.character)
                        .await
                        .map_err(|e| StoreError::storage("narrative_last_seq", e))?;
                    (last.saturating_sub(n), Some(last))
                }
            },
        };

        let limit = match upto {
            Some(upto) if upto <= after => return Ok(None),
            Some(upto) => usize::try_from(upto - after)
                .unwrap_or(usize::MAX)
                .min(self.page_size),
            None => self.page_size,
        };

        let page = self
            .repo
            .read(&self.character, after, limit)
            .await
            .map_err(|e| StoreError::storage("narrative_read", e))?;
        let Some(last) = page.last().map(|entry| entry.seq) else {
            return Ok(None);
        };
        let next = if page.len() < limit {
            Paging::Done
        } else {
            Paging::Next { after: last, upto }
        };
        Ok(Some((page, next)))
    }

    pub async fn collect(&self) -> Result<Vec<NarrativeEntry>, StoreError> {
        self.stream().try_collect().await
    }
}

/// Plain-text transcript of entries, one per line.
pub fn render(entries: &[NarrativeEntry]) -> String {
    entries
        .iter()
        .map(NarrativeEntry::transcript_line)
        .collect::<Vec<_>>()
        .join("\n")
}
