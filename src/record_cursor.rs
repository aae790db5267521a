use std::cmp::Ordering;

use anyhow::{anyhow, Context};

use crate::chunk_store::{ChunkId, ChunkStore};
use crate::record::Record;
use crate::record_io::RecordSource;

/// Forward-only view over one sorted chunk.
pub(crate) struct RecordCursor {
    chunk: ChunkId,
    key_index: usize,
    source: Option<Box<dyn RecordSource>>,
    current: Option<Record>,
}

impl RecordCursor {
    /// Open `chunk` and position the cursor on its first record.
    pub(crate) fn open(store: &dyn ChunkStore, chunk: ChunkId, key_index: usize) -> Result<RecordCursor, anyhow::Error> {
        let source = store.open(chunk)?;
        let mut cursor = RecordCursor {
            chunk,
            key_index,
            source: Some(source),
            current: None,
        };
        cursor.advance()?;
        Ok(cursor)
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.current.is_none()
    }

    /// Move to the next record, returning the one the cursor was on. The underlying source is
    /// dropped, closing its handle, as soon as the chunk is consumed.
    pub(crate) fn advance(&mut self) -> Result<Option<Record>, anyhow::Error> {
        let next = match self.source.as_mut() {
            Some(source) => source.next_record()?,
            None => None,
        };
        match &next {
            Some(record) => {
                record.key(self.key_index)
                    .with_context(|| anyhow!("{}", self.chunk))?;
            }
            None => {
                self.source = None;
            }
        }
        Ok(std::mem::replace(&mut self.current, next))
    }
}

impl Eq for RecordCursor {}

impl PartialEq<Self> for RecordCursor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd<Self> for RecordCursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordCursor {
    // comparison is flipped to work with BinaryHeap (Max Heap): the smallest key pops first and
    // equal keys pop in chunk order, which keeps the merge stable
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.current, &other.current) {
            (None, None) => other.chunk.cmp(&self.chunk),
            // none > some so exhausted cursors pop first
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(mine), Some(theirs)) => {
                theirs.cmp_by_key(mine, self.key_index)
                    .then_with(|| other.chunk.cmp(&self.chunk))
            }
        }
    }
}
