use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context};
use command_executor::command::Command;

use crate::chunk_store::ChunkStore;
use crate::pass_scheduler::ChunkGroup;
use crate::record_cursor::RecordCursor;

/// K-way merge of the chunks of `group` into the group's output chunk. Returns the number of
/// records written.
///
/// Cursors are opened in ascending chunk order and the heap breaks key ties by chunk index, so
/// equal keys come out in the order of their source chunks. A chunk that cannot be opened fails
/// the whole group; an empty chunk is skipped.
pub(crate) fn merge_group(store: &dyn ChunkStore, group: &ChunkGroup, key_index: usize) -> Result<u64, anyhow::Error> {
    let mut cursors = BinaryHeap::with_capacity(group.len());
    for chunk in group.inputs() {
        let cursor = RecordCursor::open(store, chunk, key_index)
            .with_context(|| anyhow!("Merging {}", group))?;
        if !cursor.is_exhausted() {
            cursors.push(cursor);
        }
    }

    let mut sink = store.create(group.output())?;
    let mut merged: u64 = 0;
    while let Some(mut current_min) = cursors.pop() {
        if let Some(record) = current_min.advance()? {
            sink.write_record(&record)?;
            merged += 1;
        }
        if !current_min.is_exhausted() {
            cursors.push(current_min);
        }
    }
    sink.finish()?;
    Ok(merged)
}

/// Merge one group of a pass, adding the records written to a counter shared by the pass.
pub(crate) struct MergeCommand {
    group: ChunkGroup,
    key_index: usize,
    store: Arc<dyn ChunkStore>,
    merged: Arc<AtomicU64>,
}

impl MergeCommand {
    pub(crate) fn new(group: ChunkGroup, key_index: usize, store: Arc<dyn ChunkStore>, merged: Arc<AtomicU64>) -> MergeCommand {
        MergeCommand {
            group,
            key_index,
            store,
            merged,
        }
    }
}

impl Command for MergeCommand {
    fn execute(&self) -> Result<(), anyhow::Error> {
        log::debug!("Merging {}, thread: {}", self.group, thread::current().name().unwrap_or("unnamed"));
        let merged = merge_group(self.store.as_ref(), &self.group, self.key_index)?;
        self.merged.fetch_add(merged, Ordering::SeqCst);
        log::debug!(
            "Finished merging {}, merged length: {} records, thread: {}",
            self.group,
            merged,
            thread::current().name().unwrap_or("unnamed")
        );
        Ok(())
    }
}
