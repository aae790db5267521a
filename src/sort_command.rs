use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use command_executor::command::Command;

use crate::chunk_store::{ChunkId, ChunkStore};
use crate::record::{sort_records, Record};

/// Sort one batch of records by key and persist it as a pass 0 chunk.
pub(crate) struct SortCommand {
    batch: Mutex<Vec<Record>>,
    chunk: ChunkId,
    key_index: usize,
    store: Arc<dyn ChunkStore>,
}

impl SortCommand {
    pub(crate) fn new(batch: Vec<Record>, chunk: ChunkId, key_index: usize, store: Arc<dyn ChunkStore>) -> SortCommand {
        SortCommand {
            batch: Mutex::new(batch),
            chunk,
            key_index,
            store,
        }
    }

    fn write_sorted_batch(&self, batch: &[Record]) -> Result<(), anyhow::Error> {
        let mut sink = self.store.create(self.chunk)?;
        for record in batch {
            sink.write_record(record)?;
        }
        sink.finish()
    }
}

impl Command for SortCommand {
    fn execute(&self) -> Result<(), anyhow::Error> {
        let mut batch = std::mem::take(
            &mut *self.batch.lock().unwrap_or_else(PoisonError::into_inner)
        );
        sort_records(&mut batch, self.key_index);
        self.write_sorted_batch(&batch)?;
        log::debug!(
            "Sorted {} records into {}, thread: {}",
            batch.len(),
            self.chunk,
            thread::current().name().unwrap_or("unnamed")
        );
        Ok(())
    }
}
