use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};

use crate::chunk_store::{ChunkId, ChunkStore};
use crate::config::Config;
use crate::merge_command::MergeCommand;
use crate::outcome::{SortOutcome, SortReport};
use crate::pass_scheduler::PassScheduler;
use crate::record::Record;
use crate::record_io::RecordSource;
use crate::sort_command::SortCommand;
use crate::worker_pool::WorkerPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SortState {
    Start,
    Splitting,
    Merging {
        pass: usize,
    },
    Promoting,
    Done,
    Failed,
}

impl SortState {
    /// Move to `next`. Failed is terminal.
    pub(crate) fn transition(&mut self, next: SortState) {
        if *self == SortState::Failed {
            log::warn!("Ignoring transition from {} to {}", self, next);
            return;
        }
        log::info!("Sort state: {} -> {}", self, next);
        *self = next;
    }
}

impl Display for SortState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SortState::Start => write!(f, "start"),
            SortState::Splitting => write!(f, "splitting"),
            SortState::Merging { pass } => write!(f, "merging pass {}", pass),
            SortState::Promoting => write!(f, "promoting"),
            SortState::Done => write!(f, "done"),
            SortState::Failed => write!(f, "failed"),
        }
    }
}

enum Split {
    Empty,
    InMemory {
        records: u64,
    },
    Chunks {
        chunks: usize,
        records: u64,
    },
}

/// External merge sort over an injected chunk store.
///
/// The input is cut into batches of `records_in_memory` records, each sorted and written as a
/// pass 0 chunk. Merge passes then combine groups of up to `records_in_memory` chunks until a
/// single chunk is left, which is moved to the output. Every phase runs on one worker pool and
/// completes before the next one starts.
pub(crate) struct ExternalSort {
    config: Config,
    store: Arc<dyn ChunkStore>,
    scheduler: PassScheduler,
}

impl ExternalSort {
    pub(crate) fn new(config: Config, store: Arc<dyn ChunkStore>) -> ExternalSort {
        let scheduler = PassScheduler::new(config.records_in_memory());
        ExternalSort {
            config,
            store,
            scheduler,
        }
    }

    pub(crate) fn run(&self, source: &mut dyn RecordSource, output: &Path) -> Result<SortOutcome, anyhow::Error> {
        let mut state = SortState::Start;
        let mut pool = WorkerPool::new("sorting", self.config.tasks(), self.config.queue_size())?;
        match self.drive(&mut pool, source, output, &mut state) {
            Ok(outcome) => {
                pool.shutdown()?;
                Ok(outcome)
            }
            Err(e) => {
                state.transition(SortState::Failed);
                // dropping the pool completes and joins whatever is still queued
                Err(e)
            }
        }
    }

    fn drive(&self, pool: &mut WorkerPool, source: &mut dyn RecordSource, output: &Path, state: &mut SortState) -> Result<SortOutcome, anyhow::Error> {
        state.transition(SortState::Splitting);
        let (chunks, records) = match self.split(pool, source)? {
            Split::Empty => {
                log::info!("Input is empty, nothing to sort");
                state.transition(SortState::Done);
                return Ok(SortOutcome::NothingToSort);
            }
            Split::InMemory { records } => {
                // no merge pass, the sorted batch goes to the output as is
                let chunk = ChunkId::new(0, 0);
                self.store.promote(chunk, output)
                    .with_context(|| anyhow!("Promote {} to {}", chunk, output.display()))?;
                log::info!("Promoted {} to {}", chunk, output.display());
                state.transition(SortState::Done);
                return Ok(SortOutcome::Sorted(SortReport::new(records, vec![1], true)));
            }
            Split::Chunks { chunks, records } => (chunks, records),
        };

        log::info!(
            "Split {} records into {} chunks, merge passes ahead: {}",
            records,
            chunks,
            self.scheduler.merge_passes(chunks)
        );
        let mut chunk_counts = vec![chunks];
        let mut pass = 0;
        let mut total_chunks = chunks;
        while total_chunks > 1 {
            state.transition(SortState::Merging { pass });
            total_chunks = self.merge_pass(pool, pass, total_chunks, records)?;
            chunk_counts.push(total_chunks);
            pass += 1;
        }

        state.transition(SortState::Promoting);
        let final_chunk = ChunkId::new(pass, 0);
        if !self.store.exists(final_chunk) {
            log::error!("Final chunk is missing: {}, no output written", final_chunk);
            state.transition(SortState::Done);
            return Ok(SortOutcome::MissingFinalChunk { pass });
        }
        self.store.promote(final_chunk, output)
            .with_context(|| anyhow!("Promote {} to {}", final_chunk, output.display()))?;
        log::info!("Promoted {} to {}", final_chunk, output.display());
        state.transition(SortState::Done);
        Ok(SortOutcome::Sorted(SortReport::new(records, chunk_counts, false)))
    }

    fn split(&self, pool: &mut WorkerPool, source: &mut dyn RecordSource) -> Result<Split, anyhow::Error> {
        let records_in_memory = self.config.records_in_memory();
        let mut phase = pool.phase("split")?;
        let mut chunk_number = 0;
        let mut records: u64 = 0;
        // stop reading once a command failed, wait() below reports why
        while !phase.has_failed() {
            let batch = self.read_batch(source, records)?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len();
            records += batch_len as u64;

            let id = ChunkId::new(0, chunk_number);
            phase.submit(
                SortCommand::new(batch, id, self.config.key_field(), self.store.clone())
            );
            if chunk_number == 0 && batch_len < records_in_memory {
                log::info!("Input of {} records fits in memory, sorted as a single chunk", batch_len);
                phase.wait()?;
                return Ok(Split::InMemory { records });
            }
            chunk_number += 1;
            if batch_len < records_in_memory {
                break;
            }
        }
        phase.wait()?;

        if chunk_number == 0 {
            Ok(Split::Empty)
        } else {
            Ok(
                Split::Chunks {
                    chunks: chunk_number,
                    records,
                }
            )
        }
    }

    /// Read up to `records_in_memory` records, failing on records without the key field.
    fn read_batch(&self, source: &mut dyn RecordSource, offset: u64) -> Result<Vec<Record>, anyhow::Error> {
        let records_in_memory = self.config.records_in_memory();
        let key_field = self.config.key_field();
        let mut batch = Vec::with_capacity(usize::min(records_in_memory, 4096));
        while batch.len() < records_in_memory {
            let n = offset + batch.len() as u64 + 1;
            match source.next_record().with_context(|| anyhow!("input record {}", n))? {
                Some(record) => {
                    record.key(key_field).with_context(|| anyhow!("input record {}", n))?;
                    batch.push(record);
                }
                None => break,
            }
        }
        Ok(batch)
    }

    /// Merge every group of `pass` and return the number of chunks in the next pass.
    fn merge_pass(&self, pool: &mut WorkerPool, pass: usize, total_chunks: usize, records: u64) -> Result<usize, anyhow::Error> {
        let groups = self.scheduler.groups(pass, total_chunks);
        let merged = Arc::new(AtomicU64::new(0));
        let mut phase = pool.phase(&format!("merge pass {}", pass))?;
        for group in &groups {
            phase.submit(
                MergeCommand::new(*group, self.config.key_field(), self.store.clone(), merged.clone())
            );
        }
        phase.wait()?;

        let merged = merged.load(Ordering::SeqCst);
        if merged != records {
            bail!("Merge pass {} wrote {} records, expected {}", pass, merged, records);
        }
        if !self.config.keep_intermediate() {
            for index in 0..total_chunks {
                self.store.remove(ChunkId::new(pass, index))?;
            }
        }
        log::info!("Finished merge pass {}, {} chunks merged into {}", pass, total_chunks, groups.len());
        Ok(groups.len())
    }
}
