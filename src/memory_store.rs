//! In-memory stand-ins for the file backed record and chunk storage.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;

use crate::chunk_store::{ChunkId, ChunkStore};
use crate::record::Record;
use crate::record_io::{RecordSink, RecordSource};

#[derive(Default)]
struct Storage {
    chunks: BTreeMap<ChunkId, Vec<Record>>,
    outputs: HashMap<PathBuf, Vec<Record>>,
    created: Vec<ChunkId>,
    failing: HashSet<ChunkId>,
    discarded: HashSet<ChunkId>,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryChunkStore {
    storage: Arc<Mutex<Storage>>,
    open_readers: Arc<AtomicUsize>,
}

impl MemoryChunkStore {
    pub(crate) fn new() -> MemoryChunkStore {
        MemoryChunkStore::default()
    }

    fn storage(&self) -> MutexGuard<'_, Storage> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, id: ChunkId, records: Vec<Record>) {
        self.storage().chunks.insert(id, records);
    }

    pub(crate) fn chunk(&self, id: ChunkId) -> Option<Vec<Record>> {
        self.storage().chunks.get(&id).cloned()
    }

    pub(crate) fn output(&self, path: &Path) -> Option<Vec<Record>> {
        self.storage().outputs.get(path).cloned()
    }

    /// Every chunk ever created, in creation order
    pub(crate) fn created(&self) -> Vec<ChunkId> {
        self.storage().created.clone()
    }

    pub(crate) fn created_in_pass(&self, pass: usize) -> usize {
        self.created().iter().filter(|id| id.pass() == pass).count()
    }

    pub(crate) fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::SeqCst)
    }

    /// Creating `id` fails
    pub(crate) fn fail_create(&self, id: ChunkId) {
        self.storage().failing.insert(id);
    }

    /// Writing `id` appears to succeed but the chunk is never stored
    pub(crate) fn discard(&self, id: ChunkId) {
        self.storage().discarded.insert(id);
    }
}

impl ChunkStore for MemoryChunkStore {
    fn create(&self, id: ChunkId) -> Result<Box<dyn RecordSink>, anyhow::Error> {
        let mut storage = self.storage();
        if storage.failing.contains(&id) {
            return Err(anyhow!("injected failure creating {}", id));
        }
        storage.created.push(id);
        Ok(
            Box::new(
                MemorySink {
                    storage: self.storage.clone(),
                    id,
                    records: Vec::new(),
                }
            )
        )
    }

    fn open(&self, id: ChunkId) -> Result<Box<dyn RecordSource>, anyhow::Error> {
        let records = self.chunk(id).ok_or_else(|| anyhow!("no such chunk: {}", id))?;
        self.open_readers.fetch_add(1, Ordering::SeqCst);
        Ok(
            Box::new(
                MemorySource {
                    records: records.into(),
                    open_readers: Some(self.open_readers.clone()),
                }
            )
        )
    }

    fn exists(&self, id: ChunkId) -> bool {
        self.storage().chunks.contains_key(&id)
    }

    fn remove(&self, id: ChunkId) -> Result<(), anyhow::Error> {
        self.storage().chunks.remove(&id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("no such chunk: {}", id))
    }

    fn promote(&self, id: ChunkId, output: &Path) -> Result<(), anyhow::Error> {
        let mut storage = self.storage();
        let records = storage.chunks.remove(&id).ok_or_else(|| anyhow!("no such chunk: {}", id))?;
        storage.outputs.insert(output.to_path_buf(), records);
        Ok(())
    }
}

struct MemorySink {
    storage: Arc<Mutex<Storage>>,
    id: ChunkId,
    records: Vec<Record>,
}

impl RecordSink for MemorySink {
    fn write_record(&mut self, record: &Record) -> Result<(), anyhow::Error> {
        self.records.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), anyhow::Error> {
        let records = std::mem::take(&mut self.records);
        let mut storage = self.storage.lock().unwrap_or_else(PoisonError::into_inner);
        if !storage.discarded.contains(&self.id) {
            storage.chunks.insert(self.id, records);
        }
        Ok(())
    }
}

/// Records served from memory; also used as the input of a sort.
pub(crate) struct MemorySource {
    records: VecDeque<Record>,
    open_readers: Option<Arc<AtomicUsize>>,
}

impl MemorySource {
    pub(crate) fn new(records: Vec<Record>) -> MemorySource {
        MemorySource {
            records: records.into(),
            open_readers: None,
        }
    }
}

impl RecordSource for MemorySource {
    fn next_record(&mut self) -> Result<Option<Record>, anyhow::Error> {
        Ok(self.records.pop_front())
    }
}

impl Drop for MemorySource {
    fn drop(&mut self) {
        if let Some(open_readers) = &self.open_readers {
            open_readers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Serves `records` and then fails, like an input with a malformed row.
pub(crate) struct FailingSource {
    records: VecDeque<Record>,
}

impl FailingSource {
    pub(crate) fn new(records: Vec<Record>) -> FailingSource {
        FailingSource {
            records: records.into(),
        }
    }
}

impl RecordSource for FailingSource {
    fn next_record(&mut self) -> Result<Option<Record>, anyhow::Error> {
        match self.records.pop_front() {
            Some(record) => Ok(Some(record)),
            None => Err(anyhow!("malformed record")),
        }
    }
}

/// Records keyed on field 0, valued on field 1, one per `(key, value)` pair.
pub(crate) fn records(pairs: &[(&str, &str)]) -> Vec<Record> {
    pairs.iter().map(|(key, value)| Record::new([*key, *value])).collect()
}
