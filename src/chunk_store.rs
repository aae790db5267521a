use std::fmt::{Display, Formatter};
use std::fs;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use tempfile::NamedTempFile;

use crate::record_io::{CsvFormat, CsvRecordReader, CsvRecordWriter, RecordSink, RecordSource};

/// Address of a chunk: the merge pass that produced it and its position within that pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ChunkId {
    pass: usize,
    index: usize,
}

impl ChunkId {
    pub(crate) fn new(pass: usize, index: usize) -> ChunkId {
        ChunkId {
            pass,
            index,
        }
    }

    pub(crate) fn pass(&self) -> usize {
        self.pass
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn file_name(&self) -> String {
        format!("pass_{}_chunk_{}.csv", self.pass(), self.index())
    }
}

impl Display for ChunkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "pass {} chunk {}", self.pass, self.index)
    }
}

/// Storage for the sorted runs of a single sort.
///
/// Chunks are addressed only by [ChunkId], so the split phase and every merge pass find each
/// other's results without sharing any state beyond the store itself. Each chunk is written by
/// exactly one task and read by exactly one task.
pub(crate) trait ChunkStore: Send + Sync {
    fn create(&self, id: ChunkId) -> Result<Box<dyn RecordSink>, anyhow::Error>;

    fn open(&self, id: ChunkId) -> Result<Box<dyn RecordSource>, anyhow::Error>;

    fn exists(&self, id: ChunkId) -> bool;

    fn remove(&self, id: ChunkId) -> Result<(), anyhow::Error>;

    /// Move the chunk to `output`, replacing any existing file there. `output` either keeps its
    /// previous content or holds the complete chunk, never a partial copy.
    fn promote(&self, id: ChunkId, output: &Path) -> Result<(), anyhow::Error>;
}

/// Chunks as CSV files in a scratch directory, named `pass_{pass}_chunk_{index}.csv`.
pub(crate) struct FileChunkStore {
    root: PathBuf,
    format: CsvFormat,
}

impl FileChunkStore {
    pub(crate) fn new(root: PathBuf, format: CsvFormat) -> FileChunkStore {
        FileChunkStore {
            root,
            format,
        }
    }

    pub(crate) fn location(&self, id: ChunkId) -> PathBuf {
        self.root.join(id.file_name())
    }

    /// Copy `path` to a temporary file next to `output`, then rename it over `output`.
    fn copy_into_place(path: &Path, output: &Path) -> Result<(), anyhow::Error> {
        let output_dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(output_dir)
            .with_context(|| anyhow!("Create temporary file in {}", output_dir.display()))?;
        let mut chunk = File::open(path)
            .with_context(|| anyhow!("path: {}", path.display()))?;
        io::copy(&mut chunk, &mut staged)
            .with_context(|| anyhow!("Copy {} to {}", path.display(), staged.path().display()))?;
        staged.as_file().sync_all()?;
        // temporary files are private, the output gets the chunk's permissions
        fs::set_permissions(staged.path(), chunk.metadata()?.permissions())?;
        staged.persist(output)
            .with_context(|| anyhow!("Move copy of {} to {}", path.display(), output.display()))?;
        Ok(())
    }
}

impl ChunkStore for FileChunkStore {
    fn create(&self, id: ChunkId) -> Result<Box<dyn RecordSink>, anyhow::Error> {
        let writer = CsvRecordWriter::create(&self.location(id), &self.format)
            .with_context(|| anyhow!("Failed to create {}", id))?;
        Ok(Box::new(writer))
    }

    fn open(&self, id: ChunkId) -> Result<Box<dyn RecordSource>, anyhow::Error> {
        let reader = CsvRecordReader::open(&self.location(id), &self.format)
            .with_context(|| anyhow!("Failed to open {}", id))?;
        Ok(Box::new(reader))
    }

    fn exists(&self, id: ChunkId) -> bool {
        self.location(id).is_file()
    }

    fn remove(&self, id: ChunkId) -> Result<(), anyhow::Error> {
        let path = self.location(id);
        fs::remove_file(&path)
            .with_context(|| anyhow!("Remove {}", path.display()))
    }

    fn promote(&self, id: ChunkId, output: &Path) -> Result<(), anyhow::Error> {
        let path = self.location(id);
        if let Err(e) = fs::rename(&path, output) {
            // scratch and output may live on different file systems
            log::info!("Rename {} to {} failed: {}, copying instead", path.display(), output.display(), e);
            Self::copy_into_place(&path, output)?;
            fs::remove_file(&path)
                .with_context(|| anyhow!("Remove {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::fs;

    use crate::chunk_store::{ChunkId, ChunkStore, FileChunkStore};
    use crate::record::Record;
    use crate::record_io::CsvFormat;

    #[test]
    fn test_chunk_names_are_unique_and_recomputable() {
        let store = FileChunkStore::new("scratch".into(), CsvFormat::default());
        let mut names = HashSet::new();
        for pass in 0..12 {
            for index in 0..12 {
                assert!(names.insert(store.location(ChunkId::new(pass, index))));
            }
        }
        // 1/11 and 11/1 must not collide
        assert_ne!(ChunkId::new(1, 11).file_name(), ChunkId::new(11, 1).file_name());
        assert_eq!(
            store.location(ChunkId::new(2, 1)),
            std::path::PathBuf::from("scratch").join("pass_2_chunk_1.csv")
        );
    }

    #[test]
    fn test_create_open_remove() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let store = FileChunkStore::new(dir.path().to_path_buf(), CsvFormat::default());
        let id = ChunkId::new(0, 3);
        assert!(!store.exists(id));

        let mut sink = store.create(id)?;
        sink.write_record(&Record::new(["a", "1"]))?;
        sink.finish()?;
        assert!(store.exists(id));

        let mut source = store.open(id)?;
        assert_eq!(source.next_record()?, Some(Record::new(["a", "1"])));
        assert_eq!(source.next_record()?, None);

        store.remove(id)?;
        assert!(!store.exists(id));
        assert!(store.open(id).is_err());
        Ok(())
    }

    #[test]
    fn test_promote_replaces_existing_output() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let store = FileChunkStore::new(dir.path().to_path_buf(), CsvFormat::default());
        let output = dir.path().join("output.csv");
        fs::write(&output, "stale content\n")?;

        let id = ChunkId::new(2, 0);
        let mut sink = store.create(id)?;
        sink.write_record(&Record::new(["x"]))?;
        sink.finish()?;

        store.promote(id, &output)?;
        assert!(!store.exists(id));
        assert_eq!(fs::read_to_string(&output)?, "x\n");
        Ok(())
    }

    #[test]
    fn test_copy_into_place_replaces_output() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let chunk = dir.path().join("chunk.csv");
        let output = dir.path().join("output.csv");
        fs::write(&chunk, "a,1\nb,2\n")?;
        fs::write(&output, "stale content\n")?;

        FileChunkStore::copy_into_place(&chunk, &output)?;
        assert_eq!(fs::read_to_string(&output)?, "a,1\nb,2\n");
        assert_eq!(fs::read_dir(dir.path())?.count(), 2);
        Ok(())
    }

    #[test]
    fn test_failed_copy_keeps_previous_output() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("output.csv");
        fs::write(&output, "previous\n")?;

        let result = FileChunkStore::copy_into_place(&dir.path().join("missing.csv"), &output);
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&output)?, "previous\n");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }
}
