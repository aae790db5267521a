/// How a sort ended when no error occurred.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SortOutcome {
    /// The output holds the sorted input
    Sorted(SortReport),
    /// The input held no records; no output was written
    NothingToSort,
    /// The last merge pass completed but its single chunk was not found, so no output was
    /// written. `pass` is the pass that should have held it.
    MissingFinalChunk {
        pass: usize,
    },
}

impl SortOutcome {
    pub fn is_sorted(&self) -> bool {
        matches!(self, SortOutcome::Sorted(_))
    }

    pub fn report(&self) -> Option<&SortReport> {
        match self {
            SortOutcome::Sorted(report) => Some(report),
            _ => None,
        }
    }
}

/// Statistics of a completed sort.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortReport {
    records: u64,
    chunk_counts: Vec<usize>,
    in_memory: bool,
}

impl SortReport {
    pub(crate) fn new(records: u64, chunk_counts: Vec<usize>, in_memory: bool) -> SortReport {
        SortReport {
            records,
            chunk_counts,
            in_memory,
        }
    }

    /// Number of records read from the input and written to the output
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Chunk count of every pass; `chunk_counts()[0]` is the number of chunks written by the
    /// split phase and the last entry is always 1.
    pub fn chunk_counts(&self) -> &[usize] {
        &self.chunk_counts
    }

    /// Number of merge passes performed
    pub fn merge_passes(&self) -> usize {
        self.chunk_counts.len().saturating_sub(1)
    }

    /// True when the input fit in a single batch and was written to the output directly
    pub fn in_memory(&self) -> bool {
        self.in_memory
    }
}
