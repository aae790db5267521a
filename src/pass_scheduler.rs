use std::fmt::{Display, Formatter};
use std::ops::Range;

use crate::chunk_store::ChunkId;

/// Consecutive chunks `[start, end)` of one pass merged into chunk `output` of the next pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ChunkGroup {
    pass: usize,
    start: usize,
    end: usize,
    output: usize,
}

impl ChunkGroup {
    pub(crate) fn new(pass: usize, range: Range<usize>, output: usize) -> ChunkGroup {
        ChunkGroup {
            pass,
            start: range.start,
            end: range.end,
            output,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.end - self.start
    }

    /// Input chunks in ascending index order
    pub(crate) fn inputs(&self) -> impl Iterator<Item = ChunkId> {
        let pass = self.pass;
        (self.start..self.end).map(move |index| ChunkId::new(pass, index))
    }

    pub(crate) fn output(&self) -> ChunkId {
        ChunkId::new(self.pass + 1, self.output)
    }
}

impl Display for ChunkGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "pass {} chunks [{}, {}) -> pass {} chunk {}", self.pass, self.start, self.end, self.pass + 1, self.output)
    }
}

pub(crate) struct PassScheduler {
    fan_in: usize,
}

impl PassScheduler {
    pub(crate) fn new(fan_in: usize) -> PassScheduler {
        PassScheduler {
            fan_in,
        }
    }

    /// Partition `[0, total_chunks)` into groups of at most `fan_in` chunks, without gaps or
    /// overlaps. Only the last group may be smaller.
    pub(crate) fn groups(&self, pass: usize, total_chunks: usize) -> Vec<ChunkGroup> {
        (0..total_chunks)
            .step_by(self.fan_in)
            .enumerate()
            .map(|(output, start)| {
                let end = usize::min(start + self.fan_in, total_chunks);
                ChunkGroup::new(pass, start..end, output)
            })
            .collect()
    }

    pub(crate) fn next_pass_chunks(&self, total_chunks: usize) -> usize {
        total_chunks.div_ceil(self.fan_in)
    }

    /// Number of merge passes needed to reduce `total_chunks` to a single chunk
    pub(crate) fn merge_passes(&self, total_chunks: usize) -> usize {
        let mut passes = 0;
        let mut chunks = total_chunks;
        while chunks > 1 {
            chunks = self.next_pass_chunks(chunks);
            passes += 1;
        }
        passes
    }
}
