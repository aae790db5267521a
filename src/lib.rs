//! This crate sorts CSV files, and other files of delimited records, by the value of a single
//! field, using a bounded amount of memory regardless of the size of the input.
//!
//! The sort is an external merge sort. The input is read in batches of at most
//! `records_in_memory` records; each batch is sorted in parallel and written to a scratch
//! directory as a chunk. Chunks are then merged in passes, at most `records_in_memory` chunks at
//! a time, until a single sorted chunk remains, which is moved to the output. The same number
//! bounds both the batch size and the merge fan-in, so it is the only memory knob.
//!
//! Keys are compared as strings. The sort is stable: records with equal keys keep their input
//! order.
//!
//! # Examples
//! ```no_run
//! use std::path::PathBuf;
//! use csv_external_sort::sort::Sort;
//!
//! fn sort_records(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
//!     let mut csv_sort = Sort::new(input, output);
//!     // sort by the third field
//!     csv_sort.with_key_field(2);
//!     // set number of CPU cores the sort will attempt to use. The default is to use all
//!     // available cores.
//!     csv_sort.with_tasks(2);
//!     // set the parent directory for intermediate results. The default is the system temp
//!     // dir - std::env::temp_dir(), however, for large files it is recommended to provide a
//!     // directory on the same file system as the output result.
//!     csv_sort.with_tmp_dir(tmp);
//!     let outcome = csv_sort.sort()?;
//!     assert!(outcome.is_sorted());
//!     Ok(())
//! }
//! ```
//!

pub(crate) mod config;
pub(crate) mod record;
pub(crate) mod record_io;
pub(crate) mod chunk_store;
pub(crate) mod record_cursor;
pub(crate) mod pass_scheduler;
pub(crate) mod sort_command;
pub(crate) mod merge_command;
pub(crate) mod worker_pool;
pub(crate) mod scratch_dir;
pub(crate) mod external_sort;
#[cfg(test)]
pub(crate) mod memory_store;

pub mod sort;
pub mod outcome;
pub mod error;
