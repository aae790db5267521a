use std::path::PathBuf;

use crate::error::ConfigError;
use crate::record_io::CsvFormat;

#[derive(Clone, Debug)]
pub(crate) struct Config {
    tmp: PathBuf,
    tmp_prefix: String,
    tasks: usize,
    queue_size: usize,
    key_field: usize,
    records_in_memory: usize,
    field_separator: char,
    endl: char,
    keep_intermediate: bool,
}

impl Config {
    /// Validate the settings of a sort. Performs no I/O.
    pub(crate) fn new(
        tmp: PathBuf,
        tmp_prefix: String,
        tasks: usize,
        key_field: usize,
        records_in_memory: usize,
        field_separator: char,
        endl: char,
        keep_intermediate: bool,
    ) -> Result<Config, ConfigError> {
        if records_in_memory < 2 {
            return Err(ConfigError::RecordsInMemoryTooSmall(records_in_memory));
        }
        if tasks < 1 {
            return Err(ConfigError::NoTasks);
        }
        if !field_separator.is_ascii() {
            return Err(ConfigError::NonAsciiFieldSeparator(field_separator));
        }
        if !endl.is_ascii() {
            return Err(ConfigError::NonAsciiEndl(endl));
        }
        if field_separator == endl {
            return Err(ConfigError::SeparatorIsEndl(endl));
        }

        // every queued batch holds up to records_in_memory records
        let queue_size = tasks;
        Ok(
            Config {
                tmp,
                tmp_prefix,
                tasks,
                queue_size,
                key_field,
                records_in_memory,
                field_separator,
                endl,
                keep_intermediate,
            }
        )
    }

    pub(crate) fn tmp(&self) -> &PathBuf {
        &self.tmp
    }

    pub(crate) fn tmp_prefix(&self) -> &String {
        &self.tmp_prefix
    }

    pub(crate) fn tasks(&self) -> usize {
        self.tasks
    }

    pub(crate) fn queue_size(&self) -> usize {
        self.queue_size
    }

    pub(crate) fn key_field(&self) -> usize {
        self.key_field
    }

    /// Batch size of the split phase and fan-in of every merge pass
    pub(crate) fn records_in_memory(&self) -> usize {
        self.records_in_memory
    }

    pub(crate) fn keep_intermediate(&self) -> bool {
        self.keep_intermediate
    }

    /// Files open at once in the worst case: every task merging a full group plus its output
    pub(crate) fn files(&self) -> usize {
        self.tasks.saturating_mul(self.records_in_memory.saturating_add(1))
    }

    pub(crate) fn csv_format(&self) -> CsvFormat {
        // both are ASCII, checked in new()
        CsvFormat::new(self.field_separator as u8, self.endl as u8)
    }
}
