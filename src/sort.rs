use std::cmp::{max, min};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use rlimit::{getrlimit, Resource, setrlimit};

use crate::chunk_store::FileChunkStore;
use crate::config::Config;
use crate::external_sort::ExternalSort;
use crate::outcome::SortOutcome;
use crate::record::Record;
use crate::record_io::{CsvRecordReader, RecordSource};
use crate::scratch_dir::ScratchDir;

/// Sort a CSV file by one field
///
/// # Examples
/// ```no_run
/// use std::path::PathBuf;
/// use csv_external_sort::outcome::SortOutcome;
/// use csv_external_sort::sort::Sort;
///
/// fn sort_by_second_field(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
///     let mut csv_sort = Sort::new(input, output);
///     // fields are numbered from 0
///     csv_sort.with_key_field(1);
///     // at most 50 000 records per sorted chunk, and at most 50 000 chunks merged at once
///     csv_sort.with_records_in_memory(50_000);
///     csv_sort.with_tasks(4);
///     // preferably on the same file system as the output
///     csv_sort.with_tmp_dir(tmp);
///     match csv_sort.sort()? {
///         SortOutcome::Sorted(report) => println!("sorted {} records", report.records()),
///         SortOutcome::NothingToSort => println!("input is empty"),
///         SortOutcome::MissingFinalChunk { pass } => println!("pass {} lost its result", pass),
///     }
///     Ok(())
/// }
/// ```
pub struct Sort {
    input: PathBuf,
    output: PathBuf,
    tmp: PathBuf,
    tasks: usize,
    key_field: usize,
    records_in_memory: usize,
    field_separator: char,
    endl: char,
    keep_intermediate: bool,
}

impl Sort {
    /// Create a default Sort definition.
    ///
    /// * intermediate files are created in a private directory under std::env::temp_dir()
    /// * the number of tasks is the number of CPU cores
    /// * records are compared by their first field (index 0), as strings
    /// * 100 000 records are held in memory per sorted chunk, which is also the merge fan-in
    /// * the field separator is ',' and records end with '\n'
    /// * intermediate chunks are removed as soon as they are merged
    ///
    /// The Sort implementation will increase the file descriptor rlimit to accommodate the
    /// chunks merged concurrently
    pub fn new(input: PathBuf, output: PathBuf) -> Sort {
        Sort {
            input,
            output,
            tmp: std::env::temp_dir(),
            tasks: num_cpus::get(),
            key_field: 0,
            records_in_memory: 100_000,
            field_separator: ',',
            endl: '\n',
            keep_intermediate: false,
        }
    }

    /// Set the parent directory for intermediate files. By default use std::env::temp_dir().
    /// A private directory is created inside it for every sort and removed afterwards.
    pub fn with_tmp_dir(&mut self, tmp: PathBuf) {
        self.tmp = tmp;
    }

    /// Set the number of tasks. Must be at least 1.
    pub fn with_tasks(&mut self, tasks: usize) {
        self.tasks = tasks;
    }

    /// Set the 0-based index of the field to sort by. The default is 0.
    pub fn with_key_field(&mut self, key_field: usize) {
        self.key_field = key_field;
    }

    /// Set the number of records sorted in memory at once, which is also the maximum number of
    /// chunks merged together. Must be at least 2.
    pub fn with_records_in_memory(&mut self, records_in_memory: usize) {
        self.records_in_memory = records_in_memory;
    }

    /// Set the field separator. The default is ','
    pub fn with_field_separator(&mut self, field_separator: char) {
        self.field_separator = field_separator;
    }

    /// Set the record terminator. The default is '\n', which also accepts "\r\n" and "\r" on
    /// input; output records always end with the configured char alone.
    pub fn with_endl(&mut self, endl: char) {
        self.endl = endl;
    }

    /// Keep the chunks of every pass until the sort ends instead of removing them once merged
    pub fn with_keep_intermediate(&mut self, keep_intermediate: bool) {
        self.keep_intermediate = keep_intermediate;
    }

    /// Sort the input into the output, replacing the output if it exists.
    ///
    /// Configuration is validated before any file is touched; a [crate::error::ConfigError] is
    /// returned wrapped in the error. An empty input leaves the output untouched and returns
    /// [SortOutcome::NothingToSort].
    pub fn sort(&self) -> Result<SortOutcome, anyhow::Error> {
        let config = self.create_config()?;
        let mut source = CsvRecordReader::open(&self.input, &config.csv_format())?;

        let (current_soft, current_hard) = Self::get_rlimits()?;
        log::info!("Current rlimit NOFILE, soft: {}, hard: {}", current_soft, current_hard);
        let wanted = (config.files() as u64).saturating_add(256);
        let new_soft = min(max(wanted, current_soft), current_hard);
        if new_soft < wanted {
            log::warn!("rlimit NOFILE hard limit {} is below the {} files a merge pass may open", current_hard, wanted);
        }
        log::info!("Set new rlimit NOFILE, soft: {}, hard: {}", new_soft, current_hard);
        Self::set_rlimits(new_soft, current_hard)?;

        let result = Self::internal_sort(&mut source, &config, &self.output);

        log::info!("Restore rlimit NOFILE, soft: {}, hard: {}", current_soft, current_hard);
        Self::set_rlimits(current_soft, current_hard)?;
        result
    }

    /// Check whether the input is sorted by the key field
    pub fn check(&self) -> Result<bool, anyhow::Error> {
        let config = self.create_config()?;
        let mut source = CsvRecordReader::open(&self.input, &config.csv_format())?;
        let key_field = config.key_field();

        let mut previous: Option<Record> = None;
        let mut n: u64 = 0;
        while let Some(record) = source.next_record()? {
            n += 1;
            record.key(key_field).with_context(|| anyhow!("input record {}", n))?;
            if let Some(previous_record) = &previous {
                if previous_record.cmp_by_key(&record, key_field).is_gt() {
                    log::info!("Record {} is out of order", n);
                    return Ok(false);
                }
            }
            previous = Some(record);
        }
        Ok(true)
    }

    fn get_rlimits() -> Result<(u64, u64), anyhow::Error> {
        getrlimit(Resource::NOFILE).with_context(|| "getrlimit")
    }

    fn set_rlimits(soft: u64, hard: u64) -> Result<(), anyhow::Error> {
        setrlimit(Resource::NOFILE, soft, hard)
            .with_context(|| format!("set rlimit NOFILE, soft: {}, hard: {}", soft, hard))?;
        Ok(())
    }

    fn create_config(&self) -> Result<Config, anyhow::Error> {
        let config = Config::new(
            self.tmp.clone(),
            "csv-sort-".to_string(),
            self.tasks,
            self.key_field,
            self.records_in_memory,
            self.field_separator,
            self.endl,
            self.keep_intermediate,
        )?;
        Ok(config)
    }

    fn internal_sort(source: &mut dyn RecordSource, config: &Config, output: &PathBuf) -> Result<SortOutcome, anyhow::Error> {
        log::info!("Start external sort into {}", output.display());
        let scratch_dir = ScratchDir::new(config.tmp(), config.tmp_prefix())?;
        let store = Arc::new(FileChunkStore::new(scratch_dir.path().to_path_buf(), config.csv_format()));
        let outcome = ExternalSort::new(config.clone(), store).run(source, output)?;
        scratch_dir.close()?;
        log::info!("Finish external sort: {:?}", outcome);
        Ok(outcome)
    }
}
