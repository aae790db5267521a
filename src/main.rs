use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use csv_external_sort::outcome::SortOutcome;
use csv_external_sort::sort::Sort;

#[derive(Parser)]
#[command(name = "csv-external-sort")]
#[command(about = "Sort a CSV file larger than memory by one field")]
struct Args {
    #[arg(help = "0-based index of the field to sort by")]
    key_field_index: usize,

    #[arg(help = "Records sorted in memory at once, also the number of chunks merged at once (at least 2)")]
    max_records_in_memory: usize,

    #[arg(help = "CSV file to sort")]
    input: PathBuf,

    #[arg(help = "Sorted result, replaced if it exists")]
    output: PathBuf,

    #[arg(help = "Number of worker threads (at least 1)")]
    num_threads: usize,

    #[arg(short, long, default_value_t = ',', help = "Field separator")]
    delimiter: char,

    #[arg(long, help = "Parent directory for intermediate files, defaults to the system temp dir")]
    tmp_dir: Option<PathBuf>,

    #[arg(long, help = "Keep the chunks of every merge pass until the sort ends")]
    keep_intermediate: bool,

    #[arg(short, long, help = "Verbose output")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    SimpleLogger::new().with_level(level).init()?;

    let mut csv_sort = Sort::new(args.input.clone(), args.output.clone());
    csv_sort.with_key_field(args.key_field_index);
    csv_sort.with_records_in_memory(args.max_records_in_memory);
    csv_sort.with_tasks(args.num_threads);
    csv_sort.with_field_separator(args.delimiter);
    csv_sort.with_keep_intermediate(args.keep_intermediate);
    if let Some(tmp_dir) = args.tmp_dir {
        csv_sort.with_tmp_dir(tmp_dir);
    }

    match csv_sort.sort()? {
        SortOutcome::Sorted(report) => {
            log::info!("Sorted {} records into {}", report.records(), args.output.display());
            log::info!("Chunks per pass: {:?}, merge passes: {}", report.chunk_counts(), report.merge_passes());
        }
        SortOutcome::NothingToSort => {
            log::info!("{} holds no records, no output written", args.input.display());
        }
        SortOutcome::MissingFinalChunk { pass } => {
            bail!("Final chunk of pass {} not found, no output written", pass);
        }
    }
    Ok(())
}
