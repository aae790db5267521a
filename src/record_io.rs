use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use csv::{QuoteStyle, Reader, ReaderBuilder, StringRecord, Terminator, Writer, WriterBuilder};

use crate::record::Record;

/// Sequential source of records. `Ok(None)` marks the end of the stream.
pub(crate) trait RecordSource: Send {
    fn next_record(&mut self) -> Result<Option<Record>, anyhow::Error>;
}

/// Append-only destination of records. Nothing is guaranteed durable before `finish`.
pub(crate) trait RecordSink: Send {
    fn write_record(&mut self, record: &Record) -> Result<(), anyhow::Error>;

    fn finish(&mut self) -> Result<(), anyhow::Error>;
}

/// Delimiting and quoting convention shared by every reader and writer of a run, so that chunks
/// and the final output read back exactly as the input was parsed.
#[derive(Clone, Debug)]
pub(crate) struct CsvFormat {
    field_separator: u8,
    endl: u8,
}

impl CsvFormat {
    pub(crate) fn new(field_separator: u8, endl: u8) -> CsvFormat {
        CsvFormat {
            field_separator,
            endl,
        }
    }

    fn reader_builder(&self) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .delimiter(self.field_separator)
            .has_headers(false)
            .flexible(true);
        // the default terminator accepts \n, \r and \r\n
        if self.endl != b'\n' {
            builder.terminator(Terminator::Any(self.endl));
        }
        builder
    }

    fn writer_builder(&self) -> WriterBuilder {
        let mut builder = WriterBuilder::new();
        builder
            .delimiter(self.field_separator)
            .terminator(Terminator::Any(self.endl))
            .quote_style(QuoteStyle::Necessary)
            .flexible(true);
        builder
    }
}

impl Default for CsvFormat {
    fn default() -> Self {
        CsvFormat::new(b',', b'\n')
    }
}

pub(crate) struct CsvRecordReader {
    path: PathBuf,
    reader: Reader<File>,
    record: StringRecord,
}

impl CsvRecordReader {
    pub(crate) fn open(path: &Path, format: &CsvFormat) -> Result<CsvRecordReader, anyhow::Error> {
        let file = File::open(path)
            .with_context(|| anyhow!("path: {}", path.display()))?;
        Ok(
            CsvRecordReader {
                path: path.to_path_buf(),
                reader: format.reader_builder().from_reader(file),
                record: StringRecord::new(),
            }
        )
    }
}

impl RecordSource for CsvRecordReader {
    fn next_record(&mut self) -> Result<Option<Record>, anyhow::Error> {
        let more = self.reader.read_record(&mut self.record)
            .with_context(|| anyhow!("Malformed record, path: {}", self.path.display()))?;
        if more {
            Ok(Some(Record::from(self.record.clone())))
        } else {
            Ok(None)
        }
    }
}

pub(crate) struct CsvRecordWriter {
    path: PathBuf,
    writer: Writer<File>,
}

impl CsvRecordWriter {
    /// Create or truncate `path`
    pub(crate) fn create(path: &Path, format: &CsvFormat) -> Result<CsvRecordWriter, anyhow::Error> {
        let file = File::create(path)
            .with_context(|| anyhow!("path: {}", path.display()))?;
        Ok(
            CsvRecordWriter {
                path: path.to_path_buf(),
                writer: format.writer_builder().from_writer(file),
            }
        )
    }
}

impl RecordSink for CsvRecordWriter {
    fn write_record(&mut self, record: &Record) -> Result<(), anyhow::Error> {
        self.writer.write_record(record.as_string_record())
            .with_context(|| anyhow!("path: {}", self.path.display()))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), anyhow::Error> {
        self.writer.flush()
            .with_context(|| anyhow!("path: {}", self.path.display()))?;
        Ok(())
    }
}
