use std::cmp::Ordering;

use anyhow::anyhow;
use csv::StringRecord;

/// A single delimited record. Immutable once read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Record {
    fields: StringRecord,
}

impl Record {
    #[cfg(test)]
    pub(crate) fn new<I, T>(fields: I) -> Record
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Record {
            fields: fields.into_iter().collect(),
        }
    }

    pub(crate) fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index)
    }

    pub(crate) fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns the key field, failing for records that are too short to carry it.
    pub(crate) fn key(&self, key_index: usize) -> Result<&str, anyhow::Error> {
        self.field(key_index).ok_or_else(|| {
            anyhow!(
                "record has {} fields but the key field index is {}",
                self.len(),
                key_index
            )
        })
    }

    /// Key lookup for records already validated with [Record::key].
    pub(crate) fn sort_key(&self, key_index: usize) -> &str {
        self.field(key_index).unwrap_or("")
    }

    pub(crate) fn cmp_by_key(&self, other: &Record, key_index: usize) -> Ordering {
        self.sort_key(key_index).cmp(other.sort_key(key_index))
    }

    pub(crate) fn as_string_record(&self) -> &StringRecord {
        &self.fields
    }
}

impl From<StringRecord> for Record {
    fn from(fields: StringRecord) -> Self {
        Record {
            fields,
        }
    }
}

/// Stable sort by key field; records with equal keys keep their relative order.
pub(crate) fn sort_records(records: &mut [Record], key_index: usize) {
    records.sort_by(|a, b| a.cmp_by_key(b, key_index));
}

#[cfg(test)]
mod tests {
    use crate::record::{sort_records, Record};

    #[test]
    fn test_key_out_of_range() {
        let record = Record::new(["a", "b"]);
        assert_eq!(record.key(1).unwrap(), "b");
        let error = record.key(2).unwrap_err();
        assert!(error.to_string().contains("key field index is 2"));
    }

    #[test]
    fn test_lexicographic_not_numeric() {
        let mut records = vec![
            Record::new(["10"]),
            Record::new(["9"]),
            Record::new(["100"]),
        ];
        sort_records(&mut records, 0);
        let keys: Vec<&str> = records.iter().map(|r| r.sort_key(0)).collect();
        assert_eq!(keys, vec!["10", "100", "9"]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut records = vec![
            Record::new(["b", "1"]),
            Record::new(["a", "2"]),
            Record::new(["b", "3"]),
            Record::new(["a", "4"]),
            Record::new(["b", "5"]),
        ];
        sort_records(&mut records, 0);
        let values: Vec<&str> = records.iter().map(|r| r.sort_key(1)).collect();
        assert_eq!(values, vec!["2", "4", "1", "3", "5"]);
    }
}
