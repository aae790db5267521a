use std::fmt::{Display, Formatter};

/// Configuration rejected before any I/O takes place.
///
/// Returned wrapped in an [anyhow::Error]; use `downcast_ref::<ConfigError>()` to tell it apart
/// from input and task failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The in-memory record bound doubles as the merge fan-in and must be at least 2
    RecordsInMemoryTooSmall(usize),
    /// At least one task is required to run the sort
    NoTasks,
    /// The field separator must be a single ASCII character
    NonAsciiFieldSeparator(char),
    /// The record terminator must be a single ASCII character
    NonAsciiEndl(char),
    /// The field separator and the record terminator must differ
    SeparatorIsEndl(char),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::RecordsInMemoryTooSmall(records) => {
                write!(f, "records in memory must be at least 2, got {}", records)
            }
            ConfigError::NoTasks => {
                write!(f, "number of tasks must be at least 1")
            }
            ConfigError::NonAsciiFieldSeparator(c) => {
                write!(f, "field separator must be an ASCII character, got {:?}", c)
            }
            ConfigError::NonAsciiEndl(c) => {
                write!(f, "line ending must be an ASCII character, got {:?}", c)
            }
            ConfigError::SeparatorIsEndl(c) => {
                write!(f, "field separator and line ending are both {:?}", c)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
