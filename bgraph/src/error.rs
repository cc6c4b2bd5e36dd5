use std::path::PathBuf;

use crate::types::BlockId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("metadata: {0}")]
    Metadata(String),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("edge buffer budget {budget} bytes cannot hold largest sub-block ({largest} bytes)")]
    BudgetTooSmall { budget: u64, largest: u64 },
    #[error("memory budget {budget} bytes cannot admit the largest block ({largest} bytes)")]
    MemoryBudgetTooSmall { budget: u64, largest: u64 },
    #[error("bad size suffix in {0:?} (expected e.g. 512M or 4G)")]
    BadSize(String),
    #[error("index data for block {block} has wrong length: {got}, expected {want}")]
    BadIndex { block: BlockId, got: usize, want: usize },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Logs and aborts the process. Worker threads use this for the I/O fatal
/// classes (failed open, negative completion, short read, write failure):
/// the engine is a batch system and partial progress has no value.
/// Invariant violations are `panic!`s, not process exits.
macro_rules! fatal {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
        std::process::exit(1)
    }};
}
pub(crate) use fatal;
