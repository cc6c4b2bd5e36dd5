use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::types::{BlockId, SubBlockId};

/// Order in which a block's sub-blocks are submitted for reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Ascending sub-block id.
    #[default]
    Normal,
    /// Per-block order from [`EngineConfig::static_schedule`].
    Static,
    /// Shuffled per round.
    Random,
}

impl ReadMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(ReadMode::Normal),
            "static" => Some(ReadMode::Static),
            "random" => Some(ReadMode::Random),
            _ => None,
        }
    }
}

/// Engine configuration. The CLI front-ends fill this from flags; tests
/// construct it directly.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Graph root: `meta.yaml` and `graphs/` live under here.
    pub root: PathBuf,
    /// Worker-pool parallelism P.
    pub parallelism: usize,
    /// Tasks per map call is roughly `parallelism * task_package_factor`.
    pub task_package_factor: u32,
    /// Global byte budget for block admission.
    pub memory_budget: u64,
    /// Byte budget for resident sub-block edge data.
    pub edge_buffer_budget: u64,
    /// Keep every block resident after its first read; no eviction, no
    /// writeback.
    pub in_memory: bool,
    /// Non-zero switches block admission from bytes to pre-read slots.
    pub limits: u32,
    /// Keep the round's last block resident and execute it first next round.
    pub short_cut: bool,
    pub mode: ReadMode,
    /// Sub-block read order per block for [`ReadMode::Static`]; blocks
    /// without an entry fall back to ascending id.
    pub static_schedule: HashMap<BlockId, Vec<SubBlockId>>,
    /// Algorithm-level contract: the vertex state aliases `write` onto
    /// `read` and the superstep sync is a no-op (coloring declares this).
    pub read_only_sync: bool,
    /// io_uring submission depth for the sub-block reader.
    pub queue_depth: u32,
}

impl EngineConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        EngineConfig {
            root: root.into(),
            parallelism: 1,
            task_package_factor: 50,
            memory_budget: 64 << 30,
            edge_buffer_budget: 32 << 30,
            in_memory: false,
            limits: 0,
            short_cut: false,
            mode: ReadMode::Normal,
            static_schedule: HashMap::new(),
            read_only_sync: false,
            queue_depth: 32,
        }
    }

    pub fn use_limits(&self) -> bool {
        self.limits != 0
    }
}

/// Parses a human byte size with a G/M suffix, e.g. `32G`, `512m`.
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.len() < 2 {
        return Err(Error::BadSize(s.to_string()));
    }
    let (num, unit) = s.split_at(s.len() - 1);
    let n: u64 = num.parse().map_err(|_| Error::BadSize(s.to_string()))?;
    match unit {
        "G" | "g" => Ok(n << 30),
        "M" | "m" => Ok(n << 20),
        _ => Err(Error::BadSize(s.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_suffixes() {
        assert_eq!(parse_size("2G").unwrap(), 2 << 30);
        assert_eq!(parse_size("512M").unwrap(), 512 << 20);
        assert_eq!(parse_size("1g").unwrap(), 1 << 30);
        assert!(parse_size("16").is_err());
        assert!(parse_size("16K").is_err());
        assert!(parse_size("").is_err());
    }

    #[test]
    fn read_mode_parse() {
        assert_eq!(ReadMode::parse("normal"), Some(ReadMode::Normal));
        assert_eq!(ReadMode::parse("static"), Some(ReadMode::Static));
        assert_eq!(ReadMode::parse("random"), Some(ReadMode::Random));
        assert_eq!(ReadMode::parse("eager"), None);
    }
}
