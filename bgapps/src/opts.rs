//! Flags shared by every algorithm binary.

use std::path::PathBuf;

use bgraph::{parse_size, EngineConfig, ReadMode};

#[derive(clap::Args, Debug)]
pub struct CommonArgs {
    /// graph files root path
    #[arg(short = 'i', value_name = "PATH")]
    pub input: PathBuf,

    /// worker-pool parallelism
    #[arg(short = 'p', default_value_t = 1)]
    pub parallelism: usize,

    /// total byte budget in MB
    #[arg(long = "memory_size", default_value_t = 64 * 1024)]
    pub memory_size: u64,

    /// edge-buffer budget (G/M suffix)
    #[arg(long = "buffer_size", default_value = "32G")]
    pub buffer_size: String,

    /// keep blocks resident; disable eviction and writeback
    #[arg(long = "in_memory")]
    pub in_memory: bool,

    /// pre-read slot-count admission (0 = byte-based)
    #[arg(long, default_value_t = 0)]
    pub limits: u32,

    /// keep the last block resident across rounds
    #[arg(long = "short_cut")]
    pub short_cut: bool,

    /// sub-block scheduling discipline (normal, static, random)
    #[arg(long, default_value = "normal")]
    pub mode: String,

    #[arg(long = "task_package_factor", default_value_t = 50)]
    pub task_package_factor: u32,
}

impl CommonArgs {
    pub fn engine_config(&self) -> Result<EngineConfig, bgraph::Error> {
        let mut cfg = EngineConfig::new(&self.input);
        cfg.parallelism = self.parallelism;
        cfg.memory_budget = self.memory_size << 20;
        cfg.edge_buffer_budget = parse_size(&self.buffer_size)?;
        cfg.in_memory = self.in_memory;
        cfg.limits = self.limits;
        cfg.short_cut = self.short_cut;
        cfg.task_package_factor = self.task_package_factor;
        cfg.mode = ReadMode::parse(&self.mode)
            .ok_or_else(|| bgraph::Error::Metadata(format!("unknown mode {:?}", self.mode)))?;
        Ok(cfg)
    }
}

/// Shared exit path: algorithm binaries return 0 on success and log the
/// fatal error otherwise.
pub fn exit_with(e: impl std::fmt::Display) -> ! {
    eprintln!("{e}");
    std::process::exit(1)
}
