use std::path::PathBuf;

use clap::Parser;

use crate::{
    access::ClockKind,
    error::ConfigError,
    paging::PolicyKind,
    workload::Workload,
};

/// Sanity ceiling for both page and frame counts.
pub const MAX_PAGES: usize = 16_384;

pub const DEFAULT_DISK: &str = "myvirtualdisk";

/// Demand-paging simulator with pluggable page replacement.
#[derive(Parser, Debug)]
#[command(name = "virtmem", version)]
pub struct Cli {
    /// Number of virtual pages
    pub npages: usize,

    /// Number of physical frames
    pub nframes: usize,

    /// Replacement policy: rand, fifo or custom
    pub policy: String,

    /// Program to run: sort, scan or focus
    pub program: String,

    /// Path of the disk image, recreated on every run
    #[arg(long, default_value = DEFAULT_DISK)]
    pub disk: PathBuf,

    /// Seed for the rand policy
    #[arg(long)]
    pub seed: Option<u64>,

    /// Timestamp source for the custom policy: wall or logical
    #[arg(long, default_value = "wall")]
    pub clock: String,

    /// Log every eviction
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub npages: usize,
    pub nframes: usize,
    pub policy: PolicyKind,
    pub workload: Workload,
    pub disk_path: PathBuf,
    pub seed: Option<u64>,
    pub clock: ClockKind,
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if !(1..=MAX_PAGES).contains(&cli.npages) {
            return Err(ConfigError::PageCount {
                value: cli.npages,
                max: MAX_PAGES,
            });
        }
        if !(1..=MAX_PAGES).contains(&cli.nframes) {
            return Err(ConfigError::FrameCount {
                value: cli.nframes,
                max: MAX_PAGES,
            });
        }
        if cli.nframes > cli.npages {
            return Err(ConfigError::FramesExceedPages {
                npages: cli.npages,
                nframes: cli.nframes,
            });
        }

        Ok(Self {
            npages: cli.npages,
            nframes: cli.nframes,
            policy: cli.policy.parse()?,
            workload: cli.program.parse()?,
            disk_path: cli.disk,
            seed: cli.seed,
            clock: cli.clock.parse()?,
        })
    }
}
