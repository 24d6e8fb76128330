//! Error taxonomy for the simulator.

use std::{io, path::PathBuf, process::ExitCode};

use thiserror::Error;

use crate::paging::Vpn;

pub type Result<T> = std::result::Result<T, SimError>;

/// Rejected command-line values. Raised before any simulation state exists.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("npages must be between 1 and {max}, got {value}")]
    PageCount { value: usize, max: usize },

    #[error("nframes must be between 1 and {max}, got {value}")]
    FrameCount { value: usize, max: usize },

    #[error("nframes ({nframes}) cannot exceed npages ({npages})")]
    FramesExceedPages { npages: usize, nframes: usize },

    #[error("unknown replacement policy: {0} (expected rand, fifo or custom)")]
    UnknownPolicy(String),

    #[error("unknown program: {0} (expected sort, scan or focus)")]
    UnknownWorkload(String),

    #[error("unknown clock: {0} (expected wall or logical)")]
    UnknownClock(String),
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("couldn't create virtual disk {}: {source}", .path.display())]
    DiskInit {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't create page table: {0}")]
    PageTableInit(String),

    #[error("disk {op} failed on block {block}: {source}")]
    DiskIo {
        op: &'static str,
        block: usize,
        #[source]
        source: io::Error,
    },

    #[error("couldn't close virtual disk {}: {source}", .path.display())]
    DiskClose {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("segmentation fault at virtual address {addr:#x}")]
    Segfault { addr: usize },

    #[error("invariant violated on page {vpn}: {reason}")]
    Invariant { vpn: Vpn, reason: String },
}

impl SimError {
    pub(crate) fn invariant(vpn: Vpn, reason: impl Into<String>) -> Self {
        Self::Invariant {
            vpn,
            reason: reason.into(),
        }
    }

    /// Bookkeeping failures get their own status so they can't be mistaken
    /// for bad input.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Invariant { .. } | Self::Segfault { .. } => ExitCode::from(2),
            Self::Config(_)
            | Self::DiskInit { .. }
            | Self::PageTableInit(_)
            | Self::DiskIo { .. }
            | Self::DiskClose { .. } => ExitCode::from(1),
        }
    }
}
