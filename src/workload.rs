//! Synthetic programs that generate fault traffic.
//!
//! Each workload touches its address space in a fixed, seeded pattern and
//! returns a checksum. The checksum depends only on the workload and the
//! address space length, so a paged run must agree with a flat buffer.

use std::{fmt, str::FromStr};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::error::{ConfigError, Result};

const SORT_SEED: u64 = 4856;
const FOCUS_SEED: u64 = 38290;
const SCAN_PASSES: usize = 10;
const FOCUS_BURSTS: usize = 100;
const FOCUS_BURST_LEN: usize = 100;
const FOCUS_SPAN: usize = 25;

/// Byte-addressable memory as seen by a workload.
pub trait AddressSpace {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load(&mut self, addr: usize) -> Result<u8>;

    fn store(&mut self, addr: usize, value: u8) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    Sort,
    Scan,
    Focus,
}

impl FromStr for Workload {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sort" => Ok(Self::Sort),
            "scan" => Ok(Self::Scan),
            "focus" => Ok(Self::Focus),
            other => Err(ConfigError::UnknownWorkload(other.to_string())),
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sort => "sort",
            Self::Scan => "scan",
            Self::Focus => "focus",
        })
    }
}

impl Workload {
    pub fn run<M: AddressSpace>(self, mem: &mut M) -> Result<u64> {
        match self {
            Self::Sort => sort(mem),
            Self::Scan => scan(mem),
            Self::Focus => focus(mem),
        }
    }
}

/// Fills memory with random bytes and heap-sorts it in place.
fn sort<M: AddressSpace>(mem: &mut M) -> Result<u64> {
    let len = mem.len();
    let mut rng = StdRng::seed_from_u64(SORT_SEED);
    for addr in 0..len {
        mem.store(addr, rng.random())?;
    }

    for root in (0..len / 2).rev() {
        sift_down(mem, root, len)?;
    }
    for end in (1..len).rev() {
        swap(mem, 0, end)?;
        sift_down(mem, 0, end)?;
    }

    checksum(mem)
}

fn sift_down<M: AddressSpace>(mem: &mut M, mut root: usize, end: usize) -> Result<()> {
    loop {
        let mut child = 2 * root + 1;
        if child >= end {
            return Ok(());
        }
        if child + 1 < end && mem.load(child)? < mem.load(child + 1)? {
            child += 1;
        }
        if mem.load(root)? >= mem.load(child)? {
            return Ok(());
        }
        swap(mem, root, child)?;
        root = child;
    }
}

fn swap<M: AddressSpace>(mem: &mut M, a: usize, b: usize) -> Result<()> {
    let (x, y) = (mem.load(a)?, mem.load(b)?);
    mem.store(a, y)?;
    mem.store(b, x)
}

/// Writes a sawtooth once, then reads everything back several times.
fn scan<M: AddressSpace>(mem: &mut M) -> Result<u64> {
    let len = mem.len();
    for addr in 0..len {
        mem.store(addr, (addr % 256) as u8)?;
    }

    let mut total = 0;
    for _ in 0..SCAN_PASSES {
        total += checksum(mem)?;
    }
    Ok(total)
}

/// Scattered writes clustered around random hot spots.
fn focus<M: AddressSpace>(mem: &mut M) -> Result<u64> {
    let len = mem.len();
    for addr in 0..len {
        mem.store(addr, 0)?;
    }

    let mut rng = StdRng::seed_from_u64(FOCUS_SEED);
    for _ in 0..FOCUS_BURSTS {
        let start = rng.random_range(0..len);
        for _ in 0..FOCUS_BURST_LEN {
            let addr = (start + rng.random_range(0..FOCUS_SPAN)) % len;
            mem.store(addr, rng.random())?;
        }
    }

    checksum(mem)
}

fn checksum<M: AddressSpace>(mem: &mut M) -> Result<u64> {
    let mut total = 0;
    for addr in 0..mem.len() {
        total += u64::from(mem.load(addr)?);
    }
    Ok(total)
}
