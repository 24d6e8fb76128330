pub mod access;
pub mod config;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod paging;
pub mod workload;

pub mod hardware {
    pub mod disk;
    pub mod mmu;
}
