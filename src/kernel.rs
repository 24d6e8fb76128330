use crate::{
    access::{Clock, SimClock},
    config::Config,
    error::{Result, SimError},
    hardware::{
        disk::Disk,
        mmu::{Mmu, Operation, PhysicalMemory},
    },
    memory::{MemoryManager, MemoryStats},
    paging::{PAGE_SIZE, PageTable, Pfn, Policy, Vpn},
    workload::AddressSpace,
};

/// Owns the simulated machine: page table, physical memory and the fault
/// handler with its disk. Workloads see it as a flat address space of
/// `npages * PAGE_SIZE` bytes.
pub struct Kernel<C: Clock = SimClock> {
    pub mm: MemoryManager<C>,
    pub page_table: PageTable,
    physmem: PhysicalMemory,
    mmu: Mmu,
}

impl Kernel {
    pub fn from_config(config: &Config) -> Result<Self> {
        let disk = Disk::open(&config.disk_path, config.npages)?;
        Self::new(
            config.npages,
            config.nframes,
            disk,
            Policy::new(config.policy, config.seed),
            SimClock::new(config.clock),
        )
    }
}

impl<C: Clock> Kernel<C> {
    pub fn new(page_count: usize, frame_count: usize, disk: Disk, policy: Policy, clock: C) -> Result<Self> {
        if frame_count > page_count {
            return Err(SimError::PageTableInit(format!(
                "{frame_count} frames for only {page_count} pages"
            )));
        }
        if disk.block_count() < page_count {
            return Err(SimError::PageTableInit(format!(
                "disk has {} blocks for {page_count} pages",
                disk.block_count()
            )));
        }

        Ok(Self {
            page_table: PageTable::new(page_count)?,
            physmem: PhysicalMemory::new(frame_count)?,
            mm: MemoryManager::new(page_count, frame_count, disk, policy, clock),
            mmu: Mmu::new(),
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_table.page_count()
    }

    pub fn frame_count(&self) -> usize {
        self.physmem.frame_count()
    }

    /// Touches `vpn`, faulting it in as needed.
    pub fn access_memory(&mut self, vpn: Vpn, operation: Operation) -> Result<Pfn> {
        self.mmu
            .access(&mut self.page_table, &mut self.physmem, &mut self.mm, vpn, operation)
    }

    pub fn stats(&self) -> MemoryStats {
        self.mm.stats
    }

    pub fn check_invariants(&self) -> Result<()> {
        self.mm.check_invariants(&self.page_table)
    }

    /// Syncs and closes the disk, releasing the tables.
    pub fn shutdown(self) -> Result<MemoryStats> {
        self.mm.shutdown()
    }

    fn resolve(&mut self, addr: usize, operation: Operation) -> Result<(Pfn, usize)> {
        if addr >= self.len() {
            return Err(SimError::Segfault { addr });
        }
        let pfn = self.access_memory(Vpn(addr / PAGE_SIZE), operation)?;
        Ok((pfn, addr % PAGE_SIZE))
    }
}

impl<C: Clock> AddressSpace for Kernel<C> {
    fn len(&self) -> usize {
        self.page_count() * PAGE_SIZE
    }

    fn load(&mut self, addr: usize) -> Result<u8> {
        let (pfn, offset) = self.resolve(addr, Operation::Read)?;
        Ok(self.physmem.frame(pfn)[offset])
    }

    fn store(&mut self, addr: usize, value: u8) -> Result<()> {
        let (pfn, offset) = self.resolve(addr, Operation::Write)?;
        self.physmem.frame_mut(pfn)[offset] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        access::LogicalClock,
        paging::{PolicyKind, Protection},
        workload::Workload,
    };

    fn kernel(pages: usize, frames: usize, kind: PolicyKind) -> (Kernel<LogicalClock>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let disk = Disk::open(dir.path().join("disk"), pages).unwrap();
        let kernel = Kernel::new(pages, frames, disk, Policy::new(kind, Some(3)), LogicalClock::new()).unwrap();
        (kernel, dir)
    }

    fn resident(kernel: &Kernel<LogicalClock>) -> Vec<usize> {
        kernel.page_table.mapped().map(|(vpn, _)| vpn.0).collect()
    }

    #[test]
    fn fifo_first_touch_sequence() {
        let (mut kernel, _dir) = kernel(4, 2, PolicyKind::Fifo);

        kernel.access_memory(Vpn(0), Operation::Read).unwrap();
        kernel.access_memory(Vpn(1), Operation::Read).unwrap();
        assert_eq!(kernel.page_table.get_entry(Vpn(0)).pfn, Pfn(0));
        assert_eq!(kernel.page_table.get_entry(Vpn(1)).pfn, Pfn(1));

        kernel.access_memory(Vpn(2), Operation::Read).unwrap();
        assert_eq!(resident(&kernel), vec![1, 2]);
        kernel.access_memory(Vpn(3), Operation::Read).unwrap();
        assert_eq!(resident(&kernel), vec![2, 3]);

        let stats = kernel.shutdown().unwrap();
        assert_eq!(stats.fault_count, 4);
        assert_eq!(stats.read_count, 4);
        assert_eq!(stats.write_count, 2);
    }

    #[test]
    fn fifo_evicts_in_load_order_cyclically() {
        let (mut kernel, _dir) = kernel(6, 3, PolicyKind::Fifo);
        let mut evicted = Vec::new();

        for page in [0, 1, 2, 3, 4, 5, 0, 1, 2] {
            let before = resident(&kernel);
            kernel.access_memory(Vpn(page), Operation::Read).unwrap();
            let after = resident(&kernel);
            evicted.extend(before.into_iter().filter(|p| !after.contains(p)));
        }

        assert_eq!(evicted, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn hits_do_not_fault() {
        let (mut kernel, _dir) = kernel(2, 2, PolicyKind::Fifo);
        kernel.store(10, 1).unwrap();
        kernel.store(11, 2).unwrap();
        assert_eq!(kernel.load(10).unwrap(), 1);

        let stats = kernel.stats();
        assert_eq!(stats.fault_count, 2);
        assert_eq!(kernel.page_table.get_entry(Vpn(0)).protection, Protection::ReadWrite);
    }

    #[test]
    fn bytes_survive_eviction() {
        let (mut kernel, _dir) = kernel(3, 1, PolicyKind::Custom);
        for offset in 0..PAGE_SIZE {
            kernel.store(offset, (offset * 7 % 251) as u8).unwrap();
        }

        kernel.load(PAGE_SIZE).unwrap();
        kernel.load(2 * PAGE_SIZE).unwrap();
        assert!(!kernel.page_table.get_entry(Vpn(0)).is_mapped());

        for offset in 0..PAGE_SIZE {
            assert_eq!(kernel.load(offset).unwrap(), (offset * 7 % 251) as u8);
        }
        kernel.check_invariants().unwrap();
    }

    #[test]
    fn out_of_range_address_segfaults() {
        let (mut kernel, _dir) = kernel(2, 1, PolicyKind::Fifo);
        let err = kernel.load(2 * PAGE_SIZE).unwrap_err();
        assert!(matches!(err, SimError::Segfault { addr } if addr == 2 * PAGE_SIZE));
        assert_eq!(kernel.stats().fault_count, 0);
    }

    #[test]
    fn workloads_agree_with_flat_memory() {
        for kind in [PolicyKind::Random, PolicyKind::Fifo, PolicyKind::Custom] {
            let (mut kernel, _dir) = kernel(4, 2, kind);
            let total = Workload::Scan.run(&mut kernel).unwrap();
            assert_eq!(total, 10 * 64 * 32_640);
            kernel.check_invariants().unwrap();
            assert!(kernel.mm.frame_table.occupied() <= kernel.frame_count());
        }
    }

    #[test]
    fn scan_under_fifo_counts() {
        let (mut kernel, _dir) = kernel(4, 2, PolicyKind::Fifo);
        Workload::Scan.run(&mut kernel).unwrap();

        let disk_reads = kernel.mm.disk().reads;
        let stats = kernel.shutdown().unwrap();
        assert_eq!(stats.fault_count, 48);
        assert_eq!(stats.read_count, 44);
        assert_eq!(stats.write_count, 42);
        assert_eq!(disk_reads, stats.read_count);
    }

    #[test]
    fn rejects_undersized_disk() {
        let dir = tempfile::tempdir().unwrap();
        let disk = Disk::open(dir.path().join("disk"), 2).unwrap();
        let result = Kernel::new(4, 2, disk, Policy::new(PolicyKind::Fifo, None), LogicalClock::new());
        assert!(matches!(result, Err(SimError::PageTableInit(_))));
    }
}
