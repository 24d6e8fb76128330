use crate::{
    error::{Result, SimError},
    paging::{PAGE_SIZE, PageTable, Pfn, Protection, Vpn},
};

/// A cold write faults twice: once to load the page read-only, once more to
/// upgrade it.
const MAX_FAULTS_PER_ACCESS: usize = 2;

/// Called inline by the [`Mmu`] whenever an access cannot be satisfied.
pub trait FaultHandler {
    fn handle_page_fault(
        &mut self,
        page_table: &mut PageTable,
        physmem: &mut PhysicalMemory,
        vpn: Vpn,
    ) -> Result<()>;
}

pub struct Mmu;

impl Mmu {
    pub fn new() -> Self {
        Self {}
    }

    pub fn translate(&self, page_table: &PageTable, vpn: Vpn, operation: Operation) -> TranslationResult {
        let pte = page_table.get_entry(vpn);

        match (pte.protection, operation) {
            (Protection::Unmapped, _) | (Protection::ReadOnly, Operation::Write) => {
                TranslationResult::PageFault
            }
            _ => TranslationResult::Success(pte.pfn),
        }
    }

    /// Translates `vpn`, trapping into `handler` until the access succeeds.
    pub fn access<H: FaultHandler>(
        &self,
        page_table: &mut PageTable,
        physmem: &mut PhysicalMemory,
        handler: &mut H,
        vpn: Vpn,
        operation: Operation,
    ) -> Result<Pfn> {
        for _ in 0..MAX_FAULTS_PER_ACCESS {
            if let TranslationResult::Success(pfn) = self.translate(page_table, vpn, operation) {
                return Ok(pfn);
            }
            handler.handle_page_fault(page_table, physmem, vpn)?;
        }

        match self.translate(page_table, vpn, operation) {
            TranslationResult::Success(pfn) => Ok(pfn),
            TranslationResult::PageFault => Err(SimError::invariant(
                vpn,
                "access still faults after the fault handler ran",
            )),
        }
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TranslationResult {
    Success(Pfn),
    PageFault,
}

/// `nframes` page-sized slots of zeroed memory.
pub struct PhysicalMemory {
    data: Box<[u8]>,
}

impl PhysicalMemory {
    pub fn new(frame_count: usize) -> Result<Self> {
        if frame_count == 0 {
            return Err(SimError::PageTableInit("frame count must be positive".into()));
        }
        let len = frame_count
            .checked_mul(PAGE_SIZE)
            .ok_or_else(|| SimError::PageTableInit(format!("{frame_count} frames overflow memory size")))?;

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| SimError::PageTableInit(e.to_string()))?;
        data.resize(len, 0);

        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.data.len() / PAGE_SIZE
    }

    pub fn frame(&self, pfn: Pfn) -> &[u8] {
        let start = pfn.0 * PAGE_SIZE;
        &self.data[start..start + PAGE_SIZE]
    }

    pub fn frame_mut(&mut self, pfn: Pfn) -> &mut [u8] {
        let start = pfn.0 * PAGE_SIZE;
        &mut self.data[start..start + PAGE_SIZE]
    }
}
