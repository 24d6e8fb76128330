use std::fmt;

use crate::{
    access::{AccessRecord, Clock, SimClock, WRITE_BOOST_MICROS},
    error::{Result, SimError},
    hardware::{
        disk::Disk,
        mmu::{FaultHandler, PhysicalMemory},
    },
    paging::{PageReplacementPolicy, PageTable, Pfn, Policy, Protection, Vpn},
};

pub struct MemoryManager<C: Clock = SimClock> {
    pub frame_table: FrameTable,
    pub access: AccessRecord,
    disk: Disk,
    policy: Policy,
    clock: C,
    pub stats: MemoryStats,
}

impl<C: Clock> MemoryManager<C> {
    pub fn new(page_count: usize, frame_count: usize, disk: Disk, policy: Policy, clock: C) -> Self {
        Self {
            frame_table: FrameTable::new(frame_count),
            access: AccessRecord::new(page_count),
            disk,
            policy,
            clock,
            stats: MemoryStats::new(),
        }
    }

    pub fn disk(&self) -> &Disk {
        &self.disk
    }

    fn load_into_free_frame(
        &mut self,
        page_table: &mut PageTable,
        physmem: &mut PhysicalMemory,
        vpn: Vpn,
        pfn: Pfn,
    ) -> Result<()> {
        self.disk.read(vpn.0, physmem.frame_mut(pfn))?;
        page_table.set_entry(vpn, pfn, Protection::ReadOnly);
        self.access.record(vpn, self.clock.now());
        self.frame_table.occupy(pfn, vpn);
        self.stats.read_count += 1;
        Ok(())
    }

    fn evict_and_load(&mut self, page_table: &mut PageTable, physmem: &mut PhysicalMemory, vpn: Vpn) -> Result<()> {
        let victim = self
            .policy
            .pick_victim(&mut self.frame_table, &self.access)
            .ok_or_else(|| SimError::invariant(vpn, "replacement policy found no resident victim"))?;

        // The victim's frame, the policy's frame and the page table must agree.
        let pfn = self.frame_table.frame_of(victim.vpn).ok_or_else(|| {
            SimError::invariant(victim.vpn, "victim page is not in the frame table")
        })?;
        if pfn != victim.pfn {
            return Err(SimError::invariant(
                victim.vpn,
                format!("policy chose frame {} but the page occupies frame {}", victim.pfn, pfn),
            ));
        }
        let victim_pte = page_table.get_entry(victim.vpn);
        if !victim_pte.is_mapped() || victim_pte.pfn != pfn {
            return Err(SimError::invariant(
                victim.vpn,
                format!("page table does not map the victim to frame {pfn}"),
            ));
        }

        log::debug!("evicting page {} from frame {} for page {}", victim.vpn, pfn, vpn);

        self.disk.write(victim.vpn.0, physmem.frame(pfn))?;
        self.disk.read(vpn.0, physmem.frame_mut(pfn))?;

        self.frame_table.replace(pfn, vpn);
        page_table.set_entry(vpn, pfn, Protection::ReadOnly);
        page_table.unmap(victim.vpn);
        self.access.record(vpn, self.clock.now());
        self.access.reset(victim.vpn);

        self.stats.read_count += 1;
        self.stats.write_count += 1;
        Ok(())
    }

    fn upgrade_to_write(&mut self, page_table: &mut PageTable, vpn: Vpn, pfn: Pfn) -> Result<()> {
        if self.frame_table.occupant(pfn) != Some(vpn) {
            return Err(SimError::invariant(
                vpn,
                format!("read-only page is not the occupant of frame {pfn}"),
            ));
        }
        page_table.set_entry(vpn, pfn, Protection::ReadWrite);
        let stamp = self.clock.now().boosted(WRITE_BOOST_MICROS);
        self.access.record(vpn, stamp);
        Ok(())
    }

    /// Cross-checks the frame table, page table and access record.
    pub fn check_invariants(&self, page_table: &PageTable) -> Result<()> {
        let frame_table = &self.frame_table;
        if frame_table.occupied() > frame_table.capacity() {
            return Err(SimError::invariant(
                Vpn(0),
                format!(
                    "{} frames occupied out of {}",
                    frame_table.occupied(),
                    frame_table.capacity()
                ),
            ));
        }

        for (idx, entry) in frame_table.entries.iter().enumerate() {
            let pfn = Pfn(idx);
            match entry.vpn {
                Some(vpn) => {
                    if idx >= frame_table.occupied() {
                        return Err(SimError::invariant(vpn, format!("frame {pfn} is past the fill line")));
                    }
                    let pte = page_table.get_entry(vpn);
                    if !pte.is_mapped() || pte.pfn != pfn {
                        return Err(SimError::invariant(vpn, format!("frame {pfn} holds an unmapped page")));
                    }
                }
                None if idx < frame_table.occupied() => {
                    return Err(SimError::invariant(Vpn(0), format!("occupied frame {pfn} is empty")));
                }
                None => {}
            }
        }

        let mut resident = 0;
        for (idx, pte) in page_table.entries.iter().enumerate() {
            let vpn = Vpn(idx);
            if pte.is_mapped() {
                resident += 1;
                if frame_table.occupant(pte.pfn) != Some(vpn) {
                    return Err(SimError::invariant(vpn, format!("mapped to frame {} it doesn't occupy", pte.pfn)));
                }
            }
            if pte.is_mapped() != self.access.is_tracked(vpn) {
                return Err(SimError::invariant(vpn, "access stamp disagrees with residency"));
            }
        }
        // With every mapped page matched to its own frame, equal counts
        // means no frame is shared.
        if resident != frame_table.occupied() {
            return Err(SimError::invariant(
                Vpn(0),
                format!("{resident} pages mapped but {} frames occupied", frame_table.occupied()),
            ));
        }

        Ok(())
    }

    pub fn shutdown(self) -> Result<MemoryStats> {
        log::info!(
            "disk {} saw {} reads and {} writes",
            self.disk.path().display(),
            self.disk.reads,
            self.disk.writes
        );
        self.disk.close()?;
        Ok(self.stats)
    }
}

impl<C: Clock> FaultHandler for MemoryManager<C> {
    fn handle_page_fault(
        &mut self,
        page_table: &mut PageTable,
        physmem: &mut PhysicalMemory,
        vpn: Vpn,
    ) -> Result<()> {
        self.stats.fault_count += 1;
        let pte = page_table.get_entry(vpn);

        match pte.protection {
            Protection::Unmapped => match self.frame_table.next_free() {
                Some(pfn) => self.load_into_free_frame(page_table, physmem, vpn, pfn)?,
                None => self.evict_and_load(page_table, physmem, vpn)?,
            },
            Protection::ReadOnly => self.upgrade_to_write(page_table, vpn, pte.pfn)?,
            Protection::ReadWrite => {
                return Err(SimError::invariant(vpn, "fault on a page that is already writable"));
            }
        }

        log::trace!("page fault on page {}; frames: {}", vpn, self.frame_table);
        log::trace!("page table:\n{}", page_table);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub fault_count: u64,
    pub read_count: u64,
    pub write_count: u64,
}

impl MemoryStats {
    fn new() -> Self {
        Self::default()
    }
}

/// Frames are handed out in order 0, 1, 2, ... and never released, so the
/// frames below `occupied` are exactly the occupied ones.
pub struct FrameTable {
    pub entries: Vec<FrameTableEntry>,
    occupied: usize,
    hand: usize,
}

impl FrameTable {
    pub fn new(frame_count: usize) -> Self {
        Self {
            entries: vec![FrameTableEntry::new(); frame_count],
            occupied: 0,
            hand: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn next_free(&self) -> Option<Pfn> {
        (self.occupied < self.capacity()).then_some(Pfn(self.occupied))
    }

    /// Fills the next free frame.
    pub fn occupy(&mut self, pfn: Pfn, vpn: Vpn) {
        debug_assert_eq!(Some(pfn), self.next_free());
        self.entries[pfn.0].assign(vpn);
        self.occupied += 1;
    }

    pub fn replace(&mut self, pfn: Pfn, vpn: Vpn) {
        self.entries[pfn.0].assign(vpn);
    }

    pub fn occupant(&self, pfn: Pfn) -> Option<Vpn> {
        self.entries.get(pfn.0).and_then(|entry| entry.vpn)
    }

    pub fn frame_of(&self, vpn: Vpn) -> Option<Pfn> {
        self.entries
            .iter()
            .position(|entry| entry.vpn == Some(vpn))
            .map(Pfn)
    }

    /// Returns the FIFO hand and moves it to the next frame.
    pub fn advance_hand(&mut self) -> Pfn {
        let victim = self.hand;
        self.hand += 1;
        if self.hand == self.capacity() {
            self.hand = 0;
        }
        Pfn(victim)
    }

    pub fn resident(&self) -> impl Iterator<Item = (Pfn, Vpn)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| entry.vpn.map(|vpn| (Pfn(idx), vpn)))
    }
}

impl fmt::Display for FrameTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, entry) in self.entries.iter().enumerate() {
            if idx > 0 {
                f.write_str(" - ")?;
            }
            match entry.vpn {
                Some(vpn) => write!(f, "{vpn}")?,
                None => f.write_str("_")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameTableEntry {
    pub vpn: Option<Vpn>,
}

impl FrameTableEntry {
    pub fn new() -> Self {
        FrameTableEntry { vpn: None }
    }

    pub fn assign(&mut self, vpn: Vpn) {
        self.vpn = Some(vpn);
    }
}

impl Default for FrameTableEntry {
    fn default() -> Self {
        Self::new()
    }
}
