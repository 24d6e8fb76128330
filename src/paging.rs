use std::{fmt, str::FromStr};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    access::AccessRecord,
    error::{ConfigError, Result, SimError},
    memory::FrameTable,
};

pub const PAGE_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vpn(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pfn(pub usize);

impl fmt::Display for Vpn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Display for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protection {
    #[default]
    Unmapped,
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageTableEntry {
    pub pfn: Pfn,
    pub protection: Protection,
}

impl PageTableEntry {
    pub fn is_mapped(&self) -> bool {
        self.protection != Protection::Unmapped
    }
}

pub struct PageTable {
    pub entries: Vec<PageTableEntry>,
}

impl PageTable {
    pub fn new(page_count: usize) -> Result<Self> {
        if page_count == 0 {
            return Err(SimError::PageTableInit("page count must be positive".into()));
        }
        Ok(Self {
            entries: vec![PageTableEntry::default(); page_count],
        })
    }

    pub fn page_count(&self) -> usize {
        self.entries.len()
    }

    pub fn get_entry(&self, vpn: Vpn) -> PageTableEntry {
        self.entries[vpn.0]
    }

    pub fn set_entry(&mut self, vpn: Vpn, pfn: Pfn, protection: Protection) {
        self.entries[vpn.0] = PageTableEntry { pfn, protection };
    }

    pub fn unmap(&mut self, vpn: Vpn) {
        self.entries[vpn.0] = PageTableEntry::default();
    }

    pub fn mapped(&self) -> impl Iterator<Item = (Vpn, PageTableEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, pte)| pte.is_mapped())
            .map(|(idx, pte)| (Vpn(idx), *pte))
    }
}

impl fmt::Display for PageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (vpn, pte) in self.mapped() {
            let bits = match pte.protection {
                Protection::ReadWrite => "rw",
                _ => "r-",
            };
            writeln!(f, "page {:>5}: frame {:>5} {}", vpn, pte.pfn, bits)?;
        }
        Ok(())
    }
}

/// A resident page chosen for eviction, together with the frame it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Victim {
    pub pfn: Pfn,
    pub vpn: Vpn,
}

pub trait PageReplacementPolicy {
    /// Only called once every frame is occupied. `None` means the policy
    /// landed on a frame with no occupant, which the caller reports as a
    /// bookkeeping failure.
    fn pick_victim(&mut self, frame_table: &mut FrameTable, access: &AccessRecord) -> Option<Victim>;
}

pub struct Random {
    rng: StdRng,
}

impl Random {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for Random {
    fn default() -> Self {
        Self::new()
    }
}

impl PageReplacementPolicy for Random {
    fn pick_victim(&mut self, frame_table: &mut FrameTable, _access: &AccessRecord) -> Option<Victim> {
        let pfn = Pfn(self.rng.random_range(0..frame_table.capacity()));
        frame_table.occupant(pfn).map(|vpn| Victim { pfn, vpn })
    }
}

/// Evicts frames round-robin starting at frame 0. Since frames are filled in
/// order, this is load order.
pub struct Fifo;

impl PageReplacementPolicy for Fifo {
    fn pick_victim(&mut self, frame_table: &mut FrameTable, _access: &AccessRecord) -> Option<Victim> {
        let pfn = frame_table.advance_hand();
        frame_table.occupant(pfn).map(|vpn| Victim { pfn, vpn })
    }
}

/// Evicts the resident page with the oldest access stamp.
///
/// The frame comes from [`FrameTable::frame_of`], so only the page-table half
/// of the eviction consistency check can catch drift for this policy.
pub struct Recency;

impl PageReplacementPolicy for Recency {
    fn pick_victim(&mut self, frame_table: &mut FrameTable, access: &AccessRecord) -> Option<Victim> {
        let vpn = access.oldest()?;
        let pfn = frame_table.frame_of(vpn)?;
        Some(Victim { pfn, vpn })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Random,
    Fifo,
    Custom,
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "rand" => Ok(Self::Random),
            "fifo" => Ok(Self::Fifo),
            "custom" => Ok(Self::Custom),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Random => "rand",
            Self::Fifo => "fifo",
            Self::Custom => "custom",
        })
    }
}

pub enum Policy {
    Random(Random),
    Fifo(Fifo),
    Recency(Recency),
}

impl Policy {
    pub fn new(kind: PolicyKind, seed: Option<u64>) -> Self {
        match kind {
            PolicyKind::Random => Self::Random(seed.map_or_else(Random::new, Random::seeded)),
            PolicyKind::Fifo => Self::Fifo(Fifo),
            PolicyKind::Custom => Self::Recency(Recency),
        }
    }
}

impl PageReplacementPolicy for Policy {
    fn pick_victim(&mut self, frame_table: &mut FrameTable, access: &AccessRecord) -> Option<Victim> {
        match self {
            Self::Random(policy) => policy.pick_victim(frame_table, access),
            Self::Fifo(policy) => policy.pick_victim(frame_table, access),
            Self::Recency(policy) => policy.pick_victim(frame_table, access),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Timestamp;

    fn full_table(pages: &[usize]) -> FrameTable {
        let mut frame_table = FrameTable::new(pages.len());
        for &page in pages {
            let pfn = frame_table.next_free().unwrap();
            frame_table.occupy(pfn, Vpn(page));
        }
        frame_table
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("rand".parse::<PolicyKind>().unwrap(), PolicyKind::Random);
        assert_eq!("fifo".parse::<PolicyKind>().unwrap(), PolicyKind::Fifo);
        assert_eq!("custom".parse::<PolicyKind>().unwrap(), PolicyKind::Custom);
        assert_eq!(
            "bogus".parse::<PolicyKind>(),
            Err(ConfigError::UnknownPolicy("bogus".into()))
        );
    }

    #[test]
    fn fifo_walks_frames_round_robin() {
        let mut frame_table = full_table(&[7, 3, 5]);
        let access = AccessRecord::new(8);
        let mut fifo = Fifo;

        let order: Vec<Victim> = (0..4)
            .map(|_| fifo.pick_victim(&mut frame_table, &access).unwrap())
            .collect();

        assert_eq!(order[0], Victim { pfn: Pfn(0), vpn: Vpn(7) });
        assert_eq!(order[1], Victim { pfn: Pfn(1), vpn: Vpn(3) });
        assert_eq!(order[2], Victim { pfn: Pfn(2), vpn: Vpn(5) });
        assert_eq!(order[3], Victim { pfn: Pfn(0), vpn: Vpn(7) });
    }

    #[test]
    fn random_is_reproducible_for_a_seed() {
        let mut frame_table = full_table(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let access = AccessRecord::new(8);
        let mut a = Random::seeded(42);
        let mut b = Random::seeded(42);

        for _ in 0..100 {
            assert_eq!(
                a.pick_victim(&mut frame_table, &access),
                b.pick_victim(&mut frame_table, &access)
            );
        }
    }

    #[test]
    fn random_spreads_evenly_over_frames() {
        const FRAMES: usize = 6;
        const PICKS: usize = 60_000;
        let mut frame_table = full_table(&[10, 11, 12, 13, 14, 15]);
        let access = AccessRecord::new(16);
        let mut random = Random::seeded(7);
        let mut counts = [0usize; FRAMES];

        for _ in 0..PICKS {
            let victim = random.pick_victim(&mut frame_table, &access).unwrap();
            assert_eq!(victim.vpn, Vpn(10 + victim.pfn.0));
            counts[victim.pfn.0] += 1;
        }

        let expected = PICKS / FRAMES;
        for count in counts {
            assert!(count.abs_diff(expected) < expected / 10, "skewed counts: {counts:?}");
        }
    }

    #[test]
    fn recency_picks_oldest_resident_page() {
        let mut frame_table = full_table(&[2, 0, 3]);
        let mut access = AccessRecord::new(4);
        access.record(Vpn(2), Timestamp::new(5, 10));
        access.record(Vpn(0), Timestamp::new(4, 999_999));
        access.record(Vpn(3), Timestamp::new(5, 0));

        let victim = Recency.pick_victim(&mut frame_table, &access).unwrap();
        assert_eq!(victim, Victim { pfn: Pfn(1), vpn: Vpn(0) });
    }

    #[test]
    fn recency_breaks_full_ties_by_page_number() {
        let mut frame_table = full_table(&[3, 1]);
        let mut access = AccessRecord::new(4);
        access.record(Vpn(3), Timestamp::new(2, 500));
        access.record(Vpn(1), Timestamp::new(2, 500));

        let victim = Recency.pick_victim(&mut frame_table, &access).unwrap();
        assert_eq!(victim, Victim { pfn: Pfn(1), vpn: Vpn(1) });
    }

    #[test]
    fn page_table_lists_only_mapped_pages() {
        let mut page_table = PageTable::new(4).unwrap();
        page_table.set_entry(Vpn(1), Pfn(0), Protection::ReadOnly);
        page_table.set_entry(Vpn(3), Pfn(1), Protection::ReadWrite);
        page_table.unmap(Vpn(1));

        let mapped: Vec<Vpn> = page_table.mapped().map(|(vpn, _)| vpn).collect();
        assert_eq!(mapped, vec![Vpn(3)]);
        assert!(page_table.to_string().contains("rw"));
        assert!(PageTable::new(0).is_err());
    }
}
