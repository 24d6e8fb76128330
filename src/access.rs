//! Access timestamps for the recency policy.
//!
//! A [`Timestamp`] is a (seconds, microseconds) pair. Seconds equal to zero
//! is the sentinel for "not resident"; every [`Clock`] here starts at one
//! second so a real stamp can never collide with it.

use std::{
    fmt,
    str::FromStr,
    time::{Duration, Instant},
};

use crate::{error::ConfigError, paging::Vpn};

pub const MICROS_PER_SEC: u32 = 1_000_000;

/// Added to the stamp of a page on its write fault, so a page written at `T`
/// ranks newer than one only read at `T` but not newer than later reads.
pub const WRITE_BOOST_MICROS: u32 = 1;

const _: () = assert!(WRITE_BOOST_MICROS < MICROS_PER_SEC);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    secs: u64,
    micros: u32,
}

impl Timestamp {
    pub const SENTINEL: Self = Self { secs: 0, micros: 0 };

    /// Micros past one second are carried into `secs`.
    pub fn new(secs: u64, micros: u32) -> Self {
        Self {
            secs: secs + u64::from(micros / MICROS_PER_SEC),
            micros: micros % MICROS_PER_SEC,
        }
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self {
            secs: duration.as_secs(),
            micros: duration.subsec_micros(),
        }
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn micros(&self) -> u32 {
        self.micros
    }

    pub fn is_sentinel(&self) -> bool {
        self.secs == 0
    }

    /// `micros` must stay below one second.
    pub fn boosted(self, micros: u32) -> Self {
        debug_assert!(micros < MICROS_PER_SEC);
        let fine = self.micros + micros;
        if fine >= MICROS_PER_SEC {
            Self {
                secs: self.secs + 1,
                micros: fine - MICROS_PER_SEC,
            }
        } else {
            Self {
                secs: self.secs,
                micros: fine,
            }
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

pub trait Clock {
    fn now(&mut self) -> Timestamp;
}

/// Wall-clock time since the clock was created, offset by one second.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&mut self) -> Timestamp {
        Timestamp::from_duration(self.origin.elapsed() + Duration::from_secs(1))
    }
}

/// Advances one microsecond per reading, which makes recency runs
/// reproducible.
#[derive(Default)]
pub struct LogicalClock {
    ticks: u64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for LogicalClock {
    fn now(&mut self) -> Timestamp {
        self.ticks += 1;
        let per_sec = u64::from(MICROS_PER_SEC);
        // remainder is below MICROS_PER_SEC
        Timestamp::new(1 + self.ticks / per_sec, (self.ticks % per_sec) as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockKind {
    Wall,
    Logical,
}

impl FromStr for ClockKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wall" => Ok(Self::Wall),
            "logical" => Ok(Self::Logical),
            other => Err(ConfigError::UnknownClock(other.to_string())),
        }
    }
}

/// The clock selected on the command line.
pub enum SimClock {
    Wall(MonotonicClock),
    Logical(LogicalClock),
}

impl SimClock {
    pub fn new(kind: ClockKind) -> Self {
        match kind {
            ClockKind::Wall => Self::Wall(MonotonicClock::new()),
            ClockKind::Logical => Self::Logical(LogicalClock::new()),
        }
    }
}

impl Clock for SimClock {
    fn now(&mut self) -> Timestamp {
        match self {
            Self::Wall(clock) => clock.now(),
            Self::Logical(clock) => clock.now(),
        }
    }
}

/// Last-access stamp per page, indexed by page number.
pub struct AccessRecord {
    stamps: Vec<Timestamp>,
}

impl AccessRecord {
    pub fn new(page_count: usize) -> Self {
        Self {
            stamps: vec![Timestamp::SENTINEL; page_count],
        }
    }

    pub fn record(&mut self, vpn: Vpn, stamp: Timestamp) {
        self.stamps[vpn.0] = stamp;
    }

    pub fn reset(&mut self, vpn: Vpn) {
        self.stamps[vpn.0] = Timestamp::SENTINEL;
    }

    pub fn get(&self, vpn: Vpn) -> Timestamp {
        self.stamps[vpn.0]
    }

    pub fn is_tracked(&self, vpn: Vpn) -> bool {
        !self.stamps[vpn.0].is_sentinel()
    }

    /// Lowest stamp among tracked pages. Equal stamps go to the lowest page.
    pub fn oldest(&self) -> Option<Vpn> {
        self.stamps
            .iter()
            .enumerate()
            .filter(|(_, stamp)| !stamp.is_sentinel())
            .min_by_key(|(_, stamp)| **stamp)
            .map(|(idx, _)| Vpn(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_without_carry() {
        let stamp = Timestamp::new(3, 100).boosted(WRITE_BOOST_MICROS);
        assert_eq!(stamp, Timestamp::new(3, 100 + WRITE_BOOST_MICROS));
    }

    #[test]
    fn boost_carries_into_seconds() {
        let stamp = Timestamp::new(5, 900_000).boosted(250_000);
        assert_eq!(stamp.secs(), 6);
        assert_eq!(stamp.micros(), 150_000);
    }

    #[test]
    fn boost_reaching_modulus_wraps_to_zero() {
        let stamp = Timestamp::new(5, 750_000).boosted(250_000);
        assert_eq!(stamp.secs(), 6);
        assert_eq!(stamp.micros(), 0);
    }

    #[test]
    fn ordering_is_seconds_then_micros() {
        assert!(Timestamp::new(1, 999_999) < Timestamp::new(2, 0));
        assert!(Timestamp::new(2, 1) < Timestamp::new(2, 2));
        assert_eq!(Timestamp::new(1, 1_500_000), Timestamp::new(2, 500_000));
    }

    #[test]
    fn clocks_never_produce_the_sentinel() {
        let mut wall = MonotonicClock::new();
        let mut logical = LogicalClock::new();
        assert!(!wall.now().is_sentinel());

        let mut last = Timestamp::SENTINEL;
        for _ in 0..1_000 {
            let stamp = logical.now();
            assert!(!stamp.is_sentinel());
            assert!(stamp > last);
            last = stamp;
        }
    }

    #[test]
    fn logical_clock_rolls_over_a_second() {
        let mut clock = LogicalClock {
            ticks: u64::from(MICROS_PER_SEC) - 2,
        };
        assert_eq!(clock.now(), Timestamp::new(1, 999_999));
        assert_eq!(clock.now(), Timestamp::new(2, 0));
    }

    #[test]
    fn oldest_ignores_sentinel_entries() {
        let mut record = AccessRecord::new(4);
        assert_eq!(record.oldest(), None);

        record.record(Vpn(1), Timestamp::new(9, 0));
        record.record(Vpn(3), Timestamp::new(2, 0));
        assert_eq!(record.oldest(), Some(Vpn(3)));

        record.reset(Vpn(3));
        assert!(!record.is_tracked(Vpn(3)));
        assert_eq!(record.oldest(), Some(Vpn(1)));
    }

    #[test]
    fn parses_clock_names() {
        assert_eq!("wall".parse::<ClockKind>().unwrap(), ClockKind::Wall);
        assert_eq!("logical".parse::<ClockKind>().unwrap(), ClockKind::Logical);
        assert!("sundial".parse::<ClockKind>().is_err());
    }
}
