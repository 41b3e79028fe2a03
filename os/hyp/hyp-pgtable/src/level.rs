use crate::addresses::VirtualAddress;
use core::fmt;

/// Translation level of the 4 KiB-granule, 4-level regime.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Level {
    L0 = 0,
    L1 = 1,
    L2 = 2,
    L3 = 3,
}

/// Index into one translation table (`0..512`).
///
/// Strongly typed so a raw `usize` never indexes a table by accident.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl Level {
    /// All levels, root first.
    pub const ALL: [Self; 4] = [Self::L0, Self::L1, Self::L2, Self::L3];

    /// Position of the lowest VA bit this level indexes: 39, 30, 21, 12.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        39 - 9 * (self as u32)
    }

    /// Bytes of input address covered by one descriptor at this level.
    #[inline]
    #[must_use]
    pub const fn entry_span(self) -> u64 {
        1 << self.shift()
    }

    /// The descriptor index `va` selects at this level.
    #[inline]
    #[must_use]
    pub const fn index_of(self, va: VirtualAddress) -> TableIndex {
        TableIndex::new(((va.as_u64() >> self.shift()) & 0x1FF) as u16)
    }

    /// The next level down, `None` at level 3.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::L0 => Some(Self::L1),
            Self::L1 => Some(Self::L2),
            Self::L2 => Some(Self::L3),
            Self::L3 => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.as_u8())
    }
}

impl TableIndex {
    /// ### Debug assertions
    /// - Asserts `v < 512` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < 512);
        Self(v)
    }

    /// Build from a loop counter, keeping only the low nine bits.
    #[inline]
    #[must_use]
    pub const fn new_truncate(v: usize) -> Self {
        Self((v & 0x1FF) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0 as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_and_spans() {
        assert_eq!(Level::L0.shift(), 39);
        assert_eq!(Level::L1.shift(), 30);
        assert_eq!(Level::L2.shift(), 21);
        assert_eq!(Level::L3.shift(), 12);
        assert_eq!(Level::L1.entry_span(), 1 << 30);
        assert_eq!(Level::L3.entry_span(), 4096);
    }

    #[test]
    fn index_extraction() {
        // L0=1, L1=2, L2=3, L3=4, offset 0x567
        let va = VirtualAddress::new((1 << 39) | (2 << 30) | (3 << 21) | (4 << 12) | 0x567);
        assert_eq!(Level::L0.index_of(va).as_usize(), 1);
        assert_eq!(Level::L1.index_of(va).as_usize(), 2);
        assert_eq!(Level::L2.index_of(va).as_usize(), 3);
        assert_eq!(Level::L3.index_of(va).as_usize(), 4);
    }

    #[test]
    fn index_ignores_bits_above_47() {
        let va = VirtualAddress::new(0xFFFF_0000_0000_0000 | (511 << 39));
        assert_eq!(Level::L0.index_of(va).as_usize(), 511);
    }

    #[test]
    fn level_chain() {
        assert_eq!(Level::L0.next(), Some(Level::L1));
        assert_eq!(Level::L3.next(), None);
        assert_eq!(format!("{}", Level::L2), "L2");
    }
}
