use crate::level::Level;
use core::fmt;

/// What a descriptor means at the level it was read from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EntryKind {
    /// Bit 0 clear; any lookup through it faults.
    Invalid,
    /// A `01` descriptor at level 0, which the 4 KiB granule does not allow.
    BlockNotPermitted,
    /// A 1 GiB (L1) or 2 MiB (L2) leaf.
    Block,
    /// Points to the next-level table.
    Table,
    /// A 4 KiB leaf at level 3.
    Page,
    /// A `01` descriptor at level 3; architecturally reserved, treated as a fault.
    Reserved,
}

impl EntryKind {
    /// Classify a raw descriptor by its low two bits and level.
    #[must_use]
    pub const fn classify(raw: u64, level: Level) -> Self {
        match (raw & 0b11, level) {
            (0b00 | 0b10, _) => Self::Invalid,
            (0b01, Level::L0) => Self::BlockNotPermitted,
            (0b01, Level::L1 | Level::L2) => Self::Block,
            (0b01, Level::L3) => Self::Reserved,
            (_, Level::L3) => Self::Page,
            _ => Self::Table,
        }
    }

    /// A terminal translation entry.
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::Block | Self::Page)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::BlockNotPermitted => "block (not permitted)",
            Self::Block => "block",
            Self::Table => "table",
            Self::Page => "page",
            Self::Reserved => "reserved",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
