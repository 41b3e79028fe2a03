use crate::kind::MappingKind;
use hyp_memory_addresses::VirtualAddress;
use hyp_pgtable::{EntryKind, Level};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("mapping table full ({0} records)")]
    Full(usize),
    #[error("{0} is already recorded")]
    DuplicateKind(MappingKind),
    #[error("per-CPU variables of cpu {0} are already recorded")]
    DuplicateCpu(usize),
    #[error("cpu {cpu} out of range (at most {max} CPUs)")]
    CpuOutOfRange { cpu: usize, max: usize },
    #[error("{kind} is not per-CPU but was recorded for cpu {cpu}")]
    UnexpectedCpu { kind: MappingKind, cpu: usize },
    #[error("{0}: range is inverted or overflows")]
    InvalidRange(MappingKind),
    #[error("{kind}: range ends at {end}, beyond the translatable range")]
    Untranslatable { kind: MappingKind, end: VirtualAddress },
    #[error("{first} and {second} overlap at {at}")]
    Overlap {
        first: MappingKind,
        second: MappingKind,
        at: VirtualAddress,
    },
    #[error("mapping table is already finished")]
    Sealed,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapletError {
    #[error("maplet buffer full ({0} entries)")]
    Full(usize),
    #[error("maplet at {next} does not follow {prev}")]
    NonIncreasing {
        prev: VirtualAddress,
        next: VirtualAddress,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Maplet(#[from] MapletError),
    #[error("unexpected {kind} entry at {level} for {va}")]
    UnexpectedEntry {
        va: VirtualAddress,
        level: Level,
        kind: EntryKind,
    },
    #[error("mapping records must be finished before checking")]
    Unsealed,
}
