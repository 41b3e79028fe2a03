//! # AArch64 Hypervisor Page Tables
//!
//! An independent software model of the EL2 stage-1 translation used by the
//! hypervisor: 4 KiB granule, four levels, 48-bit input and output addresses.
//! It exists to *check* the tables the production mapping code built, so it
//! never writes a live table and never shares code with that installer.
//!
//! ## Virtual Address → Physical Address Walk
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  L0   |  L1   |  L2   |  L3   | Offset |
//! ```
//!
//! Every level holds 512 eight-byte descriptors. The two low bits of a
//! descriptor decide what it is:
//!
//! | bits[1:0] | L0 | L1 / L2 | L3 |
//! |:---------:|:---|:--------|:---|
//! | `x0` | invalid | invalid | invalid |
//! | `01` | block (not permitted) | block (1 GiB / 2 MiB) | reserved |
//! | `11` | table | table | page (4 KiB) |
//!
//! See [`EntryKind::classify`].
//!
//! ## What you get
//! - [`Descriptor`]: the raw descriptor as a bitfield.
//! - [`Level`] and [`TableIndex`] for typed index extraction.
//! - [`PageTableWalker`]: translation ([`Translation`]), leaf enumeration and
//!   a debug dump.
//! - [`Prot`]: read/write/execute/device permissions and their encoding.
//! - [`PhysMapper`] and [`FrameAlloc`]: the two seams to the outside world.
//! - [`pgtable_max_pages`]: worst-case table provisioning.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "testing"))]
extern crate alloc;

mod descriptor;
mod entry_kind;
mod level;
mod phys_mapper;
mod prot;
mod sizing;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod walker;

pub use descriptor::{Descriptor, OUTPUT_ADDRESS_MASK};
pub use entry_kind::EntryKind;
pub use hyp_memory_addresses as addresses;
pub use level::{Level, TableIndex};
pub use prot::{AccessPermission, MemoryAttribute, Prot};
pub use sizing::pgtable_max_pages;
pub use walker::{LeafEntry, PageTableWalker, Translation};

use addresses::PhysicalAddress;

/// Descriptors per table at every level.
pub const ENTRIES_PER_TABLE: usize = 512;

/// Minimal frame allocator used to obtain **physical** 4 KiB frames
/// for page tables.
///
/// Returned frames **must** be 4 KiB aligned and zeroed. Returns `None` on
/// out-of-memory.
pub trait FrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress>;
}

/// Converts physical addresses to usable references in the current address
/// space (the hypervisor's linear map, or simulated RAM in tests).
///
/// # Safety
/// - `pa` must be mapped (writable for `&mut T`) for the whole lifetime `'a`.
/// - `T` must match the bytes at `pa` and no other reference may alias them
///   mutably.
pub trait PhysMapper {
    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;

    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_to_ref<'a, T>(&self, pa: PhysicalAddress) -> &'a T {
        unsafe { self.phys_to_mut(pa) }
    }
}

/// One translation table: 512 descriptors, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [Descriptor; ENTRIES_PER_TABLE],
}

const _: () = {
    assert!(size_of::<PageTable>() == 4096);
    assert!(align_of::<PageTable>() == 4096);
};

impl PageTable {
    /// A fully invalid table.
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [Descriptor::new(); ENTRIES_PER_TABLE],
        }
    }

    /// Plain load of the entry at `i`.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> Descriptor {
        self.entries[i.as_usize()]
    }

    /// Plain store; no barriers or TLB maintenance.
    #[inline]
    pub const fn set(&mut self, i: TableIndex, d: Descriptor) {
        self.entries[i.as_usize()] = d;
    }

    pub fn iter(&self) -> impl Iterator<Item = (TableIndex, Descriptor)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, d)| (TableIndex::new_truncate(i), *d))
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::zeroed()
    }
}
