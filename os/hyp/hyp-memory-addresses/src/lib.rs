//! # Hypervisor Physical and Virtual Address Types
//!
//! Strongly typed wrappers for the raw 64-bit addresses handled by the
//! hypervisor memory code: the page allocator works on physical addresses,
//! the mapping recorder on hypervisor virtual addresses, and the page-table
//! walker translates one into the other.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] | A raw 64-bit address of either kind. |
//! | [`PhysicalAddress`] | Host physical memory or MMIO. |
//! | [`VirtualAddress`] | A hypervisor (EL2) virtual address. |
//!
//! ## Page Sizes
//!
//! The AArch64 4 KiB translation granule yields three leaf sizes, exposed as
//! marker types implementing [`PageSize`]:
//!
//! - [`Size4K`]: a level-3 page
//! - [`Size2M`]: a level-2 block
//! - [`Size1G`]: a level-1 block
//!
//! ## Linear Map
//!
//! The hypervisor reaches physical memory through a single linear mapping
//! with a constant offset. [`PhysVirtConversion`] abstracts that relation and
//! [`LinearMap`] implements it.
//!
//! ```rust
//! # use hyp_memory_addresses::*;
//! let map = LinearMap::new(0x0000_8000_0000_0000 - 0x4000_0000);
//! let va = VirtualAddress::new(0x0000_8000_0000_1234);
//! let pa = map.virt_to_phys(va);
//! assert_eq!(pa.as_u64(), 0x4000_1234);
//! assert_eq!(map.phys_to_virt(pa), va);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod conversion;
mod memory_address;
mod physical_address;
mod virtual_address;

pub use conversion::{LinearMap, PhysVirtConversion};
pub use memory_address::MemoryAddress;
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

use core::fmt;
use core::hash::Hash;

/// log2 of the base translation granule.
pub const PAGE_SHIFT: u32 = 12;

/// The base translation granule in bytes.
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Number of bits of output and input address the hypervisor tables resolve.
pub const ADDRESS_BITS: u32 = 48;

/// Sealed trait pattern to restrict `PageSize` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for the leaf sizes of the 4 KiB granule.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Debug
{
    /// Size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE).
    const SHIFT: u32;

    fn as_str() -> &'static str;
}

/// 4 KiB page (level 3).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size4K;
impl sealed::Sealed for Size4K {}
impl PageSize for Size4K {
    const SIZE: u64 = PAGE_SIZE;
    const SHIFT: u32 = PAGE_SHIFT;

    fn as_str() -> &'static str {
        "4K"
    }
}

/// 2 MiB block (level 2).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size2M;
impl sealed::Sealed for Size2M {}
impl PageSize for Size2M {
    const SIZE: u64 = 2 * 1024 * 1024;
    const SHIFT: u32 = 21;

    fn as_str() -> &'static str {
        "2M"
    }
}

/// 1 GiB block (level 1).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size1G;
impl sealed::Sealed for Size1G {}
impl PageSize for Size1G {
    const SIZE: u64 = 1024 * 1024 * 1024;
    const SHIFT: u32 = 30;

    fn as_str() -> &'static str {
        "1G"
    }
}

const _: () = {
    assert!(Size4K::SIZE == 1 << Size4K::SHIFT);
    assert!(Size2M::SIZE == 1 << Size2M::SHIFT);
    assert!(Size1G::SIZE == 1 << Size1G::SHIFT);
};

/// Align `x` down to the nearest multiple of `a`.
///
/// ### Preconditions
/// - `a` must be **non-zero** and a **power of two**.
///
/// ### Examples
/// ```rust
/// # use hyp_memory_addresses::align_down;
/// assert_eq!(align_down(0,      4096), 0);
/// assert_eq!(align_down(4095,   4096), 0);
/// assert_eq!(align_down(8191,   4096), 4096);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u64, a: u64) -> u64 {
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of `a`, or `None` on overflow.
///
/// ### Preconditions
/// - `a` must be **non-zero** and a **power of two**.
///
/// ### Examples
/// ```rust
/// # use hyp_memory_addresses::align_up;
/// assert_eq!(align_up(0,    4096), Some(0));
/// assert_eq!(align_up(1,    4096), Some(4096));
/// assert_eq!(align_up(4096, 4096), Some(4096));
/// assert_eq!(align_up(u64::MAX, 4096), None);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: u64, a: u64) -> Option<u64> {
    match x.checked_add(a - 1) {
        Some(v) => Some(v & !(a - 1)),
        None => None,
    }
}
