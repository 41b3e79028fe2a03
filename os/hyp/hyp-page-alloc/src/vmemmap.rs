//! Layout of the descriptor table.
//!
//! The hypervisor maps one [`PageDescriptor`] per physical page into a
//! virtually contiguous array starting at `vmemmap_base`, indexed by
//! absolute page frame number. Only the slices covering real memory are
//! backed.

use crate::descriptor::PageDescriptor;
use core::mem::size_of;
use core::ops::Range;
use hyp_memory_addresses::{PAGE_SIZE, PhysicalAddress, Size4K, VirtualAddress};

const DESCRIPTOR_SIZE: u64 = size_of::<PageDescriptor>() as u64;

/// Page-aligned virtual range of the descriptors for `[phys, phys + size)`.
///
/// `None` if the range is empty or any bound overflows.
///
/// ```
/// # use hyp_memory_addresses::{PhysicalAddress, VirtualAddress};
/// # use hyp_page_alloc::vmemmap_range;
/// let base = VirtualAddress::new(0xFFFF_8000_0000_0000);
/// let r = vmemmap_range(base, PhysicalAddress::new(0x4000_0000), 0x1000).unwrap();
/// assert!(r.start.as_u64() % 4096 == 0 && r.end.as_u64() - r.start.as_u64() == 4096);
/// ```
#[must_use]
pub fn vmemmap_range(
    vmemmap_base: VirtualAddress,
    phys: PhysicalAddress,
    size: u64,
) -> Option<Range<VirtualAddress>> {
    if size == 0 {
        return None;
    }
    let first = phys.pfn();
    let last = phys.checked_add(size - 1)?.pfn();
    let start = first
        .checked_mul(DESCRIPTOR_SIZE)
        .and_then(|off| vmemmap_base.checked_add(off))?;
    let end = (last + 1)
        .checked_mul(DESCRIPTOR_SIZE)
        .and_then(|off| vmemmap_base.checked_add(off))?;
    Some(start.align_down::<Size4K>()..end.align_up::<Size4K>()?)
}

/// Pages of backing needed for the descriptors of `nr_pages` pages.
#[must_use]
pub const fn vmemmap_pages(nr_pages: usize) -> usize {
    (nr_pages as u64 * DESCRIPTOR_SIZE).div_ceil(PAGE_SIZE) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: VirtualAddress = VirtualAddress::new(0x10_0000_0000);

    #[test]
    fn covers_every_descriptor() {
        let phys = PhysicalAddress::new(0x4000_0000);
        let size = 0x20_0000;
        let r = vmemmap_range(BASE, phys, size).unwrap();
        let first = BASE.as_u64() + phys.pfn() * DESCRIPTOR_SIZE;
        let last_end = BASE.as_u64() + (phys.pfn() + 512) * DESCRIPTOR_SIZE;
        assert!(r.start.as_u64() <= first);
        assert!(r.end.as_u64() >= last_end);
        assert!(r.start.is_aligned::<Size4K>() && r.end.is_aligned::<Size4K>());
        assert!(r.end.as_u64() - last_end < PAGE_SIZE);
    }

    #[test]
    fn partial_pages_round_outward() {
        let r = vmemmap_range(BASE, PhysicalAddress::new(0x1800), 0x1000).unwrap();
        // pfns 1 and 2
        assert_eq!(r.start, BASE);
        assert_eq!(r.end, BASE + PAGE_SIZE);
    }

    #[test]
    fn degenerate_inputs() {
        assert!(vmemmap_range(BASE, PhysicalAddress::new(0), 0).is_none());
        assert!(vmemmap_range(BASE, PhysicalAddress::new(u64::MAX - 0xFFF), 0x2000).is_none());
        assert!(vmemmap_range(VirtualAddress::new(u64::MAX - 0xFFF), PhysicalAddress::new(0x1000_0000), 0x1000).is_none());
    }

    #[test]
    fn backing_pages() {
        assert_eq!(vmemmap_pages(0), 0);
        assert_eq!(vmemmap_pages(1), 1);
        let per_page = (PAGE_SIZE / DESCRIPTOR_SIZE) as usize;
        assert_eq!(vmemmap_pages(per_page), 1);
        assert_eq!(vmemmap_pages(per_page + 1), 2);
    }
}
