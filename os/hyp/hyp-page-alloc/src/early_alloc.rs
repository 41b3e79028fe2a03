//! Bump allocator for the window before any pool exists.
//!
//! The hypervisor carves its page-table pages, vmemmap backing and per-CPU
//! buffers out of one physical region with this allocator, then hands the
//! whole region to [`HypPool::init`](crate::HypPool::init) with the consumed
//! prefix as `reserved_pages`. Nothing is ever given back.

use hyp_memory_addresses::{PAGE_SIZE, PhysicalAddress, Size4K};
use hyp_pgtable::{FrameAlloc, PhysMapper};
use log::trace;

const PAGE_BYTES: usize = PAGE_SIZE as usize;

pub struct EarlyAlloc<'m, M> {
    mapper: &'m M,
    base: PhysicalAddress,
    cur: PhysicalAddress,
    end: PhysicalAddress,
}

impl<'m, M: PhysMapper> EarlyAlloc<'m, M> {
    /// Allocator over `nr_pages` pages at `base`.
    ///
    /// Returns `None` if `base` is not page aligned or the range overflows.
    ///
    /// # Safety
    /// The range must be mapped through `mapper` and unused by anything else;
    /// every allocation zeroes the pages it returns.
    pub unsafe fn new(mapper: &'m M, base: PhysicalAddress, nr_pages: usize) -> Option<Self> {
        if !base.is_aligned::<Size4K>() {
            return None;
        }
        let end = (nr_pages as u64)
            .checked_mul(PAGE_SIZE)
            .and_then(|size| base.checked_add(size))?;
        Some(Self {
            mapper,
            base,
            cur: base,
            end,
        })
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        self.end
    }

    /// Pages handed out so far; the `reserved_pages` of the pool that
    /// takes the region over.
    #[must_use]
    pub const fn nr_pages(&self) -> usize {
        ((self.cur.as_u64() - self.base.as_u64()) / PAGE_SIZE) as usize
    }

    /// Pages still available.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        ((self.end.as_u64() - self.cur.as_u64()) / PAGE_SIZE) as usize
    }

    /// `n` zeroed, physically contiguous pages.
    ///
    /// `None` for `n == 0` or when fewer than `n` pages remain.
    pub fn alloc_contig(&mut self, n: usize) -> Option<PhysicalAddress> {
        if n == 0 || n > self.remaining() {
            return None;
        }
        let pa = self.cur;
        for i in 0..n as u64 {
            // Safety: the range is mapped and exclusively ours (see `new`).
            let page = unsafe { self.mapper.phys_to_mut::<[u8; PAGE_BYTES]>(pa + i * PAGE_SIZE) };
            page.fill(0);
        }
        self.cur = pa + n as u64 * PAGE_SIZE;
        trace!("early alloc: {n} page(s) at {pa}");
        Some(pa)
    }

    pub fn alloc_page(&mut self) -> Option<PhysicalAddress> {
        self.alloc_contig(1)
    }
}

impl<M: PhysMapper> FrameAlloc for EarlyAlloc<'_, M> {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
        self.alloc_page()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyp_pgtable::testing::TestPhys;

    #[test]
    fn bumps_and_runs_dry() {
        let phys = TestPhys::new(PhysicalAddress::new(0x8000), 4);
        let mut early = unsafe { EarlyAlloc::new(&phys, phys.base(), 4) }.unwrap();
        assert_eq!(early.alloc_contig(0), None);
        assert_eq!(early.alloc_page(), Some(PhysicalAddress::new(0x8000)));
        assert_eq!(early.alloc_contig(2), Some(PhysicalAddress::new(0x9000)));
        assert_eq!(early.nr_pages(), 3);
        assert_eq!(early.remaining(), 1);
        assert_eq!(early.alloc_contig(2), None);
        assert_eq!(early.alloc_4k(), Some(PhysicalAddress::new(0xB000)));
        assert_eq!(early.alloc_4k(), None);
        assert_eq!(early.end(), PhysicalAddress::new(0xC000));
    }

    #[test]
    fn pages_come_back_zeroed() {
        let phys = TestPhys::new(PhysicalAddress::new(0x8000), 2);
        phys.fill_page(PhysicalAddress::new(0x9000), 0xFF);
        let mut early = unsafe { EarlyAlloc::new(&phys, phys.base(), 2) }.unwrap();
        let pa = early.alloc_contig(2).unwrap();
        assert!(phys.page_is_zero(pa + PAGE_SIZE));
    }

    #[test]
    fn rejects_bad_ranges() {
        let phys = TestPhys::new(PhysicalAddress::new(0x8000), 1);
        assert!(unsafe { EarlyAlloc::new(&phys, PhysicalAddress::new(0x8010), 1) }.is_none());
        assert!(unsafe { EarlyAlloc::new(&phys, PhysicalAddress::new(u64::MAX & !0xFFF), 2) }.is_none());
    }
}
