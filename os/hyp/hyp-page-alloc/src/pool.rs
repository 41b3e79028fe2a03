use crate::descriptor::{PageDescriptor, PoolId};
use crate::error::{AllocError, InvariantViolation, PoolInitError, RefError};
use crate::free_area::FreeArea;
use crate::{MAX_ORDER, NR_ORDERS, order_pages};
use bitflags::bitflags;
use core::ops::Range;
use hyp_memory_addresses::{PAGE_SHIFT, PAGE_SIZE, PhysicalAddress, Size4K};
use hyp_pgtable::{FrameAlloc, PhysMapper};
use hyp_sync::SpinLock;
use log::{debug, error, info, trace};

const PAGE_BYTES: usize = PAGE_SIZE as usize;

bitflags! {
    /// Allocation modifiers.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct AllocFlags: u32 {
        /// Clear every page of the group before returning it.
        const ZERO = 1 << 0;
    }
}

/// Everything the pool lock protects.
pub(crate) struct PoolState<'a> {
    pub(crate) vmemmap: &'a mut [PageDescriptor],
    pub(crate) free_area: [FreeArea; NR_ORDERS],
}

impl PoolState<'_> {
    #[inline]
    pub(crate) const fn nr_pages(&self) -> u32 {
        // Bounded by `u32::MAX` at init.
        self.vmemmap.len() as u32
    }

    /// Index of the buddy of the group at `idx`, if it starts inside the pool.
    #[inline]
    pub(crate) const fn find_buddy(&self, idx: u32, order: u8) -> Option<u32> {
        let buddy = idx ^ order_pages(order);
        if buddy < self.nr_pages() {
            Some(buddy)
        } else {
            None
        }
    }

    /// Put the group at `idx` of `order` back on the free lists, merging it
    /// with free buddies for as long as possible.
    fn attach(&mut self, mut idx: u32, mut order: u8) {
        self.vmemmap[idx as usize].order = None;
        while order < MAX_ORDER {
            let Some(buddy) = self.find_buddy(idx, order) else {
                break;
            };
            let b = &self.vmemmap[buddy as usize];
            if !b.is_free_listed() || b.order != Some(order) {
                break;
            }
            self.free_area[order as usize].remove(self.vmemmap, buddy);
            self.vmemmap[buddy as usize].order = None;
            idx = idx.min(buddy);
            order += 1;
        }
        self.vmemmap[idx as usize].order = Some(order);
        self.free_area[order as usize].push_back(self.vmemmap, idx);
    }

    /// Take the free group at `idx` of order `current` off its list and
    /// split it down to `order`. The low half is kept; each high half is
    /// freed.
    fn extract(&mut self, idx: u32, mut current: u8, order: u8) {
        debug_assert_eq!(
            self.vmemmap[idx as usize].order,
            Some(current),
            "free list head {idx} disagrees with its list's order"
        );
        self.free_area[current as usize].remove(self.vmemmap, idx);
        while current > order {
            current -= 1;
            self.vmemmap[idx as usize].order = Some(current);
            let buddy = idx ^ order_pages(current);
            debug_assert!(buddy < self.nr_pages());
            self.vmemmap[buddy as usize].order = Some(current);
            self.free_area[current as usize].push_back(self.vmemmap, buddy);
        }
        self.vmemmap[idx as usize].refcount = 1;
    }

    /// Head index and order of the group covering page `idx`.
    ///
    /// The head of a group of order `k` is `idx` rounded down to `2^k`, and
    /// every page between the head and `idx` is a body page without order.
    fn group_head(&self, idx: u32) -> Option<(u32, u8)> {
        (0..=MAX_ORDER).find_map(|o| {
            let candidate = idx & !(order_pages(o) - 1);
            let order = self.vmemmap[candidate as usize].order?;
            (u64::from(candidate) + u64::from(order_pages(order)) > u64::from(idx))
                .then_some((candidate, order))
        })
    }
}

/// A buddy page-group pool over one contiguous physical range.
///
/// All operations after [`init`](Self::init) take the pool's spinlock, so a
/// pool may be shared between CPUs. No operation ever takes a second pool's
/// lock.
pub struct HypPool<'a, M: PhysMapper> {
    id: PoolId,
    mapper: &'a M,
    range_start: PhysicalAddress,
    nr_pages: u32,
    reserved_pages: u32,
    state: SpinLock<PoolState<'a>>,
}

impl<'a, M: PhysMapper> HypPool<'a, M> {
    /// Build a pool over `nr_pages` pages starting at `phys_start`.
    ///
    /// The first `reserved_pages` pages are treated as permanently in use;
    /// all others are released into the free lists and coalesced. Only the
    /// first `nr_pages` entries of `vmemmap` are used; they are overwritten.
    ///
    /// # Safety
    /// Every page of the range must be mapped through `mapper` and owned by
    /// this pool alone for `'a`; allocations with [`AllocFlags::ZERO`] write
    /// to them.
    ///
    /// # Errors
    /// A [`PoolInitError`] if the range is unaligned or does not fit, the
    /// descriptor table is too short, or the reserved prefix exceeds the range.
    pub unsafe fn init(
        id: PoolId,
        mapper: &'a M,
        vmemmap: &'a mut [PageDescriptor],
        phys_start: PhysicalAddress,
        nr_pages: usize,
        reserved_pages: usize,
    ) -> Result<Self, PoolInitError> {
        if !phys_start.is_aligned::<Size4K>() {
            return Err(PoolInitError::Misaligned(phys_start));
        }
        let count = u32::try_from(nr_pages).map_err(|_| PoolInitError::TooManyPages(nr_pages))?;
        (nr_pages as u64)
            .checked_mul(PAGE_SIZE)
            .and_then(|size| phys_start.checked_add(size))
            .ok_or(PoolInitError::RangeOverflow(nr_pages))?;
        if vmemmap.len() < nr_pages {
            return Err(PoolInitError::VmemmapTooSmall {
                needed: nr_pages,
                provided: vmemmap.len(),
            });
        }
        if reserved_pages > nr_pages {
            return Err(PoolInitError::ReservedExceedsRange {
                reserved: reserved_pages,
                pages: nr_pages,
            });
        }
        let reserved = count.min(reserved_pages as u32);

        let (vmemmap, _) = vmemmap.split_at_mut(nr_pages);
        for (i, d) in vmemmap.iter_mut().enumerate() {
            *d = PageDescriptor {
                pool: Some(id),
                order: (i < reserved_pages).then_some(0),
                ..PageDescriptor::EMPTY
            };
        }

        let mut state = PoolState {
            vmemmap,
            free_area: [FreeArea::EMPTY; NR_ORDERS],
        };
        for idx in reserved..count {
            state.attach(idx, 0);
        }

        let pool = Self {
            id,
            mapper,
            range_start: phys_start,
            nr_pages: count,
            reserved_pages: reserved,
            state: SpinLock::new(state),
        };
        pool.check_invariant()?;
        info!(
            "{id}: {nr_pages} pages at {phys_start}, {reserved_pages} reserved, {} free",
            pool.free_pages()
        );
        Ok(pool)
    }

    #[must_use]
    pub const fn id(&self) -> PoolId {
        self.id
    }

    /// `[range_start, range_end)`.
    #[must_use]
    pub fn range(&self) -> Range<PhysicalAddress> {
        self.range_start..self.addr_of(self.nr_pages)
    }

    #[must_use]
    pub fn contains(&self, addr: PhysicalAddress) -> bool {
        self.range().contains(&addr)
    }

    #[must_use]
    pub const fn nr_pages(&self) -> usize {
        self.nr_pages as usize
    }

    #[must_use]
    pub const fn reserved_pages(&self) -> usize {
        self.reserved_pages as usize
    }

    #[inline]
    fn addr_of(&self, idx: u32) -> PhysicalAddress {
        self.range_start + (u64::from(idx) << PAGE_SHIFT)
    }

    /// Descriptor index of a managed (non-reserved) page.
    fn index_of(&self, addr: PhysicalAddress) -> Result<u32, RefError> {
        let idx = addr
            .as_u64()
            .checked_sub(self.range_start.as_u64())
            .map(|off| off >> PAGE_SHIFT)
            .filter(|idx| *idx < u64::from(self.nr_pages))
            .ok_or(RefError::OutOfRange(addr))?;
        let idx = u32::try_from(idx).map_err(|_| RefError::OutOfRange(addr))?;
        if idx < self.reserved_pages {
            return Err(RefError::Reserved(addr));
        }
        Ok(idx)
    }

    fn resolve(&self, state: &PoolState<'_>, addr: PhysicalAddress) -> Result<(u32, u8), RefError> {
        let idx = self.index_of(addr)?;
        if state.vmemmap[idx as usize].pool != Some(self.id) {
            return Err(RefError::ForeignDescriptor(addr));
        }
        state.group_head(idx).ok_or(RefError::NoGroup(addr))
    }

    /// Allocate a group of `2^order` pages.
    ///
    /// Takes the head of the lowest non-empty free list at or above `order`
    /// and splits it down. The group starts with refcount 1.
    ///
    /// # Errors
    /// [`AllocError::OrderTooLarge`] for `order > MAX_ORDER`,
    /// [`AllocError::NoMemory`] if no sufficiently large group is free.
    pub fn alloc_pages(&self, order: u8, flags: AllocFlags) -> Result<PhysicalAddress, AllocError> {
        if order > MAX_ORDER {
            return Err(AllocError::OrderTooLarge(order));
        }

        let mut state = self.state.lock();
        let found = (order..=MAX_ORDER)
            .find(|&o| !state.free_area[o as usize].is_empty())
            .ok_or(AllocError::NoMemory)?;
        let idx = state.free_area[found as usize]
            .head()
            .ok_or(AllocError::NoMemory)?;
        state.extract(idx, found, order);

        let pa = self.addr_of(idx);
        if flags.contains(AllocFlags::ZERO) {
            for page in 0..u64::from(order_pages(order)) {
                // Safety: the init contract maps every pool page through `mapper`.
                let bytes = unsafe { self.mapper.phys_to_mut::<[u8; PAGE_BYTES]>(pa + page * PAGE_SIZE) };
                bytes.fill(0);
            }
        }
        trace!("{}: allocated order {order} at {pa}", self.id);
        Ok(pa)
    }

    /// Take another reference on the group containing `addr`.
    ///
    /// The count is not checked for overflow.
    ///
    /// # Errors
    /// A [`RefError`] if `addr` is not an allocated page of this pool.
    pub fn get_page(&self, addr: PhysicalAddress) -> Result<(), RefError> {
        let mut state = self.state.lock();
        let (head, _) = self.resolve(&state, addr)?;
        let d = &mut state.vmemmap[head as usize];
        if d.is_free_listed() {
            return Err(RefError::NotAllocated(addr));
        }
        debug_assert!(d.refcount < u32::MAX, "refcount overflow");
        d.refcount = d.refcount.wrapping_add(1);
        Ok(())
    }

    /// Drop a reference on the group containing `addr`, freeing the group
    /// when the last one goes.
    ///
    /// # Errors
    /// A [`RefError`] if `addr` is not a managed page of this pool.
    ///
    /// # Panics
    /// If the group's refcount is already zero (double release).
    pub fn put_page(&self, addr: PhysicalAddress) -> Result<(), RefError> {
        let mut state = self.state.lock();
        let (head, order) = self.resolve(&state, addr)?;
        let d = &mut state.vmemmap[head as usize];
        if d.refcount == 0 {
            error!("{}: release of unreferenced page {addr}", self.id);
            panic!("{}: double release of {addr}", self.id);
        }
        d.refcount -= 1;
        if d.refcount == 0 {
            state.attach(head, order);
            trace!("{}: freed order {order} at {}", self.id, self.addr_of(head));
        }
        Ok(())
    }

    /// Refcount of the group containing `addr`.
    ///
    /// # Errors
    /// A [`RefError`] if `addr` is not a managed page of this pool.
    pub fn refcount(&self, addr: PhysicalAddress) -> Result<u32, RefError> {
        let state = self.state.lock();
        let (head, _) = self.resolve(&state, addr)?;
        Ok(state.vmemmap[head as usize].refcount)
    }

    /// Free pages across all orders.
    #[must_use]
    pub fn free_pages(&self) -> usize {
        let state = self.state.lock();
        (0..=MAX_ORDER)
            .map(|o| state.free_area[o as usize].len() * order_pages(o) as usize)
            .sum()
    }

    /// Number of free groups of exactly `order`.
    #[must_use]
    pub fn free_group_count(&self, order: u8) -> usize {
        if order > MAX_ORDER {
            return 0;
        }
        self.state.lock().free_area[order as usize].len()
    }

    /// Call `f(order, start)` for every free group, by ascending order and
    /// then list position, under the pool lock.
    pub fn for_each_free_group(&self, mut f: impl FnMut(u8, PhysicalAddress)) {
        let state = self.state.lock();
        for o in 0..=MAX_ORDER {
            for idx in state.free_area[o as usize].iter(&*state.vmemmap) {
                f(o, self.addr_of(idx));
            }
        }
    }

    /// Verify the complete allocator invariant under the lock.
    ///
    /// # Errors
    /// The first [`InvariantViolation`] found.
    pub fn check_invariant(&self) -> Result<(), InvariantViolation> {
        let state = self.state.lock();
        let result = state.check(self.id, self.range_start, self.reserved_pages);
        match &result {
            Ok(()) => debug!("{}: allocator invariant holds", self.id),
            Err(e) => error!("{}: allocator invariant violated: {e}", self.id),
        }
        result
    }
}

/// Single zeroed frames, e.g. for page tables.
impl<M: PhysMapper> FrameAlloc for &HypPool<'_, M> {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
        self.alloc_pages(0, AllocFlags::ZERO).ok()
    }
}
