//! Simulated physical memory and a table builder for tests.
//!
//! Nothing here is used on the hypervisor itself: the checker must never share
//! code with the real mapping installer, and this builder is only a way to
//! produce tables for the walker and checker to look at.

use crate::addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use crate::{Descriptor, EntryKind, FrameAlloc, Level, PageTable, PhysMapper, Prot};
use alloc::vec::Vec;
use core::cell::UnsafeCell;

const FRAME_BYTES: usize = 4096;

/// A 4 KiB-aligned raw frame.
#[repr(C, align(4096))]
struct Frame(UnsafeCell<[u8; FRAME_BYTES]>);

/// A tiny in-memory "RAM" starting at `base`.
///
/// Physical address `base + n * 4096 + off` lives at byte `off` of frame `n`.
/// All frames start zeroed.
pub struct TestPhys {
    base: PhysicalAddress,
    frames: Vec<Frame>,
}

impl TestPhys {
    /// # Panics
    /// If `base` is not page aligned.
    #[must_use]
    pub fn new(base: PhysicalAddress, nr_frames: usize) -> Self {
        assert_eq!(base.as_u64() % PAGE_SIZE, 0, "unaligned RAM base");
        let frames = (0..nr_frames)
            .map(|_| Frame(UnsafeCell::new([0; FRAME_BYTES])))
            .collect();
        Self { base, frames }
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[must_use]
    pub fn end(&self) -> PhysicalAddress {
        self.base + self.frames.len() as u64 * PAGE_SIZE
    }

    #[must_use]
    pub fn nr_frames(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn contains(&self, pa: PhysicalAddress) -> bool {
        pa >= self.base && pa < self.end()
    }

    fn byte_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        assert!(self.contains(pa), "{pa} is outside simulated RAM");
        let rel = pa.as_u64() - self.base.as_u64();
        let frame = &self.frames[(rel / PAGE_SIZE) as usize];
        frame.0.get().cast::<u8>().wrapping_add((rel % PAGE_SIZE) as usize)
    }

    /// Set every byte of the page at `pa` to `byte`.
    pub fn fill_page(&self, pa: PhysicalAddress, byte: u8) {
        let ptr = self.byte_ptr(pa.align_down::<crate::addresses::Size4K>());
        unsafe { ptr.write_bytes(byte, FRAME_BYTES) };
    }

    /// Whether the page at `pa` reads as all zeroes.
    #[must_use]
    pub fn page_is_zero(&self, pa: PhysicalAddress) -> bool {
        let ptr = self.byte_ptr(pa.align_down::<crate::addresses::Size4K>());
        let bytes = unsafe { core::slice::from_raw_parts(ptr, FRAME_BYTES) };
        bytes.iter().all(|b| *b == 0)
    }
}

impl PhysMapper for TestPhys {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = self.byte_ptr(pa);
        debug_assert!(ptr.cast::<T>().is_aligned());
        // Safety: the caller promises `T` matches the bytes at `pa`.
        unsafe { &mut *ptr.cast::<T>() }
    }
}

/// A trivial **bump** allocator: hands out the next 4 KiB frame, never reuses.
pub struct BumpFrames {
    next: u64,
    end: u64,
}

impl BumpFrames {
    #[must_use]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        Self {
            next: start.as_u64(),
            end: end.as_u64(),
        }
    }

    /// All of `phys`.
    #[must_use]
    pub fn over(phys: &TestPhys) -> Self {
        Self::new(phys.base(), phys.end())
    }
}

impl FrameAlloc for BumpFrames {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
        if self.next + PAGE_SIZE > self.end {
            return None;
        }
        let pa = self.next;
        self.next += PAGE_SIZE;
        Some(PhysicalAddress::new(pa))
    }
}

/// Builds translation tables in [`TestPhys`] by hand.
///
/// Intermediate tables are created on demand from `alloc` and zeroed.
/// Operations return `None` when the allocator runs dry or when a path is
/// blocked by a non-table entry.
pub struct TableBuilder<'p, A> {
    phys: &'p TestPhys,
    alloc: A,
    root: PhysicalAddress,
}

impl<'p, A: FrameAlloc> TableBuilder<'p, A> {
    pub fn new(phys: &'p TestPhys, mut alloc: A) -> Option<Self> {
        let root = alloc.alloc_4k()?;
        let this = Self { phys, alloc, root };
        *this.table_mut(root) = PageTable::zeroed();
        Some(this)
    }

    #[must_use]
    pub const fn root(&self) -> PhysicalAddress {
        self.root
    }

    pub fn into_alloc(self) -> A {
        self.alloc
    }

    fn table_mut(&self, pa: PhysicalAddress) -> &'p mut PageTable {
        unsafe { self.phys.phys_to_mut::<PageTable>(pa) }
    }

    fn alloc_table(&mut self) -> Option<PhysicalAddress> {
        let pa = self.alloc.alloc_4k()?;
        *self.table_mut(pa) = PageTable::zeroed();
        Some(pa)
    }

    /// The table at `level` on the path to `va`, created if `create`.
    fn table_for(&mut self, va: VirtualAddress, level: Level, create: bool) -> Option<PhysicalAddress> {
        let mut pa = self.root;
        for l in Level::ALL {
            if l == level {
                return Some(pa);
            }
            let idx = l.index_of(va);
            let d = self.table_mut(pa).get(idx);
            pa = match EntryKind::classify(d.into_bits(), l) {
                EntryKind::Table => d.output_address(),
                EntryKind::Invalid if create => {
                    let t = self.alloc_table()?;
                    self.table_mut(pa).set(idx, Descriptor::new_table(t));
                    t
                }
                _ => return None,
            };
        }
        None
    }

    /// Store `d` at `level` for `va`, creating the tables above it.
    pub fn set_entry(&mut self, va: VirtualAddress, level: Level, d: Descriptor) -> Option<()> {
        let t = self.table_for(va, level, true)?;
        self.table_mut(t).set(level.index_of(va), d);
        Some(())
    }

    pub fn map_page(&mut self, va: VirtualAddress, pa: PhysicalAddress, prot: Prot) -> Option<()> {
        self.set_entry(va, Level::L3, Descriptor::new_page(pa, prot))
    }

    /// Map `nr_pages` consecutive pages.
    pub fn map_range(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        nr_pages: u64,
        prot: Prot,
    ) -> Option<()> {
        for i in 0..nr_pages {
            self.map_page(va + i * PAGE_SIZE, pa + i * PAGE_SIZE, prot)?;
        }
        Some(())
    }

    /// Invalidate the level-3 entry for `va`; `false` if there was no path.
    pub fn unmap_page(&mut self, va: VirtualAddress) -> bool {
        match self.table_for(va, Level::L3, false) {
            Some(t) => {
                self.table_mut(t).set(Level::L3.index_of(va), Descriptor::new());
                true
            }
            None => false,
        }
    }
}
