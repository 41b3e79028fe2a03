//! Software translation table walk.
//!
//! The walker only ever *reads* tables, through a [`PhysMapper`]. It ignores
//! every attribute bit when resolving an address; permissions are decoded
//! separately via [`Descriptor::prot`].

use crate::addresses::{PhysicalAddress, Size4K, VirtualAddress};
use crate::{Descriptor, EntryKind, Level, PageTable, PhysMapper};
use log::debug;

/// Outcome of translating one virtual address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Translation {
    /// The walk stopped at `level` on an entry of kind `kind`.
    Fault { level: Level, kind: EntryKind },
    /// The address resolves to `pa` through a leaf at `level`.
    Mapped { pa: PhysicalAddress, level: Level },
}

impl Translation {
    #[inline]
    #[must_use]
    pub const fn output(self) -> Option<PhysicalAddress> {
        match self {
            Self::Mapped { pa, .. } => Some(pa),
            Self::Fault { .. } => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_fault(self) -> bool {
        matches!(self, Self::Fault { .. })
    }
}

/// A valid, non-table entry found while enumerating a table tree.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LeafEntry {
    /// First virtual address the entry covers.
    pub va: VirtualAddress,
    pub level: Level,
    pub kind: EntryKind,
    pub descriptor: Descriptor,
}

impl LeafEntry {
    /// Bytes of input address the entry covers.
    #[inline]
    #[must_use]
    pub const fn span(&self) -> u64 {
        self.level.entry_span()
    }

    /// Output address of the first byte covered.
    #[inline]
    #[must_use]
    pub const fn output_address(&self) -> PhysicalAddress {
        match self.kind {
            EntryKind::Block => self.descriptor.block_output_address(self.level),
            _ => self.descriptor.output_address(),
        }
    }
}

/// Reads the translation tables rooted at one level-0 table.
///
/// # Invariants
/// - Every table reachable from `root` is readable through `mapper` for `'m`.
/// - Nobody modifies the tables while the walker is in use.
pub struct PageTableWalker<'m, M: PhysMapper> {
    mapper: &'m M,
    root: PhysicalAddress,
}

impl<'m, M: PhysMapper> PageTableWalker<'m, M> {
    /// # Safety
    /// `root` must be a level-0 table and every table reachable from it must
    /// stay mapped through `mapper` and unmodified for `'m`.
    #[must_use]
    pub const unsafe fn new(mapper: &'m M, root: PhysicalAddress) -> Self {
        Self { mapper, root }
    }

    #[must_use]
    pub const fn root(&self) -> PhysicalAddress {
        self.root
    }

    #[inline]
    fn table(&self, pa: PhysicalAddress) -> &'m PageTable {
        // Safety: upheld by the constructor contract.
        unsafe { self.mapper.phys_to_ref::<PageTable>(pa) }
    }

    /// Translate `va` the way the MMU would, ignoring permissions.
    ///
    /// Addresses with bits `[63:48]` set are outside the single 48-bit range
    /// and fault at level 0.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Translation {
        if !va.is_translatable() {
            return Translation::Fault {
                level: Level::L0,
                kind: EntryKind::Invalid,
            };
        }

        let mut table_pa = self.root;
        let mut level = Level::L0;
        loop {
            let d = self.table(table_pa).get(level.index_of(va));
            match EntryKind::classify(d.into_bits(), level) {
                EntryKind::Table => {
                    let Some(next) = level.next() else {
                        return Translation::Fault {
                            level,
                            kind: EntryKind::Table,
                        };
                    };
                    table_pa = d.output_address();
                    level = next;
                }
                EntryKind::Block => {
                    let low = va.as_u64() & (level.entry_span() - 1);
                    return Translation::Mapped {
                        pa: d.block_output_address(level) + low,
                        level,
                    };
                }
                EntryKind::Page => {
                    return Translation::Mapped {
                        pa: d.output_address() + va.offset::<Size4K>(),
                        level,
                    };
                }
                kind => return Translation::Fault { level, kind },
            }
        }
    }

    /// Visit every valid non-table entry in ascending VA order.
    ///
    /// Stops at the first error returned by `f`.
    ///
    /// # Errors
    /// Whatever `f` returns.
    pub fn try_for_each_leaf<E, F>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&LeafEntry) -> Result<(), E>,
    {
        self.visit(self.root, Level::L0, 0, &mut f)
    }

    fn visit<E, F>(&self, table_pa: PhysicalAddress, level: Level, base: u64, f: &mut F) -> Result<(), E>
    where
        F: FnMut(&LeafEntry) -> Result<(), E>,
    {
        for (index, descriptor) in self.table(table_pa).iter() {
            let va = base | (index.as_u64() << level.shift());
            match EntryKind::classify(descriptor.into_bits(), level) {
                EntryKind::Invalid => {}
                EntryKind::Table => {
                    if let Some(next) = level.next() {
                        self.visit(descriptor.output_address(), next, va, f)?;
                    }
                }
                kind => f(&LeafEntry {
                    va: VirtualAddress::new(va),
                    level,
                    kind,
                    descriptor,
                })?,
            }
        }
        Ok(())
    }

    /// Log every valid entry of every reachable table at debug level.
    pub fn dump(&self) {
        debug!("page table @ {}", self.root);
        self.dump_table(self.root, Level::L0, 0);
    }

    fn dump_table(&self, table_pa: PhysicalAddress, level: Level, base: u64) {
        let indent = 2 * usize::from(level.as_u8());
        for (index, descriptor) in self.table(table_pa).iter() {
            let kind = EntryKind::classify(descriptor.into_bits(), level);
            if kind == EntryKind::Invalid {
                continue;
            }
            let va = base | (index.as_u64() << level.shift());
            debug!(
                "{:indent$}{level}[{:3}] va={:#014x} raw={:#018x} {kind} -> {}",
                "",
                index.as_usize(),
                va,
                descriptor.into_bits(),
                descriptor.output_address(),
            );
            if kind == EntryKind::Table
                && let Some(next) = level.next()
            {
                self.dump_table(descriptor.output_address(), next, va);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Prot;
    use crate::testing::{BumpFrames, TableBuilder, TestPhys};

    const RAM: u64 = 0x4000_0000;

    fn ram() -> TestPhys {
        TestPhys::new(PhysicalAddress::new(RAM), 16)
    }

    #[test]
    fn single_page_mapping() {
        let phys = ram();
        let mut b = TableBuilder::new(&phys, BumpFrames::over(&phys)).unwrap();
        let va = VirtualAddress::new(0x0000_8000_0000_0000);
        b.map_page(va, PhysicalAddress::new(0x8000_0000), Prot::PAGE_HYP).unwrap();

        let walker = unsafe { PageTableWalker::new(&phys, b.root()) };
        assert_eq!(
            walker.translate(va),
            Translation::Mapped {
                pa: PhysicalAddress::new(0x8000_0000),
                level: Level::L3
            }
        );
        assert_eq!(
            walker.translate(va + 0x123).output(),
            Some(PhysicalAddress::new(0x8000_0123))
        );
        assert!(walker.translate(va + 0x1000).is_fault());
        assert!(walker.translate(VirtualAddress::new(0)).is_fault());
    }

    #[test]
    fn empty_root_faults_at_level_zero() {
        let phys = ram();
        let b = TableBuilder::new(&phys, BumpFrames::over(&phys)).unwrap();
        let walker = unsafe { PageTableWalker::new(&phys, b.root()) };
        assert_eq!(
            walker.translate(VirtualAddress::new(0x1234_5000)),
            Translation::Fault {
                level: Level::L0,
                kind: EntryKind::Invalid
            }
        );
    }

    #[test]
    fn blocks_resolve_with_offset() {
        let phys = ram();
        let mut b = TableBuilder::new(&phys, BumpFrames::over(&phys)).unwrap();
        let va2m = VirtualAddress::new(0x0000_0040_0020_0000);
        b.set_entry(
            va2m,
            Level::L2,
            Descriptor::new_block(PhysicalAddress::new(0x8020_0000), Prot::PAGE_HYP),
        )
        .unwrap();
        let va1g = VirtualAddress::new(0x0000_0080_4000_0000);
        b.set_entry(
            va1g,
            Level::L1,
            Descriptor::new_block(PhysicalAddress::new(0xC000_0000), Prot::PAGE_HYP),
        )
        .unwrap();

        let walker = unsafe { PageTableWalker::new(&phys, b.root()) };
        assert_eq!(
            walker.translate(va2m + 0x1_2345),
            Translation::Mapped {
                pa: PhysicalAddress::new(0x8021_2345),
                level: Level::L2
            }
        );
        assert_eq!(
            walker.translate(va1g + 0x1234_5678).output(),
            Some(PhysicalAddress::new(0xD234_5678))
        );
    }

    #[test]
    fn reserved_and_level_zero_blocks_fault() {
        let phys = ram();
        let mut b = TableBuilder::new(&phys, BumpFrames::over(&phys)).unwrap();
        let reserved = VirtualAddress::new(0x0000_0000_0040_3000);
        b.set_entry(reserved, Level::L3, Descriptor::from_bits(0x9000_0001))
            .unwrap();
        let l0_block = VirtualAddress::new(0x0000_0100_0000_0000);
        b.set_entry(l0_block, Level::L0, Descriptor::from_bits(0x0000_0001))
            .unwrap();

        let walker = unsafe { PageTableWalker::new(&phys, b.root()) };
        assert_eq!(
            walker.translate(reserved),
            Translation::Fault {
                level: Level::L3,
                kind: EntryKind::Reserved
            }
        );
        assert_eq!(
            walker.translate(l0_block),
            Translation::Fault {
                level: Level::L0,
                kind: EntryKind::BlockNotPermitted
            }
        );
    }

    #[test]
    fn addresses_beyond_48_bits_fault() {
        let phys = ram();
        let mut b = TableBuilder::new(&phys, BumpFrames::over(&phys)).unwrap();
        b.map_page(VirtualAddress::new(0), PhysicalAddress::new(0x9000), Prot::PAGE_HYP)
            .unwrap();
        let walker = unsafe { PageTableWalker::new(&phys, b.root()) };
        assert!(walker.translate(VirtualAddress::new(1 << 48)).is_fault());
        assert!(!walker.translate(VirtualAddress::new(0)).is_fault());
    }

    #[test]
    fn leaves_are_visited_in_address_order() {
        let phys = ram();
        let mut b = TableBuilder::new(&phys, BumpFrames::over(&phys)).unwrap();
        let vas = [0x0000_8000_0000_2000_u64, 0x1000, 0x0000_8000_0000_1000, 0x4000_0000];
        for (i, va) in vas.iter().enumerate() {
            b.map_page(
                VirtualAddress::new(*va),
                PhysicalAddress::new(0x10_0000 + (i as u64) * 0x1000),
                Prot::PAGE_HYP,
            )
            .unwrap();
        }

        let walker = unsafe { PageTableWalker::new(&phys, b.root()) };
        let mut seen = Vec::new();
        walker
            .try_for_each_leaf::<(), _>(|leaf| {
                assert_eq!(leaf.kind, EntryKind::Page);
                seen.push((leaf.va.as_u64(), leaf.output_address().as_u64()));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                (0x1000, 0x10_1000),
                (0x4000_0000, 0x10_3000),
                (0x0000_8000_0000_1000, 0x10_2000),
                (0x0000_8000_0000_2000, 0x10_0000),
            ]
        );
    }

    #[test]
    fn visitor_error_stops_the_walk() {
        let phys = ram();
        let mut b = TableBuilder::new(&phys, BumpFrames::over(&phys)).unwrap();
        for i in 0..4u64 {
            b.map_page(
                VirtualAddress::new(i * 0x1000),
                PhysicalAddress::new(0x20_0000 + i * 0x1000),
                Prot::PAGE_HYP,
            )
            .unwrap();
        }
        let walker = unsafe { PageTableWalker::new(&phys, b.root()) };
        let mut visited = 0;
        let res = walker.try_for_each_leaf(|leaf| {
            visited += 1;
            if leaf.va.as_u64() == 0x1000 {
                Err(leaf.va)
            } else {
                Ok(())
            }
        });
        assert_eq!(res, Err(VirtualAddress::new(0x1000)));
        assert_eq!(visited, 2);
    }
}
