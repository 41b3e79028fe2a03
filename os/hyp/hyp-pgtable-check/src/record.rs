use crate::kind::MappingKind;
use core::fmt;
use hyp_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use hyp_pgtable::Prot;

/// One region the hypervisor intends to map: `nr_pages` pages from `virt`
/// onto `phys`, with `prot`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MappingRecord {
    pub kind: MappingKind,
    /// The CPU for [`MappingKind::PerCpu`] records, 0 otherwise.
    pub cpu: usize,
    pub virt: VirtualAddress,
    pub phys: PhysicalAddress,
    pub nr_pages: u64,
    pub prot: Prot,
    /// Free-form provenance, e.g. the linker symbol the range came from.
    pub doc: &'static str,
}

impl MappingRecord {
    /// First address past the region.
    #[must_use]
    pub fn end(&self) -> VirtualAddress {
        self.virt + self.nr_pages * PAGE_SIZE
    }

    #[must_use]
    pub fn contains(&self, va: VirtualAddress) -> bool {
        va >= self.virt && va < self.end()
    }

    /// The physical address the record intends for `va`.
    #[must_use]
    pub fn phys_for(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.contains(va)
            .then(|| self.phys + (va.as_u64() - self.virt.as_u64()))
    }

    /// Whether the record maps `va` onto `pa`.
    #[must_use]
    pub fn maps(&self, va: VirtualAddress, pa: PhysicalAddress) -> bool {
        self.phys_for(va) == Some(pa)
    }

    /// `(va, pa)` for every page, in ascending order.
    pub fn pages(&self) -> impl Iterator<Item = (VirtualAddress, PhysicalAddress)> + '_ {
        (0..self.nr_pages).map(|i| (self.virt + i * PAGE_SIZE, self.phys + i * PAGE_SIZE))
    }
}

impl fmt::Display for MappingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<17}", self.kind.as_str())?;
        if self.kind.is_per_cpu() {
            write!(f, " cpu{:<2}", self.cpu)?;
        } else {
            f.write_str("      ")?;
        }
        write!(
            f,
            " {}..{} -> {} {:>6} pages {} {}",
            self.virt,
            self.end(),
            self.phys,
            self.nr_pages,
            self.prot,
            self.doc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rodata() -> MappingRecord {
        MappingRecord {
            kind: MappingKind::Rodata,
            cpu: 0,
            virt: VirtualAddress::new(0x10_0000),
            phys: PhysicalAddress::new(0x8000_0000),
            nr_pages: 2,
            prot: Prot::PAGE_HYP_RO,
            doc: "__start_rodata",
        }
    }

    #[test]
    fn resolves_only_inside_the_region() {
        let r = rodata();
        assert_eq!(r.end(), VirtualAddress::new(0x10_2000));
        assert_eq!(
            r.phys_for(VirtualAddress::new(0x10_1234)),
            Some(PhysicalAddress::new(0x8000_1234))
        );
        assert_eq!(r.phys_for(VirtualAddress::new(0x10_2000)), None);
        assert!(r.maps(VirtualAddress::new(0x10_1000), PhysicalAddress::new(0x8000_1000)));
        assert!(!r.maps(VirtualAddress::new(0x10_1000), PhysicalAddress::new(0x8000_0000)));
    }

    #[test]
    fn pages_walk_the_region() {
        let pages: Vec<_> = rodata().pages().map(|(v, p)| (v.as_u64(), p.as_u64())).collect();
        assert_eq!(pages, [(0x10_0000, 0x8000_0000), (0x10_1000, 0x8000_1000)]);
    }

    #[test]
    fn display_names_everything() {
        let line = rodata().to_string();
        assert!(line.starts_with("rodata"));
        assert!(line.contains("-R--"));
        assert!(line.contains("__start_rodata"));
    }
}
