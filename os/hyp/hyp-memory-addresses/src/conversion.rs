use crate::{PhysicalAddress, VirtualAddress};

/// Conversion between hypervisor virtual addresses and physical addresses.
///
/// The hypervisor keeps all of its memory in one linear mapping, so both
/// directions are pure arithmetic. Implementations must be total and
/// mutually inverse on the mapped range.
pub trait PhysVirtConversion {
    fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress;
    fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress;
}

/// A constant-offset linear map: `va = pa + offset` (modulo 2^64).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinearMap {
    /// `va - pa`, as a wrapping two's complement value.
    offset: u64,
}

impl LinearMap {
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    /// The map that places `pa` at `va`.
    #[must_use]
    pub const fn anchored(va: VirtualAddress, pa: PhysicalAddress) -> Self {
        Self::new(va.as_u64().wrapping_sub(pa.as_u64()))
    }

    #[must_use]
    pub const fn identity() -> Self {
        Self::new(0)
    }

    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }
}

impl PhysVirtConversion for LinearMap {
    #[inline]
    fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress {
        PhysicalAddress::new(va.as_u64().wrapping_sub(self.offset))
    }

    #[inline]
    fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(pa.as_u64().wrapping_add(self.offset))
    }
}
