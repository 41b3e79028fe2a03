//! # Linear-map `PhysMapper`
//!
//! At EL2 all hypervisor memory is reachable through one linear mapping, so
//! turning a physical address into a pointer is a single addition of the
//! [`LinearMap`] offset.

use crate::PhysMapper;
use crate::addresses::{LinearMap, PhysVirtConversion, PhysicalAddress};

impl PhysMapper for LinearMap {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = self.phys_to_virt(pa).as_u64() as usize as *mut T;
        // Safety: the caller guarantees `pa` is covered by this linear map.
        unsafe { &mut *va }
    }
}
