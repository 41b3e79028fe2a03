use crate::descriptor::Descriptor;
use bitflags::bitflags;
use core::fmt;

bitflags! {
    /// Hypervisor mapping permissions.
    ///
    /// Only the four properties the mapping checker reasons about; the rest
    /// of the attribute space (shareability, cacheability variants, ...) is
    /// not modelled.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct Prot: u8 {
        const R = 1 << 0;
        const W = 1 << 1;
        const X = 1 << 2;
        const DEVICE = 1 << 3;
    }
}

impl Prot {
    /// Hypervisor data: read/write, never executable.
    pub const PAGE_HYP: Self = Self::R.union(Self::W);
    /// Hypervisor read-only data.
    pub const PAGE_HYP_RO: Self = Self::R;
    /// Hypervisor code: read/execute.
    pub const PAGE_HYP_EXEC: Self = Self::R.union(Self::X);
    /// Device MMIO: read/write, device memory type.
    pub const PAGE_HYP_DEVICE: Self = Self::PAGE_HYP.union(Self::DEVICE);

    /// Decode a leaf descriptor.
    ///
    /// Readability is implied by validity; writability by AP[2] clear;
    /// executability by XN clear; device by a device `AttrIndx`.
    #[must_use]
    pub fn from_leaf(d: Descriptor) -> Self {
        if !d.valid() {
            return Self::empty();
        }
        let mut prot = Self::R;
        if d.access_permissions() & AccessPermission::AP2 == 0 {
            prot |= Self::W;
        }
        if !d.execute_never() {
            prot |= Self::X;
        }
        if MemoryAttribute::from_index(d.attr_index()).is_device() {
            prot |= Self::DEVICE;
        }
        prot
    }
}

/// Printed as `DRWX` with `-` for each missing permission, e.g. `-R-X`.
impl fmt::Display for Prot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |p: Self, c: char| if self.contains(p) { c } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            flag(Self::DEVICE, 'D'),
            flag(Self::R, 'R'),
            flag(Self::W, 'W'),
            flag(Self::X, 'X')
        )
    }
}

/// EL2 stage-1 AP[2:1] encodings used by the hypervisor.
///
/// AP[1] is RES1 at EL2; AP[2] selects read-only.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccessPermission {
    ReadWrite = 0b01,
    ReadOnly = 0b11,
}

impl AccessPermission {
    /// AP[2] within the two-bit field.
    pub const AP2: u8 = 0b10;
}

/// MAIR_EL2 attribute indices, as laid out by the host kernel.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MemoryAttribute {
    Normal = 0,
    NormalTagged = 1,
    NormalNonCacheable = 2,
    NormalWriteThrough = 3,
    DeviceNgnrne = 4,
    DeviceNgnre = 5,
    DeviceGre = 6,
    Unassigned = 7,
}

impl MemoryAttribute {
    #[must_use]
    pub const fn from_index(index: u8) -> Self {
        match index & 0b111 {
            0 => Self::Normal,
            1 => Self::NormalTagged,
            2 => Self::NormalNonCacheable,
            3 => Self::NormalWriteThrough,
            4 => Self::DeviceNgnrne,
            5 => Self::DeviceNgnre,
            6 => Self::DeviceGre,
            _ => Self::Unassigned,
        }
    }

    #[must_use]
    pub const fn is_device(self) -> bool {
        matches!(self, Self::DeviceNgnrne | Self::DeviceNgnre | Self::DeviceGre)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_drwx_columns() {
        assert_eq!(format!("{}", Prot::PAGE_HYP_EXEC), "-R-X");
        assert_eq!(format!("{}", Prot::PAGE_HYP_RO), "-R--");
        assert_eq!(format!("{}", Prot::PAGE_HYP), "-RW-");
        assert_eq!(format!("{}", Prot::PAGE_HYP_DEVICE), "DRW-");
        assert_eq!(format!("{}", Prot::empty()), "----");
    }

    #[test]
    fn invalid_descriptor_has_no_permissions() {
        assert_eq!(Prot::from_leaf(Descriptor::new()), Prot::empty());
    }

    #[test]
    fn attribute_indices() {
        assert!(MemoryAttribute::from_index(5).is_device());
        assert!(!MemoryAttribute::from_index(0).is_device());
        assert_eq!(MemoryAttribute::from_index(7), MemoryAttribute::Unassigned);
    }
}
