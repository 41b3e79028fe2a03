use crate::addresses::PhysicalAddress;
use crate::level::Level;
use crate::prot::{AccessPermission, MemoryAttribute, Prot};
use bitfield_struct::bitfield;

/// Output address bits `[47:12]` of a table, block or page descriptor.
pub const OUTPUT_ADDRESS_MASK: u64 = 0x0000_FFFF_FFFF_F000;

/// Shareability encoding for inner-shareable normal memory.
const SH_INNER_SHAREABLE: u8 = 0b11;

/// One raw 64-bit AArch64 VMSAv8-64 stage-1 descriptor.
///
/// The same layout serves table, block and page descriptors; which one it is
/// depends on the level it is found at (see
/// [`EntryKind::classify`](crate::EntryKind::classify)). Attribute fields are
/// meaningless for table descriptors and ignored by the walker.
///
/// ```text
/// 63   59 58 55 54  53  52  51  50 49 48 47          12 11 10  9 8 7 6  5  4   2  1  0
/// | ign  | sw  |XN|PXN|Con|DBM|GP|res0 | output address |nG|AF| SH |AP |NS|AttrIdx|T |V |
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Descriptor {
    /// Valid (bit 0). Clear: the entry faults.
    pub valid: bool,

    /// Descriptor type (bit 1). Set: table at L0–L2, page at L3.
    /// Clear: block at L1/L2, reserved at L3.
    pub table: bool,

    /// Index into MAIR_EL2 (bits 2..=4).
    #[bits(3)]
    pub attr_index: u8,

    /// Non-secure (bit 5).
    pub non_secure: bool,

    /// Access permissions AP[2:1] (bits 6..=7).
    #[bits(2)]
    pub access_permissions: u8,

    /// Shareability (bits 8..=9).
    #[bits(2)]
    pub shareability: u8,

    /// Access flag (bit 10).
    pub access_flag: bool,

    /// Not global (bit 11).
    pub not_global: bool,

    /// Output address bits [47:12] (bits 12..=47).
    #[bits(36)]
    output_frame: u64,

    #[bits(2)]
    __res0: u8,

    /// Guarded page (bit 50).
    pub guarded: bool,

    /// Dirty bit modifier (bit 51).
    pub dirty_bit_modifier: bool,

    /// Contiguous hint (bit 52).
    pub contiguous: bool,

    /// Privileged execute-never (bit 53).
    pub privileged_execute_never: bool,

    /// Execute-never (bit 54). The only XN bit at EL2.
    pub execute_never: bool,

    /// Reserved for software use (bits 55..=58).
    #[bits(4)]
    pub software: u8,

    #[bits(5)]
    __ignored: u8,
}

impl Descriptor {
    /// The descriptor type field, bits `[1:0]`.
    #[inline]
    #[must_use]
    pub const fn type_bits(self) -> u8 {
        (self.into_bits() & 0b11) as u8
    }

    /// Output address bits `[47:12]`, low bits zero.
    #[inline]
    #[must_use]
    pub const fn output_address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.into_bits() & OUTPUT_ADDRESS_MASK)
    }

    /// Output address of a block at `level`, i.e. bits `[47:shift]`.
    ///
    /// Bits below the level's span are not part of a block's address and are
    /// dropped even if set.
    #[inline]
    #[must_use]
    pub const fn block_output_address(self, level: Level) -> PhysicalAddress {
        let low = level.entry_span() - 1;
        PhysicalAddress::new(self.into_bits() & OUTPUT_ADDRESS_MASK & !low)
    }

    #[inline]
    #[must_use]
    pub const fn with_output_address(self, pa: PhysicalAddress) -> Self {
        self.with_output_frame((pa.as_u64() & OUTPUT_ADDRESS_MASK) >> 12)
    }

    /// A table descriptor pointing at the next-level table at `pa`.
    #[inline]
    #[must_use]
    pub const fn new_table(pa: PhysicalAddress) -> Self {
        Self::new()
            .with_valid(true)
            .with_table(true)
            .with_output_address(pa)
    }

    /// A level-3 page descriptor mapping `pa` with `prot`.
    #[inline]
    #[must_use]
    pub const fn new_page(pa: PhysicalAddress, prot: Prot) -> Self {
        Self::leaf(pa, prot).with_table(true)
    }

    /// A level-1/level-2 block descriptor mapping `pa` with `prot`.
    #[inline]
    #[must_use]
    pub const fn new_block(pa: PhysicalAddress, prot: Prot) -> Self {
        Self::leaf(pa, prot).with_table(false)
    }

    const fn leaf(pa: PhysicalAddress, prot: Prot) -> Self {
        let device = prot.contains(Prot::DEVICE);
        let attr = if device {
            MemoryAttribute::DeviceNgnre
        } else {
            MemoryAttribute::Normal
        };
        let ap = if prot.contains(Prot::W) {
            AccessPermission::ReadWrite
        } else {
            AccessPermission::ReadOnly
        };
        Self::new()
            .with_valid(true)
            .with_attr_index(attr as u8)
            .with_access_permissions(ap as u8)
            .with_shareability(if device { 0 } else { SH_INNER_SHAREABLE })
            .with_access_flag(true)
            .with_execute_never(device || !prot.contains(Prot::X))
            .with_output_address(pa)
    }

    /// Permissions of a leaf, decoded from AP, XN and AttrIndx.
    #[inline]
    #[must_use]
    pub fn prot(self) -> Prot {
        Prot::from_leaf(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_architecture() {
        let d = Descriptor::new()
            .with_valid(true)
            .with_table(true)
            .with_attr_index(0b101)
            .with_access_permissions(0b11)
            .with_access_flag(true)
            .with_execute_never(true)
            .with_output_address(PhysicalAddress::new(0x0000_1234_5678_9000));
        let raw = d.into_bits();
        assert_eq!(raw & 0b11, 0b11);
        assert_eq!((raw >> 2) & 0b111, 0b101);
        assert_eq!((raw >> 6) & 0b11, 0b11);
        assert_ne!(raw & (1 << 10), 0);
        assert_ne!(raw & (1 << 54), 0);
        assert_eq!(raw & OUTPUT_ADDRESS_MASK, 0x0000_1234_5678_9000);
    }

    #[test]
    fn output_address_ignores_attributes() {
        let raw = 0x0040_0000_8000_0F03_u64 | (1 << 54);
        let d = Descriptor::from_bits(raw);
        assert_eq!(d.output_address().as_u64(), 0x8000_0000);
        assert_eq!(d.type_bits(), 0b11);
    }

    #[test]
    fn block_address_masks_low_bits() {
        let d = Descriptor::from_bits(0x8012_3001);
        assert_eq!(d.block_output_address(Level::L2).as_u64(), 0x8000_0000);
        let d = Descriptor::from_bits(0x4020_0001);
        assert_eq!(d.block_output_address(Level::L1).as_u64(), 0x4000_0000);
        assert_eq!(d.block_output_address(Level::L2).as_u64(), 0x4020_0000);
    }

    #[test]
    fn constructors_set_type_bits() {
        let pa = PhysicalAddress::new(0x4000_0000);
        assert_eq!(Descriptor::new_table(pa).type_bits(), 0b11);
        assert_eq!(Descriptor::new_page(pa, Prot::PAGE_HYP).type_bits(), 0b11);
        assert_eq!(Descriptor::new_block(pa, Prot::PAGE_HYP).type_bits(), 0b01);
        assert_eq!(Descriptor::new().type_bits(), 0b00);
    }

    #[test]
    fn prot_survives_encoding() {
        let pa = PhysicalAddress::new(0x9000);
        for prot in [
            Prot::PAGE_HYP,
            Prot::PAGE_HYP_RO,
            Prot::PAGE_HYP_EXEC,
            Prot::PAGE_HYP_DEVICE,
        ] {
            assert_eq!(Descriptor::new_page(pa, prot).prot(), prot, "{prot}");
        }
    }
}
