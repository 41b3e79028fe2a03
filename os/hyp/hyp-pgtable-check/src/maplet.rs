use crate::error::MapletError;
use core::fmt;
use hyp_memory_addresses::{PhysicalAddress, VirtualAddress};
use hyp_pgtable::Prot;
use log::error;

/// One page of a flattened mapping: `virt` translates to `phys` with `prot`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Maplet {
    pub virt: VirtualAddress,
    pub phys: PhysicalAddress,
    pub prot: Prot,
}

impl Maplet {
    /// Filler for pre-sized buffers.
    pub const EMPTY: Self = Self {
        virt: VirtualAddress::zero(),
        phys: PhysicalAddress::zero(),
        prot: Prot::empty(),
    };

    /// Equality of the translation alone; permissions are not compared.
    #[must_use]
    pub fn same_translation(&self, other: &Self) -> bool {
        self.virt == other.virt && self.phys == other.phys
    }
}

impl Default for Maplet {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for Maplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} {}", self.virt, self.phys, self.prot)
    }
}

/// A strictly increasing run of maplets in caller-provided storage.
///
/// The checker runs with a single page of stack, so the (potentially large)
/// flattened mappings live in a buffer the caller allocates up front.
pub struct Maplets<'b> {
    buf: &'b mut [Maplet],
    len: usize,
}

impl<'b> Maplets<'b> {
    #[must_use]
    pub const fn new(buf: &'b mut [Maplet]) -> Self {
        Self { buf, len: 0 }
    }

    /// Append `m`, which must lie above every maplet already present.
    ///
    /// # Errors
    /// [`MapletError::Full`] when the buffer is exhausted,
    /// [`MapletError::NonIncreasing`] when `m` is out of order.
    pub fn push(&mut self, m: Maplet) -> Result<(), MapletError> {
        if let Some(last) = self.as_slice().last()
            && m.virt <= last.virt
        {
            return Err(MapletError::NonIncreasing {
                prev: last.virt,
                next: m.virt,
            });
        }
        let capacity = self.buf.len();
        let slot = self
            .buf
            .get_mut(self.len)
            .ok_or(MapletError::Full(capacity))?;
        *slot = m;
        self.len += 1;
        Ok(())
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Maplet] {
        &self.buf[..self.len]
    }
}

/// First disagreement between two flattened mappings.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MapletMismatch {
    pub index: usize,
    /// `None` if the intended mapping ran out first.
    pub intended: Option<Maplet>,
    /// `None` if the actual mapping ran out first.
    pub actual: Option<Maplet>,
}

impl MapletMismatch {
    /// The lower of the two addresses at the mismatch: the page that is
    /// missing, extra, or mapped differently.
    #[must_use]
    pub fn va(&self) -> VirtualAddress {
        match (self.intended, self.actual) {
            (Some(i), Some(a)) => i.virt.min(a.virt),
            (Some(m), None) | (None, Some(m)) => m.virt,
            (None, None) => VirtualAddress::zero(),
        }
    }
}

impl fmt::Display for MapletMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "maplet {}: intended ", self.index)?;
        match self.intended {
            Some(m) => write!(f, "{m}")?,
            None => f.write_str("nothing")?,
        }
        f.write_str(", actual ")?;
        match self.actual {
            Some(m) => write!(f, "{m}"),
            None => f.write_str("nothing"),
        }
    }
}

/// Index-wise comparison of `(virt, phys)`; `None` if both are equal.
#[must_use]
pub fn compare_maplets(intended: &[Maplet], actual: &[Maplet]) -> Option<MapletMismatch> {
    let n = intended.len().max(actual.len());
    (0..n).find_map(|index| {
        let i = intended.get(index).copied();
        let a = actual.get(index).copied();
        match (i, a) {
            (Some(i), Some(a)) if i.same_translation(&a) => None,
            _ => Some(MapletMismatch {
                index,
                intended: i,
                actual: a,
            }),
        }
    })
}

/// Whether both flattened mappings are identical; logs the first mismatch.
#[must_use]
pub fn maplets_equal(intended: &[Maplet], actual: &[Maplet]) -> bool {
    match compare_maplets(intended, actual) {
        None => true,
        Some(mismatch) => {
            error!("{mismatch}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(virt: u64, phys: u64) -> Maplet {
        Maplet {
            virt: VirtualAddress::new(virt),
            phys: PhysicalAddress::new(phys),
            prot: Prot::PAGE_HYP,
        }
    }

    #[test]
    fn push_enforces_order_and_capacity() {
        let mut buf = [Maplet::EMPTY; 2];
        let mut ms = Maplets::new(&mut buf);
        ms.push(m(0x2000, 0x9000)).unwrap();
        assert_eq!(
            ms.push(m(0x2000, 0xA000)),
            Err(MapletError::NonIncreasing {
                prev: VirtualAddress::new(0x2000),
                next: VirtualAddress::new(0x2000)
            })
        );
        ms.push(m(0x3000, 0xA000)).unwrap();
        assert_eq!(ms.push(m(0x4000, 0xB000)), Err(MapletError::Full(2)));
        assert_eq!(ms.len(), 2);
        ms.clear();
        assert!(ms.is_empty());
        ms.push(m(0x1000, 0)).unwrap();
    }

    #[test]
    fn equality_ignores_permissions() {
        let a = [m(0x1000, 0x8000)];
        let mut b = a;
        b[0].prot = Prot::PAGE_HYP_RO;
        assert!(maplets_equal(&a, &b));
        assert!(maplets_equal(&[], &[]));
    }

    #[test]
    fn mismatch_names_the_offending_page() {
        let intended = [m(0x1000, 0x8000), m(0x2000, 0x9000), m(0x3000, 0xA000)];

        // page 0x2000 missing
        let actual = [m(0x1000, 0x8000), m(0x3000, 0xA000)];
        let mm = compare_maplets(&intended, &actual).unwrap();
        assert_eq!(mm.index, 1);
        assert_eq!(mm.va(), VirtualAddress::new(0x2000));

        // extra page at the end
        let actual = [intended[0], intended[1], intended[2], m(0x7000, 0)];
        let mm = compare_maplets(&intended, &actual).unwrap();
        assert_eq!(mm.intended, None);
        assert_eq!(mm.va(), VirtualAddress::new(0x7000));

        // wrong output address
        let actual = [intended[0], m(0x2000, 0xF000), intended[2]];
        let mm = compare_maplets(&intended, &actual).unwrap();
        assert_eq!(mm.actual.map(|a| a.phys), Some(PhysicalAddress::new(0xF000)));
        assert!(!maplets_equal(&intended, &actual));
    }
}
