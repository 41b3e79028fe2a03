use crate::descriptor::PoolId;
use crate::error::{RefError, RegistryError};
use crate::pool::HypPool;
use hyp_memory_addresses::PhysicalAddress;
use hyp_pgtable::PhysMapper;
use log::info;

/// Most pools a [`PoolRegistry`] can track.
pub const MAX_POOLS: usize = 4;

/// Routes page references to the pool owning the page.
///
/// Pools never overlap, so at most one pool matches any address. Each call
/// locks exactly one pool.
pub struct PoolRegistry<'r, 'a, M: PhysMapper> {
    pools: heapless::Vec<&'r HypPool<'a, M>, MAX_POOLS>,
}

impl<M: PhysMapper> Default for PoolRegistry<'_, '_, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r, 'a, M: PhysMapper> PoolRegistry<'r, 'a, M> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pools: heapless::Vec::new(),
        }
    }

    /// # Errors
    /// [`RegistryError`] if the registry is full, the id is taken, or the
    /// pool's range overlaps a registered one.
    pub fn register(&mut self, pool: &'r HypPool<'a, M>) -> Result<(), RegistryError> {
        let range = pool.range();
        for existing in &self.pools {
            if existing.id() == pool.id() {
                return Err(RegistryError::DuplicateId(pool.id()));
            }
            let other = existing.range();
            if !range.is_empty() && !other.is_empty() && range.start < other.end && other.start < range.end {
                return Err(RegistryError::Overlap {
                    new: pool.id(),
                    existing: existing.id(),
                });
            }
        }
        self.pools.push(pool).map_err(|_| RegistryError::Full)?;
        info!("registered {} covering {}..{}", pool.id(), range.start, range.end);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: PoolId) -> Option<&'r HypPool<'a, M>> {
        self.pools.iter().copied().find(|p| p.id() == id)
    }

    /// The pool whose range contains `addr`.
    #[must_use]
    pub fn pool_of(&self, addr: PhysicalAddress) -> Option<&'r HypPool<'a, M>> {
        self.pools.iter().copied().find(|p| p.contains(addr))
    }

    /// [`HypPool::get_page`] on the owning pool.
    ///
    /// # Errors
    /// [`RefError::OutOfRange`] if no pool owns `addr`, otherwise whatever
    /// the pool reports.
    pub fn get_page(&self, addr: PhysicalAddress) -> Result<(), RefError> {
        self.pool_of(addr).ok_or(RefError::OutOfRange(addr))?.get_page(addr)
    }

    /// [`HypPool::put_page`] on the owning pool.
    ///
    /// # Errors
    /// [`RefError::OutOfRange`] if no pool owns `addr`, otherwise whatever
    /// the pool reports.
    pub fn put_page(&self, addr: PhysicalAddress) -> Result<(), RefError> {
        self.pool_of(addr).ok_or(RefError::OutOfRange(addr))?.put_page(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PageDescriptor;
    use crate::pool::AllocFlags;
    use hyp_pgtable::testing::TestPhys;

    #[test]
    fn routes_to_owning_pool() {
        let phys = TestPhys::new(PhysicalAddress::new(0x10_0000), 8);
        let mut vm_a = [PageDescriptor::EMPTY; 4];
        let mut vm_b = [PageDescriptor::EMPTY; 4];
        let a = unsafe { HypPool::init(PoolId::new(0), &phys, &mut vm_a, phys.base(), 4, 0) }.unwrap();
        let b = unsafe {
            HypPool::init(PoolId::new(1), &phys, &mut vm_b, phys.base() + 0x4000, 4, 0)
        }
        .unwrap();

        let mut reg = PoolRegistry::new();
        reg.register(&a).unwrap();
        reg.register(&b).unwrap();
        assert_eq!(reg.len(), 2);

        let pa = b.alloc_pages(0, AllocFlags::empty()).unwrap();
        assert_eq!(reg.pool_of(pa).map(HypPool::id), Some(PoolId::new(1)));
        reg.get_page(pa).unwrap();
        assert_eq!(b.refcount(pa), Ok(2));
        reg.put_page(pa).unwrap();
        reg.put_page(pa).unwrap();
        assert_eq!(b.free_pages(), 4);

        let outside = PhysicalAddress::new(0x20_0000);
        assert_eq!(reg.get_page(outside), Err(RefError::OutOfRange(outside)));
        assert!(reg.get(PoolId::new(0)).is_some());
    }

    #[test]
    fn rejects_duplicates_and_overlaps() {
        let phys = TestPhys::new(PhysicalAddress::new(0x10_0000), 8);
        let mut vm_a = [PageDescriptor::EMPTY; 4];
        let mut vm_b = [PageDescriptor::EMPTY; 4];
        let mut vm_c = [PageDescriptor::EMPTY; 4];
        let a = unsafe { HypPool::init(PoolId::new(0), &phys, &mut vm_a, phys.base(), 4, 0) }.unwrap();
        let b = unsafe {
            HypPool::init(PoolId::new(0), &phys, &mut vm_b, phys.base() + 0x4000, 4, 0)
        }
        .unwrap();
        let c = unsafe {
            HypPool::init(PoolId::new(2), &phys, &mut vm_c, phys.base() + 0x2000, 4, 0)
        }
        .unwrap();

        let mut reg = PoolRegistry::new();
        reg.register(&a).unwrap();
        assert_eq!(reg.register(&b), Err(RegistryError::DuplicateId(PoolId::new(0))));
        assert_eq!(
            reg.register(&c),
            Err(RegistryError::Overlap {
                new: PoolId::new(2),
                existing: PoolId::new(0)
            })
        );
        assert_eq!(reg.len(), 1);
    }
}
