use crate::descriptor::PoolId;
use crate::error::InvariantViolation;
use crate::pool::PoolState;
use crate::{MAX_ORDER, order_pages};
use hyp_memory_addresses::{PAGE_SHIFT, PhysicalAddress};

impl PoolState<'_> {
    /// Check, in this order: ownership and order ranges of every descriptor,
    /// the reserved prefix, the partition of the managed range into groups
    /// (alignment, extent, head/body state, coalescing), and finally that
    /// the free lists hold exactly the free groups, correctly linked.
    pub(crate) fn check(
        &self,
        id: PoolId,
        range_start: PhysicalAddress,
        reserved: u32,
    ) -> Result<(), InvariantViolation> {
        let addr = |idx: u32| range_start + (u64::from(idx) << PAGE_SHIFT);
        let n = self.nr_pages();

        for (idx, d) in (0..n).zip(self.vmemmap.iter()) {
            if d.pool != Some(id) {
                return Err(InvariantViolation::ForeignDescriptor(addr(idx)));
            }
            if let Some(order) = d.order
                && order > MAX_ORDER
            {
                return Err(InvariantViolation::OrderOutOfRange {
                    addr: addr(idx),
                    order,
                });
            }
        }

        for idx in 0..reserved {
            let d = &self.vmemmap[idx as usize];
            if d.order != Some(0) || d.refcount != 0 || d.is_free_listed() {
                return Err(InvariantViolation::ReservedPageTouched(addr(idx)));
            }
        }

        let mut free_groups = 0;
        let mut idx = reserved;
        while idx < n {
            let d = &self.vmemmap[idx as usize];
            let Some(order) = d.order else {
                return Err(InvariantViolation::MissingHead(addr(idx)));
            };
            let size = order_pages(order);
            if idx % size != 0 {
                return Err(InvariantViolation::Misaligned {
                    addr: addr(idx),
                    order,
                });
            }
            if u64::from(idx) + u64::from(size) > u64::from(n) {
                return Err(InvariantViolation::GroupOutOfRange {
                    addr: addr(idx),
                    order,
                });
            }

            if d.is_free_listed() {
                if d.refcount != 0 {
                    return Err(InvariantViolation::FreeGroupReferenced {
                        addr: addr(idx),
                        refcount: d.refcount,
                    });
                }
                if let Some(buddy) = self.find_buddy(idx, order)
                    && order < MAX_ORDER
                {
                    let b = &self.vmemmap[buddy as usize];
                    if b.is_free_listed() && b.order == Some(order) {
                        return Err(InvariantViolation::Uncoalesced {
                            addr: addr(idx),
                            buddy: addr(buddy),
                            order,
                        });
                    }
                }
                free_groups += 1;
            } else if d.refcount == 0 {
                return Err(InvariantViolation::Orphaned(addr(idx)));
            }

            for body in idx + 1..idx + size {
                let b = &self.vmemmap[body as usize];
                if b.order.is_some() || b.refcount != 0 || b.is_free_listed() {
                    return Err(InvariantViolation::BodyPageTagged(addr(body)));
                }
            }
            idx += size;
        }

        let mut listed = 0;
        for order in 0..=MAX_ORDER {
            let area = &self.free_area[order as usize];
            let mut prev = None;
            let mut count = 0;
            for member in area.iter(&*self.vmemmap) {
                let d = &self.vmemmap[member as usize];
                if d.order != Some(order) {
                    return Err(InvariantViolation::WrongList {
                        list: order,
                        addr: addr(member),
                        order: d.order,
                    });
                }
                if d.link.map(|l| l.prev) != Some(prev) {
                    return Err(InvariantViolation::BrokenLinks(order));
                }
                prev = Some(member);
                count += 1;
            }
            if count != area.len() || prev != area.tail() {
                return Err(InvariantViolation::BrokenLinks(order));
            }
            listed += count;
        }
        if listed != free_groups {
            return Err(InvariantViolation::ListCountMismatch {
                listed,
                found: free_groups,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptor::{PageDescriptor, PoolId};
    use crate::error::InvariantViolation;
    use crate::NR_ORDERS;
    use crate::free_area::FreeArea;
    use crate::pool::{AllocFlags, HypPool, PoolState};
    use hyp_memory_addresses::PhysicalAddress;
    use hyp_pgtable::testing::TestPhys;

    #[test]
    fn fresh_pools_are_consistent() {
        for (pages, reserved) in [(0, 0), (1, 0), (1, 1), (7, 2), (16, 0), (33, 5)] {
            let phys = TestPhys::new(PhysicalAddress::new(0x10_0000), pages.max(1));
            let mut vm = vec![PageDescriptor::EMPTY; pages];
            let pool = unsafe {
                HypPool::init(PoolId::new(0), &phys, &mut vm, phys.base(), pages, reserved)
            }
            .unwrap();
            assert_eq!(pool.free_pages(), pages - reserved);
            pool.check_invariant().unwrap();
        }
    }

    #[test]
    fn busy_pool_stays_consistent() {
        let phys = TestPhys::new(PhysicalAddress::new(0x10_0000), 32);
        let mut vm = vec![PageDescriptor::EMPTY; 32];
        let pool =
            unsafe { HypPool::init(PoolId::new(0), &phys, &mut vm, phys.base(), 32, 3) }.unwrap();
        let a = pool.alloc_pages(2, AllocFlags::empty()).unwrap();
        let b = pool.alloc_pages(0, AllocFlags::empty()).unwrap();
        pool.get_page(b).unwrap();
        pool.check_invariant().unwrap();
        pool.put_page(a).unwrap();
        pool.put_page(b).unwrap();
        pool.check_invariant().unwrap();
    }

    #[test]
    fn uncoalesced_buddies_are_reported() {
        let id = PoolId::new(0);
        let mut vm = [PageDescriptor {
            pool: Some(id),
            order: Some(0),
            ..PageDescriptor::EMPTY
        }; 2];
        let mut state = PoolState {
            vmemmap: &mut vm,
            free_area: [FreeArea::EMPTY; NR_ORDERS],
        };
        // both halves freed without merging
        state.free_area[0].push_back(state.vmemmap, 0);
        state.free_area[0].push_back(state.vmemmap, 1);
        assert_eq!(
            state.check(id, PhysicalAddress::new(0x8000), 0),
            Err(InvariantViolation::Uncoalesced {
                addr: PhysicalAddress::new(0x8000),
                buddy: PhysicalAddress::new(0x9000),
                order: 0
            })
        );
    }

    #[test]
    fn list_membership_must_match_partition() {
        let id = PoolId::new(0);
        let mut vm = [PageDescriptor {
            pool: Some(id),
            order: Some(0),
            refcount: 1,
            ..PageDescriptor::EMPTY
        }; 2];
        vm[0].order = Some(1);
        vm[0].refcount = 0;
        vm[1].order = None;
        vm[1].refcount = 0;
        let mut state = PoolState {
            vmemmap: &mut vm,
            free_area: [FreeArea::EMPTY; NR_ORDERS],
        };
        assert_eq!(
            state.check(id, PhysicalAddress::new(0), 0),
            Err(InvariantViolation::Orphaned(PhysicalAddress::new(0)))
        );
        state.free_area[0].push_back(state.vmemmap, 0);
        assert_eq!(
            state.check(id, PhysicalAddress::new(0), 0),
            Err(InvariantViolation::WrongList {
                list: 0,
                addr: PhysicalAddress::new(0),
                order: Some(1)
            })
        );
    }
}
