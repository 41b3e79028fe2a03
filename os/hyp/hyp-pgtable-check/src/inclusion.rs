//! One-directional inclusion checks.
//!
//! Forward: every recorded page translates, through a full table walk, to
//! the physical address the record intends. Reverse: every leaf in the
//! table is intended by at least one record. Each direction alone can miss
//! what the other catches; the flattened comparison in [`crate::check`] is
//! the verdict, these two exist to localise failures.

use crate::check::{CheckMode, Mismatch};
use crate::records::MappingRecords;
use core::convert::Infallible;
use hyp_pgtable::{EntryKind, PageTableWalker, PhysMapper, Translation};
use log::{error, trace, warn};

/// Result of one inclusion direction.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct InclusionOutcome {
    /// Pages (forward) or leaves (reverse) examined.
    pub checked: u64,
    pub failures: u64,
    /// Leaves intended by more than one record (reverse only).
    pub duplicates: u64,
    pub first_failure: Option<Mismatch>,
}

impl InclusionOutcome {
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.failures == 0
    }

    fn fail(&mut self, mismatch: Mismatch) {
        error!("{mismatch}");
        self.failures += 1;
        if self.first_failure.is_none() {
            self.first_failure = Some(mismatch);
        }
    }
}

/// Translate every recorded page and compare with the record.
#[must_use]
pub fn check_forward<const N: usize, M: PhysMapper>(
    records: &MappingRecords<N>,
    walker: &PageTableWalker<'_, M>,
    mode: CheckMode,
) -> InclusionOutcome {
    let mut outcome = InclusionOutcome::default();
    for record in records {
        let failures_before = outcome.failures;
        for (va, pa) in record.pages() {
            outcome.checked += 1;
            let actual = match walker.translate(va) {
                Translation::Mapped { pa, .. } => Some(pa),
                Translation::Fault { .. } => None,
            };
            if actual != Some(pa) {
                outcome.fail(Mismatch {
                    kind: Some(record.kind),
                    va,
                    intended: Some(pa),
                    actual,
                });
            }
        }
        if mode.is_noisy() {
            let ok = outcome.failures == failures_before;
            trace!("forward {}: {record}", if ok { "ok  " } else { "FAIL" });
        }
    }
    outcome
}

/// Look every leaf up in the records.
#[must_use]
pub fn check_reverse<const N: usize, M: PhysMapper>(
    records: &MappingRecords<N>,
    walker: &PageTableWalker<'_, M>,
    mode: CheckMode,
) -> InclusionOutcome {
    let mut outcome = InclusionOutcome::default();
    let walked = walker.try_for_each_leaf::<Infallible, _>(|leaf| {
        outcome.checked += 1;
        let pa = leaf.output_address();
        if leaf.kind != EntryKind::Page {
            outcome.fail(Mismatch {
                kind: None,
                va: leaf.va,
                intended: None,
                actual: Some(pa),
            });
            error!("reverse: unhandled {} entry at {} for {}", leaf.kind, leaf.level, leaf.va);
            return Ok(());
        }

        let mut hits = 0_u32;
        for record in records.covering(leaf.va).filter(|r| r.maps(leaf.va, pa)) {
            hits += 1;
            if mode.is_noisy() {
                trace!("reverse: {} -> {pa} in {}", leaf.va, record.kind);
            }
        }
        match hits {
            0 => {
                // If some record covers the VA, it intends a different PA.
                let intended = records.covering(leaf.va).find_map(|r| r.phys_for(leaf.va));
                let kind = records.covering(leaf.va).map(|r| r.kind).next();
                outcome.fail(Mismatch {
                    kind,
                    va: leaf.va,
                    intended,
                    actual: Some(pa),
                });
            }
            1 => {}
            _ => {
                warn!("reverse: {} -> {pa} intended by {hits} records", leaf.va);
                outcome.duplicates += 1;
            }
        }
        Ok(())
    });
    match walked {
        Ok(()) => outcome,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::MappingKind;
    use hyp_memory_addresses::{LinearMap, PhysicalAddress, VirtualAddress};
    use hyp_pgtable::testing::{BumpFrames, TableBuilder, TestPhys};
    use hyp_pgtable::{Descriptor, Level, Prot};

    const OFFSET: u64 = 0x10_0000_0000;

    fn records() -> MappingRecords<4> {
        let mut r = MappingRecords::new();
        let c = LinearMap::new(OFFSET);
        r.record(
            &c,
            MappingKind::Text,
            0,
            "",
            VirtualAddress::new(OFFSET + 0x8000_0000)..VirtualAddress::new(OFFSET + 0x8000_2000),
            Prot::PAGE_HYP_EXEC,
        )
        .unwrap();
        r.finish().unwrap();
        r
    }

    #[test]
    fn both_directions_pass_on_a_faithful_table() {
        let recs = records();
        let phys = TestPhys::new(PhysicalAddress::new(0x4000_0000), 8);
        let mut b = TableBuilder::new(&phys, BumpFrames::over(&phys)).unwrap();
        for r in &recs {
            b.map_range(r.virt, r.phys, r.nr_pages, r.prot).unwrap();
        }
        let walker = unsafe { PageTableWalker::new(&phys, b.root()) };

        let fwd = check_forward(&recs, &walker, CheckMode::Noisy);
        let rev = check_reverse(&recs, &walker, CheckMode::Quiet);
        assert!(fwd.passed() && rev.passed());
        assert_eq!((fwd.checked, rev.checked), (2, 2));
        assert_eq!(rev.duplicates, 0);
    }

    #[test]
    fn each_direction_sees_its_own_witness() {
        let recs = records();
        let text = recs.as_slice()[0];
        let phys = TestPhys::new(PhysicalAddress::new(0x4000_0000), 8);
        let mut b = TableBuilder::new(&phys, BumpFrames::over(&phys)).unwrap();
        // first page right, second page missing, one stray page
        b.map_page(text.virt, text.phys, text.prot).unwrap();
        let stray = VirtualAddress::new(OFFSET + 0x9000_0000);
        b.map_page(stray, PhysicalAddress::new(0x1234_5000), Prot::PAGE_HYP).unwrap();
        let walker = unsafe { PageTableWalker::new(&phys, b.root()) };

        let fwd = check_forward(&recs, &walker, CheckMode::Quiet);
        assert_eq!(fwd.failures, 1);
        let missing = fwd.first_failure.unwrap();
        assert_eq!(missing.va, text.virt + 0x1000);
        assert_eq!(missing.kind, Some(MappingKind::Text));
        assert_eq!(missing.actual, None);

        let rev = check_reverse(&recs, &walker, CheckMode::Quiet);
        assert_eq!(rev.failures, 1);
        let extra = rev.first_failure.unwrap();
        assert_eq!(extra.va, stray);
        assert_eq!(extra.kind, None);
        assert_eq!(extra.actual, Some(PhysicalAddress::new(0x1234_5000)));
    }

    #[test]
    fn reverse_reports_the_intended_address_of_a_misdirected_page() {
        let recs = records();
        let text = recs.as_slice()[0];
        let phys = TestPhys::new(PhysicalAddress::new(0x4000_0000), 8);
        let mut b = TableBuilder::new(&phys, BumpFrames::over(&phys)).unwrap();
        b.map_page(text.virt, PhysicalAddress::new(0x5000_0000), text.prot).unwrap();
        let walker = unsafe { PageTableWalker::new(&phys, b.root()) };

        let rev = check_reverse(&recs, &walker, CheckMode::Quiet);
        let m = rev.first_failure.unwrap();
        assert_eq!(m.kind, Some(MappingKind::Text));
        assert_eq!(m.intended, Some(text.phys));
        assert_eq!(m.actual, Some(PhysicalAddress::new(0x5000_0000)));
    }

    #[test]
    fn reverse_walks_every_leaf_and_fails_on_blocks() {
        let recs = records();
        let text = recs.as_slice()[0];
        let phys = TestPhys::new(PhysicalAddress::new(0x4000_0000), 8);
        let mut b = TableBuilder::new(&phys, BumpFrames::over(&phys)).unwrap();
        b.map_range(text.virt, text.phys, text.nr_pages, text.prot).unwrap();
        let block = VirtualAddress::new(0x4000_0000);
        b.set_entry(block, Level::L2, Descriptor::new_block(PhysicalAddress::new(0x8000_0000), Prot::PAGE_HYP))
            .unwrap();
        let walker = unsafe { PageTableWalker::new(&phys, b.root()) };

        let rev = check_reverse(&recs, &walker, CheckMode::Quiet);
        assert_eq!(rev.checked, 3);
        assert_eq!(rev.failures, 1);
        assert_eq!(rev.first_failure.map(|m| m.va), Some(block));
    }
}
