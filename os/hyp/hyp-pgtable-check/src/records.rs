use crate::error::RecordError;
use crate::kind::MappingKind;
use crate::record::MappingRecord;
use core::ops::Range;
use hyp_memory_addresses::{
    PAGE_SHIFT, PhysVirtConversion, PhysicalAddress, Size4K, VirtualAddress,
};
use hyp_pgtable::Prot;
use log::{debug, info};

/// Most CPUs with per-CPU records.
pub const MAX_CPUS: usize = 8;

/// One record per kind, with per-CPU variables once for every CPU.
pub const MAX_MAPPINGS: usize = MappingKind::COUNT - 1 + MAX_CPUS;

/// The intended hypervisor mappings, in a fixed-capacity table.
///
/// Records are appended in any order while the hypervisor sets up its
/// tables and sorted by [`finish`](Self::finish), which also seals the
/// table. Only a finished table can be checked.
///
/// # Invariants
/// - At most one record per kind; [`MappingKind::PerCpu`] at most once per CPU.
/// - Once finished: sorted by virtual address with no two ranges overlapping.
#[derive(Debug, Default)]
pub struct MappingRecords<const N: usize = MAX_MAPPINGS> {
    records: heapless::Vec<MappingRecord, N>,
    sealed: bool,
}

impl<const N: usize> MappingRecords<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: heapless::Vec::new(),
            sealed: false,
        }
    }

    /// Record `virt` (widened to whole pages) as mapped onto the physical
    /// pages `conv` assigns to it.
    ///
    /// # Errors
    /// See [`RecordError`].
    pub fn record<C: PhysVirtConversion + ?Sized>(
        &mut self,
        conv: &C,
        kind: MappingKind,
        cpu: usize,
        doc: &'static str,
        virt: Range<VirtualAddress>,
        prot: Prot,
    ) -> Result<(), RecordError> {
        let (start, nr_pages) = page_span(kind, virt)?;
        self.push(kind, cpu, doc, start, conv.virt_to_phys(start), nr_pages, prot)
    }

    /// Record the identity mapping of the physical pages behind `virt`.
    ///
    /// # Errors
    /// See [`RecordError`].
    pub fn record_idmap<C: PhysVirtConversion + ?Sized>(
        &mut self,
        conv: &C,
        kind: MappingKind,
        cpu: usize,
        doc: &'static str,
        virt: Range<VirtualAddress>,
        prot: Prot,
    ) -> Result<(), RecordError> {
        let (start, nr_pages) = page_span(kind, virt)?;
        let phys = conv.virt_to_phys(start);
        let idmap = VirtualAddress::new(phys.as_u64());
        self.push(kind, cpu, doc, idmap, phys, nr_pages, prot)
    }

    /// Record `virt` as mapped onto pages starting at an explicit `phys`,
    /// for regions outside the linear map.
    ///
    /// # Errors
    /// See [`RecordError`].
    pub fn record_at(
        &mut self,
        kind: MappingKind,
        cpu: usize,
        doc: &'static str,
        virt: Range<VirtualAddress>,
        phys: PhysicalAddress,
        prot: Prot,
    ) -> Result<(), RecordError> {
        let (start, nr_pages) = page_span(kind, virt)?;
        self.push(kind, cpu, doc, start, phys.align_down::<Size4K>(), nr_pages, prot)
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        kind: MappingKind,
        cpu: usize,
        doc: &'static str,
        virt: VirtualAddress,
        phys: PhysicalAddress,
        nr_pages: u64,
        prot: Prot,
    ) -> Result<(), RecordError> {
        if self.sealed {
            return Err(RecordError::Sealed);
        }
        if kind.is_per_cpu() {
            if cpu >= MAX_CPUS {
                return Err(RecordError::CpuOutOfRange { cpu, max: MAX_CPUS });
            }
        } else if cpu != 0 {
            return Err(RecordError::UnexpectedCpu { kind, cpu });
        }
        if let Some(existing) = self.get(kind, cpu) {
            return Err(if existing.kind.is_per_cpu() {
                RecordError::DuplicateCpu(cpu)
            } else {
                RecordError::DuplicateKind(kind)
            });
        }
        let end = virt
            .checked_add(nr_pages << PAGE_SHIFT)
            .ok_or(RecordError::InvalidRange(kind))?;
        if end.as_u64() > VirtualAddress::TRANSLATABLE_END {
            return Err(RecordError::Untranslatable { kind, end });
        }

        let record = MappingRecord {
            kind,
            cpu,
            virt,
            phys,
            nr_pages,
            prot,
            doc,
        };
        self.records
            .push(record)
            .map_err(|_| RecordError::Full(N))?;
        debug!("recorded {record}");
        Ok(())
    }

    /// Sort by virtual address, reject overlapping regions and seal.
    ///
    /// # Errors
    /// [`RecordError::Overlap`] for the first overlapping pair, or
    /// [`RecordError::Sealed`] if already finished.
    pub fn finish(&mut self) -> Result<(), RecordError> {
        if self.sealed {
            return Err(RecordError::Sealed);
        }
        self.records.sort_unstable_by_key(|r| r.virt);
        // Empty records occupy no pages and must not hide neighbours.
        let mut prev: Option<&MappingRecord> = None;
        for b in self.records.iter().filter(|r| r.nr_pages > 0) {
            if let Some(a) = prev
                && b.virt < a.end()
            {
                return Err(RecordError::Overlap {
                    first: a.kind,
                    second: b.kind,
                    at: b.virt,
                });
            }
            prev = Some(b);
        }
        self.sealed = true;
        info!(
            "{} mappings recorded, {} pages",
            self.records.len(),
            self.total_pages()
        );
        Ok(())
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.sealed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[MappingRecord] {
        &self.records
    }

    pub fn iter(&self) -> core::slice::Iter<'_, MappingRecord> {
        self.records.iter()
    }

    /// The record of `kind` (for `cpu`, if per-CPU).
    #[must_use]
    pub fn get(&self, kind: MappingKind, cpu: usize) -> Option<&MappingRecord> {
        self.records
            .iter()
            .find(|r| r.kind == kind && (!kind.is_per_cpu() || r.cpu == cpu))
    }

    /// Records whose range contains `va`; at most one once finished.
    pub fn covering(&self, va: VirtualAddress) -> impl Iterator<Item = &MappingRecord> + '_ {
        self.records.iter().filter(move |r| r.contains(va))
    }

    /// Pages across all records; the number of maplets they flatten to.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        self.records.iter().map(|r| r.nr_pages).sum()
    }

    /// Log every record at debug level.
    pub fn dump(&self) {
        for record in &self.records {
            debug!("{record}");
        }
    }
}

impl<'r, const N: usize> IntoIterator for &'r MappingRecords<N> {
    type Item = &'r MappingRecord;
    type IntoIter = core::slice::Iter<'r, MappingRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Page-aligned start and page count of `virt`, widened outward.
fn page_span(kind: MappingKind, virt: Range<VirtualAddress>) -> Result<(VirtualAddress, u64), RecordError> {
    if virt.end < virt.start {
        return Err(RecordError::InvalidRange(kind));
    }
    let start = virt.start.align_down::<Size4K>();
    let end = virt
        .end
        .align_up::<Size4K>()
        .ok_or(RecordError::InvalidRange(kind))?;
    Ok((start, (end.as_u64() - start.as_u64()) >> PAGE_SHIFT))
}
