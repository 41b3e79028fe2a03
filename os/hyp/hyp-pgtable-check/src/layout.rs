use crate::error::RecordError;
use crate::kind::MappingKind;
use crate::records::{MAX_CPUS, MappingRecords};
use core::ops::Range;
use hyp_memory_addresses::{PAGE_SIZE, PhysVirtConversion, PhysicalAddress, VirtualAddress};
use hyp_page_alloc::vmemmap_range;
use hyp_pgtable::Prot;

/// Where the boot sequence put everything, in hypervisor virtual addresses.
#[derive(Clone, Debug)]
pub struct HypLayout<'a> {
    pub text: Range<VirtualAddress>,
    pub rodata: Range<VirtualAddress>,
    pub rodata_after_init: Range<VirtualAddress>,
    /// `.bss` up to the end of the hypervisor's own part.
    pub bss: Range<VirtualAddress>,
    /// The rest of `.bss`, mapped read-only.
    pub bss_ro: Range<VirtualAddress>,
    /// The trampoline, recorded at its physical address.
    pub idmap: Range<VirtualAddress>,

    // Pieces of the workspace, in the order they were carved out.
    pub stacks: Range<VirtualAddress>,
    pub vmemmap: Range<VirtualAddress>,
    pub s1_pgtable: Range<VirtualAddress>,
    pub s2_mem_pgtable: Range<VirtualAddress>,
    pub s2_dev_pgtable: Range<VirtualAddress>,
    pub workspace: Range<VirtualAddress>,

    /// Base of each CPU's per-CPU area.
    pub per_cpu_base: &'a [VirtualAddress],
    /// Bytes of per-CPU variables per CPU.
    pub per_cpu_size: u64,

    /// Virtual base of the descriptor array, indexed by page frame number.
    pub vmemmap_base: VirtualAddress,
    /// Physical memory the descriptor array covers.
    pub memory: Range<PhysicalAddress>,

    /// Debug UART: virtual and physical address of its register page.
    pub uart: Option<(VirtualAddress, PhysicalAddress)>,
}

/// Record every region of `layout` and finish the table.
///
/// # Errors
/// The first [`RecordError`]; a layout with more than [`MAX_CPUS`] CPUs
/// fails with [`RecordError::CpuOutOfRange`].
pub fn record_hyp_mappings<const N: usize, C: PhysVirtConversion + ?Sized>(
    records: &mut MappingRecords<N>,
    conv: &C,
    layout: &HypLayout<'_>,
) -> Result<(), RecordError> {
    let nr_cpus = layout.per_cpu_base.len();
    if nr_cpus > MAX_CPUS {
        return Err(RecordError::CpuOutOfRange {
            cpu: nr_cpus - 1,
            max: MAX_CPUS,
        });
    }

    let image = [
        (MappingKind::Text, "__hyp_text_start", &layout.text, Prot::PAGE_HYP_EXEC),
        (MappingKind::Rodata, "__start_rodata", &layout.rodata, Prot::PAGE_HYP_RO),
        (
            MappingKind::RodataAfterInit,
            "__hyp_data_ro_after_init_start",
            &layout.rodata_after_init,
            Prot::PAGE_HYP_RO,
        ),
        (MappingKind::Bss, "__bss_start", &layout.bss, Prot::PAGE_HYP),
        (MappingKind::BssReadOnly, "__hyp_bss_end", &layout.bss_ro, Prot::PAGE_HYP_RO),
    ];
    for (kind, doc, range, prot) in image {
        records.record(conv, kind, 0, doc, range.clone(), prot)?;
    }
    records.record_idmap(
        conv,
        MappingKind::Idmap,
        0,
        "__hyp_idmap_text_start",
        layout.idmap.clone(),
        Prot::PAGE_HYP_EXEC,
    )?;

    let workspace = [
        (MappingKind::Stacks, "hyp stacks", &layout.stacks),
        (MappingKind::Vmemmap, "vmemmap backing", &layout.vmemmap),
        (MappingKind::S1Pgtable, "s1 pgtable", &layout.s1_pgtable),
        (MappingKind::S2MemPgtable, "s2 mem pgtable", &layout.s2_mem_pgtable),
        (MappingKind::S2DevPgtable, "s2 dev pgtable", &layout.s2_dev_pgtable),
        (MappingKind::Workspace, "workspace", &layout.workspace),
    ];
    for (kind, doc, range) in workspace {
        records.record(conv, kind, 0, doc, range.clone(), Prot::PAGE_HYP)?;
    }

    for (cpu, &base) in layout.per_cpu_base.iter().enumerate() {
        let end = base
            .checked_add(layout.per_cpu_size)
            .ok_or(RecordError::InvalidRange(MappingKind::PerCpu))?;
        records.record(conv, MappingKind::PerCpu, cpu, "per-cpu variables", base..end, Prot::PAGE_HYP)?;
    }

    // The descriptor array is backed by the start of the vmemmap piece.
    let size = layout.memory.end.as_u64().saturating_sub(layout.memory.start.as_u64());
    let back_mapped = vmemmap_range(layout.vmemmap_base, layout.memory.start, size)
        .ok_or(RecordError::InvalidRange(MappingKind::VmemmapMap))?;
    records.record_at(
        MappingKind::VmemmapMap,
        0,
        "vmemmap",
        back_mapped,
        conv.virt_to_phys(layout.vmemmap.start),
        Prot::PAGE_HYP,
    )?;

    if let Some((va, pa)) = layout.uart {
        records.record_at(MappingKind::Uart, 0, "debug uart", va..va + PAGE_SIZE, pa, Prot::PAGE_HYP_DEVICE)?;
    }

    records.finish()
}
