//! Flatten both sides of the comparison into page-granular maplets.

use crate::error::CheckError;
use crate::maplet::{Maplet, Maplets};
use crate::records::MappingRecords;
use hyp_pgtable::{EntryKind, PageTableWalker, PhysMapper, Prot};

/// One maplet per recorded page, in ascending VA order.
///
/// # Errors
/// [`CheckError::Unsealed`] for an unfinished table, or a
/// [`MapletError`](crate::MapletError) if `out` fills up.
pub fn interpret_records<const N: usize>(
    records: &MappingRecords<N>,
    out: &mut Maplets<'_>,
) -> Result<(), CheckError> {
    if !records.is_finished() {
        return Err(CheckError::Unsealed);
    }
    for record in records {
        for (virt, phys) in record.pages() {
            out.push(Maplet {
                virt,
                phys,
                prot: record.prot,
            })?;
        }
    }
    Ok(())
}

/// One maplet per valid level-3 page entry reachable from the walker's
/// root, in ascending VA order.
///
/// The hypervisor never maps its own memory with blocks, so any block (or
/// otherwise unexpected leaf) is an error rather than being split.
///
/// # Errors
/// [`CheckError::UnexpectedEntry`] for the first non-page leaf, or a
/// [`MapletError`](crate::MapletError) if `out` fills up.
pub fn interpret_pgtable<M: PhysMapper>(
    walker: &PageTableWalker<'_, M>,
    out: &mut Maplets<'_>,
) -> Result<(), CheckError> {
    walker.try_for_each_leaf(|leaf| match leaf.kind {
        EntryKind::Page => out
            .push(Maplet {
                virt: leaf.va,
                phys: leaf.output_address(),
                prot: Prot::from_leaf(leaf.descriptor),
            })
            .map_err(CheckError::from),
        kind => Err(CheckError::UnexpectedEntry {
            va: leaf.va,
            level: leaf.level,
            kind,
        }),
    })
}
