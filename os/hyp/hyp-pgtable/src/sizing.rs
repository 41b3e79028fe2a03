use crate::ENTRIES_PER_TABLE;

/// Worst-case number of table pages needed to map `nr_pages` 4 KiB pages.
///
/// Each level needs one table per 512 entries of the level below, rounded
/// up; the sum over all four levels bounds any layout of the pages,
/// provided no table is shared with other mappings.
///
/// ```rust
/// # use hyp_pgtable::pgtable_max_pages;
/// assert_eq!(pgtable_max_pages(1), 4);
/// assert_eq!(pgtable_max_pages(512), 4);
/// assert_eq!(pgtable_max_pages(513), 5);
/// ```
#[must_use]
pub const fn pgtable_max_pages(nr_pages: u64) -> u64 {
    let mut total = 0;
    let mut n = nr_pages;
    let mut level = 0;
    while level < 4 {
        n = n.div_ceil(ENTRIES_PER_TABLE as u64);
        total += n;
        level += 1;
    }
    total
}
