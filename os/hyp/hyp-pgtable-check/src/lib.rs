//! # Hypervisor Mapping Checker
//!
//! Verifies, once at boot, that the hypervisor's stage-1 page tables map
//! exactly what the boot sequence meant to map.
//!
//! While setting up its tables the hypervisor *records* every region it
//! intends to map ([`MappingRecords`], or [`record_hyp_mappings`] for the
//! whole boot layout at once). Afterwards [`MappingChecker::check`] reads the
//! real tables with an independent [`PageTableWalker`](hyp_pgtable::PageTableWalker)
//! and compares:
//!
//! ```text
//!  records ──interpret_records──▶ maplets ─┐
//!                                          ├─ compare_maplets ─▶ verdict
//!  tables  ──interpret_pgtable──▶ maplets ─┘
//!
//!  records ──check_forward──▶ every recorded page is mapped as intended
//!  tables  ──check_reverse──▶ every leaf is intended by some record
//! ```
//!
//! The flattened comparison is the verdict; the inclusion checks pinpoint
//! failures and must agree with it.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod check;
mod error;
mod inclusion;
mod interpret;
mod kind;
mod layout;
mod maplet;
mod record;
mod records;

pub use check::{CheckMode, CheckReport, MappingChecker, Mismatch};
pub use error::{CheckError, MapletError, RecordError};
pub use inclusion::{InclusionOutcome, check_forward, check_reverse};
pub use interpret::{interpret_pgtable, interpret_records};
pub use kind::MappingKind;
pub use layout::{HypLayout, record_hyp_mappings};
pub use maplet::{Maplet, MapletMismatch, Maplets, compare_maplets, maplets_equal};
pub use record::MappingRecord;
pub use records::{MAX_CPUS, MAX_MAPPINGS, MappingRecords};
