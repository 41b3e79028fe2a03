use crate::error::CheckError;
use crate::inclusion::{InclusionOutcome, check_forward, check_reverse};
use crate::interpret::{interpret_pgtable, interpret_records};
use crate::kind::MappingKind;
use crate::maplet::{Maplet, Maplets, compare_maplets};
use crate::records::MappingRecords;
use core::fmt;
use hyp_memory_addresses::{PhysicalAddress, VirtualAddress};
use hyp_pgtable::{PageTableWalker, PhysMapper};
use log::{error, info, trace};

/// How much the checker logs.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CheckMode {
    /// Verdicts and failures only.
    #[default]
    Quiet,
    /// Also every record, every maplet and every inclusion step, at trace
    /// level.
    Noisy,
}

impl CheckMode {
    #[must_use]
    pub const fn is_noisy(self) -> bool {
        matches!(self, Self::Noisy)
    }
}

/// A page whose actual translation differs from the intended one.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Mismatch {
    /// The record covering `va`, if any.
    pub kind: Option<MappingKind>,
    pub va: VirtualAddress,
    /// `None` if nothing intends `va` to be mapped.
    pub intended: Option<PhysicalAddress>,
    /// `None` if `va` does not translate.
    pub actual: Option<PhysicalAddress>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("mapping mismatch")?;
        if let Some(kind) = self.kind {
            write!(f, " in {kind}")?;
        }
        write!(f, " at {}: intended ", self.va)?;
        match self.intended {
            Some(pa) => write!(f, "{pa}")?,
            None => f.write_str("unmapped")?,
        }
        f.write_str(", actual ")?;
        match self.actual {
            Some(pa) => write!(f, "{pa}"),
            None => f.write_str("unmapped"),
        }
    }
}

/// Outcome of [`MappingChecker::check`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CheckReport {
    pub forward: InclusionOutcome,
    pub reverse: InclusionOutcome,
    pub intended_maplets: usize,
    pub actual_maplets: usize,
    /// First difference between the flattened mappings.
    pub mismatch: Option<Mismatch>,
}

impl CheckReport {
    /// The verdict: both flattened mappings are identical.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.mismatch.is_none()
    }

    /// Whether the inclusion checks reach the same verdict as the
    /// flattened comparison.
    #[must_use]
    pub const fn agrees(&self) -> bool {
        self.passed() == (self.forward.passed() && self.reverse.passed())
    }
}

/// Compares the recorded intent with the tables actually installed.
///
/// The flattened maplets of both sides are kept in two caller-provided
/// buffers, each of which must hold at least one entry per mapped page.
pub struct MappingChecker<'b> {
    intended: &'b mut [Maplet],
    actual: &'b mut [Maplet],
}

impl<'b> MappingChecker<'b> {
    #[must_use]
    pub const fn new(intended: &'b mut [Maplet], actual: &'b mut [Maplet]) -> Self {
        Self { intended, actual }
    }

    /// Run both inclusion checks, then flatten and compare.
    ///
    /// A failed comparison is not an error: it is reported through
    /// [`CheckReport::passed`] and always logged.
    ///
    /// # Errors
    /// A [`CheckError`] if the records are not finished, a buffer is too
    /// small, or the table holds entries the checker cannot interpret.
    pub fn check<const N: usize, M: PhysMapper>(
        &mut self,
        records: &MappingRecords<N>,
        walker: &PageTableWalker<'_, M>,
        mode: CheckMode,
    ) -> Result<CheckReport, CheckError> {
        if !records.is_finished() {
            return Err(CheckError::Unsealed);
        }
        if mode.is_noisy() {
            for record in records {
                trace!("record {record}");
            }
        }

        let forward = check_forward(records, walker, mode);
        let reverse = check_reverse(records, walker, mode);

        let mut intended = Maplets::new(self.intended);
        interpret_records(records, &mut intended)?;
        let mut actual = Maplets::new(self.actual);
        interpret_pgtable(walker, &mut actual)?;
        if mode.is_noisy() {
            for m in intended.as_slice() {
                trace!("intended {m}");
            }
            for m in actual.as_slice() {
                trace!("actual   {m}");
            }
        }

        let mismatch = compare_maplets(intended.as_slice(), actual.as_slice()).map(|mm| {
            let va = mm.va();
            Mismatch {
                kind: records.covering(va).map(|r| r.kind).next(),
                va,
                intended: mm.intended.filter(|m| m.virt == va).map(|m| m.phys),
                actual: mm.actual.filter(|m| m.virt == va).map(|m| m.phys),
            }
        });

        let report = CheckReport {
            forward,
            reverse,
            intended_maplets: intended.len(),
            actual_maplets: actual.len(),
            mismatch,
        };
        match report.mismatch {
            None => info!(
                "mapping check passed: {} pages in {} records",
                report.intended_maplets,
                records.len()
            ),
            Some(m) => error!("mapping check FAILED: {m}"),
        }
        if !report.agrees() {
            error!(
                "mapping check strategies disagree: flattened {}, forward {}, reverse {}",
                report.passed(),
                report.forward.passed(),
                report.reverse.passed()
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn outcome(failures: u64) -> InclusionOutcome {
        InclusionOutcome {
            checked: 1,
            failures,
            duplicates: 0,
            first_failure: None,
        }
    }

    #[test]
    fn agreement_compares_verdicts() {
        let mismatch = Mismatch {
            kind: None,
            va: VirtualAddress::new(0x1000),
            intended: None,
            actual: Some(PhysicalAddress::new(0x2000)),
        };
        let mut report = CheckReport {
            forward: outcome(0),
            reverse: outcome(0),
            intended_maplets: 1,
            actual_maplets: 1,
            mismatch: None,
        };
        assert!(report.passed() && report.agrees());
        report.reverse = outcome(1);
        assert!(!report.agrees());
        report.mismatch = Some(mismatch);
        assert!(!report.passed() && report.agrees());
    }

    #[test]
    fn mismatch_display_names_both_sides() {
        let m = Mismatch {
            kind: Some(MappingKind::Stacks),
            va: VirtualAddress::new(0x1000),
            intended: Some(PhysicalAddress::new(0x8000)),
            actual: None,
        };
        let s = m.to_string();
        assert!(s.contains("stacks"));
        assert!(s.ends_with("actual unmapped"));
    }
}
