use core::fmt;

/// The logical regions the hypervisor maps at boot.
///
/// Each kind is recorded at most once, except [`PerCpu`](Self::PerCpu),
/// which is recorded once per CPU.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MappingKind {
    Text,
    Rodata,
    RodataAfterInit,
    Bss,
    /// The tail of `.bss` that becomes read-only after init.
    BssReadOnly,
    /// The identity-mapped boot trampoline.
    Idmap,
    Stacks,
    /// Backing store of the page descriptor table.
    Vmemmap,
    S1Pgtable,
    S2MemPgtable,
    S2DevPgtable,
    /// What is left of the boot workspace after it was divided up.
    Workspace,
    /// The page descriptor table at its own virtual address, back-mapped
    /// onto [`Vmemmap`](Self::Vmemmap).
    VmemmapMap,
    Uart,
    PerCpu,
}

impl MappingKind {
    pub const ALL: [Self; 15] = [
        Self::Text,
        Self::Rodata,
        Self::RodataAfterInit,
        Self::Bss,
        Self::BssReadOnly,
        Self::Idmap,
        Self::Stacks,
        Self::Vmemmap,
        Self::S1Pgtable,
        Self::S2MemPgtable,
        Self::S2DevPgtable,
        Self::Workspace,
        Self::VmemmapMap,
        Self::Uart,
        Self::PerCpu,
    ];

    pub const COUNT: usize = Self::ALL.len();

    #[must_use]
    pub const fn is_per_cpu(self) -> bool {
        matches!(self, Self::PerCpu)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Rodata => "rodata",
            Self::RodataAfterInit => "rodata-after-init",
            Self::Bss => "bss",
            Self::BssReadOnly => "bss-ro",
            Self::Idmap => "idmap",
            Self::Stacks => "stacks",
            Self::Vmemmap => "vmemmap",
            Self::S1Pgtable => "s1-pgtable",
            Self::S2MemPgtable => "s2-mem-pgtable",
            Self::S2DevPgtable => "s2-dev-pgtable",
            Self::Workspace => "workspace",
            Self::VmemmapMap => "vmemmap-map",
            Self::Uart => "uart",
            Self::PerCpu => "percpu",
        }
    }
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_percpu_is_per_cpu() {
        let per_cpu: Vec<_> = MappingKind::ALL.iter().filter(|k| k.is_per_cpu()).collect();
        assert_eq!(per_cpu, [&MappingKind::PerCpu]);
    }

    #[test]
    fn names_are_distinct() {
        for (i, a) in MappingKind::ALL.iter().enumerate() {
            for b in &MappingKind::ALL[i + 1..] {
                assert_ne!(a.as_str(), b.as_str());
            }
        }
    }
}
