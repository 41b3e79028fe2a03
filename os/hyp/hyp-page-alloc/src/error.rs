use crate::descriptor::PoolId;
use hyp_memory_addresses::PhysicalAddress;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolInitError {
    #[error("pool start {0} is not page aligned")]
    Misaligned(PhysicalAddress),
    #[error("a pool of {0} pages does not fit the physical address space")]
    RangeOverflow(usize),
    #[error("a pool of {0} pages exceeds the descriptor index range")]
    TooManyPages(usize),
    #[error("descriptor table holds {provided} entries but {needed} are needed")]
    VmemmapTooSmall { needed: usize, provided: usize },
    #[error("{reserved} reserved pages exceed the pool's {pages} pages")]
    ReservedExceedsRange { reserved: usize, pages: usize },
    #[error("pool inconsistent after init: {0}")]
    Invariant(#[from] InvariantViolation),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("order {0} exceeds the maximum order")]
    OrderTooLarge(u8),
    #[error("out of memory")]
    NoMemory,
}

/// Reference-count misuse detectable without touching inconsistent state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefError {
    #[error("{0} is not managed by this pool")]
    OutOfRange(PhysicalAddress),
    #[error("{0} lies in the pool's reserved prefix")]
    Reserved(PhysicalAddress),
    #[error("descriptor of {0} belongs to another pool")]
    ForeignDescriptor(PhysicalAddress),
    #[error("{0} is part of a free page group")]
    NotAllocated(PhysicalAddress),
    #[error("no page group covers {0}")]
    NoGroup(PhysicalAddress),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no room for another pool")]
    Full,
    #[error("{0} is already registered")]
    DuplicateId(PoolId),
    #[error("{new} overlaps {existing}")]
    Overlap { new: PoolId, existing: PoolId },
}

/// First broken allocator invariant found by
/// [`HypPool::check_invariant`](crate::HypPool::check_invariant).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("descriptor of {0} is not owned by this pool")]
    ForeignDescriptor(PhysicalAddress),
    #[error("{addr} carries order {order} beyond the maximum")]
    OrderOutOfRange { addr: PhysicalAddress, order: u8 },
    #[error("reserved page {0} is not a plain in-use page")]
    ReservedPageTouched(PhysicalAddress),
    #[error("no group head at {0}")]
    MissingHead(PhysicalAddress),
    #[error("group at {addr} of order {order} is misaligned")]
    Misaligned { addr: PhysicalAddress, order: u8 },
    #[error("group at {addr} of order {order} extends past the pool")]
    GroupOutOfRange { addr: PhysicalAddress, order: u8 },
    #[error("free group at {addr} has refcount {refcount}")]
    FreeGroupReferenced { addr: PhysicalAddress, refcount: u32 },
    #[error("group at {0} is neither free nor referenced")]
    Orphaned(PhysicalAddress),
    #[error("body page {0} carries head state")]
    BodyPageTagged(PhysicalAddress),
    #[error("free buddies {addr} and {buddy} of order {order} were not merged")]
    Uncoalesced {
        addr: PhysicalAddress,
        buddy: PhysicalAddress,
        order: u8,
    },
    #[error("free list {list} holds {addr} of order {order:?}")]
    WrongList {
        list: u8,
        addr: PhysicalAddress,
        order: Option<u8>,
    },
    #[error("free list {0} has broken links")]
    BrokenLinks(u8),
    #[error("free lists hold {listed} groups but {found} free groups exist")]
    ListCountMismatch { listed: usize, found: usize },
}
