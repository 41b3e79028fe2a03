use core::fmt;

/// Identifies a pool; stored in every descriptor as its back-reference.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PoolId(u16);

impl PoolId {
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

/// Free-list neighbours of a free group head, as descriptor indices.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct FreeLink {
    pub(crate) prev: Option<u32>,
    pub(crate) next: Option<u32>,
}

/// Out-of-band state of one physical page.
///
/// Descriptors form a dense table indexed by page number; the allocator
/// never stores anything inside the pages it manages.
///
/// # Invariants
/// - `link` is `Some` iff the page heads a free group.
/// - `order` is `Some` only on group heads (and reserved pages).
/// - `refcount` is non-zero only on heads of in-use groups.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PageDescriptor {
    pub(crate) refcount: u32,
    pub(crate) order: Option<u8>,
    pub(crate) pool: Option<PoolId>,
    pub(crate) link: Option<FreeLink>,
}

impl PageDescriptor {
    /// An unowned, zeroed descriptor, for statically sized tables.
    pub const EMPTY: Self = Self {
        refcount: 0,
        order: None,
        pool: None,
        link: None,
    };

    #[inline]
    #[must_use]
    pub const fn refcount(&self) -> u32 {
        self.refcount
    }

    /// `None` is the `NO_ORDER` marker of a group's body pages.
    #[inline]
    #[must_use]
    pub const fn order(&self) -> Option<u8> {
        self.order
    }

    #[inline]
    #[must_use]
    pub const fn pool(&self) -> Option<PoolId> {
        self.pool
    }

    #[inline]
    #[must_use]
    pub const fn is_free_listed(&self) -> bool {
        self.link.is_some()
    }
}
