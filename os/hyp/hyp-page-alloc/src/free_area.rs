use crate::descriptor::{FreeLink, PageDescriptor};

/// Intrusive, index-linked FIFO of free group heads of one order.
///
/// The links live in the descriptors, so pushing, popping and removing an
/// arbitrary member are all O(1) and need no storage of their own.
///
/// # Invariants
/// - Every member's `link` is `Some`; following `next` from `head` reaches
///   `tail` after exactly `len` members.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct FreeArea {
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

#[inline]
fn link_mut(vmemmap: &mut [PageDescriptor], idx: u32) -> Option<&mut FreeLink> {
    vmemmap[idx as usize].link.as_mut()
}

impl FreeArea {
    pub(crate) const EMPTY: Self = Self {
        head: None,
        tail: None,
        len: 0,
    };

    #[inline]
    pub(crate) const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) const fn head(&self) -> Option<u32> {
        self.head
    }

    #[inline]
    pub(crate) const fn tail(&self) -> Option<u32> {
        self.tail
    }

    /// Append `idx` at the tail.
    pub(crate) fn push_back(&mut self, vmemmap: &mut [PageDescriptor], idx: u32) {
        debug_assert!(vmemmap[idx as usize].link.is_none(), "page already listed");
        vmemmap[idx as usize].link = Some(FreeLink {
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => {
                if let Some(link) = link_mut(vmemmap, tail) {
                    link.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
    }

    /// Unlink `idx`, which must be a member of this list.
    pub(crate) fn remove(&mut self, vmemmap: &mut [PageDescriptor], idx: u32) {
        debug_assert!(vmemmap[idx as usize].link.is_some(), "page {idx} is not listed");
        let Some(FreeLink { prev, next }) = vmemmap[idx as usize].link.take() else {
            return;
        };
        match prev {
            Some(p) => {
                if let Some(link) = link_mut(vmemmap, p) {
                    link.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(link) = link_mut(vmemmap, n) {
                    link.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    /// Members from head to tail. Stops after `len` steps even if the links
    /// are corrupt.
    pub(crate) fn iter<'v>(&self, vmemmap: &'v [PageDescriptor]) -> impl Iterator<Item = u32> + 'v {
        let mut cursor = self.head;
        let mut remaining = self.len;
        core::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let idx = cursor?;
            remaining -= 1;
            cursor = vmemmap[idx as usize].link.and_then(|l| l.next);
            Some(idx)
        })
    }
}
