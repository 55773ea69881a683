use core::fmt;
use core::num::NonZero;

#[cfg(test)]
type RawHandle = u16;
#[cfg(not(test))]
type RawHandle = u32;

/// Stable address of a node slot in the arena.
///
/// Parent links and leaf-chain links are plain handles; only the parent's
/// child array owns a node.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub(crate) struct Handle(NonZero<RawHandle>);

impl Handle {
    pub(crate) const MAX: usize = (RawHandle::MAX - 1) as usize;

    /// Converts a slot index into a handle, or `None` past `Handle::MAX`.
    #[inline]
    pub(crate) const fn from_index(index: usize) -> Option<Self> {
        if index > Self::MAX {
            return None;
        }
        // `index + 1` cannot be zero and cannot overflow.
        #[allow(clippy::cast_possible_truncation)]
        let raw = (index + 1) as RawHandle;
        match NonZero::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    #[inline]
    pub(crate) const fn to_index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_index())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::format;
    use proptest::prelude::*;
    use static_assertions::assert_eq_size;

    // Verify our assumptions about `Handle` and the niche optimization.
    assert_eq_size!(Handle, Option<Handle>);
    assert_eq_size!(Handle, RawHandle);

    #[test]
    fn out_of_range_index_has_no_handle() {
        assert!(Handle::from_index(Handle::MAX + 1).is_none());
        assert!(Handle::from_index(Handle::MAX).is_some());
    }

    #[test]
    fn display_shows_slot_index() {
        let handle = Handle::from_index(7).unwrap();
        assert_eq!(format!("{handle}"), "#7");
    }

    proptest! {
        #[test]
        fn handle_round_trip(index in 0..=Handle::MAX) {
            let handle = Handle::from_index(index).unwrap();
            prop_assert_eq!(handle.to_index(), index);
        }
    }
}
