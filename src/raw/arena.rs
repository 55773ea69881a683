use alloc::vec::Vec;

use super::handle::Handle;
use crate::error::{Error, Result};

/// Slot storage addressed by [`Handle`], recycling freed slots.
#[derive(Clone)]
pub(crate) struct Arena<T> {
    slots: Vec<Option<T>>,
    free: Vec<Handle>,
}

impl<T> Arena<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.slots.len().saturating_sub(self.free.len())
    }

    #[cfg(test)]
    pub(crate) const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ensures the next `additional` calls to [`Arena::alloc`] cannot fail.
    pub(crate) fn try_reserve(&mut self, additional: usize) -> Result<()> {
        let fresh = additional.saturating_sub(self.free.len());
        if fresh == 0 {
            return Ok(());
        }
        // Slots beyond `Handle::MAX` have no handle.
        if self.slots.len() + fresh > Handle::MAX + 1 {
            return Err(Error::AllocationFailure { nodes: additional });
        }
        self.slots
            .try_reserve(fresh)
            .map_err(|_| Error::AllocationFailure { nodes: additional })
    }

    pub(crate) fn alloc(&mut self, element: T) -> Result<Handle> {
        if let Some(h) = self.free.pop() {
            // Reuse a free slot/handle.
            self.slots[h.to_index()] = Some(element);
            return Ok(h);
        }

        self.try_reserve(1)?;
        let handle = Handle::from_index(self.slots.len()).ok_or(Error::AllocationFailure { nodes: 1 })?;
        self.slots.push(Some(element));
        Ok(handle)
    }

    #[inline]
    pub(crate) fn get(&self, handle: Handle) -> Result<&T> {
        self.slots
            .get(handle.to_index())
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidArgument {
                handle: handle.to_index(),
            })
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, handle: Handle) -> Result<&mut T> {
        self.slots
            .get_mut(handle.to_index())
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidArgument {
                handle: handle.to_index(),
            })
    }

    pub(crate) fn take(&mut self, handle: Handle) -> Result<T> {
        let element = self
            .slots
            .get_mut(handle.to_index())
            .and_then(Option::take)
            .ok_or(Error::InvalidArgument {
                handle: handle.to_index(),
            })?;
        self.free.push(handle);
        Ok(element)
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }

    /// Iterates over live slots.
    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| Some((Handle::from_index(index)?, slot.as_ref()?)))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn stale_handle_is_invalid_argument() {
        let mut arena: Arena<u32> = Arena::new();
        let handle = arena.alloc(5).unwrap();
        assert_eq!(arena.take(handle), Ok(5));
        assert_eq!(arena.get(handle), Err(Error::InvalidArgument { handle: 0 }));
        assert_eq!(arena.take(handle), Err(Error::InvalidArgument { handle: 0 }));
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.alloc(1).unwrap();
        let _b = arena.alloc(2).unwrap();
        arena.take(a).unwrap();
        let c = arena.alloc(3).unwrap();
        assert_eq!(a, c);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn reservation_beyond_handle_space_fails() {
        let mut arena: Arena<u8> = Arena::new();
        assert_eq!(arena.try_reserve(Handle::MAX + 2), Err(Error::AllocationFailure { nodes: Handle::MAX + 2 }));
        assert!(arena.try_reserve(4).is_ok());
        assert!(arena.is_empty());
    }

    proptest! {
        #[test]
        fn arena_behaves_like_vec(operations in prop::collection::vec(strategy(), 0..256)) {
            let mut model: Vec<(Handle, u32)> = Vec::new();
            let mut arena: Arena<u32> = Arena::new();

            for operation in operations {
                match operation {
                    Operation::Alloc(value) => {
                        let handle = arena.alloc(value).unwrap();
                        model.push((handle, value));
                    }
                    Operation::GetMut(which, value) => {
                        if model.is_empty() {
                            continue;
                        }

                        let index = which % model.len();
                        let handle = model[index].0;
                        *arena.get_mut(handle).unwrap() = value;
                        model[index].1 = value;
                    }
                    Operation::Take(which) => {
                        if model.is_empty() {
                            continue;
                        }

                        let index = which % model.len();
                        let handle = model[index].0;
                        let value1 = arena.take(handle).unwrap();
                        let (_, value2) = model.swap_remove(index);
                        prop_assert_eq!(value1, value2);
                    }
                    Operation::Clear => {
                        arena.clear();
                        model.clear();
                    }
                }

                prop_assert_eq!(arena.len(), model.len());
                prop_assert_eq!(arena.is_empty(), model.is_empty());
                prop_assert_eq!(arena.iter().count(), model.len());

                for &(handle, value) in &model {
                    prop_assert_eq!(*arena.get(handle).unwrap(), value);
                }
            }
        }
    }

    #[derive(Clone, Debug)]
    enum Operation {
        Alloc(u32),
        GetMut(usize, u32),
        Take(usize),
        Clear,
    }

    fn strategy() -> impl Strategy<Value = Operation> {
        prop_oneof![
            20 => any::<u32>().prop_map(Operation::Alloc),
            5 => (any::<usize>(), any::<u32>()).prop_map(|(which, value)| Operation::GetMut(which, value)),
            5 => any::<usize>().prop_map(Operation::Take),
            1 => Just(Operation::Clear),
        ]
    }
}
