//! Generational slot pool
//!
//! Recycling arena for short-lived runtime objects: actor cells on a strand and
//! envelope nodes inside a mailbox. A [`Handle`] is a slot index plus the slot's
//! generation; removing a value bumps the generation, so a handle that outlived its
//! value resolves to `None` instead of aliasing whatever reuses the slot.
//!
//! A pool is owned by exactly one strand (or one mailbox) and is never shared.

/// Index plus generation. Generation `0` is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    pub index: u32,
    pub generation: u32,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    max: Option<usize>,
}

impl<T> Pool<T> {
    /// Pool with `reserve` slots preallocated and an optional slot ceiling.
    pub fn new(reserve: usize, max: Option<usize>) -> Self {
        Self {
            slots: Vec::with_capacity(reserve),
            free: Vec::with_capacity(reserve),
            len: 0,
            max,
        }
    }

    /// Store `value`; hands it back when the pool is at its ceiling.
    pub fn insert(&mut self, value: T) -> Result<Handle, T> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.len += 1;
            return Ok(Handle {
                index,
                generation: slot.generation,
            });
        }

        let full = self.max.is_some_and(|max| self.slots.len() >= max);
        if full || self.slots.len() >= u32::MAX as usize {
            return Err(value);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        self.len += 1;
        Ok(Handle {
            index,
            generation: 1,
        })
    }

    /// Handle the next [`insert`](Self::insert) would return, if it would succeed.
    pub fn next_handle(&self) -> Option<Handle> {
        match self.free.last() {
            Some(&index) => Some(Handle {
                index,
                generation: self.slots[index as usize].generation,
            }),
            None if self.max.is_some_and(|max| self.slots.len() >= max) => None,
            None => Some(Handle {
                index: self.slots.len() as u32,
                generation: 1,
            }),
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Take the value out and retire the handle.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slots ever allocated, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Handle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Drop every value, retiring all outstanding handles.
    pub fn clear(&mut self) {
        let handles: Vec<Handle> = self.iter().map(|(handle, _)| handle).collect();
        for handle in handles {
            self.remove(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recycled_slot_gets_new_generation() {
        let mut pool = Pool::new(4, None);
        let a = pool.insert("a").unwrap();
        assert_eq!(pool.remove(a), Some("a"));

        let b = pool.insert("b").unwrap();
        assert_eq!(a.index, b.index);
        assert_ne!(a.generation, b.generation);
        assert_eq!(pool.get(a), None);
        assert_eq!(pool.get(b), Some(&"b"));
        assert_eq!(pool.remove(a), None);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_ceiling_returns_value() {
        let mut pool = Pool::new(0, Some(2));
        pool.insert(1).unwrap();
        let h = pool.insert(2).unwrap();
        assert_eq!(pool.insert(3), Err(3));
        assert_eq!(pool.next_handle(), None);

        pool.remove(h);
        assert_eq!(pool.next_handle().map(|n| n.index), Some(h.index));
        assert!(pool.insert(3).is_ok());
    }

    #[test]
    fn test_next_handle_predicts_insert() {
        let mut pool = Pool::new(1, None);
        let predicted = pool.next_handle().unwrap();
        assert_eq!(pool.insert('x').unwrap(), predicted);
        pool.remove(predicted);
        let predicted = pool.next_handle().unwrap();
        assert_eq!(pool.insert('y').unwrap(), predicted);
    }

    #[test]
    fn test_iter_and_clear() {
        let mut pool = Pool::new(0, None);
        let handles: Vec<_> = (0..5).map(|i| pool.insert(i).unwrap()).collect();
        pool.remove(handles[2]);
        let live: Vec<_> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec![0, 1, 3, 4]);

        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.capacity(), 5);
        assert!(handles.iter().all(|h| !pool.contains(*h)));
    }
}
