/// A vector-like data structure that hands out stable, generation-tagged keys.
///
/// `SlotVec` stores values in a `Vec` of slots and reuses vacated slots through
/// a free list. Every slot carries a generation counter that is bumped whenever
/// the slot is vacated, so a [`SlotKey`] obtained before a removal never
/// resolves to a value inserted afterwards into the same slot.
///
/// Insertion and removal are O(1); iteration order is unspecified.
///
/// # Examples
///
/// ```
/// use vigil_slot_vec::SlotVec;
///
/// let mut v = SlotVec::<u64>::new();
/// let a = v.insert(100);
/// let b = v.insert(300);
///
/// assert_eq!(v.get(a), Some(&100));
/// assert_eq!(v.remove(b), Some(300));
/// assert!(v.get(b).is_none());
///
/// // The vacated slot is reused, but the stale key stays stale.
/// let c = v.insert(500);
/// assert!(v.get(b).is_none());
/// assert_eq!(v.get(c), Some(&500));
/// ```
#[derive(Clone, Default)]
pub struct SlotVec<V> {
    /// The underlying slots, occupied or vacant.
    slots: Vec<Slot<V>>,
    /// Indices of vacant slots, reused in LIFO order.
    free: Vec<u32>,
    /// Number of occupied slots.
    len: usize,
}

/// A key identifying an occupied slot of a [`SlotVec`] at a specific generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

impl SlotKey {
    /// Returns the slot index this key refers to.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Returns the generation this key was issued at.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Clone, Default)]
struct Slot<V> {
    generation: u32,
    value: Option<V>,
}

impl<V> SlotVec<V> {
    /// Creates a new empty `SlotVec`.
    pub fn new() -> SlotVec<V> {
        SlotVec {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Returns the number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` in a vacant slot (reusing one if available) and returns
    /// its key.
    ///
    /// # Panics
    ///
    /// Panics if the number of slots exceeds `u32::MAX`.
    pub fn insert(&mut self, value: V) -> SlotKey {
        let key = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            SlotKey {
                index,
                generation: slot.generation,
            }
        } else {
            let index = u32::try_from(self.slots.len()).expect("slot index overflow");
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            SlotKey {
                index,
                generation: 0,
            }
        };
        self.len += 1;
        key
    }

    /// Checks whether `key` still refers to an occupied slot.
    pub fn contains_key(&self, key: SlotKey) -> bool {
        self.get(key).is_some()
    }

    /// Returns a reference to the value stored under `key`, or `None` if the key
    /// is stale or was never issued by this `SlotVec`.
    pub fn get(&self, key: SlotKey) -> Option<&V> {
        self.slots
            .get(key.index())
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Removes the value stored under `key` and returns it.
    ///
    /// Removing a stale or unknown key is a no-op that returns `None`, so a key
    /// may be removed any number of times.
    pub fn remove(&mut self, key: SlotKey) -> Option<V> {
        let slot = self
            .slots
            .get_mut(key.index())
            .filter(|slot| slot.generation == key.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    /// Vacates every occupied slot, bumping its generation so that all
    /// previously issued keys become stale. Returns the number of values removed.
    ///
    /// The walk stops at the last occupied slot it finds.
    pub fn clear(&mut self) -> usize {
        let removed = self.len;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if self.len == 0 {
                break;
            }
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                self.len -= 1;
            }
        }
        removed
    }

    /// Returns an iterator over the key-value pairs of the occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &V)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    SlotKey {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Verifies the internal consistency of the `SlotVec`.
    ///
    /// # Panics
    ///
    /// Panics if the internal state of the `SlotVec` is inconsistent.
    pub fn verify(&self) {
        let occupied = self.slots.iter().filter(|s| s.value.is_some()).count();
        assert_eq!(occupied, self.len);
        assert_eq!(occupied + self.free.len(), self.slots.len());
        for &index in &self.free {
            assert!(self.slots[index as usize].value.is_none());
        }
    }
}

impl<V> std::fmt::Debug for SlotVec<V>
where
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
