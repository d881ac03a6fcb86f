//! Session registry: a generational arena of attached devices
//!
//! Completions carry a [`SessionId`] instead of a pointer to the session.
//! A slot's generation is bumped on removal, so an id that outlived its
//! session never resolves to a newer one.

use std::fmt;

/// Index of a session in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId {
    index: u32,
    generation: u32,
}

impl SessionId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
    reserved: bool,
}

/// Arena of sessions addressed by [`SessionId`]
pub struct SessionRegistry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SessionRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Claim a slot whose value is built later with [`fill`](Self::fill).
    ///
    /// The id does not resolve until filled.
    pub fn reserve(&mut self) -> SessionId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                    reserved: false,
                });
                self.slots.len() as u32 - 1
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.reserved = true;
        SessionId {
            index,
            generation: slot.generation,
        }
    }

    /// Store the value for a reserved id. Returns false if `id` is not reserved.
    pub fn fill(&mut self, id: SessionId, value: T) -> bool {
        match self.reserved_slot(id) {
            Some(slot) => {
                slot.reserved = false;
                slot.value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Give a reserved slot back without filling it
    pub fn release(&mut self, id: SessionId) {
        if let Some(slot) = self.reserved_slot(id) {
            slot.reserved = false;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
        }
    }

    /// Insert a value built from its own id.
    ///
    /// Nothing is inserted if `build` fails.
    pub fn try_insert_with<F, E>(&mut self, build: F) -> Result<SessionId, E>
    where
        F: FnOnce(SessionId) -> Result<T, E>,
    {
        let id = self.reserve();
        match build(id) {
            Ok(value) => {
                self.fill(id, value);
                Ok(id)
            }
            Err(e) => {
                self.release(id);
                Err(e)
            }
        }
    }

    fn reserved_slot(&mut self, id: SessionId) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.reserved && slot.generation == id.generation)
    }

    pub fn get(&self, id: SessionId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Remove a value; its id stops resolving
    pub fn remove(&mut self, id: SessionId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids and values of all live entries
    pub fn iter(&self) -> impl Iterator<Item = (SessionId, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    SessionId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}
