// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entity identifiers, slot table and location metadata.

use crate::error::{EcsError, Result};

/// Opaque generational entity handle.
///
/// Packed as `(generation << 32) | index`. The null handle is all zeroes;
/// live handles always carry a non-zero generation, so reusing a slot after
/// destruction yields a handle that compares unequal to every prior one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Entity(u64);

impl Entity {
    /// The null handle. Never refers to a live entity.
    pub const NULL: Entity = Entity(0);

    pub(crate) fn pack(index: u32, generation: u32) -> Self {
        Entity(((generation as u64) << 32) | index as u64)
    }

    /// Slot index (low 32 bits).
    pub fn index(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// Generation (high 32 bits).
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Raw packed value.
    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Entity location inside the archetype graph: all index-based, no pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntityLocation {
    pub archetype: u32,
    pub chunk: u32,
    pub row: u32,
}

impl EntityLocation {
    pub(crate) const DANGLING: EntityLocation = EntityLocation {
        archetype: u32::MAX,
        chunk: u32::MAX,
        row: u32::MAX,
    };
}

const NO_FREE_SLOT: u32 = u32::MAX;

/// One slot per ever-allocated entity index. Either alive with a valid
/// location, or dead and linked into the LIFO free list.
#[derive(Debug, Clone)]
pub(crate) struct EntitySlot {
    pub generation: u32,
    pub alive: bool,
    pub next_free: u32,
    pub location: EntityLocation,
}

/// Slotted entity table with geometric growth and slot recycling.
pub(crate) struct EntityTable {
    slots: Vec<EntitySlot>,
    capacity: u32,
    free_head: u32,
    free_count: u32,
    live_count: u32,
}

impl EntityTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            capacity: 0,
            free_head: NO_FREE_SLOT,
            free_count: 0,
            live_count: 0,
        }
    }

    /// Grow the slot storage to at least `min_capacity` (start 64, doubling).
    /// The capacity is a u32, so growth past `u32::MAX / 2` is refused.
    pub(crate) fn reserve(&mut self, min_capacity: u32) -> Result<()> {
        if self.capacity >= min_capacity {
            return Ok(());
        }
        let mut new_capacity = if self.capacity == 0 { 64 } else { self.capacity };
        while new_capacity < min_capacity {
            if new_capacity > u32::MAX / 2 {
                return Err(EcsError::CapacityReached);
            }
            new_capacity *= 2;
        }
        self.slots
            .reserve_exact(new_capacity as usize - self.slots.len());
        self.capacity = new_capacity;
        Ok(())
    }

    /// Make sure the next `allocate` cannot fail on capacity.
    pub(crate) fn ensure_one_free(&mut self) -> Result<()> {
        if self.free_head != NO_FREE_SLOT {
            return Ok(());
        }
        let needed = self
            .slots
            .len()
            .checked_add(1)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(EcsError::CapacityReached)?;
        self.reserve(needed)
    }

    /// Take a slot: the free-list head when available, otherwise a fresh
    /// index. Call `ensure_one_free` first; this never allocates.
    pub(crate) fn allocate(&mut self) -> (u32, u32) {
        let index = if self.free_head != NO_FREE_SLOT {
            let index = self.free_head;
            let slot = &mut self.slots[index as usize];
            self.free_head = slot.next_free;
            self.free_count -= 1;
            slot.alive = true;
            slot.next_free = NO_FREE_SLOT;
            index
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(EntitySlot {
                generation: 1,
                alive: true,
                next_free: NO_FREE_SLOT,
                location: EntityLocation::DANGLING,
            });
            index
        };
        self.live_count += 1;
        (index, self.slots[index as usize].generation)
    }

    /// Retire a live slot: bump the generation (skipping zero) and push it
    /// onto the LIFO free list.
    pub(crate) fn retire(&mut self, index: u32) {
        let free_head = self.free_head;
        let slot = &mut self.slots[index as usize];
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        if slot.generation == 0 {
            slot.generation = 1;
        }
        slot.location = EntityLocation::DANGLING;
        slot.next_free = free_head;
        self.free_head = index;
        self.free_count += 1;
        self.live_count -= 1;
    }

    /// Resolve a handle to its live slot index, or `StaleEntity`.
    pub(crate) fn resolve(&self, entity: Entity) -> Result<u32> {
        if entity.is_null() {
            return Err(EcsError::InvalidArgument);
        }
        let index = entity.index();
        let slot = self
            .slots
            .get(index as usize)
            .ok_or(EcsError::StaleEntity)?;
        if !slot.alive || slot.generation != entity.generation() {
            return Err(EcsError::StaleEntity);
        }
        Ok(index)
    }

    pub(crate) fn is_alive(&self, entity: Entity) -> bool {
        if entity.is_null() {
            return false;
        }
        match self.slots.get(entity.index() as usize) {
            Some(slot) => slot.alive && slot.generation == entity.generation(),
            None => false,
        }
    }

    pub(crate) fn location(&self, index: u32) -> EntityLocation {
        self.slots[index as usize].location
    }

    pub(crate) fn set_location(&mut self, index: u32, location: EntityLocation) {
        self.slots[index as usize].location = location;
    }

    pub(crate) fn live_count(&self) -> u32 {
        self.live_count
    }

    pub(crate) fn free_count(&self) -> u32 {
        self.free_count
    }

    pub(crate) fn allocated(&self) -> u32 {
        self.slots.len() as u32
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Live handles in ascending slot order.
    pub(crate) fn live_handles(&self) -> Vec<Entity> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.alive)
            .map(|(index, slot)| Entity::pack(index as u32, slot.generation))
            .collect()
    }
}
