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

//! Fixed-capacity columnar chunks.
//!
//! A chunk is a structure-of-arrays slab: one entity-id column plus one raw
//! column per non-tag component of the owning archetype. Columns are
//! separately allocated through the world allocator at the component's
//! alignment. Rows `[0, count)` are live; everything past `count` is
//! uninitialized memory.

use crate::alloc::Allocator;
use crate::entity::Entity;
use crate::error::Result;

/// One raw component column. `size` is bytes per row; the column holds
/// `capacity * size` bytes. Tag components never get a column.
pub(crate) struct Column {
    data: *mut u8,
    size: u32,
    align: u32,
}

impl Column {
    pub(crate) fn row_ptr(&self, row: u32) -> *mut u8 {
        // SAFETY: callers index rows within the chunk capacity.
        unsafe { self.data.add(row as usize * self.size as usize) }
    }

    pub(crate) fn base(&self) -> *mut u8 {
        self.data
    }
}

pub(crate) struct Chunk {
    entities: *mut Entity,
    columns: Box<[Column]>,
    capacity: u32,
    pub(crate) count: u32,
}

impl Chunk {
    /// Allocate a chunk with the given row capacity and one column per
    /// `(size, align)` layout. On any column failure everything already
    /// allocated is released again, leaving no partial chunk behind.
    pub(crate) fn allocate(
        allocator: &Allocator,
        capacity: u32,
        column_layouts: &[(u32, u32)],
    ) -> Result<Self> {
        let entity_bytes = capacity as usize * std::mem::size_of::<Entity>();
        let entity_align = std::mem::align_of::<Entity>();
        let entities = allocator.alloc_bytes(entity_bytes, entity_align)? as *mut Entity;

        let mut columns = Vec::with_capacity(column_layouts.len());
        for &(size, align) in column_layouts {
            let bytes = capacity as usize * size as usize;
            match allocator.alloc_bytes(bytes, align as usize) {
                Ok(data) => columns.push(Column { data, size, align }),
                Err(err) => {
                    for column in &columns {
                        allocator.free_bytes(
                            column.data,
                            capacity as usize * column.size as usize,
                            column.align as usize,
                        );
                    }
                    allocator.free_bytes(entities as *mut u8, entity_bytes, entity_align);
                    return Err(err);
                }
            }
        }

        Ok(Self {
            entities,
            columns: columns.into_boxed_slice(),
            capacity,
            count: 0,
        })
    }

    pub(crate) fn release(&mut self, allocator: &Allocator) {
        for column in self.columns.iter() {
            allocator.free_bytes(
                column.data,
                self.capacity as usize * column.size as usize,
                column.align as usize,
            );
        }
        allocator.free_bytes(
            self.entities as *mut u8,
            self.capacity as usize * std::mem::size_of::<Entity>(),
            std::mem::align_of::<Entity>(),
        );
        self.columns = Box::from([]);
        self.count = 0;
        self.capacity = 0;
    }

    pub(crate) fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub(crate) fn column(&self, index: u32) -> &Column {
        &self.columns[index as usize]
    }

    pub(crate) fn entity_base(&self) -> *const Entity {
        self.entities
    }

    pub(crate) fn entity_at(&self, row: u32) -> Entity {
        debug_assert!(row < self.count);
        // SAFETY: row is a live row.
        unsafe { *self.entities.add(row as usize) }
    }

    pub(crate) fn set_entity(&mut self, row: u32, entity: Entity) {
        debug_assert!(row < self.capacity);
        // SAFETY: row is within capacity and the column is owned by us.
        unsafe { *self.entities.add(row as usize) = entity }
    }
}
