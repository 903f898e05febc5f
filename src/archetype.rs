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

//! Archetype storage with row allocation and swap-removal.
//!
//! An archetype is identified by its sorted set of component ids and owns a
//! list of fixed-capacity chunks. The store keeps a hash index on the
//! sorted key so transitions resolve without scanning.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::alloc::Allocator;
use crate::chunk::Chunk;
use crate::component::{
    ComponentCtor, ComponentDtor, ComponentId, ComponentMove, ComponentRegistry,
};
use crate::entity::Entity;
use crate::error::{EcsError, Result};

/// Upper bound on rows per chunk regardless of the byte budget.
pub(crate) const ROWS_PER_CHUNK_LIMIT: u32 = 4096;

const NO_COLUMN: u32 = u32::MAX;

/// Sorted, duplicate-free set of component ids.
pub(crate) type ArchetypeKey = SmallVec<[ComponentId; 8]>;

/// Sorted key with `id` merged in. Pure; the input must not contain `id`.
pub(crate) fn key_with_add(key: &[ComponentId], id: ComponentId) -> ArchetypeKey {
    let mut out = ArchetypeKey::with_capacity(key.len() + 1);
    let insert_at = key.partition_point(|&existing| existing < id);
    out.extend_from_slice(&key[..insert_at]);
    out.push(id);
    out.extend_from_slice(&key[insert_at..]);
    out
}

/// Sorted key with `id` omitted. Pure; the input must contain `id`.
pub(crate) fn key_with_remove(key: &[ComponentId], id: ComponentId) -> ArchetypeKey {
    key.iter().copied().filter(|&existing| existing != id).collect()
}

/// Per-archetype copy of the component layout and hooks, resolved once at
/// archetype creation so structural moves never touch the registry.
pub(crate) struct ComponentMeta {
    pub id: ComponentId,
    pub size: u32,
    pub tag: bool,
    pub trivially_relocatable: bool,
    column: u32,
    pub ctor: Option<ComponentCtor>,
    pub dtor: Option<ComponentDtor>,
    pub move_fn: Option<ComponentMove>,
}

impl ComponentMeta {
    /// Relocate one row between columns of this component.
    ///
    /// # Safety
    /// `dst` and `src` must be valid, non-overlapping rows of `size` bytes.
    pub(crate) unsafe fn relocate(&self, dst: *mut u8, src: *const u8) {
        if self.trivially_relocatable || self.move_fn.is_none() {
            std::ptr::copy_nonoverlapping(src, dst, self.size as usize);
        } else if let Some(move_fn) = &self.move_fn {
            move_fn(dst, src, 1);
        }
    }
}

/// Structure-of-arrays container for all entities sharing one component set.
pub struct Archetype {
    key: ArchetypeKey,
    metas: Box<[ComponentMeta]>,
    column_layouts: Box<[(u32, u32)]>,
    rows_per_chunk: u32,
    chunks: Vec<Chunk>,
}

impl Archetype {
    fn new(key: ArchetypeKey, registry: &ComponentRegistry, target_chunk_bytes: u32) -> Result<Self> {
        let mut metas = Vec::with_capacity(key.len());
        let mut column_layouts = Vec::new();
        let mut row_bytes = std::mem::size_of::<Entity>() as u64;

        for &id in &key {
            let record = registry.get(id).ok_or(EcsError::NotFound)?;
            let column = if record.is_tag() {
                NO_COLUMN
            } else {
                column_layouts.push((record.size, record.align));
                row_bytes += record.size as u64;
                (column_layouts.len() - 1) as u32
            };
            metas.push(ComponentMeta {
                id,
                size: record.size,
                tag: record.is_tag(),
                trivially_relocatable: record
                    .flags
                    .contains(crate::component::ComponentFlags::TRIVIALLY_RELOCATABLE),
                column,
                ctor: record.ctor.clone(),
                dtor: record.dtor.clone(),
                move_fn: record.move_fn.clone(),
            });
        }

        let rows_per_chunk =
            ((target_chunk_bytes as u64 / row_bytes) as u32).clamp(1, ROWS_PER_CHUNK_LIMIT);

        Ok(Self {
            key,
            metas: metas.into_boxed_slice(),
            column_layouts: column_layouts.into_boxed_slice(),
            rows_per_chunk,
            chunks: Vec::new(),
        })
    }

    pub(crate) fn key(&self) -> &[ComponentId] {
        &self.key
    }

    pub(crate) fn metas(&self) -> &[ComponentMeta] {
        &self.metas
    }

    pub(crate) fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub(crate) fn rows_per_chunk(&self) -> u32 {
        self.rows_per_chunk
    }

    /// Does this archetype carry `id`? The key is sorted, so binary search.
    pub(crate) fn contains(&self, id: ComponentId) -> bool {
        self.key.binary_search(&id).is_ok()
    }

    /// Index of `id` within the key (and `metas`).
    pub(crate) fn meta_index(&self, id: ComponentId) -> Option<usize> {
        self.key.binary_search(&id).ok()
    }

    /// Pointer to one component row, or null for tag components.
    pub(crate) fn component_ptr(&self, chunk: u32, row: u32, meta_index: usize) -> *mut u8 {
        let meta = &self.metas[meta_index];
        if meta.column == NO_COLUMN {
            return std::ptr::null_mut();
        }
        self.chunks[chunk as usize].column(meta.column).row_ptr(row)
    }

    /// Base pointer of one component column, or null for tags.
    pub(crate) fn column_base(&self, chunk: u32, meta_index: usize) -> *mut u8 {
        let meta = &self.metas[meta_index];
        if meta.column == NO_COLUMN {
            return std::ptr::null_mut();
        }
        self.chunks[chunk as usize].column(meta.column).base()
    }

    /// Take a row: the first chunk with spare capacity, or a fresh chunk
    /// appended to the list. Returns `(chunk, row, allocated_new_chunk)`.
    pub(crate) fn alloc_row(&mut self, allocator: &Allocator) -> Result<(u32, u32, bool)> {
        for (index, chunk) in self.chunks.iter_mut().enumerate() {
            if !chunk.is_full() {
                let row = chunk.count;
                chunk.count += 1;
                return Ok((index as u32, row, false));
            }
        }
        let chunk = Chunk::allocate(allocator, self.rows_per_chunk, &self.column_layouts)?;
        self.chunks.push(chunk);
        let index = (self.chunks.len() - 1) as u32;
        let chunk = &mut self.chunks[index as usize];
        chunk.count = 1;
        Ok((index, 0, true))
    }

    pub(crate) fn chunk(&self, index: u32) -> &Chunk {
        &self.chunks[index as usize]
    }

    pub(crate) fn chunk_mut(&mut self, index: u32) -> &mut Chunk {
        &mut self.chunks[index as usize]
    }

    /// Remove `row` from `chunk` by moving the last live row into its place.
    /// Returns the entity that was relocated, if any; the caller must patch
    /// that entity's slot back-pointer.
    pub(crate) fn swap_remove(&mut self, chunk_index: u32, row: u32) -> Option<Entity> {
        let chunk = &mut self.chunks[chunk_index as usize];
        let last = chunk.count - 1;
        if row == last {
            chunk.count = last;
            return None;
        }

        let moved = chunk.entity_at(last);
        chunk.set_entity(row, moved);
        for meta in self.metas.iter() {
            if meta.column == NO_COLUMN {
                continue;
            }
            let column = chunk.column(meta.column);
            let src = column.row_ptr(last);
            let dst = column.row_ptr(row);
            // SAFETY: row != last, so the two rows never overlap; both are
            // live rows of this column.
            unsafe { meta.relocate(dst, src) };
        }
        chunk.count = last;
        Some(moved)
    }

    /// Run the dtor hooks for every component of one row.
    pub(crate) fn drop_row(&self, chunk_index: u32, row: u32) {
        for (meta_index, meta) in self.metas.iter().enumerate() {
            if let Some(dtor) = &meta.dtor {
                let ptr = self.component_ptr(chunk_index, row, meta_index);
                if !ptr.is_null() || meta.tag {
                    dtor(ptr, 1);
                }
            }
        }
    }

    /// Run the dtor hooks over every live row of every chunk. Used on world
    /// teardown, where whole columns can be swept at once.
    pub(crate) fn drop_all_rows(&self) {
        for (chunk_index, chunk) in self.chunks.iter().enumerate() {
            if chunk.count == 0 {
                continue;
            }
            for (meta_index, meta) in self.metas.iter().enumerate() {
                if let Some(dtor) = &meta.dtor {
                    let base = self.column_base(chunk_index as u32, meta_index);
                    if !base.is_null() || meta.tag {
                        dtor(base, chunk.count);
                    }
                }
            }
        }
    }

    pub(crate) fn release_chunks(&mut self, allocator: &Allocator) {
        for chunk in &mut self.chunks {
            chunk.release(allocator);
        }
        self.chunks.clear();
    }
}

/// The set of all archetypes, keyed by sorted component-id set.
pub(crate) struct ArchetypeStore {
    archetypes: Vec<Archetype>,
    index: AHashMap<ArchetypeKey, u32>,
}

impl ArchetypeStore {
    /// Create the store with the root archetype (empty key) at index 0.
    pub(crate) fn new(registry: &ComponentRegistry, target_chunk_bytes: u32) -> Self {
        let mut store = Self {
            archetypes: Vec::with_capacity(16),
            index: AHashMap::with_capacity(16),
        };
        // The empty key references no components, so this cannot fail.
        let root = Archetype::new(ArchetypeKey::new(), registry, target_chunk_bytes)
            .unwrap_or_else(|_| unreachable!("root archetype has no components"));
        store.index.insert(ArchetypeKey::new(), 0);
        store.archetypes.push(root);
        store
    }

    pub(crate) const ROOT: u32 = 0;

    pub(crate) fn find_or_create(
        &mut self,
        key: ArchetypeKey,
        registry: &ComponentRegistry,
        target_chunk_bytes: u32,
    ) -> Result<u32> {
        if let Some(&index) = self.index.get(&key) {
            return Ok(index);
        }
        if self.archetypes.len() as u64 >= u32::MAX as u64 {
            return Err(EcsError::CapacityReached);
        }
        let archetype = Archetype::new(key.clone(), registry, target_chunk_bytes)?;
        self.archetypes.push(archetype);
        let index = (self.archetypes.len() - 1) as u32;
        self.index.insert(key, index);
        Ok(index)
    }

    pub(crate) fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn get(&self, index: u32) -> &Archetype {
        &self.archetypes[index as usize]
    }

    pub(crate) fn get_mut(&mut self, index: u32) -> &mut Archetype {
        &mut self.archetypes[index as usize]
    }

    pub(crate) fn len(&self) -> u32 {
        self.archetypes.len() as u32
    }

    /// Disjoint mutable access to two distinct archetypes.
    pub(crate) fn pair_mut(&mut self, a: u32, b: u32) -> (&mut Archetype, &mut Archetype) {
        debug_assert_ne!(a, b);
        let (a, b) = (a as usize, b as usize);
        if a < b {
            let (left, right) = self.archetypes.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }
}
