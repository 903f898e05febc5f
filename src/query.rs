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

//! Queries: compiled filters with archetype matching and chunk iteration.
//!
//! A query owns a copy of its filter and a match cache over the archetype
//! set. The cache is rebuilt at the start of every iteration and every
//! schedule execution, so structural changes between frames are picked up
//! automatically.

use std::marker::PhantomData;

use smallvec::SmallVec;

use crate::archetype::Archetype;
use crate::component::ComponentId;
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::trace::TraceEventKind;
use crate::world::World;

/// How a with-term touches its component. Drives scheduler conflict edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

/// One required component with its declared access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTerm {
    pub component: ComponentId,
    pub access: Access,
}

/// Query filter: entities must carry every with-term's component and none
/// of the without set.
#[derive(Debug, Clone, Default)]
pub struct QueryDesc {
    pub with_terms: Vec<QueryTerm>,
    pub without: Vec<ComponentId>,
}

impl QueryDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read(mut self, component: ComponentId) -> Self {
        self.with_terms.push(QueryTerm {
            component,
            access: Access::Read,
        });
        self
    }

    pub fn with_write(mut self, component: ComponentId) -> Self {
        self.with_terms.push(QueryTerm {
            component,
            access: Access::Write,
        });
        self
    }

    pub fn without(mut self, component: ComponentId) -> Self {
        self.without.push(component);
        self
    }
}

/// Compiled query, bound to one world for its lifetime.
#[derive(Debug)]
pub struct Query {
    world_id: u64,
    terms: SmallVec<[QueryTerm; 8]>,
    without: SmallVec<[ComponentId; 4]>,
    matches: Vec<u32>,
}

impl Query {
    /// Compile a filter against a world. All referenced ids must be
    /// registered; the with and without sets must be duplicate-free and
    /// disjoint.
    pub fn new(world: &World, desc: &QueryDesc) -> Result<Self> {
        for term in &desc.with_terms {
            if world.registry().get(term.component).is_none() {
                return Err(EcsError::NotFound);
            }
        }
        for &id in &desc.without {
            if world.registry().get(id).is_none() {
                return Err(EcsError::NotFound);
            }
        }
        for (index, term) in desc.with_terms.iter().enumerate() {
            if desc.with_terms[..index]
                .iter()
                .any(|prior| prior.component == term.component)
            {
                return Err(EcsError::InvalidArgument);
            }
        }
        for (index, &id) in desc.without.iter().enumerate() {
            if desc.without[..index].contains(&id) {
                return Err(EcsError::InvalidArgument);
            }
        }
        for term in &desc.with_terms {
            if desc.without.contains(&term.component) {
                return Err(EcsError::Conflict);
            }
        }

        let mut query = Self {
            world_id: world.id(),
            terms: SmallVec::from_slice(&desc.with_terms),
            without: SmallVec::from_slice(&desc.without),
            matches: Vec::new(),
        };
        query.scan(world);
        Ok(query)
    }

    pub(crate) fn world_id(&self) -> u64 {
        self.world_id
    }

    pub(crate) fn terms(&self) -> &[QueryTerm] {
        &self.terms
    }

    pub(crate) fn matches(&self) -> &[u32] {
        &self.matches
    }

    fn matches_archetype(&self, archetype: &Archetype) -> bool {
        self.terms
            .iter()
            .all(|term| archetype.contains(term.component))
            && !self.without.iter().any(|&id| archetype.contains(id))
    }

    fn scan(&mut self, world: &World) {
        self.matches.clear();
        for (index, archetype) in world.store.archetypes().iter().enumerate() {
            if self.matches_archetype(archetype) {
                self.matches.push(index as u32);
            }
        }
    }

    /// Rescan the archetype set. Implied at the start of every iteration
    /// and schedule execution.
    pub fn refresh(&mut self, world: &World) -> Result<()> {
        if self.world_id != world.id() {
            return Err(EcsError::InvalidArgument);
        }
        self.scan(world);
        Ok(())
    }

    /// Number of entities currently matched, by walking matched chunks.
    pub fn count_entities(&mut self, world: &World) -> Result<u32> {
        self.refresh(world)?;
        let mut total = 0;
        for &archetype_index in &self.matches {
            for chunk in world.store.get(archetype_index).chunks() {
                total += chunk.count;
            }
        }
        Ok(total)
    }

    /// Begin a serial chunk iteration. The refresh happens here; the
    /// returned iterator is a lazy lending sequence over matched non-empty
    /// chunks.
    pub fn iter<'a>(&'a mut self, world: &'a mut World) -> Result<ChunkIter<'a>> {
        self.refresh(world)?;
        world.emit(
            TraceEventKind::QueryIterBegin,
            None,
            Entity::NULL,
            ComponentId::INVALID,
            None,
        );
        Ok(ChunkIter {
            world,
            terms: &self.terms,
            matches: &self.matches,
            archetype_cursor: 0,
            chunk_cursor: 0,
            finished: false,
        })
    }

    /// Apply `callback` to every matched non-empty chunk, partitioning
    /// chunks across up to `worker_count` workers. Blocks until all workers
    /// finish. See `parallel` module for the execution contract.
    pub fn for_each_chunk_parallel<F>(
        &mut self,
        world: &mut World,
        worker_count: u32,
        callback: F,
    ) -> Result<()>
    where
        F: Fn(&mut ChunkView<'_>, u32) + Send + Sync,
    {
        crate::parallel::for_each_chunk_parallel(self, world, worker_count, callback)
    }
}

pub(crate) struct RawColumn {
    ptr: *mut u8,
    size: u32,
    access: Access,
}

/// One column of a view, granted according to its term's declared access.
///
/// Read terms never yield exclusive bytes: within a schedule batch the same
/// chunk may be visible to several read-only entries on different workers,
/// and only the declared accesses make that sharing sound.
pub enum ColumnSlice<'v> {
    /// Term declared `Access::Read`: shared bytes only.
    Read(&'v [u8]),
    /// Term declared `Access::Write`: exclusive bytes.
    Write(&'v mut [u8]),
}

impl<'v> ColumnSlice<'v> {
    /// Shared view of the column bytes, whatever the declared access.
    pub fn bytes(&self) -> &[u8] {
        match self {
            ColumnSlice::Read(bytes) => bytes,
            ColumnSlice::Write(bytes) => bytes,
        }
    }

    /// Consume as shared bytes.
    pub fn into_bytes(self) -> &'v [u8] {
        match self {
            ColumnSlice::Read(bytes) => bytes,
            ColumnSlice::Write(bytes) => bytes,
        }
    }

    /// Consume as exclusive bytes.
    ///
    /// # Panics
    /// Panics when the with-term was declared `Access::Read`; read columns
    /// are never handed out mutably.
    pub fn into_bytes_mut(self) -> &'v mut [u8] {
        match self {
            ColumnSlice::Read(_) => {
                panic!("column was declared Access::Read; no mutable access")
            }
            ColumnSlice::Write(bytes) => bytes,
        }
    }
}

/// Borrowed view of one chunk: the entity column plus one column per
/// with-term, in declaration order. Tag terms expose empty columns.
///
/// Columns are valid only until the next structural mutation of the
/// archetype or the next call to `ChunkIter::next`.
pub struct ChunkView<'a> {
    count: u32,
    entities: *const Entity,
    columns: SmallVec<[RawColumn; 8]>,
    _marker: PhantomData<&'a ()>,
}

// SAFETY: a view grants exclusive access to its write-declared columns; the
// executor hands each view to exactly one worker at a time, and read-declared
// columns are only ever exposed as shared slices.
unsafe impl Send for ChunkView<'_> {}

impl ChunkView<'_> {
    /// Live rows in this chunk.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn column_count(&self) -> u32 {
        self.columns.len() as u32
    }

    /// Entity ids for rows `0..count`.
    pub fn entities(&self) -> &[Entity] {
        // SAFETY: rows [0, count) of the entity column are initialized.
        unsafe { std::slice::from_raw_parts(self.entities, self.count as usize) }
    }

    /// Raw bytes of one column (`count * size`); empty for tag terms.
    pub fn column(&self, index: usize) -> &[u8] {
        let column = &self.columns[index];
        if column.ptr.is_null() {
            return &[];
        }
        // SAFETY: the column base covers count rows of size bytes.
        unsafe {
            std::slice::from_raw_parts(column.ptr, self.count as usize * column.size as usize)
        }
    }

    /// All columns at once, in with-term declaration order, each granted
    /// according to its declared access: write terms as disjoint mutable
    /// slices, read terms as shared slices. Tag terms yield empty slices.
    ///
    /// Read terms never become mutable here. A schedule batch may hand the
    /// same chunk to several read-only entries on different workers, so
    /// mutable access to a read column would alias.
    pub fn columns_mut(&mut self) -> SmallVec<[ColumnSlice<'_>; 8]> {
        let count = self.count as usize;
        self.columns
            .iter()
            .map(|column| {
                if column.ptr.is_null() {
                    return match column.access {
                        Access::Read => ColumnSlice::Read(&[]),
                        Access::Write => ColumnSlice::Write(&mut []),
                    };
                }
                let bytes = count * column.size as usize;
                match column.access {
                    // SAFETY: shared view over live rows; writers to this
                    // column are excluded by the scheduler's conflict rule.
                    Access::Read => ColumnSlice::Read(unsafe {
                        std::slice::from_raw_parts(column.ptr, bytes)
                    }),
                    // SAFETY: write columns are separate allocations and no
                    // other entry in the batch may touch this component at
                    // all; &mut self pins the view.
                    Access::Write => ColumnSlice::Write(unsafe {
                        std::slice::from_raw_parts_mut(column.ptr, bytes)
                    }),
                }
            })
            .collect()
    }
}

/// Resolve the column pointers of one chunk for a term list.
pub(crate) fn bind_view<'a>(
    archetype: &Archetype,
    chunk_index: u32,
    terms: &[QueryTerm],
) -> ChunkView<'a> {
    let chunk = archetype.chunk(chunk_index);
    let mut columns = SmallVec::with_capacity(terms.len());
    for term in terms {
        let raw = match archetype.meta_index(term.component) {
            Some(meta_index) => {
                let meta = &archetype.metas()[meta_index];
                RawColumn {
                    ptr: archetype.column_base(chunk_index, meta_index),
                    size: meta.size,
                    access: term.access,
                }
            }
            None => RawColumn {
                ptr: std::ptr::null_mut(),
                size: 0,
                access: term.access,
            },
        };
        columns.push(raw);
    }
    ChunkView {
        count: chunk.count,
        entities: chunk.entity_base(),
        columns,
        _marker: PhantomData,
    }
}

/// Serial lazy sequence of chunk views across matched archetypes.
///
/// The iterator itself does not prevent structural mutation; callers follow
/// the cooperative discipline (or a defer region) while iterating.
pub struct ChunkIter<'a> {
    world: &'a mut World,
    terms: &'a [QueryTerm],
    matches: &'a [u32],
    archetype_cursor: usize,
    chunk_cursor: u32,
    finished: bool,
}

impl ChunkIter<'_> {
    /// Next non-empty chunk, or `None` at exhaustion. Once exhausted, every
    /// further call returns `None` without re-entering the walk.
    pub fn next(&mut self) -> Option<ChunkView<'_>> {
        if self.finished {
            return None;
        }
        loop {
            let Some(&archetype_index) = self.matches.get(self.archetype_cursor) else {
                self.finished = true;
                self.world.emit(
                    TraceEventKind::QueryIterEnd,
                    None,
                    Entity::NULL,
                    ComponentId::INVALID,
                    None,
                );
                return None;
            };

            let archetype = self.world.store.get(archetype_index);
            if self.chunk_cursor as usize >= archetype.chunks().len() {
                self.archetype_cursor += 1;
                self.chunk_cursor = 0;
                continue;
            }

            let chunk_index = self.chunk_cursor;
            self.chunk_cursor += 1;
            if archetype.chunk(chunk_index).count == 0 {
                continue;
            }

            let view = bind_view(archetype, chunk_index, self.terms);
            self.world.emit(
                TraceEventKind::QueryIterChunk,
                None,
                Entity::NULL,
                ComponentId::INVALID,
                None,
            );
            return Some(view);
        }
    }
}
