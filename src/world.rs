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

//! World: central entity, component and archetype storage.
//!
//! One world is owned by one logical thread of control. Serial operations
//! never suspend; the parallel executor and the schedule executor are the
//! only blocking points and both return after a caller-visible barrier.

use tracing::{debug, trace};

use crate::alloc::Allocator;
use crate::archetype::{key_with_add, key_with_remove, ArchetypeStore};
use crate::command::{Command, CommandBuffer, CommandKind};
use crate::component::{ComponentDesc, ComponentFlags, ComponentId, ComponentRegistry};
use crate::entity::{Entity, EntityLocation, EntityTable};
use crate::error::{EcsError, Result};
use crate::trace::{TraceEvent, TraceEventKind, TraceHook};
use crate::utils::next_id;

/// Default per-chunk byte budget.
pub const DEFAULT_CHUNK_BYTES: u32 = 16 * 1024;

/// World creation parameters. `Default` gives the platform allocator, lazy
/// capacities and a 16 KiB chunk budget.
#[derive(Default, Clone)]
pub struct WorldConfig {
    pub allocator: crate::alloc::AllocatorConfig,
    pub initial_entity_capacity: u32,
    pub initial_component_capacity: u32,
    /// Target bytes per chunk; 0 selects the default.
    pub target_chunk_bytes: u32,
}

/// Observable counters, all maintained incrementally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub live_entities: u32,
    pub entity_capacity: u32,
    pub allocated_entity_slots: u32,
    pub free_entity_slots: u32,
    pub registered_components: u32,
    pub archetype_count: u32,
    pub chunk_count: u32,
    pub pending_commands: u32,
    pub defer_depth: u32,
    pub structural_moves: u64,
}

/// Central ECS world.
pub struct World {
    id: u64,
    allocator: Allocator,
    target_chunk_bytes: u32,
    entities: EntityTable,
    registry: ComponentRegistry,
    pub(crate) store: ArchetypeStore,
    commands: CommandBuffer,
    defer_depth: u32,
    structural_moves: u64,
    chunk_count: u32,
    trace_hook: Option<TraceHook>,
}

// SAFETY: all column memory is uniquely owned by the world, and every
// host-supplied hook (allocator, component hooks, trace hook) is required
// to be Send + Sync.
unsafe impl Send for World {}

impl World {
    /// Create a world. Fails with `InvalidArgument` when the allocator
    /// config supplies only one half of the alloc/free pair.
    pub fn new(config: WorldConfig) -> Result<Self> {
        let allocator = Allocator::resolve(config.allocator)?;
        let target_chunk_bytes = if config.target_chunk_bytes == 0 {
            DEFAULT_CHUNK_BYTES
        } else {
            config.target_chunk_bytes
        };

        let mut entities = EntityTable::new();
        if config.initial_entity_capacity > 0 {
            entities.reserve(config.initial_entity_capacity)?;
        }
        let mut registry = ComponentRegistry::new();
        if config.initial_component_capacity > 0 {
            registry.reserve(config.initial_component_capacity);
        }

        let store = ArchetypeStore::new(&registry, target_chunk_bytes);
        let id = next_id();
        debug!(world = id, target_chunk_bytes, "created world");

        Ok(Self {
            id,
            allocator,
            target_chunk_bytes,
            entities,
            registry,
            store,
            commands: CommandBuffer::new(),
            defer_depth: 0,
            structural_moves: 0,
            chunk_count: 0,
            trace_hook: None,
        })
    }

    /// Create a world with the default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(WorldConfig::default())
    }

    /// Unique identity of this world, used to bind queries and schedules.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Grow the entity slot table to at least `capacity` slots.
    pub fn reserve_entities(&mut self, capacity: u32) -> Result<()> {
        self.entities.reserve(capacity)
    }

    /// Pre-size the component registry.
    pub fn reserve_components(&mut self, capacity: u32) -> Result<()> {
        self.registry.reserve(capacity);
        Ok(())
    }

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            live_entities: self.entities.live_count(),
            entity_capacity: self.entities.capacity(),
            allocated_entity_slots: self.entities.allocated(),
            free_entity_slots: self.entities.free_count(),
            registered_components: self.registry.len(),
            archetype_count: self.store.len(),
            chunk_count: self.chunk_count,
            pending_commands: self.commands.len(),
            defer_depth: self.defer_depth,
            structural_moves: self.structural_moves,
        }
    }

    /// Install or clear the trace hook. The hook fires synchronously inside
    /// world operations and must not call back into the world.
    pub fn set_trace_hook(&mut self, hook: Option<TraceHook>) {
        self.trace_hook = hook;
    }

    pub(crate) fn emit(
        &self,
        kind: TraceEventKind,
        status: Option<EcsError>,
        entity: Entity,
        component: ComponentId,
        op: Option<CommandKind>,
    ) {
        if let Some(hook) = &self.trace_hook {
            hook(&TraceEvent {
                kind,
                status,
                entity,
                component,
                op,
                live_entities: self.entities.live_count(),
                pending_commands: self.commands.len(),
                defer_depth: self.defer_depth,
            });
        }
    }

    pub(crate) fn defer_depth(&self) -> u32 {
        self.defer_depth
    }

    // ========== Defer / flush ==========

    /// Open a defer region. Structural mutations enqueue until the matching
    /// `end_defer` and a `flush`.
    pub fn begin_defer(&mut self) -> Result<()> {
        self.defer_depth = self
            .defer_depth
            .checked_add(1)
            .ok_or(EcsError::CapacityReached)?;
        self.emit(
            TraceEventKind::DeferBegin,
            None,
            Entity::NULL,
            ComponentId::INVALID,
            None,
        );
        Ok(())
    }

    /// Close one defer level. `Conflict` when no region is open.
    pub fn end_defer(&mut self) -> Result<()> {
        if self.defer_depth == 0 {
            return Err(EcsError::Conflict);
        }
        self.defer_depth -= 1;
        self.emit(
            TraceEventKind::DeferEnd,
            None,
            Entity::NULL,
            ComponentId::INVALID,
            None,
        );
        Ok(())
    }

    /// Apply all queued commands in enqueue order. The first failing command
    /// stops iteration; the rest are discarded either way, and its status is
    /// the return value. Per-command results are reported only through
    /// `FlushApply` trace events.
    pub fn flush(&mut self) -> Result<()> {
        if self.defer_depth > 0 {
            return Err(EcsError::Conflict);
        }
        let commands = self.commands.take();
        trace!(world = self.id, queued = commands.len(), "flush");
        self.emit(
            TraceEventKind::FlushBegin,
            None,
            Entity::NULL,
            ComponentId::INVALID,
            None,
        );

        let mut first_error = None;
        for command in commands {
            let status = self.apply_command(&command);
            self.emit(
                TraceEventKind::FlushApply,
                status.err(),
                command.entity,
                command.component,
                Some(command.kind),
            );
            if let Err(err) = status {
                first_error = Some(err);
                break;
            }
        }

        self.emit(
            TraceEventKind::FlushEnd,
            first_error,
            Entity::NULL,
            ComponentId::INVALID,
            None,
        );
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn apply_command(&mut self, command: &Command) -> Result<()> {
        match command.kind {
            CommandKind::AddComponent => self.run_add(
                command.entity,
                command.component,
                command.payload.as_deref(),
            ),
            CommandKind::RemoveComponent => self.run_remove(command.entity, command.component),
            CommandKind::DestroyEntity => self.run_destroy(command.entity),
        }
    }

    // ========== Entity lifecycle ==========

    /// Create an entity in the root archetype.
    pub fn create_entity(&mut self) -> Result<Entity> {
        self.entities.ensure_one_free()?;
        let (chunk, row, new_chunk) = self
            .store
            .get_mut(ArchetypeStore::ROOT)
            .alloc_row(&self.allocator)?;

        let (index, generation) = self.entities.allocate();
        let entity = Entity::pack(index, generation);
        self.store
            .get_mut(ArchetypeStore::ROOT)
            .chunk_mut(chunk)
            .set_entity(row, entity);
        self.entities.set_location(
            index,
            EntityLocation {
                archetype: ArchetypeStore::ROOT,
                chunk,
                row,
            },
        );
        if new_chunk {
            self.chunk_count += 1;
        }
        self.emit(
            TraceEventKind::EntityCreate,
            None,
            entity,
            ComponentId::INVALID,
            None,
        );
        Ok(entity)
    }

    /// Destroy an entity, running dtor hooks for its live components.
    /// Inside a defer region the destruction is enqueued instead.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<()> {
        self.entities.resolve(entity)?;
        if self.defer_depth > 0 {
            self.commands.push(Command {
                kind: CommandKind::DestroyEntity,
                entity,
                component: ComponentId::INVALID,
                payload: None,
            });
            self.emit(
                TraceEventKind::DeferEnqueue,
                None,
                entity,
                ComponentId::INVALID,
                Some(CommandKind::DestroyEntity),
            );
            return Ok(());
        }
        self.run_destroy(entity)
    }

    fn run_destroy(&mut self, entity: Entity) -> Result<()> {
        let index = self.entities.resolve(entity)?;
        let location = self.entities.location(index);

        let archetype = self.store.get_mut(location.archetype);
        archetype.drop_row(location.chunk, location.row);
        let moved = archetype.swap_remove(location.chunk, location.row);

        self.structural_moves += 1;
        if let Some(moved) = moved {
            self.entities.set_location(moved.index(), location);
            self.structural_moves += 1;
        }
        self.entities.retire(index);
        self.emit(
            TraceEventKind::EntityDestroy,
            None,
            entity,
            ComponentId::INVALID,
            None,
        );
        Ok(())
    }

    /// Does this handle refer to a live entity? Null handles, out-of-range
    /// indices and stale generations all answer `false`.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    // ========== Component registry ==========

    pub fn register_component(&mut self, desc: &ComponentDesc) -> Result<ComponentId> {
        self.registry.register(desc)
    }

    pub fn find_component(&self, name: &str) -> Result<ComponentId> {
        if name.is_empty() {
            return Err(EcsError::InvalidArgument);
        }
        self.registry.find(name).ok_or(EcsError::NotFound)
    }

    pub fn component_name(&self, id: ComponentId) -> Result<&str> {
        self.registry
            .get(id)
            .map(|record| record.name.as_str())
            .ok_or(EcsError::InvalidArgument)
    }

    /// Registered `(size, align, flags)` of a component.
    pub fn component_layout(&self, id: ComponentId) -> Result<(u32, u32, ComponentFlags)> {
        self.registry
            .get(id)
            .map(|record| (record.size, record.align, record.flags))
            .ok_or(EcsError::InvalidArgument)
    }

    /// All registered component ids, ascending.
    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.registry.ids()
    }

    /// All live entity handles in slot-index order.
    pub fn live_entities(&self) -> Vec<Entity> {
        self.entities.live_handles()
    }

    /// The sorted component set currently attached to an entity.
    pub fn entity_component_ids(&self, entity: Entity) -> Result<Vec<ComponentId>> {
        let index = self.entities.resolve(entity)?;
        let location = self.entities.location(index);
        Ok(self.store.get(location.archetype).key().to_vec())
    }

    // ========== Structural mutation ==========

    /// Attach a component. `initial` must be exactly the registered size
    /// when present; without it the component's ctor runs, and failing that
    /// the column bytes are zeroed. Inside a defer region the payload is
    /// copied and the mutation enqueued.
    pub fn add_component(
        &mut self,
        entity: Entity,
        id: ComponentId,
        initial: Option<&[u8]>,
    ) -> Result<()> {
        self.entities.resolve(entity)?;
        let size = self.registry.get(id).ok_or(EcsError::NotFound)?.size;
        if let Some(bytes) = initial {
            if bytes.len() != size as usize {
                return Err(EcsError::InvalidArgument);
            }
        }
        if self.defer_depth > 0 {
            self.commands.push(Command {
                kind: CommandKind::AddComponent,
                entity,
                component: id,
                payload: initial.map(|bytes| bytes.to_vec().into_boxed_slice()),
            });
            self.emit(
                TraceEventKind::DeferEnqueue,
                None,
                entity,
                id,
                Some(CommandKind::AddComponent),
            );
            return Ok(());
        }
        self.run_add(entity, id, initial)
    }

    fn run_add(&mut self, entity: Entity, id: ComponentId, initial: Option<&[u8]>) -> Result<()> {
        let index = self.entities.resolve(entity)?;
        let src_location = self.entities.location(index);
        let src_index = src_location.archetype;

        if self.registry.get(id).is_none() {
            return Err(EcsError::NotFound);
        }
        if self.store.get(src_index).contains(id) {
            return Err(EcsError::AlreadyExists);
        }

        let dst_key = key_with_add(self.store.get(src_index).key(), id);
        let dst_index =
            self.store
                .find_or_create(dst_key, &self.registry, self.target_chunk_bytes)?;

        let (src, dst) = self.store.pair_mut(src_index, dst_index);
        let (dst_chunk, dst_row, new_chunk) = dst.alloc_row(&self.allocator)?;
        dst.chunk_mut(dst_chunk).set_entity(dst_row, entity);

        // Initialize the added column: payload, else ctor, else zero-fill.
        if let Some(meta_index) = dst.meta_index(id) {
            let meta = &dst.metas()[meta_index];
            if !meta.tag {
                let dst_ptr = dst.component_ptr(dst_chunk, dst_row, meta_index);
                unsafe {
                    if let Some(bytes) = initial {
                        std::ptr::copy_nonoverlapping(
                            bytes.as_ptr(),
                            dst_ptr,
                            meta.size as usize,
                        );
                    } else if let Some(ctor) = &meta.ctor {
                        ctor(dst_ptr, 1);
                    } else {
                        std::ptr::write_bytes(dst_ptr, 0, meta.size as usize);
                    }
                }
            }
        }

        // Transfer every source component into the destination row.
        for (src_meta_index, meta) in src.metas().iter().enumerate() {
            if meta.tag {
                continue;
            }
            let Some(dst_meta_index) = dst.meta_index(meta.id) else {
                continue;
            };
            let src_ptr = src.component_ptr(src_location.chunk, src_location.row, src_meta_index);
            let dst_ptr = dst.component_ptr(dst_chunk, dst_row, dst_meta_index);
            // SAFETY: source and destination rows live in different
            // archetypes, so the ranges cannot overlap.
            unsafe { meta.relocate(dst_ptr, src_ptr) };
        }

        self.entities.set_location(
            index,
            EntityLocation {
                archetype: dst_index,
                chunk: dst_chunk,
                row: dst_row,
            },
        );
        self.structural_moves += 1;
        if new_chunk {
            self.chunk_count += 1;
        }

        if let Some(moved) = src.swap_remove(src_location.chunk, src_location.row) {
            self.entities.set_location(moved.index(), src_location);
            self.structural_moves += 1;
        }

        self.emit(TraceEventKind::ComponentAdd, None, entity, id, None);
        Ok(())
    }

    /// Detach a component, invoking its dtor hook. Inside a defer region the
    /// mutation is enqueued.
    pub fn remove_component(&mut self, entity: Entity, id: ComponentId) -> Result<()> {
        self.entities.resolve(entity)?;
        if self.registry.get(id).is_none() {
            return Err(EcsError::NotFound);
        }
        if self.defer_depth > 0 {
            self.commands.push(Command {
                kind: CommandKind::RemoveComponent,
                entity,
                component: id,
                payload: None,
            });
            self.emit(
                TraceEventKind::DeferEnqueue,
                None,
                entity,
                id,
                Some(CommandKind::RemoveComponent),
            );
            return Ok(());
        }
        self.run_remove(entity, id)
    }

    fn run_remove(&mut self, entity: Entity, id: ComponentId) -> Result<()> {
        let index = self.entities.resolve(entity)?;
        let src_location = self.entities.location(index);
        let src_index = src_location.archetype;

        let Some(removed_meta_index) = self.store.get(src_index).meta_index(id) else {
            return Err(EcsError::NotFound);
        };

        let dst_key = key_with_remove(self.store.get(src_index).key(), id);
        let dst_index =
            self.store
                .find_or_create(dst_key, &self.registry, self.target_chunk_bytes)?;

        let (src, dst) = self.store.pair_mut(src_index, dst_index);
        let (dst_chunk, dst_row, new_chunk) = dst.alloc_row(&self.allocator)?;
        dst.chunk_mut(dst_chunk).set_entity(dst_row, entity);

        // Transfer the retained components.
        for (src_meta_index, meta) in src.metas().iter().enumerate() {
            if meta.tag || meta.id == id {
                continue;
            }
            let Some(dst_meta_index) = dst.meta_index(meta.id) else {
                continue;
            };
            let src_ptr = src.component_ptr(src_location.chunk, src_location.row, src_meta_index);
            let dst_ptr = dst.component_ptr(dst_chunk, dst_row, dst_meta_index);
            // SAFETY: rows in different archetypes never overlap.
            unsafe { meta.relocate(dst_ptr, src_ptr) };
        }

        // Tear down the removed component before the source row is recycled.
        {
            let meta = &src.metas()[removed_meta_index];
            if let Some(dtor) = &meta.dtor {
                let ptr = src.component_ptr(src_location.chunk, src_location.row, removed_meta_index);
                dtor(ptr, 1);
            }
        }

        self.entities.set_location(
            index,
            EntityLocation {
                archetype: dst_index,
                chunk: dst_chunk,
                row: dst_row,
            },
        );
        self.structural_moves += 1;
        if new_chunk {
            self.chunk_count += 1;
        }

        if let Some(moved) = src.swap_remove(src_location.chunk, src_location.row) {
            self.entities.set_location(moved.index(), src_location);
            self.structural_moves += 1;
        }

        self.emit(TraceEventKind::ComponentRemove, None, entity, id, None);
        Ok(())
    }

    /// Does the entity currently carry the component? Deferred adds are not
    /// visible until flush.
    pub fn has_component(&self, entity: Entity, id: ComponentId) -> Result<bool> {
        let index = self.entities.resolve(entity)?;
        if self.registry.get(id).is_none() {
            return Err(EcsError::NotFound);
        }
        let location = self.entities.location(index);
        Ok(self.store.get(location.archetype).contains(id))
    }

    /// Raw bytes of one component value. Tag components have no storage and
    /// yield an empty slice.
    pub fn component_bytes(&self, entity: Entity, id: ComponentId) -> Result<&[u8]> {
        let (ptr, size) = self.component_ptr_len(entity, id)?;
        if size == 0 {
            return Ok(&[]);
        }
        // SAFETY: ptr addresses a live row of `size` bytes inside a chunk
        // column owned by this world.
        Ok(unsafe { std::slice::from_raw_parts(ptr, size) })
    }

    /// Mutable raw bytes of one component value; empty for tags.
    pub fn component_bytes_mut(&mut self, entity: Entity, id: ComponentId) -> Result<&mut [u8]> {
        let (ptr, size) = self.component_ptr_len(entity, id)?;
        if size == 0 {
            return Ok(&mut []);
        }
        // SAFETY: as above, and &mut self guarantees exclusivity.
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr, size) })
    }

    fn component_ptr_len(&self, entity: Entity, id: ComponentId) -> Result<(*mut u8, usize)> {
        let index = self.entities.resolve(entity)?;
        let location = self.entities.location(index);
        let archetype = self.store.get(location.archetype);
        let meta_index = archetype.meta_index(id).ok_or(EcsError::NotFound)?;
        let meta = &archetype.metas()[meta_index];
        if meta.tag {
            return Ok((std::ptr::null_mut(), 0));
        }
        let ptr = archetype.component_ptr(location.chunk, location.row, meta_index);
        Ok((ptr, meta.size as usize))
    }

    pub(crate) fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }
}

impl Drop for World {
    fn drop(&mut self) {
        debug!(world = self.id, "destroying world");
        // Queued payloads are freed with the buffer.
        self.commands.clear();
        // Dtor sweep over every live row, then give the column memory back
        // to the allocator.
        for index in 0..self.store.len() {
            self.store.get(index).drop_all_rows();
        }
        for index in 0..self.store.len() {
            self.store.get_mut(index).release_chunks(&self.allocator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        World::with_defaults().unwrap()
    }

    #[test]
    fn test_create_destroy_revive() {
        let mut world = world();
        let e0 = world.create_entity().unwrap();
        assert!(world.is_alive(e0));

        world.destroy_entity(e0).unwrap();
        assert!(!world.is_alive(e0));
        assert_eq!(
            world.destroy_entity(e0).unwrap_err(),
            EcsError::StaleEntity
        );

        let e1 = world.create_entity().unwrap();
        assert_ne!(e0, e1);
        assert!(world.is_alive(e1));

        let stats = world.stats();
        assert_eq!(stats.live_entities, 1);
        assert_eq!(stats.free_entity_slots, 0);
    }

    #[test]
    fn test_entity_capacity_growth() {
        let mut world = World::new(WorldConfig {
            initial_entity_capacity: 4,
            ..WorldConfig::default()
        })
        .unwrap();
        let mut entities = Vec::new();
        for _ in 0..300 {
            entities.push(world.create_entity().unwrap());
        }
        let stats = world.stats();
        assert_eq!(stats.live_entities, 300);
        assert!(stats.entity_capacity >= 300);
        assert!(entities.iter().all(|entity| !entity.is_null()));
    }

    #[test]
    fn test_add_requires_known_component() {
        let mut world = world();
        let entity = world.create_entity().unwrap();
        assert_eq!(
            world
                .add_component(entity, ComponentId::INVALID, None)
                .unwrap_err(),
            EcsError::NotFound
        );
    }

    #[test]
    fn test_add_twice_is_already_exists() {
        let mut world = world();
        let position = world
            .register_component(&ComponentDesc::new("Position", 12, 4))
            .unwrap();
        let entity = world.create_entity().unwrap();
        world
            .add_component(entity, position, Some(&[0u8; 12]))
            .unwrap();
        assert_eq!(
            world
                .add_component(entity, position, Some(&[0u8; 12]))
                .unwrap_err(),
            EcsError::AlreadyExists
        );
    }

    #[test]
    fn test_payload_length_is_validated() {
        let mut world = world();
        let position = world
            .register_component(&ComponentDesc::new("Position", 12, 4))
            .unwrap();
        let entity = world.create_entity().unwrap();
        assert_eq!(
            world
                .add_component(entity, position, Some(&[0u8; 5]))
                .unwrap_err(),
            EcsError::InvalidArgument
        );
    }

    #[test]
    fn test_remove_absent_is_not_found() {
        let mut world = world();
        let position = world
            .register_component(&ComponentDesc::new("Position", 12, 4))
            .unwrap();
        let entity = world.create_entity().unwrap();
        assert_eq!(
            world.remove_component(entity, position).unwrap_err(),
            EcsError::NotFound
        );
    }

    #[test]
    fn test_structural_move_accounting() {
        let mut world = world();
        let position = world
            .register_component(&ComponentDesc::new("Position", 12, 4))
            .unwrap();
        let a = world.create_entity().unwrap();
        let b = world.create_entity().unwrap();
        assert_eq!(world.stats().structural_moves, 0);

        let value = [0u8; 12];
        world.add_component(a, position, Some(&value)).unwrap();
        assert_eq!(world.stats().structural_moves, 2);
        world.add_component(b, position, Some(&value)).unwrap();
        assert_eq!(world.stats().structural_moves, 3);
        world.remove_component(a, position).unwrap();
        assert_eq!(world.stats().structural_moves, 5);
        world.remove_component(b, position).unwrap();
        assert_eq!(world.stats().structural_moves, 6);
    }

    #[test]
    fn test_defer_nesting_and_flush_conflicts() {
        let mut world = world();
        let entity = world.create_entity().unwrap();

        world.begin_defer().unwrap();
        world.begin_defer().unwrap();
        world.destroy_entity(entity).unwrap();
        assert!(world.is_alive(entity));

        assert_eq!(world.flush().unwrap_err(), EcsError::Conflict);
        world.end_defer().unwrap();
        assert_eq!(world.flush().unwrap_err(), EcsError::Conflict);
        world.end_defer().unwrap();
        world.flush().unwrap();

        assert!(!world.is_alive(entity));
        assert_eq!(world.end_defer().unwrap_err(), EcsError::Conflict);
    }

    #[test]
    fn test_flush_stops_at_first_failure() {
        let mut world = world();
        let position = world
            .register_component(&ComponentDesc::new("Position", 4, 4))
            .unwrap();
        let entity = world.create_entity().unwrap();

        world.begin_defer().unwrap();
        // Destroy, then mutate the now-dead entity, then a command that
        // would have succeeded on its own.
        world.destroy_entity(entity).unwrap();
        world
            .add_component(entity, position, Some(&1u32.to_ne_bytes()))
            .unwrap();
        world
            .add_component(entity, position, Some(&2u32.to_ne_bytes()))
            .unwrap();
        world.end_defer().unwrap();

        assert_eq!(world.flush().unwrap_err(), EcsError::StaleEntity);
        assert_eq!(world.stats().pending_commands, 0);
        // A later flush is a no-op success.
        world.flush().unwrap();
    }

    #[test]
    fn test_introspection_snapshots() {
        let mut world = world();
        let position = world
            .register_component(&ComponentDesc::new("Position", 12, 4))
            .unwrap();
        let tag = world.register_component(&ComponentDesc::tag("Selected")).unwrap();

        let e0 = world.create_entity().unwrap();
        let e1 = world.create_entity().unwrap();
        world.add_component(e0, position, Some(&[0u8; 12])).unwrap();
        world.add_component(e1, position, Some(&[0u8; 12])).unwrap();
        world.add_component(e1, tag, None).unwrap();

        assert_eq!(world.component_name(position).unwrap(), "Position");
        let (size, align, flags) = world.component_layout(position).unwrap();
        assert_eq!((size, align), (12, 4));
        assert!(flags.is_empty());
        assert_eq!(
            world.component_layout(ComponentId::INVALID).unwrap_err(),
            EcsError::InvalidArgument
        );

        assert_eq!(world.component_ids(), vec![position, tag]);
        assert_eq!(world.live_entities(), vec![e0, e1]);
        assert_eq!(world.entity_component_ids(e1).unwrap(), vec![position, tag]);
        assert_eq!(world.find_component("Position").unwrap(), position);
        assert_eq!(
            world.find_component("Missing").unwrap_err(),
            EcsError::NotFound
        );
        assert_eq!(
            world.find_component("").unwrap_err(),
            EcsError::InvalidArgument
        );
    }

    #[test]
    fn test_tag_components_have_no_bytes() {
        let mut world = world();
        let tag = world.register_component(&ComponentDesc::tag("EnemyTag")).unwrap();
        let entity = world.create_entity().unwrap();
        world.add_component(entity, tag, None).unwrap();

        assert!(world.has_component(entity, tag).unwrap());
        assert!(world.component_bytes(entity, tag).unwrap().is_empty());

        world.remove_component(entity, tag).unwrap();
        assert!(!world.has_component(entity, tag).unwrap());
    }
}
