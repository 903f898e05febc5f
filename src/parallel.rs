//! Parallel chunk executor.
//!
//! Applies a callback to every matched non-empty chunk of one query,
//! partitioning chunks across up to `worker_count` scoped threads. Each
//! worker receives a disjoint set of chunks, so per-chunk callbacks have
//! exclusive access to their columns for the duration of the call. The
//! dispatch blocks the caller until every worker has finished; there is no
//! callback-driven completion and no cancellation.
//!
//! Callbacks must not perform structural mutations, and must not create,
//! refresh or iterate queries. The only permitted side effects are writes
//! to the columns exposed by the view and to captured host state.

use tracing::trace;

use crate::error::{EcsError, Result};
use crate::query::{bind_view, ChunkView, Query};
use crate::world::World;

/// Round-robin partition of `tasks` into `workers` disjoint lists.
fn partition<T>(tasks: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    let mut lists: Vec<Vec<T>> = (0..workers).map(|_| Vec::new()).collect();
    for (index, task) in tasks.into_iter().enumerate() {
        lists[index % workers].push(task);
    }
    lists
}

pub(crate) fn for_each_chunk_parallel<F>(
    query: &mut Query,
    world: &mut World,
    worker_count: u32,
    callback: F,
) -> Result<()>
where
    F: Fn(&mut ChunkView<'_>, u32) + Send + Sync,
{
    if worker_count == 0 {
        return Err(EcsError::InvalidArgument);
    }
    if query.world_id() != world.id() {
        return Err(EcsError::InvalidArgument);
    }
    if world.defer_depth() > 0 {
        return Err(EcsError::Conflict);
    }

    // One refresh at executor entry; workers see this snapshot.
    query.refresh(world)?;

    let mut tasks: Vec<ChunkView<'_>> = Vec::new();
    for &archetype_index in query.matches() {
        let archetype = world.store.get(archetype_index);
        for chunk_index in 0..archetype.chunks().len() as u32 {
            if archetype.chunk(chunk_index).count == 0 {
                continue;
            }
            tasks.push(bind_view(archetype, chunk_index, query.terms()));
        }
    }
    if tasks.is_empty() {
        return Ok(());
    }

    let workers = (worker_count as usize).min(tasks.len());
    trace!(workers, chunks = tasks.len(), "parallel chunk dispatch");

    if workers == 1 {
        for mut view in tasks {
            callback(&mut view, 0);
        }
        return Ok(());
    }

    let lists = partition(tasks, workers);
    // SAFETY ARCHITECTURE: every view references a distinct chunk (one task
    // per chunk), so no two workers ever touch the same columns. The &mut
    // World held by this frame guarantees no other access to the storage
    // while the scope runs, and the scope joins all workers before
    // returning.
    std::thread::scope(|scope| {
        for (worker_index, list) in lists.into_iter().enumerate() {
            let callback = &callback;
            scope.spawn(move || {
                for mut view in list {
                    callback(&mut view, worker_index as u32);
                }
            });
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentDesc;
    use crate::query::QueryDesc;

    #[test]
    fn test_validation_errors() {
        let mut world = World::with_defaults().unwrap();
        let value = world
            .register_component(&ComponentDesc::new("Value", 4, 4))
            .unwrap();
        let entity = world.create_entity().unwrap();
        world
            .add_component(entity, value, Some(&1u32.to_ne_bytes()))
            .unwrap();
        let mut query = Query::new(&world, &QueryDesc::new().with_write(value)).unwrap();

        assert_eq!(
            query
                .for_each_chunk_parallel(&mut world, 0, |_, _| {})
                .unwrap_err(),
            EcsError::InvalidArgument
        );

        world.begin_defer().unwrap();
        assert_eq!(
            query
                .for_each_chunk_parallel(&mut world, 2, |_, _| {})
                .unwrap_err(),
            EcsError::Conflict
        );
        world.end_defer().unwrap();
        world.flush().unwrap();

        query
            .for_each_chunk_parallel(&mut world, 2, |_, _| {})
            .unwrap();
    }

    #[test]
    fn test_partition_is_disjoint_and_total() {
        let lists = partition((0..10).collect(), 3);
        assert_eq!(lists.len(), 3);
        let mut all: Vec<i32> = lists.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_every_chunk_is_visited_once() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let mut world = World::new(crate::world::WorldConfig {
            // Tiny chunks force several chunks per archetype.
            target_chunk_bytes: 64,
            ..Default::default()
        })
        .unwrap();
        let value = world
            .register_component(&ComponentDesc::new("Value", 4, 4))
            .unwrap();
        for i in 0..40u32 {
            let entity = world.create_entity().unwrap();
            world
                .add_component(entity, value, Some(&i.to_ne_bytes()))
                .unwrap();
        }

        let mut query = Query::new(&world, &QueryDesc::new().with_write(value)).unwrap();
        let rows = AtomicU32::new(0);
        query
            .for_each_chunk_parallel(&mut world, 4, |view, _| {
                rows.fetch_add(view.count(), Ordering::Relaxed);
            })
            .unwrap();
        assert_eq!(rows.load(Ordering::Relaxed), 40);
    }
}
