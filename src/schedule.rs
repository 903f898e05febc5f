//! Schedule builder with conflict graph
//!
//! Compiles a list of (query, callback) entries into an ordered sequence of
//! batches via topological layering, so that conflicting entries never run
//! concurrently. Batches execute sequentially; entries within a batch fan
//! out across up to `worker_count` workers.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{EcsError, Result};
use crate::query::{bind_view, Access, ChunkView, Query, QueryTerm};
use crate::world::World;

/// Planner output, observable and reproducible across repeated runs of the
/// same entry list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    /// Number of sequential batches.
    pub batch_count: u32,
    /// Conflict edges discovered during planning.
    pub edge_count: u32,
    /// Largest parallel group.
    pub max_batch_size: u32,
}

/// Per-chunk callback: `(view, worker_index)`. Host state is closure
/// capture.
pub type ChunkCallback<'a> = Box<dyn Fn(&mut ChunkView<'_>, u32) + Send + Sync + 'a>;

/// One unit of scheduled work: a query and the callback applied to each of
/// its matched chunks.
pub struct ScheduleEntry<'a> {
    query: &'a mut Query,
    callback: ChunkCallback<'a>,
}

impl<'a> ScheduleEntry<'a> {
    pub fn new(
        query: &'a mut Query,
        callback: impl Fn(&mut ChunkView<'_>, u32) + Send + Sync + 'a,
    ) -> Self {
        Self {
            query,
            callback: Box::new(callback),
        }
    }
}

/// Do two term lists collide on any component (WRITE/WRITE or WRITE/READ)?
fn conflicts(a: &[QueryTerm], b: &[QueryTerm]) -> bool {
    for term_a in a {
        for term_b in b {
            if term_a.component == term_b.component
                && (term_a.access == Access::Write || term_b.access == Access::Write)
            {
                return true;
            }
        }
    }
    false
}

/// Conflict-graph layering: entries at the same depth are mutually
/// conflict-free and form one batch.
fn plan(entries: &[ScheduleEntry<'_>]) -> (Vec<Vec<usize>>, ScheduleStats) {
    let count = entries.len();
    let mut edges: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    let mut in_degree = vec![0usize; count];
    let mut edge_count = 0u32;

    // Edges run from the earlier entry to the later one, so the graph is
    // acyclic by construction.
    for i in 0..count {
        for j in (i + 1)..count {
            if conflicts(entries[i].query.terms(), entries[j].query.terms()) {
                edges.entry(i).or_default().push(j);
                in_degree[j] += 1;
                edge_count += 1;
            }
        }
    }

    // Kahn's algorithm with depth tracking.
    let mut depth = vec![0usize; count];
    let mut queue: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    while let Some(node) = queue.pop_front() {
        if let Some(neighbors) = edges.get(&node) {
            for &next in neighbors {
                in_degree[next] -= 1;
                depth[next] = depth[next].max(depth[node] + 1);
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    let max_depth = depth.iter().copied().max().unwrap_or(0);
    let mut batches: Vec<Vec<usize>> = vec![Vec::new(); max_depth + 1];
    for (index, &d) in depth.iter().enumerate() {
        batches[d].push(index);
    }

    let stats = ScheduleStats {
        batch_count: batches.len() as u32,
        edge_count,
        max_batch_size: batches.iter().map(Vec::len).max().unwrap_or(0) as u32,
    };
    (batches, stats)
}

/// Compiled batch plan over a fixed entry list.
pub struct Schedule<'a> {
    world_id: u64,
    entries: Vec<ScheduleEntry<'a>>,
    batches: Vec<Vec<usize>>,
    stats: ScheduleStats,
}

impl<'a> std::fmt::Debug for Schedule<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schedule")
            .field("world_id", &self.world_id)
            .field("batches", &self.batches)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<'a> Schedule<'a> {
    /// Compile the batches. The entry list must be non-empty and every
    /// entry must come from the same world.
    pub fn new(entries: Vec<ScheduleEntry<'a>>) -> Result<Self> {
        if entries.is_empty() {
            return Err(EcsError::InvalidArgument);
        }
        let world_id = entries[0].query.world_id();
        if entries
            .iter()
            .any(|entry| entry.query.world_id() != world_id)
        {
            return Err(EcsError::Conflict);
        }

        let (batches, stats) = plan(&entries);
        debug!(
            entries = entries.len(),
            batches = stats.batch_count,
            edges = stats.edge_count,
            "compiled schedule"
        );
        Ok(Self {
            world_id,
            entries,
            batches,
            stats,
        })
    }

    /// Precomputed planner stats; identical to what `execute` reports.
    pub fn stats(&self) -> ScheduleStats {
        self.stats
    }

    /// Run the batches in order. Every query refreshes once at entry, then
    /// each batch's chunks fan out across up to `worker_count` workers with
    /// a barrier between batches.
    pub fn execute(&mut self, world: &mut World, worker_count: u32) -> Result<ScheduleStats> {
        if worker_count == 0 {
            return Err(EcsError::InvalidArgument);
        }
        if self.world_id != world.id() {
            return Err(EcsError::InvalidArgument);
        }
        if world.defer_depth() > 0 {
            return Err(EcsError::Conflict);
        }

        for entry in self.entries.iter_mut() {
            entry.query.refresh(world)?;
        }

        for batch in &self.batches {
            run_batch(world, &self.entries, batch, worker_count);
        }
        Ok(self.stats)
    }
}

/// Execute one conflict-free batch.
fn run_batch(
    world: &mut World,
    entries: &[ScheduleEntry<'_>],
    batch: &[usize],
    worker_count: u32,
) {
    // Task list in deterministic order: entries by index, chunks in
    // archetype/list order.
    let mut tasks: Vec<(ChunkView<'_>, usize)> = Vec::new();
    for &entry_index in batch {
        let query = &entries[entry_index].query;
        for &archetype_index in query.matches() {
            let archetype = world.store.get(archetype_index);
            for chunk_index in 0..archetype.chunks().len() as u32 {
                if archetype.chunk(chunk_index).count == 0 {
                    continue;
                }
                tasks.push((
                    bind_view(archetype, chunk_index, query.terms()),
                    entry_index,
                ));
            }
        }
    }
    if tasks.is_empty() {
        return;
    }

    let workers = (worker_count as usize).min(tasks.len());
    if workers == 1 {
        for (mut view, entry_index) in tasks {
            (entries[entry_index].callback)(&mut view, 0);
        }
        return;
    }

    let mut lists: Vec<Vec<(ChunkView<'_>, usize)>> = (0..workers).map(|_| Vec::new()).collect();
    for (index, task) in tasks.into_iter().enumerate() {
        lists[index % workers].push(task);
    }

    // SAFETY ARCHITECTURE: entries in one batch never conflict, so when two
    // entries view the same chunk any shared component is read-declared on
    // both sides, and views only vend shared slices for read columns.
    // The &mut World held by the caller excludes all other storage access,
    // and the scope joins every worker before returning.
    std::thread::scope(|scope| {
        for (worker_index, list) in lists.into_iter().enumerate() {
            scope.spawn(move || {
                for (mut view, entry_index) in list {
                    (entries[entry_index].callback)(&mut view, worker_index as u32);
                }
            });
        }
    });
}

/// One-shot: compile and run an entry list, discarding the plan. An empty
/// list is a successful no-op with zeroed stats.
pub fn schedule_queries(
    world: &mut World,
    entries: Vec<ScheduleEntry<'_>>,
    worker_count: u32,
) -> Result<ScheduleStats> {
    if worker_count == 0 {
        return Err(EcsError::InvalidArgument);
    }
    if entries.is_empty() {
        return Ok(ScheduleStats::default());
    }
    let mut schedule = Schedule::new(entries)?;
    schedule.execute(world, worker_count)
}
