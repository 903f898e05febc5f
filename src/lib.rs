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

//! Lattice - archetype-based entity component runtime
//!
//! Embeddable storage for large entity populations whose component
//! composition changes at runtime: generational entity handles, chunked
//! columnar archetype storage, deferred structural mutation, filtered chunk
//! queries and a conflict-aware parallel query scheduler. Components are
//! registered by name with an explicit size and alignment; there is no
//! static-type discovery.

pub mod alloc;
pub mod archetype;
pub mod chunk;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod trace;
pub mod utils;
pub mod world;

// Parallel execution
pub mod parallel;
pub mod schedule;

// Re-exports for convenience
pub use alloc::{AllocFn, AllocatorConfig, FreeFn};
pub use command::CommandKind;
pub use component::{
    ComponentCtor, ComponentDesc, ComponentDtor, ComponentFlags, ComponentId, ComponentMove,
};
pub use entity::Entity;
pub use error::{status_str, EcsError, Result};
pub use query::{Access, ChunkIter, ChunkView, ColumnSlice, Query, QueryDesc, QueryTerm};
pub use trace::{TraceEvent, TraceEventKind, TraceHook};
pub use world::{World, WorldConfig, WorldStats, DEFAULT_CHUNK_BYTES};

// Scheduler exports
pub use schedule::{schedule_queries, ChunkCallback, Schedule, ScheduleEntry, ScheduleStats};
