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

//! Trace hook: a single synchronous observer per world.
//!
//! The hook fires before the triggering operation returns to the caller.
//! It MUST NOT call back into the world; the world may be mid-mutation
//! when the hook runs.

use crate::command::CommandKind;
use crate::component::ComponentId;
use crate::entity::Entity;
use crate::error::EcsError;

/// Lifecycle event kinds, 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TraceEventKind {
    DeferBegin = 1,
    DeferEnd = 2,
    DeferEnqueue = 3,
    FlushBegin = 4,
    FlushApply = 5,
    FlushEnd = 6,
    EntityCreate = 7,
    EntityDestroy = 8,
    ComponentAdd = 9,
    ComponentRemove = 10,
    QueryIterBegin = 11,
    QueryIterChunk = 12,
    QueryIterEnd = 13,
}

/// Snapshot delivered to the trace hook for each lifecycle event.
#[derive(Debug, Clone, Copy)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    /// `None` is success; `Some` carries the failing status. Per-command
    /// flush results are only observable here, on `FlushApply` events.
    pub status: Option<EcsError>,
    /// Subject entity, or `Entity::NULL` when the event has none.
    pub entity: Entity,
    /// Subject component, or `ComponentId::INVALID` when the event has none.
    pub component: ComponentId,
    /// For defer/flush events: which structural operation was captured or
    /// re-executed.
    pub op: Option<CommandKind>,
    pub live_entities: u32,
    pub pending_commands: u32,
    pub defer_depth: u32,
}

/// Observer callback. Host state is closure capture.
pub type TraceHook = Box<dyn Fn(&TraceEvent) + Send + Sync>;
