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

//! Deferred command buffer with struct variants.
//!
//! While a defer region is open, structural mutations are captured here
//! instead of applied. Add commands own a heap copy of the initial payload,
//! taken at enqueue time so the caller may immediately reuse its buffer.

use crate::component::ComponentId;
use crate::entity::Entity;

/// Which structural mutation a deferred command re-executes at flush time.
/// Also used as the auxiliary operation tag on trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    AddComponent,
    RemoveComponent,
    DestroyEntity,
}

/// One captured mutation.
pub(crate) struct Command {
    pub kind: CommandKind,
    pub entity: Entity,
    pub component: ComponentId,
    /// Owned copy of the initial value for `AddComponent`; sized by the
    /// component's registered layout. Freed on flush or world teardown.
    pub payload: Option<Box<[u8]>>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind)
            .field("entity", &self.entity)
            .field("component", &self.component)
            .field("payload_len", &self.payload.as_ref().map(|p| p.len()))
            .finish()
    }
}

/// Ordered capture of deferred mutations.
#[derive(Default)]
pub(crate) struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, command: Command) {
        if self.commands.capacity() == 0 {
            self.commands.reserve(64);
        }
        self.commands.push(command);
    }

    /// Drain everything in enqueue order, leaving the buffer empty.
    pub(crate) fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub(crate) fn len(&self) -> u32 {
        self.commands.len() as u32
    }

    pub(crate) fn clear(&mut self) {
        self.commands.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_drain_in_enqueue_order() {
        let mut buffer = CommandBuffer::new();
        buffer.push(Command {
            kind: CommandKind::AddComponent,
            entity: Entity::NULL,
            component: ComponentId::INVALID,
            payload: Some(vec![1, 2, 3].into_boxed_slice()),
        });
        buffer.push(Command {
            kind: CommandKind::DestroyEntity,
            entity: Entity::NULL,
            component: ComponentId::INVALID,
            payload: None,
        });
        assert_eq!(buffer.len(), 2);

        let drained = buffer.take();
        assert_eq!(drained[0].kind, CommandKind::AddComponent);
        assert_eq!(drained[1].kind, CommandKind::DestroyEntity);
        assert_eq!(buffer.len(), 0);
    }
}
