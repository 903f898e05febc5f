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

//! Component descriptors and the name-keyed registry.
//!
//! Components are registered at runtime by name with an explicit size and
//! alignment; there is no static-type discovery. Ids are dense small
//! integers starting at 1, with 0 reserved as invalid.

use std::sync::Arc;

use crate::error::{EcsError, Result};
use crate::utils::is_power_of_two;

/// Dense runtime component identifier. Zero is reserved as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct ComponentId(u32);

impl ComponentId {
    /// The reserved invalid id.
    pub const INVALID: ComponentId = ComponentId(0);

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    pub(crate) fn from_index(index: usize) -> Self {
        ComponentId(index as u32 + 1)
    }

    pub(crate) fn index(self) -> usize {
        debug_assert!(self.0 != 0);
        self.0 as usize - 1
    }
}

bitflags::bitflags! {
    /// Registration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ComponentFlags: u32 {
        /// Zero-size presence marker; never allocates a column.
        const TAG = 1 << 0;
        /// Rows may be relocated with a plain memcpy even when a move hook
        /// is registered.
        const TRIVIALLY_RELOCATABLE = 1 << 1;
    }
}

/// Constructor hook: initialize `count` fresh rows starting at `dst`.
pub type ComponentCtor = Arc<dyn Fn(*mut u8, u32) + Send + Sync>;

/// Destructor hook: tear down `count` live rows starting at `dst`.
pub type ComponentDtor = Arc<dyn Fn(*mut u8, u32) + Send + Sync>;

/// Move hook: relocate `count` rows from `src` to `dst`; `src` is dead after.
pub type ComponentMove = Arc<dyn Fn(*mut u8, *const u8, u32) + Send + Sync>;

/// Registration input for one component type.
#[derive(Clone, Default)]
pub struct ComponentDesc {
    pub name: String,
    pub size: u32,
    pub align: u32,
    pub flags: ComponentFlags,
    pub ctor: Option<ComponentCtor>,
    pub dtor: Option<ComponentDtor>,
    pub move_fn: Option<ComponentMove>,
}

impl ComponentDesc {
    /// Plain POD-style component with an explicit layout.
    pub fn new(name: impl Into<String>, size: u32, align: u32) -> Self {
        Self {
            name: name.into(),
            size,
            align,
            ..Default::default()
        }
    }

    /// Layout taken from a Rust type. Convenience only; the registry still
    /// treats the component as raw bytes.
    pub fn for_type<T>(name: impl Into<String>) -> Self {
        Self::new(
            name,
            std::mem::size_of::<T>() as u32,
            std::mem::align_of::<T>() as u32,
        )
    }

    /// Zero-size tag component.
    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            align: 1,
            flags: ComponentFlags::TAG,
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: ComponentFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_ctor(mut self, ctor: impl Fn(*mut u8, u32) + Send + Sync + 'static) -> Self {
        self.ctor = Some(Arc::new(ctor));
        self
    }

    pub fn with_dtor(mut self, dtor: impl Fn(*mut u8, u32) + Send + Sync + 'static) -> Self {
        self.dtor = Some(Arc::new(dtor));
        self
    }

    pub fn with_move(
        mut self,
        move_fn: impl Fn(*mut u8, *const u8, u32) + Send + Sync + 'static,
    ) -> Self {
        self.move_fn = Some(Arc::new(move_fn));
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(EcsError::InvalidArgument);
        }
        if self.flags.contains(ComponentFlags::TAG) {
            if self.size != 0 {
                return Err(EcsError::InvalidArgument);
            }
            if self.align != 0 && self.align != 1 {
                return Err(EcsError::InvalidArgument);
            }
            return Ok(());
        }
        if self.size == 0 || !is_power_of_two(self.align) {
            return Err(EcsError::InvalidArgument);
        }
        Ok(())
    }
}

/// One registered component.
pub(crate) struct ComponentRecord {
    pub name: String,
    pub size: u32,
    pub align: u32,
    pub flags: ComponentFlags,
    pub ctor: Option<ComponentCtor>,
    pub dtor: Option<ComponentDtor>,
    pub move_fn: Option<ComponentMove>,
}

impl ComponentRecord {
    pub(crate) fn is_tag(&self) -> bool {
        self.flags.contains(ComponentFlags::TAG)
    }
}

/// Name-keyed component table. Lookup by name is a linear scan over the
/// records; registration is rare and the set stays small.
pub(crate) struct ComponentRegistry {
    records: Vec<ComponentRecord>,
}

impl ComponentRegistry {
    pub(crate) fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub(crate) fn reserve(&mut self, min_capacity: u32) {
        let len = self.records.len();
        let target = (min_capacity as usize).max(16);
        if target > len {
            self.records.reserve(target - len);
        }
    }

    pub(crate) fn register(&mut self, desc: &ComponentDesc) -> Result<ComponentId> {
        desc.validate()?;
        if self.records.iter().any(|record| record.name == desc.name) {
            return Err(EcsError::AlreadyExists);
        }
        if self.records.len() as u64 >= u32::MAX as u64 - 1 {
            return Err(EcsError::CapacityReached);
        }
        self.records.push(ComponentRecord {
            name: desc.name.clone(),
            size: desc.size,
            align: desc.align.max(1),
            flags: desc.flags,
            ctor: desc.ctor.clone(),
            dtor: desc.dtor.clone(),
            move_fn: desc.move_fn.clone(),
        });
        Ok(ComponentId::from_index(self.records.len() - 1))
    }

    pub(crate) fn find(&self, name: &str) -> Option<ComponentId> {
        self.records
            .iter()
            .position(|record| record.name == name)
            .map(ComponentId::from_index)
    }

    pub(crate) fn get(&self, id: ComponentId) -> Option<&ComponentRecord> {
        if !id.is_valid() {
            return None;
        }
        self.records.get(id.index())
    }

    pub(crate) fn len(&self) -> u32 {
        self.records.len() as u32
    }

    /// All ids in ascending order.
    pub(crate) fn ids(&self) -> Vec<ComponentId> {
        (0..self.records.len())
            .map(ComponentId::from_index)
            .collect()
    }
}
