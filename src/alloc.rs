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

//! Allocator facade for column memory
//!
//! The world routes every chunk column allocation through a pluggable
//! alloc/free pair. Hosts that embed the runtime into an engine with its own
//! memory tracking supply both hooks; everyone else gets the platform
//! aligned allocator.

use std::alloc::Layout;
use std::sync::Arc;

use crate::error::{EcsError, Result};

/// Allocation hook: returns a pointer aligned to `layout.align()`, or null.
pub type AllocFn = Arc<dyn Fn(Layout) -> *mut u8 + Send + Sync>;

/// Paired free hook: receives the same layout the allocation presented.
pub type FreeFn = Arc<dyn Fn(*mut u8, Layout) + Send + Sync>;

/// Host-supplied allocator hooks. The pair is all-or-nothing: supplying
/// exactly one of the two fails world creation with `InvalidArgument`.
#[derive(Default, Clone)]
pub struct AllocatorConfig {
    pub alloc: Option<AllocFn>,
    pub free: Option<FreeFn>,
}

/// Resolved allocator used by the world for all column memory.
#[derive(Clone)]
pub(crate) struct Allocator {
    alloc: AllocFn,
    free: FreeFn,
}

impl std::fmt::Debug for Allocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocator").finish_non_exhaustive()
    }
}

fn default_alloc(layout: Layout) -> *mut u8 {
    if layout.size() == 0 {
        return std::ptr::null_mut();
    }
    // SAFETY: size is non-zero and the layout was validated by the caller.
    unsafe { std::alloc::alloc(layout) }
}

fn default_free(ptr: *mut u8, layout: Layout) {
    if ptr.is_null() || layout.size() == 0 {
        return;
    }
    // SAFETY: ptr was returned by `default_alloc` with the same layout.
    unsafe { std::alloc::dealloc(ptr, layout) }
}

impl Allocator {
    /// Resolve the host config, enforcing the all-or-nothing pairing rule.
    pub(crate) fn resolve(config: AllocatorConfig) -> Result<Self> {
        match (config.alloc, config.free) {
            (Some(alloc), Some(free)) => Ok(Self { alloc, free }),
            (None, None) => Ok(Self {
                alloc: Arc::new(default_alloc),
                free: Arc::new(default_free),
            }),
            _ => Err(EcsError::InvalidArgument),
        }
    }

    /// Allocate `size` bytes at `align`. Zero-size requests return null
    /// without touching the hook; a null return for a non-zero request is
    /// `AllocationFailed`.
    pub(crate) fn alloc_bytes(&self, size: usize, align: usize) -> Result<*mut u8> {
        if size == 0 {
            return Ok(std::ptr::null_mut());
        }
        let layout =
            Layout::from_size_align(size, align).map_err(|_| EcsError::CapacityReached)?;
        let ptr = (self.alloc)(layout);
        if ptr.is_null() {
            return Err(EcsError::AllocationFailed);
        }
        Ok(ptr)
    }

    /// Free a prior allocation, presenting the same size and alignment.
    pub(crate) fn free_bytes(&self, ptr: *mut u8, size: usize, align: usize) {
        if ptr.is_null() || size == 0 {
            return;
        }
        if let Ok(layout) = Layout::from_size_align(size, align) {
            (self.free)(ptr, layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_pair_round_trip() {
        let allocator = Allocator::resolve(AllocatorConfig::default()).unwrap();
        let ptr = allocator.alloc_bytes(64, 16).unwrap();
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize % 16, 0);
        allocator.free_bytes(ptr, 64, 16);
    }

    #[test]
    fn test_zero_size_returns_null() {
        let allocator = Allocator::resolve(AllocatorConfig::default()).unwrap();
        assert!(allocator.alloc_bytes(0, 1).unwrap().is_null());
    }

    #[test]
    fn test_partial_pair_is_rejected() {
        let config = AllocatorConfig {
            alloc: Some(Arc::new(|_| std::ptr::null_mut())),
            free: None,
        };
        assert_eq!(
            Allocator::resolve(config).unwrap_err(),
            EcsError::InvalidArgument
        );
    }

    #[test]
    fn test_custom_pair_sees_matching_layouts() {
        let live = Arc::new(AtomicUsize::new(0));
        let live_alloc = live.clone();
        let live_free = live.clone();
        let config = AllocatorConfig {
            alloc: Some(Arc::new(move |layout: Layout| {
                live_alloc.fetch_add(layout.size(), Ordering::Relaxed);
                unsafe { std::alloc::alloc(layout) }
            })),
            free: Some(Arc::new(move |ptr: *mut u8, layout: Layout| {
                live_free.fetch_sub(layout.size(), Ordering::Relaxed);
                unsafe { std::alloc::dealloc(ptr, layout) }
            })),
        };
        let allocator = Allocator::resolve(config).unwrap();
        let ptr = allocator.alloc_bytes(128, 8).unwrap();
        assert_eq!(live.load(Ordering::Relaxed), 128);
        allocator.free_bytes(ptr, 128, 8);
        assert_eq!(live.load(Ordering::Relaxed), 0);
    }
}
