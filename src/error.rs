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

//! Error types

use thiserror::Error;

/// Failure status for every fallible world operation.
///
/// The numeric codes are stable: success is code 0 and is represented by
/// `Result::Ok`, so the enum starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(u32)]
pub enum EcsError {
    /// Null or malformed input: bad descriptor, zero worker count,
    /// overlapping query terms, mismatched payload length.
    #[error("invalid argument")]
    InvalidArgument = 1,

    /// Unknown component id or name, or removal of an absent component.
    #[error("not found")]
    NotFound = 2,

    /// Duplicate component name, or add of an already-present component.
    #[error("already exists")]
    AlreadyExists = 3,

    /// A u32 counter or capacity would overflow.
    #[error("capacity reached")]
    CapacityReached = 4,

    /// The allocator returned null.
    #[error("allocation failed")]
    AllocationFailed = 5,

    /// The handle's generation or index no longer refers to a live slot.
    #[error("stale entity")]
    StaleEntity = 6,

    /// Defer/flush nesting violation, parallel dispatch while deferring,
    /// with/without overlap, or schedule entries from multiple worlds.
    #[error("conflict")]
    Conflict = 7,

    /// Reserved.
    #[error("not implemented")]
    NotImplemented = 8,
}

impl EcsError {
    /// Stable numeric code (success is 0 and has no variant).
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Stable upper-case name, matching the wire-level status vocabulary.
    pub const fn as_str(self) -> &'static str {
        match self {
            EcsError::InvalidArgument => "INVALID_ARGUMENT",
            EcsError::NotFound => "NOT_FOUND",
            EcsError::AlreadyExists => "ALREADY_EXISTS",
            EcsError::CapacityReached => "CAPACITY_REACHED",
            EcsError::AllocationFailed => "ALLOCATION_FAILED",
            EcsError::StaleEntity => "STALE_ENTITY",
            EcsError::Conflict => "CONFLICT",
            EcsError::NotImplemented => "NOT_IMPLEMENTED",
        }
    }
}

/// Name for an optional status, where `None` is success.
pub fn status_str(status: Option<EcsError>) -> &'static str {
    match status {
        None => "OK",
        Some(err) => err.as_str(),
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
