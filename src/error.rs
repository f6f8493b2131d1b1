// Copyright 2024 RisingWave Labs
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

use crate::types::StorageTag;

pub type Result<T> = std::result::Result<T, JoinError>;

/// Errors the join engine can surface to its caller.
///
/// Every physical join is a transaction over its output: on any of these
/// errors the partial output table is dropped and nothing escapes to the
/// caller (see the `Result`-returning signatures throughout `join::*`).
#[derive(thiserror::Error, Debug)]
pub enum JoinError {
    #[error("type mismatch in {op}: left column is {left:?}, right column is {right:?}")]
    TypeMismatch {
        op: &'static str,
        left: StorageTag,
        right: StorageTag,
    },

    #[error("null input table for {op}")]
    NullInput { op: &'static str },

    #[error("fetch_join requires a dense void head on one side ({op})")]
    WrongShape { op: &'static str },

    #[error("out of memory while allocating {what} ({requested} slots)")]
    OutOfMemory { what: &'static str, requested: usize },

    #[error("miss in fetch: hit_always was asserted but a left row found no match")]
    MissInFetch,

    #[error("merge_join requires a sorted right head, but {op} saw an unsorted one")]
    NotSorted { op: &'static str },
}

impl JoinError {
    /// Whether retrying the same call with a fresh allocation budget could
    /// plausibly succeed. Used by callers that wrap the engine in a retry
    /// loop around transient allocation pressure.
    pub fn retryable(&self) -> bool {
        matches!(self, JoinError::OutOfMemory { .. })
    }
}
