// Copyright 2025 RISC Zero, Inc.
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

//! Error types for reward computation and the sources it reads from.

use thiserror::Error;

/// Failure reported by an event or snapshot source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Failed to decode source data: {0}")]
    Decode(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Fatal errors of a reward period computation.
///
/// Per-block source failures are not represented here; the aggregator records them as skipped
/// blocks and carries on.
#[derive(Error, Debug)]
pub enum RewardsError {
    #[error("Invalid block range: end block {end_block} is before start block {start_block}")]
    InvalidRange { start_block: u64, end_block: u64 },

    #[error("Event source unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),

    #[error("No valid samples: all {sampled} sampled blocks failed or had zero liability")]
    NoValidSamples { sampled: usize },

    #[error("Reward computation cancelled")]
    Cancelled,

    #[error("Reward run has already been executed")]
    AlreadyExecuted,
}

impl RewardsError {
    /// Whether re-running the whole period could succeed.
    ///
    /// Malformed input and caller-initiated cancellation are never retryable; exhaustion of the
    /// sources is, since the underlying failures are transient node or transport errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            RewardsError::SourceUnavailable(_) | RewardsError::NoValidSamples { .. } => true,
            RewardsError::InvalidRange { .. }
            | RewardsError::Cancelled
            | RewardsError::AlreadyExecuted => false,
        }
    }
}
