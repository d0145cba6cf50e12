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

//! Time-weighted liability share rewards for lending protocol borrowers.
//!
//! A reward period is sampled at a set of blocks, each borrower's share of the total outstanding
//! liability is measured at every sampled block, and the pool is split by the average share.

use std::time::Duration;

// Declare modules
pub mod aggregator;
pub mod chain;
pub mod deployments;
pub mod error;
pub mod events;
pub mod output;
pub mod run;
pub mod sampler;
pub mod schedule;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use aggregator::{
    compute_block_shares, Aggregation, Aggregator, AggregatorConfig, BlockShares, OwnerAccumulator,
    OwnerReward, SkipReason, SkippedBlock,
};

pub use chain::{connect_http, liability_to_decimal, RetryConfig, VaultControllerSource};

pub use deployments::Deployment;

pub use error::{RewardsError, SourceError};

pub use events::{fetch_interest_events, query_logs_chunked};

pub use output::{write_rewards, write_rewards_to, OutputFormat, RewardRecord};

pub use run::{compute_period_rewards, RewardTable, RewardsRun, RunConfig, RunState};

pub use sampler::{event_blocks, random_filler_blocks, Sampler, SamplerConfig};

pub use schedule::{PeriodRange, RewardSchedule};

pub use source::{EventSource, SnapshotSource};

pub use types::{LiabilityEvent, Position, RewardPeriod, Snapshot};

/// Decimals of the on-chain liability amounts.
pub const LIABILITY_DECIMALS: u32 = 18;
/// Default number of random filler blocks drawn per period.
pub const DEFAULT_FILLER_SAMPLES: usize = 1000;
/// Default number of snapshot fetches in flight.
pub const DEFAULT_CONCURRENCY: usize = 8;
/// Default timeout of a single snapshot fetch.
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(30);
/// Chunk size for log queries to avoid rate limiting
pub const LOG_QUERY_CHUNK_SIZE: u64 = 2500;
