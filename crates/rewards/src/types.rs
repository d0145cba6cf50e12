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

//! Core data types shared by the sampler, the aggregator and the sources.

use alloy::primitives::Address;
use rust_decimal::Decimal;

use crate::error::RewardsError;

/// A contiguous, fully closed block range over which one reward pool is distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardPeriod {
    start_block: u64,
    end_block: u64,
    reward_pool: Decimal,
}

impl RewardPeriod {
    /// Create a period covering `[start_block, end_block]`.
    pub fn new(
        start_block: u64,
        end_block: u64,
        reward_pool: Decimal,
    ) -> Result<Self, RewardsError> {
        if end_block < start_block {
            return Err(RewardsError::InvalidRange { start_block, end_block });
        }
        Ok(Self { start_block, end_block, reward_pool })
    }

    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    pub fn end_block(&self) -> u64 {
        self.end_block
    }

    pub fn reward_pool(&self) -> Decimal {
        self.reward_pool
    }

    /// Number of blocks in the period, both ends included.
    pub fn block_count(&self) -> u64 {
        self.end_block - self.start_block + 1
    }

    pub fn contains(&self, block: u64) -> bool {
        (self.start_block..=self.end_block).contains(&block)
    }
}

/// A single active position as observed at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// Protocol identifier of the position (the vault id).
    pub position_id: u64,
    /// Owner credited with the position's liability share.
    pub owner: Address,
    /// Outstanding liability, already scaled down by the token decimals.
    pub liability: Decimal,
}

/// The complete active-position set at one block height.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub block: u64,
    pub positions: Vec<Position>,
}

impl Snapshot {
    pub fn new(block: u64, positions: Vec<Position>) -> Self {
        Self { block, positions }
    }

    /// Sum of all position liabilities, or `None` on overflow.
    pub fn total_liability(&self) -> Option<Decimal> {
        self.positions.iter().try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.liability))
    }
}

/// An on-chain event that may change liability shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LiabilityEvent {
    pub block: u64,
    pub transaction_index: u64,
    pub log_index: u64,
}

impl LiabilityEvent {
    pub fn at_block(block: u64) -> Self {
        Self { block, transaction_index: 0, log_index: 0 }
    }
}
