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

//! Aggregation of per-block liability shares into per-owner average shares and rewards.

use std::{collections::BTreeMap, time::Duration};

use alloy::primitives::Address;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{RewardsError, SourceError},
    source::SnapshotSource,
    types::Snapshot,
    DEFAULT_BLOCK_TIMEOUT, DEFAULT_CONCURRENCY,
};

/// Configuration of the [Aggregator].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Maximum number of snapshot fetches in flight.
    pub concurrency: usize,
    /// Timeout applied to each snapshot fetch individually.
    pub block_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { concurrency: DEFAULT_CONCURRENCY, block_timeout: DEFAULT_BLOCK_TIMEOUT }
    }
}

/// Why a sampled block did not contribute to the average.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("snapshot fetch failed: {0}")]
    Source(#[from] SourceError),

    #[error("snapshot fetch timed out")]
    Timeout,

    #[error("total liability is zero")]
    ZeroLiability,

    #[error("snapshot contains a negative liability")]
    NegativeLiability,

    #[error("liability arithmetic overflowed")]
    Overflow,
}

/// A sampled block that was left out of the average.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBlock {
    pub block: u64,
    pub reason: SkipReason,
}

/// Fractional liability shares of every owner at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockShares {
    pub block: u64,
    pub total_liability: Decimal,
    /// Share per owner. Owners holding several positions have them summed.
    pub shares: BTreeMap<Address, Decimal>,
}

/// Compute each owner's share of the total liability in `snapshot`.
///
/// Blocks with zero total liability are degenerate and are rejected instead of divided by.
pub fn compute_block_shares(block: u64, snapshot: &Snapshot) -> Result<BlockShares, SkipReason> {
    if snapshot.positions.iter().any(|p| p.liability < Decimal::ZERO) {
        return Err(SkipReason::NegativeLiability);
    }
    let total_liability = snapshot.total_liability().ok_or(SkipReason::Overflow)?;
    if total_liability.is_zero() {
        return Err(SkipReason::ZeroLiability);
    }

    let mut shares: BTreeMap<Address, Decimal> = BTreeMap::new();
    for position in &snapshot.positions {
        let share = position.liability.checked_div(total_liability).ok_or(SkipReason::Overflow)?;
        *shares.entry(position.owner).or_default() += share;
    }

    Ok(BlockShares { block, total_liability, shares })
}

/// Running per-owner sum of fractional shares over the successfully processed blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerAccumulator {
    shares: BTreeMap<Address, Decimal>,
    successful_blocks: u64,
}

/// Reward owed to one owner for a period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerReward {
    pub owner: Address,
    /// Accumulated share divided by the number of successful blocks.
    pub average_share: Decimal,
    /// `average_share * reward_pool`.
    pub amount: Decimal,
}

impl OwnerAccumulator {
    /// Apply the shares of one block and count it as successful.
    pub fn apply(&mut self, block: &BlockShares) {
        for (owner, share) in &block.shares {
            *self.shares.entry(*owner).or_default() += *share;
        }
        self.successful_blocks += 1;
    }

    pub fn successful_blocks(&self) -> u64 {
        self.successful_blocks
    }

    pub fn accumulated_share(&self, owner: &Address) -> Option<Decimal> {
        self.shares.get(owner).copied()
    }

    /// Accumulated share averaged over the successful blocks.
    pub fn average_share(&self, owner: &Address) -> Option<Decimal> {
        if self.successful_blocks == 0 {
            return None;
        }
        self.accumulated_share(owner).map(|share| share / Decimal::from(self.successful_blocks))
    }

    /// Convert the average shares into rewards, sorted by owner.
    ///
    /// Owners with a zero average share are left out. Returns `None` when no block was applied.
    pub fn rewards(&self, reward_pool: Decimal) -> Option<Vec<OwnerReward>> {
        if self.successful_blocks == 0 {
            return None;
        }
        let blocks = Decimal::from(self.successful_blocks);
        let rewards = self
            .shares
            .iter()
            .map(|(owner, share)| (*owner, *share / blocks))
            .filter(|(_, average_share)| !average_share.is_zero())
            .map(|(owner, average_share)| OwnerReward {
                owner,
                average_share,
                amount: average_share * reward_pool,
            })
            .collect();
        Some(rewards)
    }
}

/// Outcome of aggregating a set of sampled blocks.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Number of distinct blocks that were processed.
    pub sampled: usize,
    pub accumulator: OwnerAccumulator,
    /// Skipped blocks, sorted by block number.
    pub skipped: Vec<SkippedBlock>,
}

impl Aggregation {
    /// Convert into a reward list, failing if no sampled block produced a valid snapshot.
    pub fn finalize(&self, reward_pool: Decimal) -> Result<Vec<OwnerReward>, RewardsError> {
        self.accumulator
            .rewards(reward_pool)
            .ok_or(RewardsError::NoValidSamples { sampled: self.sampled })
    }
}

/// Fetches a snapshot for every sampled block and folds the shares into an [OwnerAccumulator].
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Aggregate shares over `blocks`.
    ///
    /// Each distinct block is fetched once. Fetches run with bounded concurrency and complete in
    /// any order, but their partial results are folded in ascending block order, so the result
    /// does not depend on completion order. Only blocks that arrive ahead of a still pending
    /// lower block are held back. A failed, timed out or degenerate block is recorded and
    /// skipped. Cancelling `cancel` drops all in-flight fetches and returns no partial result.
    pub async fn aggregate<S>(
        &self,
        blocks: &[u64],
        source: &S,
        cancel: &CancellationToken,
    ) -> Result<Aggregation, RewardsError>
    where
        S: SnapshotSource + ?Sized,
    {
        let mut order = blocks.to_vec();
        order.sort_unstable();
        order.dedup();

        let block_timeout = self.config.block_timeout;
        let mut fetches = futures_util::stream::iter(order.clone())
            .map(|block| async move {
                let fetched = tokio::time::timeout(block_timeout, source.get_snapshot(block)).await;
                let outcome = match fetched {
                    Ok(Ok(snapshot)) => compute_block_shares(block, &snapshot),
                    Ok(Err(err)) => Err(SkipReason::Source(err)),
                    Err(_) => Err(SkipReason::Timeout),
                };
                (block, outcome)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        let mut fold = OrderedFold::new(order);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(
                        "Aggregation cancelled after {} of {} blocks",
                        fold.received(),
                        fold.len()
                    );
                    return Err(RewardsError::Cancelled);
                }
                next = fetches.next() => next,
            };
            let Some((block, outcome)) = next else {
                break;
            };

            match &outcome {
                Ok(shares) => tracing::debug!(
                    "Block {} done: {} owners, total liability {}",
                    block,
                    shares.shares.len(),
                    shares.total_liability
                ),
                Err(reason) => tracing::warn!("Skipping block {}: {}", block, reason),
            }
            fold.push(block, outcome);
        }

        let aggregation = fold.finish();
        tracing::info!(
            "Aggregated {} blocks: {} successful, {} skipped",
            aggregation.sampled,
            aggregation.accumulator.successful_blocks(),
            aggregation.skipped.len()
        );
        Ok(aggregation)
    }
}

/// Applies block outcomes in ascending block order as they become contiguous.
#[derive(Debug)]
struct OrderedFold {
    /// Distinct blocks, ascending.
    order: Vec<u64>,
    /// Index into `order` of the next block to apply.
    cursor: usize,
    /// Outcomes that arrived before a lower block.
    pending: BTreeMap<u64, Result<BlockShares, SkipReason>>,
    received: usize,
    accumulator: OwnerAccumulator,
    skipped: Vec<SkippedBlock>,
}

impl OrderedFold {
    fn new(order: Vec<u64>) -> Self {
        Self {
            order,
            cursor: 0,
            pending: BTreeMap::new(),
            received: 0,
            accumulator: OwnerAccumulator::default(),
            skipped: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn received(&self) -> usize {
        self.received
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.pending.len()
    }

    fn push(&mut self, block: u64, outcome: Result<BlockShares, SkipReason>) {
        self.received += 1;
        self.pending.insert(block, outcome);
        while let Some(next) = self.order.get(self.cursor) {
            let Some(outcome) = self.pending.remove(next) else {
                break;
            };
            match outcome {
                Ok(shares) => self.accumulator.apply(&shares),
                Err(reason) => self.skipped.push(SkippedBlock { block: *next, reason }),
            }
            self.cursor += 1;
        }
    }

    fn finish(self) -> Aggregation {
        Aggregation { sampled: self.received, accumulator: self.accumulator, skipped: self.skipped }
    }
}
