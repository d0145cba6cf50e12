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

//! Driver for a complete reward period computation.

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::{
    aggregator::{Aggregator, AggregatorConfig, OwnerReward, SkippedBlock},
    error::RewardsError,
    sampler::{Sampler, SamplerConfig},
    source::{EventSource, SnapshotSource},
    types::RewardPeriod,
};

/// Configuration of a [RewardsRun].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunConfig {
    pub sampler: SamplerConfig,
    pub aggregator: AggregatorConfig,
}

/// Lifecycle of a [RewardsRun].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Sampling,
    Aggregating,
    Finalized,
    Failed,
}

/// Rewards computed for a period, together with how they were obtained.
#[derive(Debug, Clone)]
pub struct RewardTable {
    pub period: RewardPeriod,
    /// Blocks chosen by the sampler, ascending.
    pub sampled_blocks: Vec<u64>,
    /// Number of sampled blocks that contributed to the average.
    pub successful_blocks: u64,
    pub skipped_blocks: Vec<SkippedBlock>,
    /// Rewards sorted by owner address.
    pub rewards: Vec<OwnerReward>,
}

impl RewardTable {
    /// Sum of all reward amounts.
    pub fn total_distributed(&self) -> Decimal {
        self.rewards.iter().map(|r| r.amount).sum()
    }

    /// Sum of all average shares. One, up to rounding.
    pub fn total_share(&self) -> Decimal {
        self.rewards.iter().map(|r| r.average_share).sum()
    }
}

/// A single reward period computation: `Init -> Sampling -> Aggregating -> Finalized`, or
/// `Failed` on any fatal error.
#[derive(Debug)]
pub struct RewardsRun {
    config: RunConfig,
    state: RunState,
}

impl RewardsRun {
    pub fn new(config: RunConfig) -> Self {
        Self { config, state: RunState::Init }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run the computation. A run can only be executed once.
    pub async fn execute<E, S>(
        &mut self,
        period: &RewardPeriod,
        events: &E,
        snapshots: &S,
        cancel: &CancellationToken,
    ) -> Result<RewardTable, RewardsError>
    where
        E: EventSource + ?Sized,
        S: SnapshotSource + ?Sized,
    {
        if self.state != RunState::Init {
            return Err(RewardsError::AlreadyExecuted);
        }

        let result = self.execute_inner(period, events, snapshots, cancel).await;
        match &result {
            Ok(_) => self.transition(RunState::Finalized),
            Err(err) => {
                tracing::error!(
                    "Reward run for blocks [{}, {}] failed: {}",
                    period.start_block(),
                    period.end_block(),
                    err
                );
                self.transition(RunState::Failed);
            }
        }
        result
    }

    async fn execute_inner<E, S>(
        &mut self,
        period: &RewardPeriod,
        events: &E,
        snapshots: &S,
        cancel: &CancellationToken,
    ) -> Result<RewardTable, RewardsError>
    where
        E: EventSource + ?Sized,
        S: SnapshotSource + ?Sized,
    {
        self.transition(RunState::Sampling);
        let sampler = Sampler::new(self.config.sampler);
        let sampled_blocks = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RewardsError::Cancelled),
            sampled = sampler.sample(period, events) => sampled?,
        };

        self.transition(RunState::Aggregating);
        let aggregator = Aggregator::new(self.config.aggregator);
        let aggregation = aggregator.aggregate(&sampled_blocks, snapshots, cancel).await?;
        let rewards = aggregation.finalize(period.reward_pool())?;

        Ok(RewardTable {
            period: *period,
            sampled_blocks,
            successful_blocks: aggregation.accumulator.successful_blocks(),
            skipped_blocks: aggregation.skipped,
            rewards,
        })
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!("Reward run state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Compute the reward table for `period` in a single call.
pub async fn compute_period_rewards<E, S>(
    period: &RewardPeriod,
    events: &E,
    snapshots: &S,
    config: RunConfig,
    cancel: &CancellationToken,
) -> Result<RewardTable, RewardsError>
where
    E: EventSource + ?Sized,
    S: SnapshotSource + ?Sized,
{
    RewardsRun::new(config).execute(period, events, snapshots, cancel).await
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        error::SourceError,
        types::{LiabilityEvent, Position, Snapshot},
    };

    struct FixedChain {
        positions: Vec<Position>,
    }

    #[async_trait]
    impl EventSource for FixedChain {
        async fn get_liability_events(
            &self,
            start_block: u64,
            _end_block: u64,
        ) -> Result<Vec<LiabilityEvent>, SourceError> {
            Ok(vec![LiabilityEvent::at_block(start_block + 1)])
        }
    }

    #[async_trait]
    impl SnapshotSource for FixedChain {
        async fn get_snapshot(&self, block: u64) -> Result<Snapshot, SourceError> {
            Ok(Snapshot::new(block, self.positions.clone()))
        }
    }

    fn config() -> RunConfig {
        RunConfig {
            sampler: SamplerConfig { filler_samples: 4, seed: Some(9) },
            ..Default::default()
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn run_reaches_finalized() {
        let chain = FixedChain {
            positions: vec![Position {
                position_id: 1,
                owner: Address::repeat_byte(0xaa),
                liability: dec!(42),
            }],
        };
        let period = RewardPeriod::new(10, 20, dec!(500)).unwrap();
        let mut run = RewardsRun::new(config());
        assert_eq!(run.state(), RunState::Init);

        let table = run.execute(&period, &chain, &chain, &CancellationToken::new()).await.unwrap();
        assert_eq!(run.state(), RunState::Finalized);
        assert_eq!(table.successful_blocks, table.sampled_blocks.len() as u64);
        assert!(table.skipped_blocks.is_empty());
        assert_eq!(table.total_distributed(), dec!(500));
        assert!(logs_contain("Sampling -> Aggregating"));

        let err =
            run.execute(&period, &chain, &chain, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RewardsError::AlreadyExecuted));
        assert_eq!(run.state(), RunState::Finalized);
    }

    #[tokio::test]
    async fn run_without_liability_fails() {
        let chain = FixedChain { positions: vec![] };
        let period = RewardPeriod::new(10, 20, dec!(500)).unwrap();
        let mut run = RewardsRun::new(config());

        let err =
            run.execute(&period, &chain, &chain, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RewardsError::NoValidSamples { .. }));
        assert_eq!(run.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn cancelled_before_start_fails() {
        let chain = FixedChain { positions: vec![] };
        let period = RewardPeriod::new(10, 20, dec!(500)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err =
            compute_period_rewards(&period, &chain, &chain, config(), &cancel).await.unwrap_err();
        assert!(matches!(err, RewardsError::Cancelled));
    }
}
