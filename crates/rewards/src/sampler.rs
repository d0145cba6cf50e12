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

//! Selection of the block heights at which liability state is measured.
//!
//! Shares only change at blocks carrying a liability event, so sampling exactly at those blocks
//! captures every constant regime. Random filler blocks are added on top so the average is
//! weighted by time rather than by event count.

use std::collections::BTreeSet;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    error::RewardsError,
    source::EventSource,
    types::{LiabilityEvent, RewardPeriod},
    DEFAULT_FILLER_SAMPLES,
};

/// Configuration of the [Sampler].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Number of uniformly random blocks drawn in addition to the event blocks.
    pub filler_samples: usize,
    /// Seed for the filler draw. When unset the RNG is seeded from the OS.
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { filler_samples: DEFAULT_FILLER_SAMPLES, seed: None }
    }
}

/// Produces the ordered, deduplicated set of blocks to snapshot for a reward period.
#[derive(Debug, Clone, Default)]
pub struct Sampler {
    config: SamplerConfig,
}

impl Sampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Sample blocks for the given period. The result is sorted ascending.
    pub async fn sample<E>(
        &self,
        period: &RewardPeriod,
        events: &E,
    ) -> Result<Vec<u64>, RewardsError>
    where
        E: EventSource + ?Sized,
    {
        self.sample_range(period.start_block(), period.end_block(), events).await
    }

    /// Sample blocks for `[start_block, end_block]`.
    ///
    /// The range is validated before the event source is queried.
    pub async fn sample_range<E>(
        &self,
        start_block: u64,
        end_block: u64,
        events: &E,
    ) -> Result<Vec<u64>, RewardsError>
    where
        E: EventSource + ?Sized,
    {
        if end_block < start_block {
            return Err(RewardsError::InvalidRange { start_block, end_block });
        }

        let events = events
            .get_liability_events(start_block, end_block)
            .await
            .map_err(RewardsError::SourceUnavailable)?;
        tracing::info!(
            "Found {} liability events in blocks [{}, {}]",
            events.len(),
            start_block,
            end_block
        );

        let mut blocks = event_blocks(start_block, end_block, &events);
        let event_block_count = blocks.len();

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        blocks.extend(random_filler_blocks(
            start_block,
            end_block,
            self.config.filler_samples,
            &mut rng,
        ));

        tracing::info!(
            "Sampled {} distinct blocks ({} from events, {} filler draws)",
            blocks.len(),
            event_block_count,
            self.config.filler_samples
        );
        Ok(blocks.into_iter().collect())
    }
}

/// Event-driven strategy: the start block plus every block carrying an event.
///
/// Events outside `[start_block, end_block]` are dropped.
pub fn event_blocks(start_block: u64, end_block: u64, events: &[LiabilityEvent]) -> BTreeSet<u64> {
    let mut blocks = BTreeSet::from([start_block]);
    for event in events {
        if event.block < start_block || event.block > end_block {
            tracing::warn!(
                "Ignoring event at block {} outside of range [{}, {}]",
                event.block,
                start_block,
                end_block
            );
            continue;
        }
        blocks.insert(event.block);
    }
    blocks
}

/// Random strategy: `count` independent uniform draws from `[start_block, end_block)`.
///
/// A single-block range has an empty half-open interval, so nothing is drawn.
pub fn random_filler_blocks<R: Rng>(
    start_block: u64,
    end_block: u64,
    count: usize,
    rng: &mut R,
) -> BTreeSet<u64> {
    if end_block <= start_block {
        return BTreeSet::new();
    }
    (0..count).map(|_| rng.random_range(start_block..end_block)).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tracing_test::traced_test;

    use super::*;
    use crate::error::SourceError;

    struct StaticEvents {
        blocks: Vec<u64>,
        calls: AtomicUsize,
    }

    impl StaticEvents {
        fn new(blocks: Vec<u64>) -> Self {
            Self { blocks, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl EventSource for StaticEvents {
        async fn get_liability_events(
            &self,
            _start_block: u64,
            _end_block: u64,
        ) -> Result<Vec<LiabilityEvent>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.blocks.iter().copied().map(LiabilityEvent::at_block).collect())
        }
    }

    struct DownEvents;

    #[async_trait]
    impl EventSource for DownEvents {
        async fn get_liability_events(
            &self,
            _start_block: u64,
            _end_block: u64,
        ) -> Result<Vec<LiabilityEvent>, SourceError> {
            Err(SourceError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn includes_start_and_event_blocks() {
        let sampler = Sampler::new(SamplerConfig { filler_samples: 0, seed: Some(1) });
        let period = RewardPeriod::new(100, 200, dec!(1)).unwrap();
        let events = StaticEvents::new(vec![150, 120, 150, 199]);

        let blocks = sampler.sample(&period, &events).await.unwrap();
        assert_eq!(blocks, vec![100, 120, 150, 199]);
    }

    #[tokio::test]
    #[traced_test]
    async fn drops_events_outside_range() {
        let sampler = Sampler::new(SamplerConfig { filler_samples: 0, seed: Some(1) });
        let events = StaticEvents::new(vec![99, 150, 201]);

        let blocks = sampler.sample_range(100, 200, &events).await.unwrap();
        assert_eq!(blocks, vec![100, 150]);
        assert!(logs_contain("outside of range"));
    }

    #[tokio::test]
    async fn filler_blocks_stay_in_half_open_range() {
        let sampler = Sampler::new(SamplerConfig { filler_samples: 500, seed: Some(42) });
        let events = StaticEvents::new(vec![]);

        let blocks = sampler.sample_range(1_000, 1_010, &events).await.unwrap();
        assert!(blocks.windows(2).all(|w| w[0] < w[1]), "sorted and distinct");
        assert!(blocks.iter().all(|b| (1_000..1_010).contains(b)));
        // 500 draws over 10 heights cover every one of them.
        assert_eq!(blocks, (1_000..1_010).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn single_block_period_draws_no_fillers() {
        let sampler = Sampler::new(SamplerConfig { filler_samples: 100, seed: Some(7) });
        let events = StaticEvents::new(vec![]);

        let blocks = sampler.sample_range(100, 100, &events).await.unwrap();
        assert_eq!(blocks, vec![100]);
    }

    #[tokio::test]
    async fn seeded_sampling_is_reproducible() {
        let config = SamplerConfig { filler_samples: 50, seed: Some(1234) };
        let events = StaticEvents::new(vec![5_000, 7_500]);

        let first = Sampler::new(config).sample_range(1, 1_000_000, &events).await.unwrap();
        let second = Sampler::new(config).sample_range(1, 1_000_000, &events).await.unwrap();
        assert_eq!(first, second);
        assert!(first.contains(&1) && first.contains(&5_000) && first.contains(&7_500));
    }

    #[tokio::test]
    async fn inverted_range_fails_before_querying() {
        let sampler = Sampler::default();
        let events = StaticEvents::new(vec![]);

        let err = sampler.sample_range(200, 100, &events).await.unwrap_err();
        assert!(matches!(err, RewardsError::InvalidRange { start_block: 200, end_block: 100 }));
        assert_eq!(events.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unavailable_event_source_is_fatal() {
        let sampler = Sampler::default();
        let err = sampler.sample_range(1, 10, &DownEvents).await.unwrap_err();
        assert!(matches!(err, RewardsError::SourceUnavailable(SourceError::Unavailable(_))));
        assert!(err.is_retryable());
    }
}
