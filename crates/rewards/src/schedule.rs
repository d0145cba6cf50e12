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

//! Reward schedules: a reward pool and the list of periods it is paid out over.

use std::path::Path;

use anyhow::{bail, Context};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::RewardPeriod;

/// Inclusive block range of one period in a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PeriodRange {
    pub start_block: u64,
    pub end_block: u64,
}

/// A reward pool paid out once per listed period.
///
/// ```yaml
/// reward_pool: "51282"
/// periods:
///   - start_block: 16244257
///     end_block: 16294657
///   - start_block: 16294658
///     end_block: 16345058
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RewardSchedule {
    /// Amount distributed in each period.
    pub reward_pool: Decimal,
    pub periods: Vec<PeriodRange>,
}

impl RewardSchedule {
    /// Load a schedule from a `.yaml`/`.yml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schedule file {}", path.display()))?;

        let schedule = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            _ => bail!("unsupported schedule file extension: {}", path.display()),
        };
        schedule.with_context(|| format!("failed to parse schedule file {}", path.display()))
    }

    pub fn from_yaml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn from_json_str(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// The validated period at `index`.
    pub fn period(&self, index: usize) -> anyhow::Result<RewardPeriod> {
        let range = self.periods.get(index).with_context(|| {
            format!(
                "period index {index} out of range; schedule has {} periods",
                self.periods.len()
            )
        })?;
        Ok(RewardPeriod::new(range.start_block, range.end_block, self.reward_pool)?)
    }
}
