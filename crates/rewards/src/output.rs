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

//! Serialization of reward tables for the payout tooling.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::Context;
use clap::ValueEnum;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::run::RewardTable;

/// Output format of the reward table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// A single JSON array of `{owner, amount}` records.
    #[default]
    Json,
    /// One `{owner, amount}` JSON record per line.
    JsonLines,
    /// A single JSON object mapping owner to amount.
    Map,
}

/// One payout entry. Amounts are serialized as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardRecord {
    pub owner: String,
    pub amount: Decimal,
}

/// Payout records of `table`, in owner order.
pub fn reward_records(table: &RewardTable) -> Vec<RewardRecord> {
    table
        .rewards
        .iter()
        .map(|reward| RewardRecord {
            owner: reward.owner.to_checksum(None),
            amount: reward.amount.normalize(),
        })
        .collect()
}

/// Write the rewards of `table` to `writer` in the given format.
pub fn write_rewards<W: Write>(
    table: &RewardTable,
    format: OutputFormat,
    mut writer: W,
) -> anyhow::Result<()> {
    let records = reward_records(table);
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &records)?;
            writeln!(writer)?;
        }
        OutputFormat::JsonLines => {
            for record in &records {
                serde_json::to_writer(&mut writer, record)?;
                writeln!(writer)?;
            }
        }
        OutputFormat::Map => {
            let map: BTreeMap<&str, Decimal> =
                records.iter().map(|r| (r.owner.as_str(), r.amount)).collect();
            serde_json::to_writer_pretty(&mut writer, &map)?;
            writeln!(writer)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Write the rewards of `table` to `path`, or to stdout when no path is given.
pub fn write_rewards_to(
    table: &RewardTable,
    format: OutputFormat,
    path: Option<&Path>,
) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output file {}", path.display()))?;
            write_rewards(table, format, BufWriter::new(file))
                .with_context(|| format!("failed to write rewards to {}", path.display()))
        }
        None => write_rewards(table, format, std::io::stdout().lock()),
    }
}
