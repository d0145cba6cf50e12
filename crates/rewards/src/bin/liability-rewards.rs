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

use std::{path::PathBuf, time::Duration};

use alloy::providers::Provider;
use anyhow::{Context, Result};
use clap::Parser;
use liability_rewards::{
    compute_period_rewards, connect_http, write_rewards_to, AggregatorConfig, Deployment,
    OutputFormat, RetryConfig, RewardPeriod, RewardSchedule, RewardTable, RunConfig, SamplerConfig,
    VaultControllerSource, DEFAULT_CONCURRENCY, DEFAULT_FILLER_SAMPLES,
};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Arguments for the liability rewards calculator.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct LiabilityRewardsArgs {
    /// URL of the Ethereum RPC endpoint.
    #[clap(short, long, env)]
    rpc_url: Url,

    /// First block of the reward period (inclusive).
    #[clap(long, conflicts_with = "schedule", requires_all = ["end_block", "reward_pool"])]
    start_block: Option<u64>,

    /// Last block of the reward period (inclusive).
    #[clap(long, conflicts_with = "schedule", requires = "start_block")]
    end_block: Option<u64>,

    /// Total reward amount distributed over the period.
    #[clap(long, conflicts_with = "schedule", requires = "start_block")]
    reward_pool: Option<Decimal>,

    /// Reward schedule file (YAML or JSON) listing the periods and the reward pool.
    #[clap(long, env)]
    schedule: Option<PathBuf>,

    /// Index of the period to compute within the schedule. Defaults to the first period.
    #[clap(long, requires = "schedule")]
    period: Option<usize>,

    /// Number of random filler blocks sampled in addition to the interest event blocks.
    #[clap(long, default_value_t = DEFAULT_FILLER_SAMPLES)]
    filler_samples: usize,

    /// Seed for the filler block draw. Makes the sampled blocks reproducible.
    #[clap(long)]
    seed: Option<u64>,

    /// Maximum number of snapshot fetches in flight.
    #[clap(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Timeout in seconds of a single block snapshot fetch.
    #[clap(long, default_value = "30")]
    block_timeout: u64,

    /// Number of retries of a failed RPC request.
    #[clap(long, default_value = "3")]
    rpc_retries: u32,

    /// File to write the reward table to. Defaults to stdout.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Format of the reward table.
    #[clap(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,

    /// Deployment to use
    #[clap(flatten, next_help_heading = "Lending Protocol Deployment")]
    deployment: Option<Deployment>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = LiabilityRewardsArgs::parse();

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .from_env_lossy();

    if args.log_json {
        tracing_subscriber::fmt().with_ansi(false).json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_ansi(false).with_env_filter(filter).init();
    }

    let period = resolve_period(&args)?;
    let retry = RetryConfig { max_retries: args.rpc_retries, ..Default::default() };
    let provider = connect_http(args.rpc_url.clone(), retry);
    let chain_id = provider.get_chain_id().await.context("failed to query chain ID")?;
    let deployment = match args.deployment.clone() {
        Some(deployment) => deployment,
        None => Deployment::from_chain_id(chain_id)
            .context("Could not determine deployment from chain ID; specify it explicitly")?,
    };
    tracing::info!("Using deployment: {:?}", deployment);

    let source = VaultControllerSource::new(provider, deployment.vault_controller_address);
    let config = RunConfig {
        sampler: SamplerConfig { filler_samples: args.filler_samples, seed: args.seed },
        aggregator: AggregatorConfig {
            concurrency: args.concurrency,
            block_timeout: Duration::from_secs(args.block_timeout),
        },
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl-C, cancelling reward computation");
            ctrl_c_cancel.cancel();
        }
    });

    tracing::info!(
        "Computing rewards for blocks [{}, {}] with a pool of {}",
        period.start_block(),
        period.end_block(),
        period.reward_pool()
    );
    let table = match compute_period_rewards(&period, &source, &source, config, &cancel).await {
        Ok(table) => table,
        Err(err) => {
            if err.is_retryable() {
                tracing::error!("Reward computation failed; the run may be retried: {}", err);
            }
            return Err(err.into());
        }
    };

    log_summary(&table);
    write_rewards_to(&table, args.format, args.output.as_deref())?;
    Ok(())
}

fn resolve_period(args: &LiabilityRewardsArgs) -> Result<RewardPeriod> {
    if let Some(path) = &args.schedule {
        let schedule = RewardSchedule::load(path)?;
        return schedule.period(args.period.unwrap_or(0));
    }

    let start_block =
        args.start_block.context("--start-block is required when no --schedule is given")?;
    let end_block = args.end_block.context("--end-block is required with --start-block")?;
    let reward_pool = args.reward_pool.context("--reward-pool is required with --start-block")?;
    Ok(RewardPeriod::new(start_block, end_block, reward_pool)?)
}

fn log_summary(table: &RewardTable) {
    tracing::info!(
        "Sampled {} blocks: {} successful, {} skipped",
        table.sampled_blocks.len(),
        table.successful_blocks,
        table.skipped_blocks.len()
    );
    for skipped in &table.skipped_blocks {
        tracing::debug!("Skipped block {}: {}", skipped.block, skipped.reason);
    }
    tracing::info!(
        "{} owners rewarded, {} distributed out of {}",
        table.rewards.len(),
        table.total_distributed(),
        table.period.reward_pool()
    );
}
