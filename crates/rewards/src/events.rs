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

//! Event fetching and log querying utilities.

use alloy::{
    primitives::Address,
    providers::Provider,
    rpc::types::{BlockNumberOrTag, Filter, Log},
    sol_types::SolEvent,
};
use anyhow::Context;

use crate::{chain::IVaultController, types::LiabilityEvent, LOG_QUERY_CHUNK_SIZE};

/// Query logs in chunks to avoid hitting provider limits
pub async fn query_logs_chunked<P: Provider>(
    provider: &P,
    filter: Filter,
    from_block: u64,
    to_block: u64,
) -> anyhow::Result<Vec<Log>> {
    let mut all_logs = Vec::new();

    let mut current_from = from_block;
    while current_from <= to_block {
        let current_to = current_from.saturating_add(LOG_QUERY_CHUNK_SIZE - 1).min(to_block);

        let chunk_filter = filter
            .clone()
            .from_block(BlockNumberOrTag::Number(current_from))
            .to_block(BlockNumberOrTag::Number(current_to));

        let logs = provider.get_logs(&chunk_filter).await?;
        tracing::debug!("Fetched {} logs in blocks [{}, {}]", logs.len(), current_from, current_to);
        all_logs.extend(logs);

        if current_to == u64::MAX {
            break;
        }
        current_from = current_to + 1;
    }

    Ok(all_logs)
}

/// Fetch the interest accrual events emitted by the vault controller in `[from_block, to_block]`.
///
/// Interest accrual is what moves every vault's liability, so these blocks are where liability
/// shares change.
pub async fn fetch_interest_events<P: Provider>(
    provider: &P,
    vault_controller: Address,
    from_block: u64,
    to_block: u64,
) -> anyhow::Result<Vec<LiabilityEvent>> {
    let filter = Filter::new()
        .address(vault_controller)
        .event_signature(IVaultController::InterestEvent::SIGNATURE_HASH);

    let logs = query_logs_chunked(provider, filter, from_block, to_block)
        .await
        .context("Failed to get interest event logs")?;

    let mut events = logs.iter().map(log_to_event).collect::<anyhow::Result<Vec<_>>>()?;
    events.sort();
    Ok(events)
}

fn log_to_event(log: &Log) -> anyhow::Result<LiabilityEvent> {
    let block = log.block_number.context("Interest event log is missing its block number")?;
    Ok(LiabilityEvent {
        block,
        transaction_index: log.transaction_index.unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
    })
}
