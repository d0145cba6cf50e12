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

//! Event and snapshot sources backed by a lending protocol's vault controller contract.

use std::{collections::HashMap, sync::Arc};

use alloy::{
    eips::BlockId,
    primitives::{aliases::U96, Address, U256},
    providers::{
        fillers::{ChainIdFiller, FillProvider, JoinFill},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::client::RpcClient,
    transports::layers::RetryBackoffLayer,
};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OnceCell};
use url::Url;

use crate::{
    error::SourceError,
    events::fetch_interest_events,
    source::{EventSource, SnapshotSource},
    types::{LiabilityEvent, Position, Snapshot},
    DEFAULT_CONCURRENCY, LIABILITY_DECIMALS,
};

alloy::sol! {
    #[sol(rpc, all_derives)]
    interface IVaultController {
        struct VaultSummary {
            uint96 id;
            uint192 borrowingPower;
            uint192 vaultLiability;
            address[] tokenAddresses;
            uint256[] tokenBalances;
        }

        event InterestEvent(uint64 epoch, uint192 amount, uint256 curve_val);

        function vaultsMinted() external view returns (uint96);
        function vaultAddress(uint96 id) external view returns (address);
        function vaultSummaries(uint96 start, uint96 stop)
            external
            view
            returns (VaultSummary[] memory);
    }

    #[sol(rpc, all_derives)]
    interface IVault {
        function minter() external view returns (address);
    }
}

/// Provider type used by the CLI: chain ID filler only, with retry and backoff on the transport.
pub type ProviderType = FillProvider<JoinFill<Identity, ChainIdFiller>, RootProvider>;

/// Retry policy of the RPC transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub compute_units_per_second: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, initial_backoff_ms: 1000, compute_units_per_second: 200 }
    }
}

/// Build an HTTP provider that retries rate limited and transient failures.
pub fn connect_http(rpc_url: Url, retry: RetryConfig) -> ProviderType {
    let retry_layer = RetryBackoffLayer::new(
        retry.max_retries,
        retry.initial_backoff_ms,
        retry.compute_units_per_second,
    );
    ProviderBuilder::new()
        .disable_recommended_fillers()
        .filler(ChainIdFiller::default())
        .connect_client(RpcClient::builder().layer(retry_layer).http(rpc_url))
}

/// Convert a raw on-chain amount with `decimals` decimals into a [Decimal].
///
/// The whole and fractional parts are converted separately so that amounts far beyond the
/// precision of a single `i128` still convert, rounding only the least significant digits.
pub fn liability_to_decimal(raw: U256, decimals: u32) -> Result<Decimal, SourceError> {
    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let (whole, fraction) = raw.div_rem(divisor);

    let out_of_range = || SourceError::Decode(format!("liability {raw} is out of range"));
    let whole = i128::try_from(whole).map_err(|_| out_of_range())?;
    let whole = Decimal::try_from_i128_with_scale(whole, 0).map_err(|_| out_of_range())?;
    let fraction = i128::try_from(fraction).map_err(|_| out_of_range())?;
    let fraction =
        Decimal::try_from_i128_with_scale(fraction, decimals).map_err(|_| out_of_range())?;

    whole.checked_add(fraction).ok_or_else(out_of_range)
}

fn rpc_error(context: &str, err: impl std::fmt::Display) -> SourceError {
    SourceError::Rpc(format!("{context}: {err}"))
}

/// Reads vault liabilities and interest events from a vault controller.
///
/// Owners are resolved through each vault's `minter()` and cached by vault id, since the minter
/// of a vault never changes. Concurrent snapshots share one lookup per vault.
pub struct VaultControllerSource<P> {
    provider: P,
    vault_controller: Address,
    decimals: u32,
    owner_concurrency: usize,
    minters: Mutex<HashMap<u64, Arc<OnceCell<Address>>>>,
}

impl<P: Provider> VaultControllerSource<P> {
    pub fn new(provider: P, vault_controller: Address) -> Self {
        Self {
            provider,
            vault_controller,
            decimals: LIABILITY_DECIMALS,
            owner_concurrency: DEFAULT_CONCURRENCY,
            minters: Mutex::new(HashMap::new()),
        }
    }

    /// Override the number of decimals of the liability token.
    pub fn with_decimals(self, decimals: u32) -> Self {
        Self { decimals, ..self }
    }

    /// Override the number of owner lookups in flight per snapshot.
    pub fn with_owner_concurrency(self, owner_concurrency: usize) -> Self {
        Self { owner_concurrency, ..self }
    }

    pub fn vault_controller(&self) -> Address {
        self.vault_controller
    }

    async fn fetch_minter(&self, vault_id: u64, block: BlockId) -> Result<Address, SourceError> {
        let controller = IVaultController::new(self.vault_controller, &self.provider);
        let vault = controller
            .vaultAddress(U96::from(vault_id))
            .block(block)
            .call()
            .await
            .map_err(|e| rpc_error(&format!("vaultAddress({vault_id})"), e))?;
        IVault::new(vault, &self.provider)
            .minter()
            .block(block)
            .call()
            .await
            .map_err(|e| rpc_error(&format!("minter() of vault {vault}"), e))
    }

    /// Owner of `vault_id`. The first caller fetches it, concurrent callers wait for that fetch.
    /// A failed fetch leaves the entry empty so a later call retries it.
    async fn resolve_owner(&self, vault_id: u64, block: BlockId) -> Result<Address, SourceError> {
        let cell = self.minters.lock().await.entry(vault_id).or_default().clone();
        cell.get_or_try_init(|| async {
            tracing::trace!("Resolving owner of vault {}", vault_id);
            self.fetch_minter(vault_id, block).await
        })
        .await
        .copied()
    }

    /// Resolve the owner of every vault in `vault_ids`.
    async fn resolve_owners(
        &self,
        vault_ids: &[u64],
        block: BlockId,
    ) -> Result<HashMap<u64, Address>, SourceError> {
        futures_util::stream::iter(vault_ids.iter().copied())
            .map(|id| async move { self.resolve_owner(id, block).await.map(|owner| (id, owner)) })
            .buffer_unordered(self.owner_concurrency.max(1))
            .try_collect()
            .await
    }
}

#[async_trait]
impl<P: Provider> EventSource for VaultControllerSource<P> {
    async fn get_liability_events(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<LiabilityEvent>, SourceError> {
        fetch_interest_events(&self.provider, self.vault_controller, start_block, end_block)
            .await
            .map_err(|e| SourceError::Rpc(format!("{e:#}")))
    }
}

#[async_trait]
impl<P: Provider> SnapshotSource for VaultControllerSource<P> {
    async fn get_snapshot(&self, block: u64) -> Result<Snapshot, SourceError> {
        let block_id = BlockId::number(block);
        let controller = IVaultController::new(self.vault_controller, &self.provider);

        let vault_count = controller
            .vaultsMinted()
            .block(block_id)
            .call()
            .await
            .map_err(|e| rpc_error("vaultsMinted()", e))?;
        if vault_count.is_zero() {
            return Ok(Snapshot::new(block, vec![]));
        }

        let summaries = controller
            .vaultSummaries(U96::from(1u64), vault_count)
            .block(block_id)
            .call()
            .await
            .map_err(|e| rpc_error("vaultSummaries()", e))?;

        let vault_ids = summaries
            .iter()
            .map(|summary| {
                u64::try_from(summary.id).map_err(|_| {
                    SourceError::Decode(format!("vault id {} does not fit in u64", summary.id))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let owners = self.resolve_owners(&vault_ids, block_id).await?;

        let positions = summaries
            .iter()
            .zip(vault_ids)
            .map(|(summary, position_id)| {
                let owner = owners.get(&position_id).copied().ok_or_else(|| {
                    SourceError::Decode(format!("owner of vault {position_id} not resolved"))
                })?;
                let liability =
                    liability_to_decimal(U256::from(summary.vaultLiability), self.decimals)?;
                Ok(Position { position_id, owner, liability })
            })
            .collect::<Result<Vec<_>, SourceError>>()?;

        Ok(Snapshot::new(block, positions))
    }
}
