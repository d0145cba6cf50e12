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

//! Capabilities the reward computation consumes from the outside world.
//!
//! The core never talks to a chain directly. An adapter such as
//! [VaultControllerSource](crate::chain::VaultControllerSource) implements these traits, and
//! tests plug in deterministic in-memory implementations.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::SourceError,
    types::{LiabilityEvent, Snapshot},
};

/// Source of the events that may change liability shares.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Return the liability-changing events in `[start_block, end_block]`, in chain order.
    async fn get_liability_events(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<LiabilityEvent>, SourceError>;
}

/// Source of full position snapshots at a given block.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn get_snapshot(&self, block: u64) -> Result<Snapshot, SourceError>;
}

#[async_trait]
impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    async fn get_liability_events(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<LiabilityEvent>, SourceError> {
        (**self).get_liability_events(start_block, end_block).await
    }
}

#[async_trait]
impl<T: EventSource + ?Sized> EventSource for &T {
    async fn get_liability_events(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<LiabilityEvent>, SourceError> {
        (**self).get_liability_events(start_block, end_block).await
    }
}

#[async_trait]
impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    async fn get_snapshot(&self, block: u64) -> Result<Snapshot, SourceError> {
        (**self).get_snapshot(block).await
    }
}

#[async_trait]
impl<T: SnapshotSource + ?Sized> SnapshotSource for &T {
    async fn get_snapshot(&self, block: u64) -> Result<Snapshot, SourceError> {
        (**self).get_snapshot(block).await
    }
}
