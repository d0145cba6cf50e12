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

//! In-memory chain used by the integration tests.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use alloy::primitives::Address;
use async_trait::async_trait;
use liability_rewards::{
    EventSource, LiabilityEvent, Position, Snapshot, SnapshotSource, SourceError,
};
use rust_decimal::Decimal;

/// Snapshot served for a block that has no explicit entry.
#[derive(Debug, Clone)]
pub enum Fallback {
    /// Serve the given positions.
    Positions(Vec<(Address, Decimal)>),
    /// Fail with an RPC error.
    Fail,
}

/// A deterministic chain: explicit per-block snapshots or failures, a fixed event list and call
/// counters.
#[derive(Debug)]
pub struct MockChain {
    events: Vec<LiabilityEvent>,
    blocks: BTreeMap<u64, Result<Vec<(Address, Decimal)>, String>>,
    fallback: Fallback,
    event_calls: AtomicUsize,
    snapshot_calls: AtomicUsize,
}

impl MockChain {
    pub fn new(fallback: Fallback) -> Self {
        Self {
            events: vec![],
            blocks: BTreeMap::new(),
            fallback,
            event_calls: AtomicUsize::new(0),
            snapshot_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_events(mut self, blocks: impl IntoIterator<Item = u64>) -> Self {
        self.events.extend(blocks.into_iter().map(LiabilityEvent::at_block));
        self
    }

    pub fn with_block(mut self, block: u64, positions: Vec<(Address, Decimal)>) -> Self {
        self.blocks.insert(block, Ok(positions));
        self
    }

    pub fn with_failed_block(mut self, block: u64) -> Self {
        self.blocks.insert(block, Err(format!("block {block} unavailable")));
        self
    }

    pub fn event_calls(&self) -> usize {
        self.event_calls.load(Ordering::SeqCst)
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for MockChain {
    async fn get_liability_events(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<LiabilityEvent>, SourceError> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .events
            .iter()
            .filter(|event| (start_block..=end_block).contains(&event.block))
            .copied()
            .collect())
    }
}

#[async_trait]
impl SnapshotSource for MockChain {
    async fn get_snapshot(&self, block: u64) -> Result<Snapshot, SourceError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let positions = match self.blocks.get(&block) {
            Some(Ok(positions)) => positions.clone(),
            Some(Err(msg)) => return Err(SourceError::Rpc(msg.clone())),
            None => match &self.fallback {
                Fallback::Positions(positions) => positions.clone(),
                Fallback::Fail => return Err(SourceError::Rpc(format!("no data at {block}"))),
            },
        };
        Ok(snapshot(block, positions))
    }
}

/// Build a snapshot, numbering the positions in order.
pub fn snapshot(block: u64, positions: Vec<(Address, Decimal)>) -> Snapshot {
    Snapshot::new(
        block,
        positions
            .into_iter()
            .enumerate()
            .map(|(i, (owner, liability))| Position { position_id: i as u64 + 1, owner, liability })
            .collect(),
    )
}

pub fn owner(byte: u8) -> Address {
    Address::repeat_byte(byte)
}
