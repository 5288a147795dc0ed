// Copyright ⓒ 2024-2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Producer Id allocation
//!
//! Producer ids are claimed from a shared [`IdSequence`] in contiguous blocks
//! and handed out locally until the block is exhausted. Ids lost in a block
//! on restart are never reused.

use std::{
    fmt::Debug,
    ops::Range,
    sync::{Arc, LazyLock, Mutex},
};

use async_trait::async_trait;
use opentelemetry::{KeyValue, metrics::Counter};
use tracing::debug;

use crate::{Error, METER, Result};

#[async_trait]
pub trait IdSequence: Debug + Send + Sync + 'static {
    /// Reserve the next `size` ids, exclusive to the caller.
    async fn claim(&self, size: i64) -> Result<Range<i64>>;
}

#[async_trait]
pub trait ProducerIdManager: Debug + Send + Sync + 'static {
    async fn generate_id(&self) -> Result<i64>;
}

/// A process local id sequence starting at 1.
#[derive(Clone, Debug)]
pub struct MemorySequence {
    next: Arc<Mutex<i64>>,
}

impl Default for MemorySequence {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl MemorySequence {
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: Arc::new(Mutex::new(first)),
        }
    }
}

#[async_trait]
impl IdSequence for MemorySequence {
    async fn claim(&self, size: i64) -> Result<Range<i64>> {
        if size < 1 {
            return Err(Error::Message(format!("invalid block size: {size}")));
        }

        let mut next = self.next.lock()?;

        let start = *next;
        let end = start
            .checked_add(size)
            .ok_or(Error::Message(format!("id sequence exhausted at: {start}")))?;

        *next = end;
        Ok(start..end)
    }
}

static BLOCK_CLAIMS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("quay_producer_id_block_claims")
        .with_description("The number of producer id blocks claimed")
        .build()
});

#[derive(Debug)]
pub struct BlockProducerIdManager {
    sequence: Arc<dyn IdSequence>,
    block_size: i64,
    block: tokio::sync::Mutex<Range<i64>>,
}

impl BlockProducerIdManager {
    pub fn new(sequence: impl IdSequence, block_size: i64) -> Self {
        Self::with_sequence(Arc::new(sequence), block_size)
    }

    pub fn with_sequence(sequence: Arc<dyn IdSequence>, block_size: i64) -> Self {
        Self {
            sequence,
            block_size: block_size.max(1),
            block: tokio::sync::Mutex::new(0..0),
        }
    }
}

#[async_trait]
impl ProducerIdManager for BlockProducerIdManager {
    async fn generate_id(&self) -> Result<i64> {
        let mut block = self.block.lock().await;

        if block.is_empty() {
            *block = self
                .sequence
                .claim(self.block_size)
                .await
                .inspect(|claimed| {
                    debug!(?claimed);
                    BLOCK_CLAIMS.add(1, &[KeyValue::new("outcome", "claimed")]);
                })
                .inspect_err(|_| BLOCK_CLAIMS.add(1, &[KeyValue::new("outcome", "error")]))?;
        }

        block
            .next()
            .ok_or(Error::Message(String::from("empty producer id block")))
    }
}
