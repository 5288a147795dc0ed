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

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use tracing::debug;

use crate::{Result, producer::ProducerIdManager};

use super::metadata::TransactionMetadata;

pub type SharedMetadata = Arc<tokio::sync::Mutex<TransactionMetadata>>;

/// Transaction metadata by transaction id.
///
/// The map lock is only held to look up or insert, each metadata has its own
/// async lock that is held for the duration of an operation.
#[derive(Debug)]
pub struct TransactionMetadataManager {
    producers: Arc<dyn ProducerIdManager>,
    transactions: Mutex<BTreeMap<String, SharedMetadata>>,
}

impl TransactionMetadataManager {
    pub fn new(producers: Arc<dyn ProducerIdManager>) -> Self {
        Self {
            producers,
            transactions: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, transaction_id: &str) -> Result<Option<SharedMetadata>> {
        self.transactions
            .lock()
            .map(|transactions| transactions.get(transaction_id).cloned())
            .map_err(Into::into)
    }

    /// The metadata for `transaction_id`, created with a new producer id if
    /// absent.
    ///
    /// Losing a creation race to a concurrent caller burns the allocated
    /// producer id.
    pub async fn get_or_create(&self, transaction_id: &str, app: &str) -> Result<SharedMetadata> {
        if let Some(existing) = self.get(transaction_id)? {
            return Ok(existing);
        }

        let producer_id = self.producers.generate_id().await?;

        let mut transactions = self.transactions.lock()?;

        Ok(transactions
            .entry(transaction_id.to_owned())
            .or_insert_with(|| {
                debug!(transaction_id, app, producer_id);

                Arc::new(tokio::sync::Mutex::new(TransactionMetadata::new(
                    transaction_id,
                    app,
                    producer_id,
                    SystemTime::now(),
                )))
            })
            .clone())
    }

    pub fn all(&self) -> Result<Vec<SharedMetadata>> {
        self.transactions
            .lock()
            .map(|transactions| transactions.values().cloned().collect())
            .map_err(Into::into)
    }
}
