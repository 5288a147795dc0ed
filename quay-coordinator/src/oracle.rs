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
    collections::BTreeSet,
    fmt::Debug,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use tracing::debug;

use crate::Result;

/// Ownership Oracle
///
/// Routes a transaction or group id to exactly one coordinator instance at a
/// time. Queried on every request, never mutated by the coordinators.
#[async_trait]
pub trait Ownership: Debug + Send + Sync + 'static {
    async fn is_current_group(&self, group_id: &str) -> Result<bool>;

    async fn is_current_transaction(&self, transaction_id: &str) -> Result<bool>;
}

/// A single node deployment owns every key.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Everything;

#[async_trait]
impl Ownership for Everything {
    async fn is_current_group(&self, group_id: &str) -> Result<bool> {
        debug!(group_id);
        Ok(true)
    }

    async fn is_current_transaction(&self, transaction_id: &str) -> Result<bool> {
        debug!(transaction_id);
        Ok(true)
    }
}

#[derive(Clone, Debug, Default)]
struct Keys {
    groups: BTreeSet<String>,
    transactions: BTreeSet<String>,
}

/// An explicit set of owned group and transaction ids.
///
/// Ownership may be acquired or relinquished as the external election
/// decides, clones share the same set.
#[derive(Clone, Debug, Default)]
pub struct KeySet {
    keys: Arc<RwLock<Keys>>,
}

impl KeySet {
    pub fn acquire_group(&self, group_id: impl Into<String>) -> Result<()> {
        self.keys
            .write()
            .map(|mut keys| {
                _ = keys.groups.insert(group_id.into());
            })
            .map_err(Into::into)
    }

    pub fn relinquish_group(&self, group_id: &str) -> Result<()> {
        self.keys
            .write()
            .map(|mut keys| {
                _ = keys.groups.remove(group_id);
            })
            .map_err(Into::into)
    }

    pub fn acquire_transaction(&self, transaction_id: impl Into<String>) -> Result<()> {
        self.keys
            .write()
            .map(|mut keys| {
                _ = keys.transactions.insert(transaction_id.into());
            })
            .map_err(Into::into)
    }

    pub fn relinquish_transaction(&self, transaction_id: &str) -> Result<()> {
        self.keys
            .write()
            .map(|mut keys| {
                _ = keys.transactions.remove(transaction_id);
            })
            .map_err(Into::into)
    }
}

#[async_trait]
impl Ownership for KeySet {
    async fn is_current_group(&self, group_id: &str) -> Result<bool> {
        self.keys
            .read()
            .map(|keys| keys.groups.contains(group_id))
            .inspect(|owned| debug!(group_id, owned))
            .map_err(Into::into)
    }

    async fn is_current_transaction(&self, transaction_id: &str) -> Result<bool> {
        self.keys
            .read()
            .map(|keys| keys.transactions.contains(transaction_id))
            .inspect(|owned| debug!(transaction_id, owned))
            .map_err(Into::into)
    }
}
