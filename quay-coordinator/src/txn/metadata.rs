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
    cmp::Ordering,
    collections::BTreeSet,
    hash::{Hash, Hasher},
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, ErrorCode, Result, name::Broker};

use super::TxnState;

/// A partition enlisted in a transaction, recorded on its leader at prepare.
///
/// Identity is (topic, partition, transaction id), the remaining fields are
/// carried for the partition leader.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TransactionPrepare {
    pub topic: String,
    pub partition: i32,
    pub app: String,
    pub leader: Broker,
    pub transaction_id: String,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub transaction_epoch: i32,
    pub timeout: Duration,
    pub created_at: SystemTime,
}

impl TransactionPrepare {
    pub fn new(
        metadata: &TransactionMetadata,
        topic: impl Into<String>,
        partition: i32,
        leader: Broker,
        created_at: SystemTime,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            app: metadata.app.clone(),
            leader,
            transaction_id: metadata.id.clone(),
            producer_id: metadata.producer_id,
            producer_epoch: metadata.producer_epoch,
            transaction_epoch: metadata.epoch,
            timeout: metadata.timeout,
            created_at,
        }
    }

    fn key(&self) -> (&str, i32, &str) {
        (&self.topic, self.partition, &self.transaction_id)
    }
}

impl PartialEq for TransactionPrepare {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TransactionPrepare {}

impl PartialOrd for TransactionPrepare {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TransactionPrepare {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for TransactionPrepare {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state)
    }
}

/// A consumer offset committed as part of a transaction.
///
/// Identity is (group, topic, partition), a later commit replaces an earlier.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TransactionOffset {
    pub group: String,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub metadata: Option<String>,
}

impl TransactionOffset {
    fn key(&self) -> (&str, &str, i32) {
        (&self.group, &self.topic, self.partition)
    }
}

impl PartialEq for TransactionOffset {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TransactionOffset {}

impl PartialOrd for TransactionOffset {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TransactionOffset {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// The coordinator's state for a single transaction id.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TransactionMetadata {
    id: String,
    app: String,
    producer_id: i64,
    producer_epoch: i16,
    epoch: i32,
    timeout: Duration,
    last_update: SystemTime,
    created_at: SystemTime,
    state: TxnState,
    pending: BTreeSet<TransactionPrepare>,
    offsets: BTreeSet<TransactionOffset>,
}

impl TransactionMetadata {
    /// Metadata prior to its first initialization, both epochs are -1.
    pub fn new(
        id: impl Into<String>,
        app: impl Into<String>,
        producer_id: i64,
        now: SystemTime,
    ) -> Self {
        Self {
            id: id.into(),
            app: app.into(),
            producer_id,
            producer_epoch: -1,
            epoch: -1,
            timeout: Duration::ZERO,
            last_update: now,
            created_at: now,
            state: TxnState::Empty,
            pending: BTreeSet::new(),
            offsets: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn producer_id(&self) -> i64 {
        self.producer_id
    }

    pub fn producer_epoch(&self) -> i16 {
        self.producer_epoch
    }

    pub fn epoch(&self) -> i32 {
        self.epoch
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn last_update(&self) -> SystemTime {
        self.last_update
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn pending(&self) -> &BTreeSet<TransactionPrepare> {
        &self.pending
    }

    pub fn offsets(&self) -> &BTreeSet<TransactionOffset> {
        &self.offsets
    }

    pub fn is_prepared(&self) -> bool {
        self.state.is_prepared()
    }

    pub fn is_completed(&self) -> bool {
        self.state.is_completed()
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.last_update
            .checked_add(self.timeout)
            .is_some_and(|deadline| deadline < now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    /// Reject a caller whose identity or producer epoch is not current.
    pub fn fence(&self, app: &str, producer_id: i64, producer_epoch: i16) -> Result<()> {
        if self.producer_id != producer_id || self.app != app {
            debug!(
                transaction_id = self.id,
                producer_id,
                expected = self.producer_id,
                app
            );
            return Err(Error::Api(ErrorCode::InvalidProducerIdMapping));
        }

        if self.producer_epoch != producer_epoch {
            debug!(
                transaction_id = self.id,
                producer_epoch,
                expected = self.producer_epoch
            );
            return Err(Error::Api(ErrorCode::InvalidProducerEpoch));
        }

        Ok(())
    }

    /// Start a new producer generation, fencing any earlier producer epoch.
    pub fn initialize(&mut self, timeout: Duration, now: SystemTime) -> Result<()> {
        let producer_epoch = self
            .producer_epoch
            .checked_add(1)
            .ok_or(Error::Api(ErrorCode::InvalidProducerEpoch))?;

        self.clear();
        self.producer_epoch = producer_epoch;
        self.epoch = self.epoch.wrapping_add(1);
        self.timeout = timeout;
        self.last_update = now;

        Ok(())
    }

    /// Move to `next`, leaving the metadata untouched when not permitted.
    pub fn transition(&mut self, next: TxnState) -> Result<()> {
        if self.state.may_transition_to(next) {
            debug!(transaction_id = self.id, from = %self.state, to = %next);
            self.state = next;
            Ok(())
        } else {
            debug!(transaction_id = self.id, illegal_from = %self.state, to = %next);
            Err(Error::Api(ErrorCode::InvalidTxnState))
        }
    }

    pub fn touch(&mut self, now: SystemTime) {
        self.last_update = now;
    }

    pub fn enlist(&mut self, prepares: impl IntoIterator<Item = TransactionPrepare>) {
        self.pending.extend(prepares)
    }

    pub fn record_offset(&mut self, offset: TransactionOffset) {
        _ = self.offsets.replace(offset);
    }

    /// Finish a completed generation, ready for the next transaction.
    pub fn complete(&mut self, now: SystemTime) -> Result<()> {
        if !self.is_completed() {
            return Err(Error::Api(ErrorCode::InvalidTxnState));
        }

        self.clear();
        self.epoch = self.epoch.wrapping_add(1);
        self.last_update = now;
        Ok(())
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.offsets.clear();
        self.state = TxnState::Empty;
    }
}
