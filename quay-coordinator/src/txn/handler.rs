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
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, LazyLock},
    time::{Duration, SystemTime},
};

use opentelemetry::{KeyValue, metrics::Counter};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::{
    Error, ErrorCode, METER, Result, lifecycle::Lifecycle, name::NameService,
    oracle::Ownership, producer::ProducerIdManager,
};

use super::{
    TxnState,
    manager::TransactionMetadataManager,
    metadata::{TransactionMetadata, TransactionOffset, TransactionPrepare},
    synchronizer::TransactionSynchronizer,
};

/// Per topic, per partition outcome of an operation on many partitions.
pub type PartitionResults = BTreeMap<String, BTreeMap<i32, ErrorCode>>;

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct OffsetCommit {
    pub partition: i32,
    pub offset: i64,
    pub metadata: Option<String>,
}

static TXN_COORDINATOR_REQUESTS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("quay_txn_coordinator_requests")
        .with_description("The number of transaction coordinator requests")
        .build()
});

static TXN_COORDINATOR_ERRORS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("quay_txn_coordinator_errors")
        .with_description("The number of transaction coordinator errors")
        .build()
});

fn observe<T>(method: &'static str, outcome: Result<T>) -> Result<T> {
    TXN_COORDINATOR_REQUESTS.add(1, &[KeyValue::new("method", method)]);

    outcome.inspect_err(|err| {
        TXN_COORDINATOR_ERRORS.add(
            1,
            &[
                KeyValue::new("method", method),
                KeyValue::new("code", i64::from(i16::from(err.code()))),
            ],
        )
    })
}

/// Transaction Coordinator
///
/// Every operation checks that the coordinator is running and owns the
/// transaction id, then runs while holding that transaction's lock. State
/// transitions only follow a successful synchronizer call, so a failed
/// operation may be retried.
#[derive(Clone, Debug)]
pub struct TransactionHandler {
    lifecycle: Lifecycle,
    ownership: Arc<dyn Ownership>,
    name_service: Arc<dyn NameService>,
    synchronizer: Arc<dyn TransactionSynchronizer>,
    transactions: Arc<TransactionMetadataManager>,
    max_transaction_timeout: Duration,
}

impl TransactionHandler {
    pub fn new(
        lifecycle: Lifecycle,
        ownership: Arc<dyn Ownership>,
        name_service: Arc<dyn NameService>,
        synchronizer: Arc<dyn TransactionSynchronizer>,
        producers: Arc<dyn ProducerIdManager>,
        max_transaction_timeout: Duration,
    ) -> Self {
        Self {
            lifecycle,
            ownership,
            name_service,
            synchronizer,
            transactions: Arc::new(TransactionMetadataManager::new(producers)),
            max_transaction_timeout,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn accept(&self, transaction_id: &str) -> Result<()> {
        self.lifecycle.ensure_running()?;

        if self.ownership.is_current_transaction(transaction_id).await? {
            Ok(())
        } else {
            debug!(transaction_id, owned = false);
            Err(Error::Api(ErrorCode::NotCoordinator))
        }
    }

    #[instrument(skip(self))]
    pub async fn init_producer(
        &self,
        client_id: &str,
        transaction_id: &str,
        transaction_timeout: Duration,
    ) -> Result<TransactionMetadata> {
        observe(
            "init_producer",
            self.do_init_producer(client_id, transaction_id, transaction_timeout)
                .await,
        )
    }

    async fn do_init_producer(
        &self,
        client_id: &str,
        transaction_id: &str,
        transaction_timeout: Duration,
    ) -> Result<TransactionMetadata> {
        self.accept(transaction_id).await?;

        if transaction_timeout.is_zero() || transaction_timeout > self.max_transaction_timeout {
            debug!(?transaction_timeout, maximum = ?self.max_transaction_timeout);
            return Err(Error::Api(ErrorCode::InvalidTransactionTimeout));
        }

        let shared = self
            .transactions
            .get_or_create(transaction_id, client_id)
            .await?;

        let mut metadata = shared.lock().await;
        metadata.initialize(transaction_timeout, SystemTime::now())?;

        info!(
            transaction_id,
            producer_id = metadata.producer_id(),
            producer_epoch = metadata.producer_epoch(),
            epoch = metadata.epoch()
        );

        Ok(metadata.clone())
    }

    #[instrument(skip(self, partitions))]
    pub async fn add_partitions_to_txn(
        &self,
        client_id: &str,
        transaction_id: &str,
        producer_id: i64,
        producer_epoch: i16,
        partitions: &BTreeMap<String, Vec<i32>>,
    ) -> Result<PartitionResults> {
        observe(
            "add_partitions_to_txn",
            self.do_add_partitions_to_txn(
                client_id,
                transaction_id,
                producer_id,
                producer_epoch,
                partitions,
            )
            .await,
        )
    }

    async fn do_add_partitions_to_txn(
        &self,
        client_id: &str,
        transaction_id: &str,
        producer_id: i64,
        producer_epoch: i16,
        partitions: &BTreeMap<String, Vec<i32>>,
    ) -> Result<PartitionResults> {
        self.accept(transaction_id).await?;

        let shared = self
            .transactions
            .get(transaction_id)?
            .ok_or(Error::Api(ErrorCode::InvalidProducerIdMapping))?;

        let mut metadata = shared.lock().await;

        metadata.fence(client_id, producer_id, producer_epoch)?;

        let now = SystemTime::now();

        if metadata.is_expired_at(now) {
            debug!(transaction_id, expired = true);
            return Err(Error::Api(ErrorCode::InvalidProducerEpoch));
        }

        if metadata.is_prepared() {
            debug!(transaction_id, state = %metadata.state());
            return Err(Error::Api(ErrorCode::ConcurrentTransactions));
        }

        let mut results = PartitionResults::new();
        let mut batch = BTreeSet::new();

        for (topic, requested) in partitions {
            let outcomes = results.entry(topic.clone()).or_default();
            let config = self.name_service.topic_config(topic).await?;

            for partition in requested {
                match config
                    .as_ref()
                    .and_then(|config| config.partition_group_by_partition(*partition))
                {
                    None => {
                        _ = outcomes.insert(*partition, ErrorCode::UnknownTopicOrPartition);
                    }

                    Some(group) => match group.leader.as_ref() {
                        None => {
                            _ = outcomes.insert(*partition, ErrorCode::NotLeaderForPartition);
                        }

                        Some(leader) => {
                            _ = batch.insert(TransactionPrepare::new(
                                &metadata,
                                topic,
                                *partition,
                                leader.clone(),
                                now,
                            ));
                        }
                    },
                }
            }
        }

        if batch.is_empty() {
            return Ok(results);
        }

        metadata.transition(TxnState::Ongoing)?;
        metadata.touch(now);

        let code = match self.synchronizer.prepare(&metadata, &batch).await {
            Ok(()) => ErrorCode::None,

            Err(err) => {
                error!(transaction_id, batch = batch.len(), ?err);
                ErrorCode::CoordinatorNotAvailable
            }
        };

        for prepare in &batch {
            _ = results
                .entry(prepare.topic.clone())
                .or_default()
                .insert(prepare.partition, code);
        }

        if code == ErrorCode::None {
            metadata.enlist(batch);
        }

        debug!(transaction_id, pending = metadata.pending().len(), ?results);

        Ok(results)
    }

    #[instrument(skip(self, offsets))]
    pub async fn txn_offset_commit(
        &self,
        client_id: &str,
        transaction_id: &str,
        producer_id: i64,
        producer_epoch: i16,
        group_id: &str,
        offsets: &BTreeMap<String, Vec<OffsetCommit>>,
    ) -> Result<PartitionResults> {
        observe(
            "txn_offset_commit",
            self.do_txn_offset_commit(
                client_id,
                transaction_id,
                producer_id,
                producer_epoch,
                group_id,
                offsets,
            )
            .await,
        )
    }

    async fn do_txn_offset_commit(
        &self,
        client_id: &str,
        transaction_id: &str,
        producer_id: i64,
        producer_epoch: i16,
        group_id: &str,
        offsets: &BTreeMap<String, Vec<OffsetCommit>>,
    ) -> Result<PartitionResults> {
        self.accept(transaction_id).await?;

        let shared = self
            .transactions
            .get(transaction_id)?
            .ok_or(Error::Api(ErrorCode::InvalidProducerIdMapping))?;

        let mut metadata = shared.lock().await;

        metadata.fence(client_id, producer_id, producer_epoch)?;

        let now = SystemTime::now();

        if metadata.is_expired_at(now) {
            return Err(Error::Api(ErrorCode::InvalidProducerEpoch));
        }

        if metadata.is_prepared() {
            return Err(Error::Api(ErrorCode::ConcurrentTransactions));
        }

        if offsets.values().all(Vec::is_empty) {
            return Ok(offsets
                .keys()
                .map(|topic| (topic.clone(), BTreeMap::new()))
                .collect());
        }

        metadata.transition(TxnState::Ongoing)?;
        metadata.touch(now);

        let mut results = PartitionResults::new();

        for (topic, commits) in offsets {
            let outcomes = results.entry(topic.clone()).or_default();

            for commit in commits {
                metadata.record_offset(TransactionOffset {
                    group: group_id.to_owned(),
                    topic: topic.clone(),
                    partition: commit.partition,
                    offset: commit.offset,
                    metadata: commit.metadata.clone(),
                });

                _ = outcomes.insert(commit.partition, ErrorCode::None);
            }
        }

        Ok(results)
    }

    #[instrument(skip(self))]
    pub async fn end_txn(
        &self,
        client_id: &str,
        transaction_id: &str,
        producer_id: i64,
        producer_epoch: i16,
        is_commit: bool,
    ) -> Result<bool> {
        observe(
            "end_txn",
            self.do_end_txn(
                client_id,
                transaction_id,
                producer_id,
                producer_epoch,
                is_commit,
            )
            .await,
        )
    }

    async fn do_end_txn(
        &self,
        client_id: &str,
        transaction_id: &str,
        producer_id: i64,
        producer_epoch: i16,
        is_commit: bool,
    ) -> Result<bool> {
        self.accept(transaction_id).await?;

        let shared = self
            .transactions
            .get(transaction_id)?
            .ok_or(Error::Api(ErrorCode::InvalidProducerIdMapping))?;

        let mut metadata = shared.lock().await;

        metadata.fence(client_id, producer_id, producer_epoch)?;

        if metadata.is_expired() || metadata.is_completed() {
            debug!(transaction_id, state = %metadata.state());
            return Err(Error::Api(ErrorCode::InvalidProducerEpoch));
        }

        let (prepared, completed) = if is_commit {
            (TxnState::PrepareCommit, TxnState::CompleteCommit)
        } else {
            (TxnState::PrepareAbort, TxnState::CompleteAbort)
        };

        if metadata.is_prepared() && metadata.state() != prepared {
            debug!(transaction_id, state = %metadata.state(), is_commit);
            return Err(Error::Api(ErrorCode::InvalidTxnState));
        }

        if metadata.state() != prepared {
            let outcome = if is_commit {
                self.synchronizer
                    .prepare_commit(&metadata, metadata.pending())
                    .await
            } else {
                self.synchronizer
                    .prepare_abort(&metadata, metadata.pending())
                    .await
            };

            outcome.map_err(|err| unavailable(transaction_id, prepared, err))?;
            metadata.transition(prepared)?;
        }

        let outcome = if is_commit {
            self.synchronizer
                .commit(&metadata, metadata.pending(), metadata.offsets())
                .await
        } else {
            self.synchronizer
                .abort(&metadata, metadata.pending())
                .await
        };

        outcome.map_err(|err| unavailable(transaction_id, completed, err))?;
        metadata.transition(completed)?;

        metadata.complete(SystemTime::now())?;

        info!(
            transaction_id,
            is_commit,
            producer_epoch = metadata.producer_epoch(),
            epoch = metadata.epoch()
        );

        Ok(true)
    }

    /// A snapshot of the metadata for `transaction_id`.
    pub async fn transaction(&self, transaction_id: &str) -> Result<Option<TransactionMetadata>> {
        match self.transactions.get(transaction_id)? {
            Some(shared) => Ok(Some(shared.lock().await.clone())),
            None => Ok(None),
        }
    }

    /// In flight transactions whose timeout has elapsed.
    ///
    /// Nothing is aborted here, resolving them is left to the caller.
    pub async fn expired_transactions(&self) -> Result<Vec<TransactionMetadata>> {
        let now = SystemTime::now();
        let mut expired = Vec::new();

        for shared in self.transactions.all()? {
            let metadata = shared.lock().await;

            if matches!(
                metadata.state(),
                TxnState::Ongoing | TxnState::PrepareCommit | TxnState::PrepareAbort
            ) && metadata.is_expired_at(now)
            {
                expired.push(metadata.clone());
            }
        }

        Ok(expired)
    }
}

fn unavailable(transaction_id: &str, target: TxnState, err: Error) -> Error {
    error!(transaction_id, %target, ?err);
    Error::Api(ErrorCode::CoordinatorNotAvailable)
}
