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

use std::collections::{BTreeMap, BTreeSet};

use common::{Call, Recording, alphanumeric_string, connection, coordinator, init_tracing, topology};
use pretty_assertions::assert_eq;
use quay_coordinator::{
    Coordinator, ErrorCode, Result,
    oracle::{Everything, KeySet},
    service::{
        Connection,
        txn::{
            AddPartitionsToTxnRequest, EndTxnRequest, InitProducerRequest, InitProducerResponse,
            PartitionsResponse, TxnOffsetCommitRequest,
        },
    },
    txn::{TxnState, handler::OffsetCommit},
};

pub mod common;

const CLIENT_ID: &str = "c1";

struct Producer<'a> {
    coordinator: &'a Coordinator,
    connection: Connection,
    transaction_id: String,
}

impl<'a> Producer<'a> {
    fn new(coordinator: &'a Coordinator) -> Self {
        Self {
            coordinator,
            connection: connection(CLIENT_ID),
            transaction_id: alphanumeric_string(15),
        }
    }

    async fn init(&self) -> InitProducerResponse {
        self.coordinator
            .txn()
            .init_producer(
                Some(&self.connection),
                InitProducerRequest {
                    client_id: CLIENT_ID.into(),
                    transaction_id: self.transaction_id.clone(),
                    transaction_timeout_ms: 30_000,
                },
            )
            .await
    }

    async fn add(
        &self,
        producer: &InitProducerResponse,
        topics: &[(&str, Vec<i32>)],
    ) -> PartitionsResponse {
        self.coordinator
            .txn()
            .add_partitions_to_txn(
                Some(&self.connection),
                AddPartitionsToTxnRequest {
                    client_id: CLIENT_ID.into(),
                    transaction_id: self.transaction_id.clone(),
                    producer_id: producer.producer_id,
                    producer_epoch: producer.producer_epoch,
                    topics: topics
                        .iter()
                        .map(|(topic, partitions)| (String::from(*topic), partitions.clone()))
                        .collect(),
                },
            )
            .await
    }

    async fn end(&self, producer: &InitProducerResponse, committed: bool) -> ErrorCode {
        self.coordinator
            .txn()
            .end_txn(
                Some(&self.connection),
                EndTxnRequest {
                    client_id: CLIENT_ID.into(),
                    transaction_id: self.transaction_id.clone(),
                    producer_id: producer.producer_id,
                    producer_epoch: producer.producer_epoch,
                    committed,
                },
            )
            .await
            .error_code
    }

    async fn state(&self) -> Result<Option<TxnState>> {
        self.coordinator
            .txn()
            .handler()
            .transaction(&self.transaction_id)
            .await
            .map(|metadata| metadata.map(|metadata| metadata.state()))
    }
}

fn orders(partitions: &[i32]) -> BTreeSet<(String, i32)> {
    partitions
        .iter()
        .map(|partition| (String::from("orders"), *partition))
        .collect()
}

#[tokio::test]
async fn commit() -> Result<()> {
    let _guard = init_tracing()?;

    let synchronizer = Recording::default();
    let coordinator = coordinator(Everything, topology()?, synchronizer.clone())?;
    let producer = Producer::new(&coordinator);

    let initialized = producer.init().await;
    assert_eq!(ErrorCode::None, initialized.error_code);
    assert_eq!(0, initialized.producer_epoch);

    let added = producer.add(&initialized, &[("orders", vec![0, 1])]).await;
    assert_eq!(ErrorCode::None, added.error_code);
    assert_eq!(
        BTreeMap::from([(0, ErrorCode::None), (1, ErrorCode::None)]),
        added.results["orders"]
    );
    assert_eq!(Some(TxnState::Ongoing), producer.state().await?);

    assert_eq!(ErrorCode::None, producer.end(&initialized, true).await);

    let metadata = coordinator
        .txn()
        .handler()
        .transaction(&producer.transaction_id)
        .await?
        .expect("metadata");

    assert_eq!(TxnState::Empty, metadata.state());
    assert_eq!(1, metadata.epoch());
    assert!(metadata.pending().is_empty());

    assert_eq!(
        vec![
            Call::Prepare(orders(&[0, 1])),
            Call::PrepareCommit(orders(&[0, 1])),
            Call::Commit(orders(&[0, 1]), 0),
        ],
        synchronizer.calls()?
    );

    Ok(())
}

#[tokio::test]
async fn unresolvable_partitions_are_not_prepared() -> Result<()> {
    let _guard = init_tracing()?;

    let synchronizer = Recording::default();
    let coordinator = coordinator(Everything, topology()?, synchronizer.clone())?;
    let producer = Producer::new(&coordinator);

    let initialized = producer.init().await;

    let added = producer
        .add(
            &initialized,
            &[("payments", vec![0, 1]), ("missing", vec![0]), ("orders", vec![9])],
        )
        .await;

    assert_eq!(ErrorCode::None, added.error_code);
    assert_eq!(
        BTreeMap::from([
            (
                String::from("payments"),
                BTreeMap::from([(0, ErrorCode::None), (1, ErrorCode::NotLeaderForPartition)])
            ),
            (
                String::from("missing"),
                BTreeMap::from([(0, ErrorCode::UnknownTopicOrPartition)])
            ),
            (
                String::from("orders"),
                BTreeMap::from([(9, ErrorCode::UnknownTopicOrPartition)])
            ),
        ]),
        added.results
    );

    assert_eq!(
        vec![Call::Prepare(BTreeSet::from([(String::from("payments"), 0)]))],
        synchronizer.calls()?
    );

    Ok(())
}

#[tokio::test]
async fn failed_prepare_enlists_nothing() -> Result<()> {
    let _guard = init_tracing()?;

    let synchronizer = Recording::default();
    synchronizer.fail("prepare")?;

    let coordinator = coordinator(Everything, topology()?, synchronizer.clone())?;
    let producer = Producer::new(&coordinator);

    let initialized = producer.init().await;

    let added = producer.add(&initialized, &[("orders", vec![2, 4])]).await;
    assert_eq!(
        BTreeMap::from([
            (2, ErrorCode::CoordinatorNotAvailable),
            (4, ErrorCode::CoordinatorNotAvailable)
        ]),
        added.results["orders"]
    );

    let metadata = coordinator
        .txn()
        .handler()
        .transaction(&producer.transaction_id)
        .await?
        .expect("metadata");
    assert!(metadata.pending().is_empty());

    Ok(())
}

#[tokio::test]
async fn fencing() -> Result<()> {
    let _guard = init_tracing()?;

    let coordinator = coordinator(Everything, topology()?, Recording::default())?;
    let producer = Producer::new(&coordinator);

    let zombie = producer.init().await;
    let current = producer.init().await;

    assert_eq!(zombie.producer_id, current.producer_id);
    assert!(current.producer_epoch > zombie.producer_epoch);

    let added = producer.add(&zombie, &[("orders", vec![0])]).await;
    assert_eq!(ErrorCode::InvalidProducerEpoch, added.error_code);
    assert_eq!(
        BTreeMap::from([(0, ErrorCode::InvalidProducerEpoch)]),
        added.results["orders"]
    );

    assert_eq!(
        ErrorCode::InvalidProducerEpoch,
        producer.end(&zombie, true).await
    );

    let added = producer.add(&current, &[("orders", vec![0])]).await;
    assert_eq!(ErrorCode::None, added.error_code);

    Ok(())
}

#[tokio::test]
async fn commit_retry_skips_prepare() -> Result<()> {
    let _guard = init_tracing()?;

    let synchronizer = Recording::default();
    let coordinator = coordinator(Everything, topology()?, synchronizer.clone())?;
    let producer = Producer::new(&coordinator);

    let initialized = producer.init().await;
    _ = producer.add(&initialized, &[("orders", vec![0])]).await;

    synchronizer.fail("commit")?;
    assert_eq!(
        ErrorCode::CoordinatorNotAvailable,
        producer.end(&initialized, true).await
    );
    assert_eq!(Some(TxnState::PrepareCommit), producer.state().await?);

    assert_eq!(
        ErrorCode::InvalidTxnState,
        producer.end(&initialized, false).await
    );

    synchronizer.succeed("commit")?;
    assert_eq!(ErrorCode::None, producer.end(&initialized, true).await);
    assert_eq!(Some(TxnState::Empty), producer.state().await?);

    assert_eq!(
        vec![
            Call::Prepare(orders(&[0])),
            Call::PrepareCommit(orders(&[0])),
            Call::Commit(orders(&[0]), 0),
            Call::Commit(orders(&[0]), 0),
        ],
        synchronizer.calls()?
    );

    Ok(())
}

#[tokio::test]
async fn abort_retry_skips_prepare() -> Result<()> {
    let _guard = init_tracing()?;

    let synchronizer = Recording::default();
    let coordinator = coordinator(Everything, topology()?, synchronizer.clone())?;
    let producer = Producer::new(&coordinator);

    let initialized = producer.init().await;
    _ = producer.add(&initialized, &[("orders", vec![0])]).await;

    synchronizer.fail("abort")?;
    assert_eq!(
        ErrorCode::CoordinatorNotAvailable,
        producer.end(&initialized, false).await
    );
    assert_eq!(Some(TxnState::PrepareAbort), producer.state().await?);

    assert_eq!(
        ErrorCode::InvalidTxnState,
        producer.end(&initialized, true).await
    );

    synchronizer.succeed("abort")?;
    assert_eq!(ErrorCode::None, producer.end(&initialized, false).await);
    assert_eq!(Some(TxnState::Empty), producer.state().await?);

    assert_eq!(
        vec![
            Call::Prepare(orders(&[0])),
            Call::PrepareAbort(orders(&[0])),
            Call::Abort(orders(&[0])),
            Call::Abort(orders(&[0])),
        ],
        synchronizer.calls()?
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_init_bumps_the_epoch_once_each() -> Result<()> {
    let _guard = init_tracing()?;

    let coordinator = coordinator(Everything, topology()?, Recording::default())?;
    let producer = Producer::new(&coordinator);

    let (first, second) = tokio::join!(producer.init(), producer.init());

    assert_eq!(ErrorCode::None, first.error_code);
    assert_eq!(ErrorCode::None, second.error_code);
    assert_eq!(first.producer_id, second.producer_id);

    assert_eq!(
        BTreeSet::from([0, 1]),
        BTreeSet::from([first.producer_epoch, second.producer_epoch])
    );

    assert_eq!(
        Some(1),
        coordinator
            .txn()
            .handler()
            .transaction(&producer.transaction_id)
            .await?
            .map(|metadata| metadata.producer_epoch())
    );

    Ok(())
}

#[tokio::test]
async fn abort_discards_offsets() -> Result<()> {
    let _guard = init_tracing()?;

    let synchronizer = Recording::default();
    let coordinator = coordinator(Everything, topology()?, synchronizer.clone())?;
    let producer = Producer::new(&coordinator);

    let initialized = producer.init().await;
    _ = producer.add(&initialized, &[("orders", vec![3])]).await;

    let committed = coordinator
        .txn()
        .txn_offset_commit(
            Some(&producer.connection),
            TxnOffsetCommitRequest {
                client_id: CLIENT_ID.into(),
                transaction_id: producer.transaction_id.clone(),
                producer_id: initialized.producer_id,
                producer_epoch: initialized.producer_epoch,
                group_id: "consumer-grp".into(),
                topics: BTreeMap::from([(
                    "payments".into(),
                    vec![OffsetCommit {
                        partition: 0,
                        offset: 42,
                        metadata: None,
                    }],
                )]),
            },
        )
        .await;

    assert_eq!(ErrorCode::None, committed.error_code);
    assert_eq!(
        BTreeMap::from([(0, ErrorCode::None)]),
        committed.results["payments"]
    );

    assert_eq!(ErrorCode::None, producer.end(&initialized, false).await);

    let metadata = coordinator
        .txn()
        .handler()
        .transaction(&producer.transaction_id)
        .await?
        .expect("metadata");

    assert_eq!(TxnState::Empty, metadata.state());
    assert!(metadata.offsets().is_empty());

    assert_eq!(
        vec![
            Call::Prepare(orders(&[3])),
            Call::PrepareAbort(orders(&[3])),
            Call::Abort(orders(&[3])),
        ],
        synchronizer.calls()?
    );

    Ok(())
}

#[tokio::test]
async fn ownership_follows_the_oracle() -> Result<()> {
    let _guard = init_tracing()?;

    let ownership = KeySet::default();
    let coordinator = coordinator(ownership.clone(), topology()?, Recording::default())?;
    let producer = Producer::new(&coordinator);

    assert_eq!(ErrorCode::NotCoordinator, producer.init().await.error_code);

    ownership.acquire_transaction(producer.transaction_id.clone())?;
    let initialized = producer.init().await;
    assert_eq!(ErrorCode::None, initialized.error_code);

    ownership.relinquish_transaction(&producer.transaction_id)?;
    assert_eq!(
        ErrorCode::NotCoordinator,
        producer.end(&initialized, true).await
    );

    Ok(())
}
