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

use std::{marker::PhantomData, sync::Arc};

use tracing::{debug, info};

use crate::{
    Config, Error, Result,
    assignment::handler::PartitionAssignmentHandler,
    lifecycle::Lifecycle,
    name::NameService,
    oracle::Ownership,
    producer::{BlockProducerIdManager, IdSequence, MemorySequence},
    service::{fetch_assigned_partition::FetchAssignedPartitionService, txn::TxnService},
    txn::{
        handler::TransactionHandler,
        synchronizer::{Timeout, TransactionSynchronizer},
    },
};

/// The transaction and partition assignment coordinators of one broker,
/// sharing a lifecycle.
#[derive(Clone, Debug)]
pub struct Coordinator {
    config: Config,
    lifecycle: Lifecycle,
    txn: TxnService,
    fetch_assigned_partition: FetchAssignedPartitionService,
}

impl Coordinator {
    pub fn builder() -> PhantomBuilder {
        Builder::default()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn txn(&self) -> &TxnService {
        &self.txn
    }

    pub fn fetch_assigned_partition(&self) -> &FetchAssignedPartitionService {
        &self.fetch_assigned_partition
    }

    pub fn start(&self) -> Result<()> {
        self.lifecycle
            .start()
            .inspect(|_| info!(node_id = self.config.node_id, started = true))
    }

    pub fn stop(&self) -> Result<()> {
        self.lifecycle
            .stop()
            .inspect(|_| info!(node_id = self.config.node_id, stopped = true))
    }
}

#[derive(Clone, Debug, Default)]
pub struct Builder<C, O, N, S> {
    config: C,
    ownership: O,
    name_service: N,
    synchronizer: S,
    id_sequence: Option<Arc<dyn IdSequence>>,
}

pub type PhantomBuilder = Builder<
    PhantomData<Config>,
    PhantomData<Arc<dyn Ownership>>,
    PhantomData<Arc<dyn NameService>>,
    PhantomData<Arc<dyn TransactionSynchronizer>>,
>;

impl<C, O, N, S> Builder<C, O, N, S> {
    pub fn config(self, config: Config) -> Builder<Config, O, N, S> {
        debug!(?config);

        Builder {
            config,
            ownership: self.ownership,
            name_service: self.name_service,
            synchronizer: self.synchronizer,
            id_sequence: self.id_sequence,
        }
    }

    pub fn ownership(self, ownership: impl Ownership) -> Builder<C, Arc<dyn Ownership>, N, S> {
        Builder {
            config: self.config,
            ownership: Arc::new(ownership),
            name_service: self.name_service,
            synchronizer: self.synchronizer,
            id_sequence: self.id_sequence,
        }
    }

    pub fn name_service(
        self,
        name_service: impl NameService,
    ) -> Builder<C, O, Arc<dyn NameService>, S> {
        Builder {
            config: self.config,
            ownership: self.ownership,
            name_service: Arc::new(name_service),
            synchronizer: self.synchronizer,
            id_sequence: self.id_sequence,
        }
    }

    /// Reaches the partition leaders, each call bounded by the configured timeout.
    pub fn synchronizer(
        self,
        synchronizer: impl TransactionSynchronizer,
    ) -> Builder<C, O, N, Arc<dyn TransactionSynchronizer>> {
        Builder {
            config: self.config,
            ownership: self.ownership,
            name_service: self.name_service,
            synchronizer: Arc::new(synchronizer),
            id_sequence: self.id_sequence,
        }
    }

    /// Where producer ids are claimed from, in memory when absent.
    pub fn id_sequence(self, id_sequence: impl IdSequence) -> Self {
        Self {
            id_sequence: Some(Arc::new(id_sequence)),
            ..self
        }
    }
}

impl
    Builder<
        Config,
        Arc<dyn Ownership>,
        Arc<dyn NameService>,
        Arc<dyn TransactionSynchronizer>,
    >
{
    pub fn build(self) -> Result<Coordinator> {
        if self.config.producer_id_block_size < 1 {
            return Err(Error::Message(format!(
                "producer id block size: {}",
                self.config.producer_id_block_size
            )));
        }

        let lifecycle = Lifecycle::default();

        let producers = BlockProducerIdManager::with_sequence(
            self.id_sequence
                .unwrap_or_else(|| Arc::new(MemorySequence::default())),
            self.config.producer_id_block_size,
        );

        let txn = TxnService::new(TransactionHandler::new(
            lifecycle.clone(),
            self.ownership.clone(),
            self.name_service.clone(),
            Arc::new(Timeout::new(
                self.synchronizer,
                self.config.synchronizer_timeout(),
            )),
            Arc::new(producers),
            self.config.max_transaction_timeout(),
        ));

        let fetch_assigned_partition = FetchAssignedPartitionService::new(
            lifecycle.clone(),
            self.ownership,
            self.name_service,
            PartitionAssignmentHandler::new(
                self.config.assignment_strategy.assignor(),
                self.config.assignment_ttl(),
            ),
        );

        Ok(Coordinator {
            config: self.config,
            lifecycle,
            txn,
            fetch_assigned_partition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ErrorCode,
        lifecycle::State,
        name::memory::InMemory,
        oracle::Everything,
        service::{
            Connection,
            txn::{InitProducerRequest, InitProducerResponse},
        },
        txn::synchronizer::Noop,
    };
    use pretty_assertions::assert_eq;

    fn coordinator(config: Config) -> Result<Coordinator> {
        Coordinator::builder()
            .config(config)
            .ownership(Everything)
            .name_service(InMemory::default())
            .synchronizer(Noop)
            .id_sequence(MemorySequence::starting_at(5_000))
            .build()
    }

    fn init_producer() -> InitProducerRequest {
        InitProducerRequest {
            client_id: "app".into(),
            transaction_id: "txn-1".into(),
            transaction_timeout_ms: 60_000,
        }
    }

    #[tokio::test]
    async fn serves_only_while_running() -> Result<()> {
        let coordinator = coordinator(Config::default())?;
        let connection = Connection::new("c1", "10.1.0.1", "10.1.0.1:43210").authorize("app");

        assert_eq!(
            InitProducerResponse::from(ErrorCode::CoordinatorNotAvailable),
            coordinator
                .txn()
                .init_producer(Some(&connection), init_producer())
                .await
        );

        coordinator.start()?;
        assert_eq!(State::Running, coordinator.lifecycle().state()?);

        assert_eq!(
            InitProducerResponse {
                error_code: ErrorCode::None,
                producer_id: 5_000,
                producer_epoch: 0,
            },
            coordinator
                .txn()
                .init_producer(Some(&connection), init_producer())
                .await
        );

        coordinator.stop()?;

        assert_eq!(
            ErrorCode::CoordinatorNotAvailable,
            coordinator
                .txn()
                .init_producer(Some(&connection), init_producer())
                .await
                .error_code
        );

        assert!(coordinator.start().is_err());

        Ok(())
    }

    #[test]
    fn empty_producer_id_block() {
        assert!(matches!(
            coordinator(Config {
                producer_id_block_size: 0,
                ..Config::default()
            }),
            Err(Error::Message(_))
        ));
    }
}
