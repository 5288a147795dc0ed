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

#![allow(dead_code)]

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use quay_coordinator::{
    Config, Coordinator, Error, Result,
    name::memory::{InMemory, Topology},
    oracle::Ownership,
    service::Connection,
    txn::{
        metadata::{TransactionMetadata, TransactionOffset, TransactionPrepare},
        synchronizer::TransactionSynchronizer,
    },
};
use rand::{distr::Alphanumeric, prelude::*, rng};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

pub(crate) fn init_tracing() -> Result<DefaultGuard> {
    Ok(tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_level(true)
            .with_line_number(true)
            .with_thread_names(false)
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(format!("{}=debug", env!("CARGO_CRATE_NAME")).parse()?),
            )
            .with_test_writer()
            .finish(),
    ))
}

pub(crate) fn alphanumeric_string(length: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

pub(crate) const TOPOLOGY: &str = r#"{
    "topics": {
        "orders": {
            "name": "orders",
            "partition_groups": {
                "0": {"group": 0, "leader": {"id": 1, "host": "10.0.0.1", "port": 50088}, "partitions": [0, 1]},
                "1": {"group": 1, "leader": {"id": 2, "host": "10.0.0.2", "port": 50088}, "partitions": [2, 3]},
                "2": {"group": 2, "leader": {"id": 3, "host": "10.0.0.3", "port": 50088}, "partitions": [4, 5]}
            }
        },
        "payments": {
            "name": "payments",
            "partition_groups": {
                "0": {"group": 0, "leader": {"id": 1, "host": "10.0.0.1", "port": 50088}, "partitions": [0]},
                "1": {"group": 1, "leader": null, "partitions": [1]}
            }
        }
    },
    "data_centers": {
        "10.0.0.1": {"region": "east", "code": "e1"},
        "10.0.0.2": {"region": "west", "code": "w1"}
    }
}"#;

pub(crate) fn topology() -> Result<InMemory> {
    TOPOLOGY.parse::<Topology>().map(InMemory::from)
}

pub(crate) fn connection(app: &str) -> Connection {
    Connection::new(
        alphanumeric_string(10),
        "10.1.0.1",
        "10.1.0.1:43210",
    )
    .authorize(app)
}

pub(crate) fn coordinator(
    ownership: impl Ownership,
    names: InMemory,
    synchronizer: impl TransactionSynchronizer,
) -> Result<Coordinator> {
    let coordinator = Coordinator::builder()
        .config(Config::default())
        .ownership(ownership)
        .name_service(names)
        .synchronizer(synchronizer)
        .build()?;

    coordinator.start()?;
    Ok(coordinator)
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub(crate) enum Call {
    Prepare(BTreeSet<(String, i32)>),
    PrepareCommit(BTreeSet<(String, i32)>),
    Commit(BTreeSet<(String, i32)>, usize),
    PrepareAbort(BTreeSet<(String, i32)>),
    Abort(BTreeSet<(String, i32)>),
}

/// Records each call, failing those named in `failing`.
#[derive(Clone, Debug, Default)]
pub(crate) struct Recording {
    calls: Arc<Mutex<Vec<Call>>>,
    failing: Arc<Mutex<BTreeSet<&'static str>>>,
}

impl Recording {
    pub(crate) fn calls(&self) -> Result<Vec<Call>> {
        self.calls.lock().map(|calls| calls.clone()).map_err(Into::into)
    }

    pub(crate) fn fail(&self, method: &'static str) -> Result<()> {
        self.failing
            .lock()
            .map(|mut failing| {
                _ = failing.insert(method);
            })
            .map_err(Into::into)
    }

    pub(crate) fn succeed(&self, method: &'static str) -> Result<()> {
        self.failing
            .lock()
            .map(|mut failing| {
                _ = failing.remove(method);
            })
            .map_err(Into::into)
    }

    fn record(&self, method: &'static str, call: Call) -> Result<()> {
        self.calls.lock()?.push(call);

        if self.failing.lock()?.contains(method) {
            Err(Error::Synchronizer(format!("{method}: leader unreachable")))
        } else {
            Ok(())
        }
    }
}

fn partitions(prepares: &BTreeSet<TransactionPrepare>) -> BTreeSet<(String, i32)> {
    prepares
        .iter()
        .map(|prepare| (prepare.topic.clone(), prepare.partition))
        .collect()
}

#[async_trait]
impl TransactionSynchronizer for Recording {
    async fn prepare(
        &self,
        _metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        self.record("prepare", Call::Prepare(partitions(prepares)))
    }

    async fn prepare_commit(
        &self,
        _metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        self.record("prepare_commit", Call::PrepareCommit(partitions(prepares)))
    }

    async fn commit(
        &self,
        _metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
        offsets: &BTreeSet<TransactionOffset>,
    ) -> Result<()> {
        self.record("commit", Call::Commit(partitions(prepares), offsets.len()))
    }

    async fn prepare_abort(
        &self,
        _metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        self.record("prepare_abort", Call::PrepareAbort(partitions(prepares)))
    }

    async fn abort(
        &self,
        _metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        self.record("abort", Call::Abort(partitions(prepares)))
    }
}
