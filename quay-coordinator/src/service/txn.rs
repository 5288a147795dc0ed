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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    ErrorCode, Result,
    txn::handler::{OffsetCommit, PartitionResults, TransactionHandler},
};

use super::{Connection, error_code, millis};

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct InitProducerRequest {
    pub client_id: String,
    pub transaction_id: String,
    pub transaction_timeout_ms: i32,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct InitProducerResponse {
    pub error_code: ErrorCode,
    pub producer_id: i64,
    pub producer_epoch: i16,
}

impl From<ErrorCode> for InitProducerResponse {
    fn from(error_code: ErrorCode) -> Self {
        Self {
            error_code,
            producer_id: -1,
            producer_epoch: -1,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct AddPartitionsToTxnRequest {
    pub client_id: String,
    pub transaction_id: String,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub topics: BTreeMap<String, Vec<i32>>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct TxnOffsetCommitRequest {
    pub client_id: String,
    pub transaction_id: String,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub group_id: String,
    pub topics: BTreeMap<String, Vec<OffsetCommit>>,
}

/// Outcome of an operation on many partitions.
///
/// When the whole request fails every requested partition carries the same
/// code as the response.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PartitionsResponse {
    pub error_code: ErrorCode,
    pub results: PartitionResults,
}

impl PartitionsResponse {
    fn failed<'a>(
        error_code: ErrorCode,
        requested: impl Iterator<Item = (&'a String, Vec<i32>)>,
    ) -> Self {
        Self {
            error_code,
            results: requested
                .map(|(topic, partitions)| {
                    (
                        topic.clone(),
                        partitions
                            .into_iter()
                            .map(|partition| (partition, error_code))
                            .collect(),
                    )
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct EndTxnRequest {
    pub client_id: String,
    pub transaction_id: String,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub committed: bool,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct EndTxnResponse {
    pub error_code: ErrorCode,
}

/// Transaction RPCs over a [`TransactionHandler`].
#[derive(Clone, Debug)]
pub struct TxnService {
    handler: TransactionHandler,
}

impl TxnService {
    pub fn new(handler: TransactionHandler) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &TransactionHandler {
        &self.handler
    }

    fn authorize(connection: Option<&Connection>, client_id: &str) -> Result<(), ErrorCode> {
        match connection {
            None => Err(ErrorCode::ConnectionNotFound),

            Some(connection) if !connection.is_authorized(client_id) => {
                debug!(connection = connection.id, client_id, authorized = false);
                Err(ErrorCode::NotAuthorized)
            }

            Some(_) => Ok(()),
        }
    }

    #[instrument(skip_all, fields(transaction_id = request.transaction_id))]
    pub async fn init_producer(
        &self,
        connection: Option<&Connection>,
        request: InitProducerRequest,
    ) -> InitProducerResponse {
        if let Err(code) = Self::authorize(connection, &request.client_id) {
            return code.into();
        }

        self.handler
            .init_producer(
                &request.client_id,
                &request.transaction_id,
                millis(request.transaction_timeout_ms),
            )
            .await
            .map_or_else(
                |err| error_code("init_producer", &err).into(),
                |metadata| InitProducerResponse {
                    error_code: ErrorCode::None,
                    producer_id: metadata.producer_id(),
                    producer_epoch: metadata.producer_epoch(),
                },
            )
    }

    #[instrument(skip_all, fields(transaction_id = request.transaction_id))]
    pub async fn add_partitions_to_txn(
        &self,
        connection: Option<&Connection>,
        request: AddPartitionsToTxnRequest,
    ) -> PartitionsResponse {
        let requested = || {
            request
                .topics
                .iter()
                .map(|(topic, partitions)| (topic, partitions.clone()))
        };

        if let Err(code) = Self::authorize(connection, &request.client_id) {
            return PartitionsResponse::failed(code, requested());
        }

        self.handler
            .add_partitions_to_txn(
                &request.client_id,
                &request.transaction_id,
                request.producer_id,
                request.producer_epoch,
                &request.topics,
            )
            .await
            .map_or_else(
                |err| {
                    PartitionsResponse::failed(
                        error_code("add_partitions_to_txn", &err),
                        requested(),
                    )
                },
                |results| PartitionsResponse {
                    error_code: ErrorCode::None,
                    results,
                },
            )
    }

    #[instrument(skip_all, fields(transaction_id = request.transaction_id))]
    pub async fn txn_offset_commit(
        &self,
        connection: Option<&Connection>,
        request: TxnOffsetCommitRequest,
    ) -> PartitionsResponse {
        let requested = || {
            request.topics.iter().map(|(topic, commits)| {
                (
                    topic,
                    commits
                        .iter()
                        .map(|commit| commit.partition)
                        .collect::<Vec<_>>(),
                )
            })
        };

        if let Err(code) = Self::authorize(connection, &request.client_id) {
            return PartitionsResponse::failed(code, requested());
        }

        self.handler
            .txn_offset_commit(
                &request.client_id,
                &request.transaction_id,
                request.producer_id,
                request.producer_epoch,
                &request.group_id,
                &request.topics,
            )
            .await
            .map_or_else(
                |err| PartitionsResponse::failed(error_code("txn_offset_commit", &err), requested()),
                |results| PartitionsResponse {
                    error_code: ErrorCode::None,
                    results,
                },
            )
    }

    #[instrument(skip_all, fields(transaction_id = request.transaction_id))]
    pub async fn end_txn(
        &self,
        connection: Option<&Connection>,
        request: EndTxnRequest,
    ) -> EndTxnResponse {
        if let Err(code) = Self::authorize(connection, &request.client_id) {
            return EndTxnResponse { error_code: code };
        }

        let code = self
            .handler
            .end_txn(
                &request.client_id,
                &request.transaction_id,
                request.producer_id,
                request.producer_epoch,
                request.committed,
            )
            .await
            .map_or_else(|err| error_code("end_txn", &err), |_| ErrorCode::None);

        EndTxnResponse { error_code: code }
    }
}
