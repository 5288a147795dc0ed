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

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    Error, ErrorCode,
    assignment::{handler::PartitionAssignmentHandler, region},
    lifecycle::Lifecycle,
    name::NameService,
    oracle::Ownership,
};

use super::{Connection, error_code, millis};

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FetchAssignedPartitionData {
    pub topic: String,
    pub nearby: bool,
    pub session_timeout_ms: i32,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FetchAssignedPartitionRequest {
    pub app: String,
    pub topics: Vec<FetchAssignedPartitionData>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FetchAssignedPartitionAck {
    pub error_code: ErrorCode,
    pub partitions: Vec<i32>,
}

impl From<ErrorCode> for FetchAssignedPartitionAck {
    fn from(error_code: ErrorCode) -> Self {
        Self {
            error_code,
            partitions: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FetchAssignedPartitionResponse {
    pub error_code: ErrorCode,
    pub topics: BTreeMap<String, FetchAssignedPartitionAck>,
}

impl From<ErrorCode> for FetchAssignedPartitionResponse {
    fn from(error_code: ErrorCode) -> Self {
        Self {
            error_code,
            topics: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FetchAssignedPartitionService {
    lifecycle: Lifecycle,
    ownership: Arc<dyn Ownership>,
    name_service: Arc<dyn NameService>,
    handler: PartitionAssignmentHandler,
}

impl FetchAssignedPartitionService {
    pub fn new(
        lifecycle: Lifecycle,
        ownership: Arc<dyn Ownership>,
        name_service: Arc<dyn NameService>,
        handler: PartitionAssignmentHandler,
    ) -> Self {
        Self {
            lifecycle,
            ownership,
            name_service,
            handler,
        }
    }

    pub fn handler(&self) -> &PartitionAssignmentHandler {
        &self.handler
    }

    #[instrument(skip_all, fields(app = request.app))]
    pub async fn serve(
        &self,
        connection: Option<&Connection>,
        request: FetchAssignedPartitionRequest,
    ) -> FetchAssignedPartitionResponse {
        let Some(connection) = connection.filter(|connection| connection.is_authorized(&request.app))
        else {
            warn!(app = request.app, connection_not_found = true);
            return ErrorCode::ConnectionNotFound.into();
        };

        if !self.lifecycle.is_running() {
            return ErrorCode::CoordinatorNotCurrent.into();
        }

        match self.ownership.is_current_group(&request.app).await {
            Ok(true) => (),

            Ok(false) => {
                warn!(app = request.app, topics = ?request.topics, current = false);
                return ErrorCode::CoordinatorNotCurrent.into();
            }

            Err(err) => {
                return error_code("fetch_assigned_partition", &err).into();
            }
        }

        let mut topics = BTreeMap::new();

        for data in &request.topics {
            let ack = self
                .assign(connection, &request.app, data)
                .await
                .unwrap_or_else(|err| {
                    debug!(topic = data.topic, ?err);

                    let code = match err {
                        Error::Api(
                            code @ (ErrorCode::TopicNotExist | ErrorCode::NoPartitions),
                        ) => code,

                        Error::Api(_) => ErrorCode::AssignorError,

                        otherwise => {
                            _ = error_code("fetch_assigned_partition", &otherwise);
                            ErrorCode::AssignorError
                        }
                    };

                    code.into()
                });

            _ = topics.insert(data.topic.clone(), ack);
        }

        FetchAssignedPartitionResponse {
            error_code: ErrorCode::None,
            topics,
        }
    }

    async fn assign(
        &self,
        connection: &Connection,
        app: &str,
        data: &FetchAssignedPartitionData,
    ) -> crate::Result<FetchAssignedPartitionAck> {
        let config = self
            .name_service
            .topic_config(&data.topic)
            .await?
            .ok_or(Error::Api(ErrorCode::TopicNotExist))?;

        let groups = config.partition_groups.into_values();

        let candidates = if data.nearby {
            region::nearby(groups, connection.region.as_deref(), self.name_service.as_ref())
                .await?
        } else {
            groups.collect()
        };

        if candidates.is_empty() {
            return Err(Error::Api(ErrorCode::NoPartitions));
        }

        self.handler
            .assign(
                &data.topic,
                app,
                &connection.id,
                &connection.host,
                millis(data.session_timeout_ms),
                &candidates,
            )
            .await
            .map(|assignment| FetchAssignedPartitionAck {
                error_code: ErrorCode::None,
                partitions: assignment.partitions.into_iter().collect(),
            })
    }
}
