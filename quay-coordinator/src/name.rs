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

//! Name Service
//!
//! Read only topic, partition group and broker location facts. Absence is a
//! normal outcome and is represented by `None`, not an error.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Debug,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub mod memory;

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Broker {
    pub id: i32,
    pub host: String,
    pub port: u16,
}

impl Broker {
    pub fn new(id: i32, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct DataCenter {
    pub region: String,
    pub code: String,
}

/// A group of partitions replicated together, led by a single broker.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PartitionGroup {
    pub group: i32,
    pub leader: Option<Broker>,
    pub partitions: BTreeSet<i32>,
}

impl PartitionGroup {
    pub fn new(group: i32, leader: Option<Broker>, partitions: impl IntoIterator<Item = i32>) -> Self {
        Self {
            group,
            leader,
            partitions: partitions.into_iter().collect(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct TopicConfig {
    pub name: String,
    pub partition_groups: BTreeMap<i32, PartitionGroup>,
}

impl TopicConfig {
    pub fn new(name: impl Into<String>, groups: impl IntoIterator<Item = PartitionGroup>) -> Self {
        Self {
            name: name.into(),
            partition_groups: groups
                .into_iter()
                .map(|group| (group.group, group))
                .collect(),
        }
    }

    pub fn partition_group_by_partition(&self, partition: i32) -> Option<&PartitionGroup> {
        self.partition_groups
            .values()
            .find(|group| group.partitions.contains(&partition))
    }

    pub fn partition_groups(&self) -> impl Iterator<Item = &PartitionGroup> {
        self.partition_groups.values()
    }
}

#[async_trait]
pub trait NameService: Debug + Send + Sync + 'static {
    async fn topic_config(&self, topic: &str) -> Result<Option<TopicConfig>>;

    /// The data center hosting a broker, looked up by host.
    async fn data_center(&self, host: &str) -> Result<Option<DataCenter>>;
}
