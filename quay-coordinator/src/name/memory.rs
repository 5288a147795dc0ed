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
    str::FromStr,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

use super::{Broker, DataCenter, NameService, TopicConfig};

/// Topics and broker locations, loadable from JSON.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Topology {
    #[serde(default)]
    pub topics: BTreeMap<String, TopicConfig>,

    /// Data centers by broker host.
    #[serde(default)]
    pub data_centers: BTreeMap<String, DataCenter>,
}

impl FromStr for Topology {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map_err(Into::into)
    }
}

/// In memory name service, clones share the same topology.
#[derive(Clone, Debug, Default)]
pub struct InMemory {
    topology: Arc<RwLock<Topology>>,
}

impl From<Topology> for InMemory {
    fn from(topology: Topology) -> Self {
        Self {
            topology: Arc::new(RwLock::new(topology)),
        }
    }
}

impl InMemory {
    pub fn topic(self, topic: TopicConfig) -> Result<Self> {
        self.upsert_topic(topic).map(|()| self)
    }

    pub fn data_center(self, host: impl Into<String>, data_center: DataCenter) -> Result<Self> {
        {
            let mut topology = self.topology.write()?;
            _ = topology.data_centers.insert(host.into(), data_center);
        }

        Ok(self)
    }

    pub fn upsert_topic(&self, topic: TopicConfig) -> Result<()> {
        debug!(?topic);

        self.topology
            .write()
            .map(|mut topology| {
                _ = topology.topics.insert(topic.name.clone(), topic);
            })
            .map_err(Into::into)
    }

    /// Replace the leader of a partition group, returning the previous leader.
    pub fn elect(
        &self,
        topic: &str,
        group: i32,
        leader: Option<Broker>,
    ) -> Result<Option<Broker>> {
        debug!(topic, group, ?leader);

        let mut topology = self.topology.write()?;

        topology
            .topics
            .get_mut(topic)
            .and_then(|config| config.partition_groups.get_mut(&group))
            .ok_or(Error::Message(format!(
                "unknown partition group: {topic}/{group}"
            )))
            .map(|partition_group| std::mem::replace(&mut partition_group.leader, leader))
    }
}

#[async_trait]
impl NameService for InMemory {
    async fn topic_config(&self, topic: &str) -> Result<Option<TopicConfig>> {
        self.topology
            .read()
            .map(|topology| topology.topics.get(topic).cloned())
            .map_err(Into::into)
    }

    async fn data_center(&self, host: &str) -> Result<Option<DataCenter>> {
        self.topology
            .read()
            .map(|topology| topology.data_centers.get(host).cloned())
            .map_err(Into::into)
    }
}
