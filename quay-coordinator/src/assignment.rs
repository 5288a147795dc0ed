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

//! Partition Assignment Coordinator
//!
//! Hands out the partitions of a topic to the live members of an app,
//! optionally restricted to partition groups led in the member's region.
//! Computed assignments are cached per (topic, app) for a TTL and reused
//! while every live member keeps the same eligible partitions.

use std::{
    collections::BTreeSet,
    fmt::{self, Display, Formatter},
    str::FromStr,
    sync::Arc,
    time::SystemTime,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub mod cache;
pub mod handler;
pub mod members;
pub mod region;
pub mod strategy;

use strategy::{AssignmentStrategy, RoundRobin, Sticky};

/// The partitions of a topic assigned to one member of an app.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PartitionAssignment {
    pub topic: String,
    pub app: String,
    pub partitions: BTreeSet<i32>,
    pub version: u64,
    pub created_at: SystemTime,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Strategy {
    #[default]
    Sticky,
    RoundRobin,
}

impl Strategy {
    pub fn assignor(&self) -> Arc<dyn AssignmentStrategy> {
        match self {
            Self::Sticky => Arc::new(Sticky),
            Self::RoundRobin => Arc::new(RoundRobin),
        }
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sticky" => Ok(Self::Sticky),
            "round-robin" => Ok(Self::RoundRobin),
            otherwise => Err(Error::UnsupportedAssignmentStrategy(otherwise.to_owned())),
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.assignor().name())
    }
}
